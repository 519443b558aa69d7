//! Client-identifier to address bindings and address allocation.
//!
//! The table is a flat vector scanned linearly by either key. At the
//! dozens-of-clients scale this server targets, the scans are cheaper than
//! maintaining two indexes; the contract below leaves room for a dual-index
//! representation without changing callers.
//!
//! Bindings are created on DISCOVER and live until the process exits.
//! There is no expiry accounting: the advertised lease time is a fixed
//! announcement, not a tracked deadline.

use std::net::Ipv4Addr;

use crate::config::AddressRange;
use crate::error::{Error, Result};

/// One address assignment. The client id is either the CLIENT_ID option
/// bytes or the full 16-byte chaddr field, treated as opaque either way.
///
/// The table also holds one sentinel row for the server's own address with
/// an empty client id. No request can match it; it exists only to keep the
/// server's address out of the allocatable set.
#[derive(Debug, Clone)]
pub struct Binding {
    pub address: Ipv4Addr,
    pub client_id: Vec<u8>,
}

/// In-memory binding table.
///
/// Invariants: no two entries share an address, and no two entries share a
/// non-empty client id. Callers uphold these by looking up before
/// inserting.
#[derive(Debug, Default)]
pub struct BindingTable {
    entries: Vec<Binding>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address bound to `client_id`, if any. Empty stored ids (the server
    /// sentinel) never match, whatever the query.
    pub fn find_by_client_id(&self, client_id: &[u8]) -> Option<Ipv4Addr> {
        self.entries
            .iter()
            .find(|entry| !entry.client_id.is_empty() && entry.client_id == client_id)
            .map(|entry| entry.address)
    }

    pub fn contains_address(&self, address: Ipv4Addr) -> bool {
        self.entries.iter().any(|entry| entry.address == address)
    }

    /// Appends a binding. The caller guarantees neither key is already
    /// present.
    pub fn insert(&mut self, address: Ipv4Addr, client_id: Vec<u8>) -> Result<()> {
        self.entries
            .try_reserve(1)
            .map_err(|_| Error::OutOfMemory)?;
        self.entries.push(Binding { address, client_id });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Next unbound address after `cursor`, wrapping past `max_addr` back to
/// `min_addr`. Returns `None` once a full circuit finds every address
/// bound. The caller moves the cursor to the returned address when the
/// offer goes out.
pub fn next_free(range: &AddressRange, cursor: u32, table: &BindingTable) -> Option<Ipv4Addr> {
    let min = u32::from(range.min_addr);
    let max = u32::from(range.max_addr);

    let mut candidate = if cursor < min || cursor >= max {
        min
    } else {
        cursor + 1
    };

    for _ in 0..range.size() {
        let address = Ipv4Addr::from(candidate);
        if !table.contains_address(address) {
            return Some(address);
        }
        candidate = if candidate == max { min } else { candidate + 1 };
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_range() -> AddressRange {
        AddressRange {
            min_addr: Ipv4Addr::new(10, 0, 0, 2),
            max_addr: Ipv4Addr::new(10, 0, 0, 6),
        }
    }

    #[test]
    fn test_find_by_client_id() {
        let mut table = BindingTable::new();
        table
            .insert(Ipv4Addr::new(10, 0, 0, 2), b"alice-id".to_vec())
            .unwrap();

        assert_eq!(
            table.find_by_client_id(b"alice-id"),
            Some(Ipv4Addr::new(10, 0, 0, 2))
        );
        assert_eq!(table.find_by_client_id(b"bob-id"), None);
        assert_eq!(table.find_by_client_id(b"alice"), None);
    }

    #[test]
    fn test_sentinel_never_matches() {
        let mut table = BindingTable::new();
        table.insert(Ipv4Addr::new(10, 0, 0, 5), Vec::new()).unwrap();

        assert_eq!(table.find_by_client_id(b""), None);
        assert_eq!(table.find_by_client_id(b"anything"), None);
        assert!(table.contains_address(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_first_allocation_wraps_to_min() {
        let range = test_range();
        let table = BindingTable::new();

        // Cursor starts at max so the first allocation lands on min.
        let cursor = u32::from(range.max_addr);
        assert_eq!(
            next_free(&range, cursor, &table),
            Some(Ipv4Addr::new(10, 0, 0, 2))
        );
    }

    #[test]
    fn test_allocation_skips_bound_addresses() {
        let range = test_range();
        let mut table = BindingTable::new();
        table.insert(Ipv4Addr::new(10, 0, 0, 3), b"a".to_vec()).unwrap();
        table.insert(Ipv4Addr::new(10, 0, 0, 4), b"b".to_vec()).unwrap();

        let cursor = u32::from(Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(
            next_free(&range, cursor, &table),
            Some(Ipv4Addr::new(10, 0, 0, 5))
        );
    }

    #[test]
    fn test_allocation_wraps_around_max() {
        let range = test_range();
        let mut table = BindingTable::new();
        table.insert(Ipv4Addr::new(10, 0, 0, 6), b"a".to_vec()).unwrap();

        let cursor = u32::from(Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(
            next_free(&range, cursor, &table),
            Some(Ipv4Addr::new(10, 0, 0, 2))
        );
    }

    #[test]
    fn test_range_exhaustion() {
        let range = test_range();
        let mut table = BindingTable::new();
        for (offset, id) in (2..=6).zip(b'a'..) {
            table
                .insert(Ipv4Addr::new(10, 0, 0, offset), vec![id])
                .unwrap();
        }

        let cursor = u32::from(range.max_addr);
        assert_eq!(next_free(&range, cursor, &table), None);
    }

    #[test]
    fn test_single_address_range() {
        let range = AddressRange {
            min_addr: Ipv4Addr::new(10, 0, 0, 2),
            max_addr: Ipv4Addr::new(10, 0, 0, 2),
        };
        let mut table = BindingTable::new();

        let cursor = u32::from(range.max_addr);
        assert_eq!(
            next_free(&range, cursor, &table),
            Some(Ipv4Addr::new(10, 0, 0, 2))
        );

        table.insert(Ipv4Addr::new(10, 0, 0, 2), b"a".to_vec()).unwrap();
        assert_eq!(next_free(&range, cursor, &table), None);
    }
}
