use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Startup record describing the interface the server answers on. The
/// allocation range is derived from the address and mask rather than
/// configured directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server_ip: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    /// Used to drop requests the server's own network stack broadcasts;
    /// leasing ourselves an address would invalidate `server_ip`.
    pub server_hostname: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_ip: Ipv4Addr::new(192, 168, 1, 10),
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
            server_hostname: "lanlease".to_string(),
        }
    }
}

impl Config {
    pub async fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path).await?;
            Ok(config)
        }
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !Self::is_valid_subnet_mask(self.subnet_mask) {
            return Err(Error::InvalidConfig(format!(
                "invalid subnet mask: {} (must be contiguous)",
                self.subnet_mask
            )));
        }

        let range = self.address_range();
        if u32::from(range.min_addr) > u32::from(range.max_addr) {
            return Err(Error::InvalidConfig(format!(
                "subnet {}/{} leaves no addresses to allocate",
                self.server_ip, self.subnet_mask
            )));
        }

        if self.server_hostname.is_empty() {
            return Err(Error::InvalidConfig(
                "server_hostname must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    fn is_valid_subnet_mask(mask: Ipv4Addr) -> bool {
        let mask_bits = u32::from(mask);
        if mask_bits == 0 {
            return false;
        }
        let inverted = !mask_bits;
        inverted.count_ones() == inverted.trailing_ones()
    }

    /// Allocatable addresses on the attached subnet. `.1` is reserved for
    /// the default router and the all-ones host part is the subnet
    /// broadcast, so the range runs from `network | 2` to the address just
    /// below the broadcast.
    pub fn address_range(&self) -> AddressRange {
        let mask = u32::from(self.subnet_mask);
        let network = u32::from(self.server_ip) & mask;
        AddressRange {
            min_addr: Ipv4Addr::from(network | 2),
            max_addr: Ipv4Addr::from(network | !(mask | 1)),
        }
    }
}

/// Inclusive range of allocatable addresses, kept alongside the numeric
/// cursor arithmetic in the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    pub min_addr: Ipv4Addr,
    pub max_addr: Ipv4Addr,
}

impl AddressRange {
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let value = u32::from(addr);
        value >= u32::from(self.min_addr) && value <= u32::from(self.max_addr)
    }

    pub fn size(&self) -> u32 {
        u32::from(self.max_addr) - u32::from(self.min_addr) + 1
    }
}

pub fn sanitize_hostname(hostname: &str) -> String {
    hostname
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '.')
        .take(255)
        .collect()
}
