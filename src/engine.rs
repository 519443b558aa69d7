//! The request/response engine: decides for each inbound frame whether to
//! answer with OFFER, ACK, or NAK, or to drop it, and where the reply goes.
//!
//! All mutable server state lives here: the binding table, the allocation
//! cursor, and the server identity. The engine never touches a socket; it
//! consumes raw datagram bytes and yields a serialized reply plus its
//! destination, which keeps every conformance decision testable without
//! network plumbing.

use std::net::{Ipv4Addr, SocketAddrV4};

use tracing::{debug, info};

use crate::binding::{BindingTable, next_free};
use crate::config::{AddressRange, Config, sanitize_hostname};
use crate::error::{Error, Result};
use crate::options::{MessageType, OptionCode};
use crate::packet::{BROADCAST_FLAG, DHCP_REPLY_SIZE, DhcpPacket, ReplyFrame};

/// DHCP ports (RFC 2131 section 4.1).
pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;

/// Advertised lease duration. Fixed: this server announces a lease time
/// but keeps no expiry state.
pub const LEASE_TIME_SECS: u32 = 3600;

/// A serialized reply and the address it must be sent to.
#[derive(Debug, Clone)]
pub struct Reply {
    pub frame: [u8; DHCP_REPLY_SIZE],
    pub destination: SocketAddrV4,
}

pub struct Engine {
    server_ip: Ipv4Addr,
    subnet_mask: Ipv4Addr,
    server_hostname: String,
    range: AddressRange,
    bindings: BindingTable,
    /// Numeric value of the most recently offered address. Starts at
    /// `max_addr` so the first allocation wraps to `min_addr`.
    last_offer: u32,
}

impl Engine {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let range = config.address_range();
        assert!(
            range.contains(config.server_ip),
            "server address {} outside allocation range [{} - {}]",
            config.server_ip,
            range.min_addr,
            range.max_addr
        );

        let mut bindings = BindingTable::new();
        // Sentinel with an empty client id; keeps the server's own address
        // out of the allocatable set without ever matching a request.
        bindings.insert(config.server_ip, Vec::new())?;

        Ok(Self {
            server_ip: config.server_ip,
            subnet_mask: config.subnet_mask,
            server_hostname: config.server_hostname.clone(),
            range,
            bindings,
            last_offer: u32::from(range.max_addr),
        })
    }

    pub fn range(&self) -> &AddressRange {
        &self.range
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Handles one inbound datagram. `Ok(Some)` carries the reply,
    /// `Ok(None)` is a deliberate silent drop, and errors are dropped
    /// requests the caller may want to log.
    pub fn handle(&mut self, data: &[u8]) -> Result<Option<Reply>> {
        let request = DhcpPacket::parse(data)?;

        let message_type = match request.message_type() {
            Some(message_type) => message_type,
            None => {
                let raw = request
                    .find_option(OptionCode::MessageType)
                    .and_then(|data| data.first().copied())
                    .unwrap_or(0);
                return Err(Error::UnsupportedMessageType(raw));
            }
        };

        let hostname = match request.hostname() {
            Some(hostname) if !hostname.is_empty() => hostname,
            _ => return Err(Error::NoHostname),
        };
        // Our own stack broadcasting on this segment must not be leased an
        // address; that would invalidate the configured server address.
        if hostname == self.server_hostname {
            return Err(Error::OwnHostname);
        }
        let hostname = sanitize_hostname(&hostname);

        // RFC 2131 client identity order: CLIENT_ID option first, then the
        // whole chaddr field, trailing zeros included.
        let client_id = request
            .client_id()
            .map(<[u8]>::to_vec)
            .unwrap_or_else(|| request.chaddr.to_vec());
        let bound = self.bindings.find_by_client_id(&client_id);

        match message_type {
            MessageType::Discover => self
                .handle_discover(&request, &hostname, client_id, bound)
                .map(Some),
            MessageType::Request => self.handle_request(&request, &hostname, bound).map(Some),
            MessageType::Decline | MessageType::Release => {
                // Parsed but not acted on: bindings are never torn down
                // during the process lifetime.
                debug!("ignoring {} from \"{}\"", message_type, hostname);
                Ok(None)
            }
            MessageType::Inform => Ok(None),
            MessageType::Offer | MessageType::Ack | MessageType::Nak => {
                // Server-to-client messages have no business on port 67.
                Err(Error::UnsupportedMessageType(message_type as u8))
            }
        }
    }

    /// RFC 2131 section 4.3.1.
    fn handle_discover(
        &mut self,
        request: &DhcpPacket,
        hostname: &str,
        client_id: Vec<u8>,
        bound: Option<Ipv4Addr>,
    ) -> Result<Reply> {
        let offer = match bound {
            Some(address) => address,
            None => {
                let address = next_free(&self.range, self.last_offer, &self.bindings)
                    .ok_or(Error::RangeExhausted)?;
                self.bindings.insert(address, client_id)?;
                address
            }
        };
        // Moved even on sticky reuse, so a reboot storm of known clients
        // keeps rotating the scan start for newcomers.
        self.last_offer = u32::from(offer);

        info!(
            "offering {} to \"{}\" ({})",
            offer,
            hostname,
            request.mac_address()
        );

        Ok(self.build_reply(request, MessageType::Offer, offer, Ipv4Addr::UNSPECIFIED))
    }

    /// RFC 2131 section 4.3.2. The three REQUEST flavors are told apart by
    /// which fields the client populated.
    fn handle_request(
        &self,
        request: &DhcpPacket,
        hostname: &str,
        bound: Option<Ipv4Addr>,
    ) -> Result<Reply> {
        let acked = if request.server_id() == Some(self.server_ip) {
            // SELECTING: the client is answering our OFFER.
            bound
        } else if let Some(requested) = request.requested_ip() {
            // INIT-REBOOT. The RFC forbids a non-zero ciaddr here, but some
            // clients set one anyway; tolerate it.
            bound.filter(|address| *address == requested)
        } else if request.ciaddr != Ipv4Addr::UNSPECIFIED {
            // RENEWING or REBINDING: the claimed address rides in ciaddr.
            bound.filter(|address| *address == request.ciaddr)
        } else {
            return Err(Error::InvalidRequestCombination);
        };

        match acked {
            Some(address) => {
                info!(
                    "acknowledging \"{}\" ({}) at {}",
                    hostname,
                    request.mac_address(),
                    address
                );
                Ok(self.build_reply(request, MessageType::Ack, address, address))
            }
            None => {
                info!(
                    "denying \"{}\" ({}) an unoffered address",
                    hostname,
                    request.mac_address()
                );
                Ok(self.build_reply(
                    request,
                    MessageType::Nak,
                    Ipv4Addr::UNSPECIFIED,
                    Ipv4Addr::UNSPECIFIED,
                ))
            }
        }
    }

    /// Serializes the reply and picks its destination (RFC 2131 section
    /// 4.1): relays get the reply on the server port with the broadcast
    /// flag forced, NAKs are always broadcast, and without an ARP-primed
    /// unicast path every other case that lacks a usable ciaddr falls back
    /// to limited broadcast, relying on clients to filter on xid/chaddr.
    fn build_reply(
        &self,
        request: &DhcpPacket,
        message_type: MessageType,
        yiaddr: Ipv4Addr,
        ciaddr: Ipv4Addr,
    ) -> Reply {
        let mut reply = ReplyFrame::for_request(
            request,
            message_type,
            yiaddr,
            ciaddr,
            LEASE_TIME_SECS,
            self.subnet_mask,
            self.server_ip,
        );

        let destination = if request.giaddr != Ipv4Addr::UNSPECIFIED {
            reply.flags |= BROADCAST_FLAG;
            SocketAddrV4::new(request.giaddr, DHCP_SERVER_PORT)
        } else if message_type == MessageType::Nak {
            SocketAddrV4::new(Ipv4Addr::BROADCAST, DHCP_CLIENT_PORT)
        } else if request.ciaddr != Ipv4Addr::UNSPECIFIED {
            SocketAddrV4::new(request.ciaddr, DHCP_CLIENT_PORT)
        } else {
            SocketAddrV4::new(Ipv4Addr::BROADCAST, DHCP_CLIENT_PORT)
        };

        Reply {
            frame: reply.encode(),
            destination,
        }
    }
}
