use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::options::{MessageType, OptionCode, RawOption};

pub const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
pub const BOOTREQUEST: u8 = 1;
pub const BOOTREPLY: u8 = 2;
/// Broadcast bit of the flags field (RFC 2131 section 2).
pub const BROADCAST_FLAG: u16 = 0x8000;
/// Fixed header (236 bytes) plus the magic cookie.
pub const DHCP_MIN_FRAME_SIZE: usize = 240;
/// Every reply uses the same serialized layout: header, magic cookie,
/// MSG_TYPE(3), LEASE_TIME(6), SUBNETMASK(6), SERVER_ID(6), END(1).
pub const DHCP_REPLY_SIZE: usize = 262;

/// Written into the sname field of every reply, zero-padded to 64 bytes.
const REPLY_SERVER_NAME: &[u8] = b"lanlease DHCP server";

#[derive(Debug, Clone)]
pub struct DhcpPacket {
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: [u8; 16],
    pub sname: [u8; 64],
    pub file: [u8; 128],
    pub options: Vec<RawOption>,
}

impl DhcpPacket {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < DHCP_MIN_FRAME_SIZE {
            return Err(Error::MalformedFrame(format!(
                "frame too short: {} bytes (minimum {})",
                data.len(),
                DHCP_MIN_FRAME_SIZE
            )));
        }

        let op = data[0];
        if op != BOOTREQUEST {
            return Err(Error::MalformedFrame(format!("op {} is not BOOTREQUEST", op)));
        }

        let magic_cookie = &data[236..240];
        if magic_cookie != DHCP_MAGIC_COOKIE {
            return Err(Error::MalformedFrame("bad magic cookie".to_string()));
        }

        let htype = data[1];
        let hlen = data[2];
        let hops = data[3];

        let xid = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let secs = u16::from_be_bytes([data[8], data[9]]);
        let flags = u16::from_be_bytes([data[10], data[11]]);

        let ciaddr = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
        let yiaddr = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
        let siaddr = Ipv4Addr::new(data[20], data[21], data[22], data[23]);
        let giaddr = Ipv4Addr::new(data[24], data[25], data[26], data[27]);

        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(&data[28..44]);

        let mut sname = [0u8; 64];
        sname.copy_from_slice(&data[44..108]);

        let mut file = [0u8; 128];
        file.copy_from_slice(&data[108..236]);

        let options = Self::walk_options(&data[240..]);

        Ok(Self {
            op,
            htype,
            hlen,
            hops,
            xid,
            secs,
            flags,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr,
            chaddr,
            sname,
            file,
            options,
        })
    }

    /// Collects (tag, value) entries from the options area. PAD bytes are
    /// skipped and END stops the walk. A declared length that overruns the
    /// buffer also stops the walk: clients in the wild sometimes pad or
    /// truncate, and whatever was collected up to that point stays usable.
    fn walk_options(data: &[u8]) -> Vec<RawOption> {
        let mut options = Vec::new();
        let mut index = 0;

        while index < data.len() {
            let code = data[index];

            if code == OptionCode::Pad as u8 {
                index += 1;
                continue;
            }

            if code == OptionCode::End as u8 {
                break;
            }

            if index + 1 >= data.len() {
                break;
            }

            let length = data[index + 1] as usize;

            if index + 2 + length > data.len() {
                break;
            }

            options.push(RawOption {
                code,
                data: data[index + 2..index + 2 + length].to_vec(),
            });

            index += 2 + length;
        }

        options
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(DHCP_REPLY_SIZE);

        packet.push(self.op);
        packet.push(self.htype);
        packet.push(self.hlen);
        packet.push(self.hops);

        packet.extend_from_slice(&self.xid.to_be_bytes());
        packet.extend_from_slice(&self.secs.to_be_bytes());
        packet.extend_from_slice(&self.flags.to_be_bytes());

        packet.extend_from_slice(&self.ciaddr.octets());
        packet.extend_from_slice(&self.yiaddr.octets());
        packet.extend_from_slice(&self.siaddr.octets());
        packet.extend_from_slice(&self.giaddr.octets());

        packet.extend_from_slice(&self.chaddr);
        packet.extend_from_slice(&self.sname);
        packet.extend_from_slice(&self.file);

        packet.extend_from_slice(&DHCP_MAGIC_COOKIE);

        for option in &self.options {
            packet.extend_from_slice(&option.encode());
        }

        packet.push(OptionCode::End as u8);

        packet
    }

    /// First occurrence wins on duplicate tags.
    pub fn find_option(&self, code: OptionCode) -> Option<&[u8]> {
        self.options
            .iter()
            .find(|option| option.code == code as u8)
            .map(|option| option.data.as_slice())
    }

    pub fn message_type(&self) -> Option<MessageType> {
        let data = self.find_option(OptionCode::MessageType)?;
        if data.len() != 1 {
            return None;
        }
        MessageType::try_from(data[0]).ok()
    }

    pub fn hostname(&self) -> Option<String> {
        self.find_option(OptionCode::HostName)
            .map(|data| String::from_utf8_lossy(data).into_owned())
    }

    pub fn requested_ip(&self) -> Option<Ipv4Addr> {
        match self.find_option(OptionCode::RequestedIpAddress)? {
            [a, b, c, d] => Some(Ipv4Addr::new(*a, *b, *c, *d)),
            _ => None,
        }
    }

    pub fn server_id(&self) -> Option<Ipv4Addr> {
        match self.find_option(OptionCode::ServerIdentifier)? {
            [a, b, c, d] => Some(Ipv4Addr::new(*a, *b, *c, *d)),
            _ => None,
        }
    }

    /// CLIENT_ID option bytes, verbatim. Callers fall back to the full
    /// chaddr field when absent (RFC 2131 client identity order).
    pub fn client_id(&self) -> Option<&[u8]> {
        self.find_option(OptionCode::ClientIdentifier)
    }

    pub fn mac_address(&self) -> String {
        self.chaddr[..6]
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect::<Vec<_>>()
            .join(":")
    }

    pub fn is_broadcast(&self) -> bool {
        (self.flags & BROADCAST_FLAG) != 0
    }
}

/// Header and option values for an outbound reply. `encode` produces the
/// fixed 262-byte layout; only the engine decides the field values.
#[derive(Debug, Clone)]
pub struct ReplyFrame {
    pub message_type: MessageType,
    pub htype: u8,
    pub hlen: u8,
    pub xid: u32,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: [u8; 16],
    pub lease_secs: u32,
    pub subnet_mask: Ipv4Addr,
    pub server_id: Ipv4Addr,
}

impl ReplyFrame {
    /// Builds a reply echoing the fields RFC 2131 requires from the
    /// request: xid, flags, giaddr, chaddr, htype, hlen. hops, secs,
    /// siaddr, and file stay zero.
    pub fn for_request(
        request: &DhcpPacket,
        message_type: MessageType,
        yiaddr: Ipv4Addr,
        ciaddr: Ipv4Addr,
        lease_secs: u32,
        subnet_mask: Ipv4Addr,
        server_id: Ipv4Addr,
    ) -> Self {
        Self {
            message_type,
            htype: request.htype,
            hlen: request.hlen,
            xid: request.xid,
            flags: request.flags,
            ciaddr,
            yiaddr,
            giaddr: request.giaddr,
            chaddr: request.chaddr,
            lease_secs,
            subnet_mask,
            server_id,
        }
    }

    /// Serializes into the constant reply layout. For NAK the LEASE_TIME
    /// and SUBNETMASK extents are left as PAD fill instead of being
    /// omitted, so the buffer length never varies by message kind.
    pub fn encode(&self) -> [u8; DHCP_REPLY_SIZE] {
        let mut frame = [0u8; DHCP_REPLY_SIZE];

        frame[0] = BOOTREPLY;
        frame[1] = self.htype;
        frame[2] = self.hlen;
        frame[4..8].copy_from_slice(&self.xid.to_be_bytes());
        frame[10..12].copy_from_slice(&self.flags.to_be_bytes());
        frame[12..16].copy_from_slice(&self.ciaddr.octets());
        frame[16..20].copy_from_slice(&self.yiaddr.octets());
        frame[24..28].copy_from_slice(&self.giaddr.octets());
        frame[28..44].copy_from_slice(&self.chaddr);

        let name_len = REPLY_SERVER_NAME.len().min(63);
        frame[44..44 + name_len].copy_from_slice(&REPLY_SERVER_NAME[..name_len]);

        frame[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);

        frame[240] = OptionCode::MessageType as u8;
        frame[241] = 1;
        frame[242] = self.message_type as u8;

        if self.message_type != MessageType::Nak {
            frame[243] = OptionCode::LeaseTime as u8;
            frame[244] = 4;
            frame[245..249].copy_from_slice(&self.lease_secs.to_be_bytes());

            frame[249] = OptionCode::SubnetMask as u8;
            frame[250] = 4;
            frame[251..255].copy_from_slice(&self.subnet_mask.octets());
        }

        frame[255] = OptionCode::ServerIdentifier as u8;
        frame[256] = 4;
        frame[257..261].copy_from_slice(&self.server_id.octets());

        frame[261] = OptionCode::End as u8;

        frame
    }
}
