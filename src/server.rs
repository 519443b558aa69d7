use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::engine::{DHCP_SERVER_PORT, Engine};
use crate::error::{Error, Result};

/// Largest possible UDP payload. One scratch buffer of this size is owned
/// by the receive loop for the whole process lifetime.
const RECV_BUFFER_SIZE: usize = 65_527;

pub struct DhcpServer {
    engine: Engine,
    socket: UdpSocket,
}

impl DhcpServer {
    pub async fn new(config: Config) -> Result<Self> {
        let engine = Engine::new(&config)?;
        let socket = create_socket()?;

        let range = engine.range();
        info!(
            "DHCP server starting on {}:{}",
            config.server_ip, DHCP_SERVER_PORT
        );
        info!(
            "subnet {}, allocation range [{} - {}] ({} addresses)",
            config.subnet_mask,
            range.min_addr,
            range.max_addr,
            range.size()
        );

        Ok(Self { engine, socket })
    }

    /// Sequential request loop: each datagram is fully handled and its
    /// reply sent before the next receive, so replies leave in arrival
    /// order and the engine state needs no locking.
    pub async fn run(&mut self) -> Result<()> {
        let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

        info!("DHCP server ready and listening");

        loop {
            let (size, source) = match self.socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error) if error.kind() == ErrorKind::NotConnected => {
                    info!("datagram endpoint closed, stopping request handler");
                    return Ok(());
                }
                Err(error) => {
                    error!("error receiving datagram: {}", error);
                    continue;
                }
            };

            match self.engine.handle(&buffer[..size]) {
                Ok(Some(reply)) => {
                    let destination = SocketAddr::V4(reply.destination);
                    if let Err(error) = self.socket.send_to(&reply.frame, destination).await {
                        error!("failed to send reply to {}: {}", destination, error);
                    }
                }
                Ok(None) => {}
                // Hostname filters drop without a trace; everything else
                // logs at the severity the failure deserves.
                Err(Error::NoHostname | Error::OwnHostname) => {}
                Err(error @ (Error::RangeExhausted | Error::OutOfMemory)) => {
                    error!("dropping request from {}: {}", source, error);
                }
                Err(error) => {
                    warn!("dropping request from {}: {}", source, error);
                }
            }
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

fn create_socket() -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|error| Error::Socket(format!("Failed to create socket: {}", error)))?;

    socket
        .set_reuse_address(true)
        .map_err(|error| Error::Socket(format!("Failed to set SO_REUSEADDR: {}", error)))?;

    socket
        .set_broadcast(true)
        .map_err(|error| Error::Socket(format!("Failed to set SO_BROADCAST: {}", error)))?;

    socket
        .set_nonblocking(true)
        .map_err(|error| Error::Socket(format!("Failed to set non-blocking: {}", error)))?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DHCP_SERVER_PORT);
    socket
        .bind(&bind_addr.into())
        .map_err(|error| Error::Socket(format!("Failed to bind to {}: {}", bind_addr, error)))?;

    let std_socket: std::net::UdpSocket = socket.into();
    let tokio_socket = UdpSocket::from_std(std_socket)
        .map_err(|error| Error::Socket(format!("Failed to convert to tokio socket: {}", error)))?;

    Ok(tokio_socket)
}
