pub mod binding;
pub mod config;
pub mod engine;
pub mod error;
pub mod options;
pub mod packet;
pub mod server;

pub use binding::{Binding, BindingTable};
pub use config::{AddressRange, Config};
pub use engine::{Engine, Reply};
pub use error::{Error, Result};
pub use options::{MessageType, OptionCode, RawOption};
pub use packet::{DhcpPacket, ReplyFrame};
pub use server::DhcpServer;
