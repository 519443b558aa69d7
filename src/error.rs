#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Malformed DHCP frame: {0}")]
    MalformedFrame(String),

    #[error("Unsupported DHCP message type {0}")]
    UnsupportedMessageType(u8),

    #[error("Request carries no hostname")]
    NoHostname,

    #[error("Request carries this server's own hostname")]
    OwnHostname,

    #[error("No free addresses left in the allocation range")]
    RangeExhausted,

    #[error("Out of memory while recording a binding")]
    OutOfMemory,

    #[error("REQUEST without server identifier, requested address, or ciaddr")]
    InvalidRequestCombination,
}

pub type Result<T> = std::result::Result<T, Error>;
