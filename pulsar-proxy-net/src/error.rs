use pulsar_proxy_codec::error::{DecodeError, EncodeError};

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Frame decoding error
    #[error("Decoding error: {0}")]
    Decode(#[from] DecodeError),
    /// Frame encoding error
    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),
    /// Read timeout
    #[error("Read timeout")]
    ReadTimeout,
    /// Write timeout
    #[error("Write timeout")]
    WriteTimeout,
    /// Close timeout
    #[error("Close timeout")]
    CloseTimeout,
    #[error("Connect timeout, {0}")]
    ConnectTimeout(String),
    #[error("Peer is disconnected")]
    Disconnected,
    #[error("invalid protocol, expected {0}")]
    InvalidProtocol(&'static str),
    #[error("pending queue is full, max: {0}")]
    PendingQueueFull(usize),
    #[error("too many connections, max: {0}")]
    TooManyConnections(usize),
}
