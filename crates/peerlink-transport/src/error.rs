/// Errors that can occur in connection and channel operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection has not completed its ready handshake, or was torn down.
    #[error("connection is not established")]
    NotConnected,

    /// The channel was closed locally or by the remote side.
    #[error("channel '{0}' is closed")]
    ChannelClosed(String),

    /// The channel name cannot be used for negotiation.
    #[error("invalid channel name: {0:?}")]
    InvalidChannelName(String),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
