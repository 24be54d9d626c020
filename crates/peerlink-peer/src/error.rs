use crate::binder::SlotId;
use crate::service::ServiceError;

/// Errors that can occur in peer session operations.
///
/// None of these is fatal to the session. Inbound failures are logged and
/// the offending message dropped; failures of display-layer actions are
/// returned to the caller.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Another channel already holds this name.
    #[error("channel '{0}' is already bound")]
    DuplicateBinding(String),

    /// The payload could not be decoded or violates the envelope rules.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] peerlink_codec::CodecError),

    /// The market-data session could not be started.
    #[error("market data session could not be started")]
    SessionStartFailure,

    /// No channel is available to carry the message.
    #[error("no channel bound")]
    NoChannelBound,

    /// The channel was unbound while a reply was being prepared.
    #[error("channel was unbound before the reply could be sent")]
    StaleChannel,

    /// The connection has not completed its ready handshake.
    #[error("connection is not ready")]
    NotReady,

    /// The slot already holds a channel.
    #[error("{0} is bound")]
    SlotBound(SlotId),

    /// The slot has no channel name to create a channel with.
    #[error("{0} has no channel name")]
    EmptySlotName(SlotId),

    /// No slot with this index.
    #[error("no slot with index {0}")]
    UnknownSlot(usize),

    /// A forwarded reference data request is still waiting for its reply.
    #[error("a request is already outstanding on channel '{0}'")]
    RequestInFlight(String),

    /// The market-data service reported an error.
    #[error("service failure: {0}")]
    ServiceFailure(#[from] ServiceError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] peerlink_transport::TransportError),

    /// Schema validation error.
    #[cfg(feature = "schema")]
    #[error("schema validation error: {0}")]
    Schema(#[from] peerlink_schema::SchemaError),
}

pub type Result<T> = std::result::Result<T, PeerError>;
