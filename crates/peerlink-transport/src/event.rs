use tokio::sync::mpsc;

use crate::traits::{ChannelId, SharedChannel};

/// Lifecycle and data events emitted by a connection.
///
/// Events for one connection are delivered in order through a single queue,
/// which serializes what a browser runtime would deliver as callbacks.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The connection finished its ready handshake.
    Ready,
    /// The connection to the peer went away.
    Disconnect,
    /// The connection failed. Treated like a disconnect by consumers.
    Error(String),
    /// A data channel was negotiated, by either side.
    ChannelOpen(SharedChannel),
    /// A data channel closed.
    ChannelClosed(ChannelId),
    /// A text message arrived on a channel.
    Message { channel: ChannelId, data: String },
}

impl TransportEvent {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportEvent::Ready => "ready",
            TransportEvent::Disconnect => "disconnect",
            TransportEvent::Error(_) => "error",
            TransportEvent::ChannelOpen(_) => "channel_open",
            TransportEvent::ChannelClosed(_) => "channel_closed",
            TransportEvent::Message { .. } => "message",
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Create an event queue for one connection.
pub fn event_queue() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
