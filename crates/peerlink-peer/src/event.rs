use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::binder::SlotId;

/// What the display layer should show.
///
/// Every user-visible outcome of the session is reported here, in the order
/// the session produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The connection is ready for channel creation.
    Ready,
    /// The connection went away. All slots have been unbound.
    Disconnected {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    SlotBound {
        slot: SlotId,
        name: String,
    },
    SlotUnbound {
        slot: SlotId,
        name: String,
    },
    /// A channel opened but no slot took it.
    ChannelRejected {
        name: String,
        reason: RejectReason,
    },
    Chat {
        slot: SlotId,
        name: String,
        text: String,
    },
    /// Reference data result, as JSON text.
    RefDataResult {
        text: String,
    },
    SubscriptionData {
        data: Value,
    },
    Status {
        topic: Topic,
        message: String,
    },
    /// A queued command could not be carried out.
    CommandFailed {
        command: String,
        error: String,
    },
}

impl SessionEvent {
    pub fn status(topic: Topic, message: impl Into<String>) -> Self {
        SessionEvent::Status {
            topic,
            message: message.into(),
        }
    }

    /// Short label for logging and table output.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Ready => "ready",
            SessionEvent::Disconnected { .. } => "disconnected",
            SessionEvent::SlotBound { .. } => "slot_bound",
            SessionEvent::SlotUnbound { .. } => "slot_unbound",
            SessionEvent::ChannelRejected { .. } => "channel_rejected",
            SessionEvent::Chat { .. } => "chat",
            SessionEvent::RefDataResult { .. } => "ref_data_result",
            SessionEvent::SubscriptionData { .. } => "subscription_data",
            SessionEvent::Status { .. } => "status",
            SessionEvent::CommandFailed { .. } => "command_failed",
        }
    }
}

/// Why a freshly opened channel was not bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Another slot already holds a channel with this name.
    DuplicateBinding,
    /// Every slot is bound or expects a different name.
    NoFreeSlot,
    /// The channel has no name to bind under.
    InvalidName,
}

/// Which status line a [`SessionEvent::Status`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Request,
    Subscribe,
    Channel,
}

pub type EventSink = mpsc::UnboundedSender<SessionEvent>;
pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;

/// Create the session's outbound event queue.
pub fn event_sink() -> (EventSink, SessionEvents) {
    mpsc::unbounded_channel()
}

/// Push an event. A dropped receiver means nobody is watching.
pub(crate) fn emit(sink: &EventSink, event: SessionEvent) {
    tracing::trace!(event = event.kind(), "session event");
    let _ = sink.send(event);
}
