use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;

/// Process-unique identity of one transport channel.
///
/// Two channels may share a name (a duplicate negotiation); they never share
/// an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// A negotiated data channel.
///
/// Inbound messages and close notifications are not callbacks on the handle;
/// they arrive as [`crate::TransportEvent`]s tagged with [`ChannelHandle::id`].
pub trait ChannelHandle: Send + Sync + fmt::Debug {
    /// Transport-assigned identity.
    fn id(&self) -> ChannelId;

    /// Channel label agreed during negotiation.
    fn name(&self) -> &str;

    /// Send one text message to the remote end.
    fn send(&self, data: &str) -> Result<()>;

    /// Whether the channel can still carry messages.
    fn is_open(&self) -> bool;
}

/// Shared handle to a negotiated channel.
pub type SharedChannel = Arc<dyn ChannelHandle>;

/// The connection primitive that negotiates data channels with a peer.
pub trait Connection: Send + Sync {
    /// Ask the remote peer to open a data channel with this label.
    ///
    /// Success means the request was issued. The channel itself shows up
    /// later as a `ChannelOpen` event.
    fn create_channel(&self, name: &str) -> Result<()>;
}

impl<C: Connection + ?Sized> Connection for Arc<C> {
    fn create_channel(&self, name: &str) -> Result<()> {
        (**self).create_channel(name)
    }
}
