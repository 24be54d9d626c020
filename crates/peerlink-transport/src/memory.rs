//! In-process loopback transport.
//!
//! [`pair`] returns two endpoints wired to each other. Creating a channel on
//! either side opens it on both, like a negotiated data channel: each side
//! receives a `ChannelOpen` carrying its own half, and text sent on one half
//! arrives as a `Message` event on the other side's queue.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Result, TransportError};
use crate::event::{event_queue, EventReceiver, EventSender, TransportEvent};
use crate::traits::{ChannelHandle, ChannelId, Connection, SharedChannel};

/// One side of a loopback pair: the connection plus its event queue.
pub struct MemoryEndpoint {
    pub connection: MemoryConnection,
    pub events: EventReceiver,
}

impl fmt::Debug for MemoryEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEndpoint")
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

/// Create two connected-but-not-ready endpoints.
///
/// Call [`MemoryConnection::connect`] on either side to emit `Ready` to both.
pub fn pair() -> (MemoryEndpoint, MemoryEndpoint) {
    let link = Arc::new(Link {
        connected: AtomicBool::new(false),
        channels: Mutex::new(Vec::new()),
    });
    let (a_tx, a_rx) = event_queue();
    let (b_tx, b_rx) = event_queue();

    let a = MemoryConnection {
        local: a_tx.clone(),
        remote: b_tx.clone(),
        link: link.clone(),
    };
    let b = MemoryConnection {
        local: b_tx,
        remote: a_tx,
        link,
    };

    (
        MemoryEndpoint {
            connection: a,
            events: a_rx,
        },
        MemoryEndpoint {
            connection: b,
            events: b_rx,
        },
    )
}

struct Link {
    connected: AtomicBool,
    channels: Mutex<Vec<Arc<AtomicBool>>>,
}

impl Link {
    fn close_all_channels(&self) {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for open in channels.drain(..) {
            open.store(false, Ordering::SeqCst);
        }
    }
}

/// Loopback connection handle. Cloning shares the same link.
#[derive(Clone)]
pub struct MemoryConnection {
    local: EventSender,
    remote: EventSender,
    link: Arc<Link>,
}

impl MemoryConnection {
    /// Complete the ready handshake on both sides.
    pub fn connect(&self) {
        self.link.connected.store(true, Ordering::SeqCst);
        emit(&self.local, TransportEvent::Ready);
        emit(&self.remote, TransportEvent::Ready);
    }

    /// Tear the connection down. Every channel on the link stops carrying
    /// messages; no per-channel close events are emitted.
    pub fn disconnect(&self) {
        if self.link.connected.swap(false, Ordering::SeqCst) {
            self.link.close_all_channels();
            emit(&self.local, TransportEvent::Disconnect);
            emit(&self.remote, TransportEvent::Disconnect);
        }
    }

    /// Simulate a local transport failure: `Error` here, `Disconnect` on the
    /// remote side.
    pub fn fail(&self, reason: &str) {
        self.link.connected.store(false, Ordering::SeqCst);
        self.link.close_all_channels();
        emit(&self.local, TransportEvent::Error(reason.to_string()));
        emit(&self.remote, TransportEvent::Disconnect);
    }

    /// Whether the link completed its handshake and is still up.
    pub fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::SeqCst)
    }
}

impl Connection for MemoryConnection {
    fn create_channel(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(TransportError::InvalidChannelName(name.to_string()));
        }
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let (near, far) = MemoryChannel::pair(name, self.local.clone(), self.remote.clone());
        self.link
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(near.open.clone());

        tracing::debug!(name, near = %near.id, far = %far.id, "memory channel created");
        emit(&self.local, TransportEvent::ChannelOpen(near as SharedChannel));
        emit(&self.remote, TransportEvent::ChannelOpen(far as SharedChannel));
        Ok(())
    }
}

impl fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// One half of a loopback data channel.
pub struct MemoryChannel {
    id: ChannelId,
    peer_id: ChannelId,
    name: String,
    open: Arc<AtomicBool>,
    local: EventSender,
    remote: EventSender,
}

impl MemoryChannel {
    /// Build both halves of a channel. `local` receives events for the first
    /// half, `remote` for the second.
    pub fn pair(name: &str, local: EventSender, remote: EventSender) -> (Arc<Self>, Arc<Self>) {
        let open = Arc::new(AtomicBool::new(true));
        let near_id = ChannelId::next();
        let far_id = ChannelId::next();

        let near = Arc::new(Self {
            id: near_id,
            peer_id: far_id,
            name: name.to_string(),
            open: open.clone(),
            local: local.clone(),
            remote: remote.clone(),
        });
        let far = Arc::new(Self {
            id: far_id,
            peer_id: near_id,
            name: name.to_string(),
            open,
            local: remote,
            remote: local,
        });
        (near, far)
    }

    /// Id of the other half.
    pub fn peer_id(&self) -> ChannelId {
        self.peer_id
    }

    /// Close both halves and notify both sides.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            emit(&self.local, TransportEvent::ChannelClosed(self.id));
            emit(&self.remote, TransportEvent::ChannelClosed(self.peer_id));
        }
    }
}

impl ChannelHandle for MemoryChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, data: &str) -> Result<()> {
        if !self.is_open() {
            return Err(TransportError::ChannelClosed(self.name.clone()));
        }
        self.remote
            .send(TransportEvent::Message {
                channel: self.peer_id,
                data: data.to_string(),
            })
            .map_err(|_| TransportError::ChannelClosed(self.name.clone()))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}

fn emit(queue: &EventSender, event: TransportEvent) {
    let kind = event.kind();
    if queue.send(event).is_err() {
        tracing::debug!(kind, "event queue closed; dropping event");
    }
}
