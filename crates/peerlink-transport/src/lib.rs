//! Connection and data-channel abstraction for peerlink.
//!
//! The signaling/connection primitive that discovers peers and negotiates
//! data channels lives outside this workspace. This crate describes what
//! peerlink needs from it:
//! - a [`Connection`] that can create named channels
//! - a [`ChannelHandle`] per negotiated data channel
//! - a queue of [`TransportEvent`]s carrying connection and channel lifecycle
//!
//! The [`memory`] module provides an in-process loopback pair implementing
//! the same contract, used by tests and the demo CLI.

pub mod error;
pub mod event;
pub mod memory;
pub mod traits;

pub use error::{Result, TransportError};
pub use event::{event_queue, EventReceiver, EventSender, TransportEvent};
pub use memory::{MemoryChannel, MemoryConnection, MemoryEndpoint};
pub use traits::{ChannelHandle, ChannelId, Connection, SharedChannel};
