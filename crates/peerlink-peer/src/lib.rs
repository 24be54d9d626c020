//! Channel binding, message routing and market-data proxying between peers.
//!
//! A [`PeerSession`] sits on top of one connection to a remote peer. It binds
//! negotiated data channels to numbered slots, routes each inbound envelope
//! to the chat sink or the [`ServiceProxy`], and reports everything the
//! display layer should show as [`SessionEvent`]s.
//!
//! A process either holds the market-data capability (a
//! [`MarketDataService`]) and answers requests itself, or forwards them
//! unchanged to a peer that does.

pub mod binder;
pub mod config;
pub mod error;
pub mod event;
pub mod proxy;
pub mod registry;
pub mod router;
pub mod service;
pub mod session;

#[cfg(test)]
mod testing;

pub use binder::{BindOutcome, Binding, BindingState, ChannelBinder, ChannelLease, SlotId};
pub use config::{ProxyConfig, SessionConfig, DEFAULT_REQUEST_TIMEOUT};
pub use error::{PeerError, Result};
pub use event::{event_sink, EventSink, RejectReason, SessionEvent, SessionEvents, Topic};
pub use proxy::{Dispatch, ServiceProxy};
pub use registry::ChannelRegistry;
pub use router::Router;
pub use service::{FeedReceiver, MarketDataService, ServiceError, ServiceRequest, SharedService};
pub use session::{Command, PeerSession, SessionHandle};
