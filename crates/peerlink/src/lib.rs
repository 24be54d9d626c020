//! Peer-to-peer chat and market-data proxying over WebRTC data channels.
//!
//! Two peers exchange JSON envelopes over named data channels. A peer that
//! holds the market-data capability answers reference data requests and
//! subscriptions; a peer without it forwards them to one that does.
//!
//! # Crate Structure
//!
//! - [`transport`]: connection and channel traits, plus an in-memory loopback
//! - [`codec`]: envelope encoding and classification
//! - [`schema`]: optional JSON Schema validation (behind `schema` feature)
//! - [`peer`]: channel binding, routing and proxying (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use peerlink_transport::*;
}

/// Re-export codec types.
pub mod codec {
    pub use peerlink_codec::*;
}

/// Re-export schema types (requires `schema` feature).
#[cfg(feature = "schema")]
pub mod schema {
    pub use peerlink_schema::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use peerlink_peer::*;
}
