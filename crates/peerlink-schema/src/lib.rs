//! Optional JSON Schema validation of peerlink envelopes.
//!
//! Schemas are keyed by the envelope `type`. Attach a registry to a session
//! to reject envelopes that break their contract before they reach the chat
//! sink or the service proxy.

pub mod builtin;
pub mod config;
pub mod error;
pub mod registry;
mod validator;

pub use config::RegistryConfig;
pub use error::{Result, SchemaError};
pub use registry::EnvelopeSchemas;
