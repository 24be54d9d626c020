//! JSON envelope codec and message classification for peerlink.
//!
//! Every message on a data channel is one JSON object, the envelope,
//! discriminated by its `type` field:
//! - `"chat"` carries a `text` string
//! - the service-family tag (default `"bloomberg"`) carries either a request
//!   (`action` + `request`) or a reply (`response` or `subscribeData`)
//!
//! Fields this crate does not know about survive a decode/encode cycle, so a
//! relayed envelope reaches the next hop intact.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod route;

pub use codec::{decode, decode_with_config, encode, CodecConfig, DEFAULT_MAX_PAYLOAD};
pub use envelope::{
    Action, Envelope, ACTION_REQUEST_REF_DATA, ACTION_SUBSCRIBE, CHAT, DEFAULT_SERVICE_TAG,
};
pub use error::{CodecError, Result};
pub use route::{classify, Route, ServiceMessage};
