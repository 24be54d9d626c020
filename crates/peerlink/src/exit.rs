use std::fmt;

use peerlink_peer::PeerError;
use peerlink_schema::SchemaError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn schema_error(context: &str, err: SchemaError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Schema(err) => schema_error(context, err),
        PeerError::MalformedPayload(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        PeerError::NotReady
        | PeerError::SlotBound(_)
        | PeerError::EmptySlotName(_)
        | PeerError::UnknownSlot(_) => CliError::new(USAGE, format!("{context}: {err}")),
        PeerError::NoChannelBound
        | PeerError::DuplicateBinding(_)
        | PeerError::RequestInFlight(_)
        | PeerError::SessionStartFailure
        | PeerError::ServiceFailure(_)
        | PeerError::StaleChannel
        | PeerError::Transport(_) => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}
