/// Errors that can occur while decoding or classifying envelopes.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text is not valid JSON, or does not fit the envelope shape.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Valid JSON, but not an object.
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A field required by the envelope kind is absent.
    #[error("{kind} envelope is missing '{field}'")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    /// The envelope violates the reply/request shape rules.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;
