/// Errors that can occur during envelope schema validation.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The schema file could not be loaded.
    #[error("failed to load schema: {0}")]
    LoadFailed(String),

    /// The schema could not be compiled.
    #[error("failed to compile schema: {0}")]
    CompileFailed(String),

    /// The envelope failed schema validation.
    #[error("validation failed for '{kind}' envelope: {message}")]
    ValidationFailed { kind: String, message: String },

    /// The payload is not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// No schema registered for the envelope type.
    #[error("no schema registered for envelope type '{0}'")]
    NoSchema(String),
}

pub type Result<T> = std::result::Result<T, SchemaError>;
