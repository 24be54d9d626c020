#[cfg(feature = "schema")]
use std::sync::Arc;

use peerlink_codec::{classify, decode_with_config, CodecConfig, Route};
#[cfg(feature = "schema")]
use peerlink_schema::registry::EnvelopeSchemas;

use crate::error::Result;

/// Decodes inbound text and decides where each envelope goes.
#[derive(Debug, Clone)]
pub struct Router {
    service_tag: String,
    codec: CodecConfig,
    #[cfg(feature = "schema")]
    schemas: Option<Arc<EnvelopeSchemas>>,
}

impl Router {
    pub fn new(service_tag: impl Into<String>) -> Self {
        Self {
            service_tag: service_tag.into(),
            codec: CodecConfig::default(),
            #[cfg(feature = "schema")]
            schemas: None,
        }
    }

    pub fn with_codec_config(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }

    /// Validate every decoded envelope before classifying it.
    #[cfg(feature = "schema")]
    pub fn with_schemas(mut self, schemas: Arc<EnvelopeSchemas>) -> Self {
        self.schemas = Some(schemas);
        self
    }

    pub fn service_tag(&self) -> &str {
        &self.service_tag
    }

    /// Decode `text` and classify it.
    pub fn route(&self, text: &str) -> Result<Route> {
        let envelope = decode_with_config(text, &self.codec)?;

        #[cfg(feature = "schema")]
        if let Some(schemas) = &self.schemas {
            schemas.validate(&envelope.to_value())?;
        }

        Ok(classify(envelope, &self.service_tag)?)
    }
}
