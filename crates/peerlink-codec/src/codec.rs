use serde_json::Value;

use crate::envelope::Envelope;
use crate::error::{CodecError, Result};

/// Default maximum payload size: 256 KiB, the common data-channel message
/// ceiling across browser implementations.
pub const DEFAULT_MAX_PAYLOAD: usize = 256 * 1024;

/// Configuration for envelope decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    /// Maximum accepted payload size in bytes.
    pub max_payload_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Serialize an envelope to its wire text.
pub fn encode(envelope: &Envelope) -> Result<String> {
    serde_json::to_string(envelope).map_err(CodecError::from)
}

/// Parse wire text into an envelope using the default configuration.
pub fn decode(text: &str) -> Result<Envelope> {
    decode_with_config(text, &CodecConfig::default())
}

/// Parse wire text into an envelope.
///
/// Fails with [`CodecError::Malformed`] when the text is not JSON or a known
/// field has the wrong JSON type, and with [`CodecError::NotAnObject`] for
/// valid JSON that is not an object.
pub fn decode_with_config(text: &str, config: &CodecConfig) -> Result<Envelope> {
    if text.len() > config.max_payload_size {
        return Err(CodecError::PayloadTooLarge {
            size: text.len(),
            max: config.max_payload_size,
        });
    }

    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(CodecError::NotAnObject);
    }
    serde_json::from_value(value).map_err(CodecError::from)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::envelope::{Action, DEFAULT_SERVICE_TAG};

    #[test]
    fn known_kinds_survive_roundtrip() {
        let envelopes = [
            Envelope::chat("hello"),
            Envelope::service_request(
                DEFAULT_SERVICE_TAG,
                Action::RequestRefData,
                json!({
                    "serviceUri": "//blp/refdata",
                    "operationName": "ReferenceDataRequest",
                    "requestObject": {"securities": ["IBM US Equity"]}
                }),
            ),
            Envelope::service_request(
                DEFAULT_SERVICE_TAG,
                Action::Subscribe,
                json!([{"security": "IBM US Equity", "fields": ["LAST_PRICE"]}]),
            ),
            Envelope::response(DEFAULT_SERVICE_TAG, r#"{"PX_LAST":140.5}"#),
            Envelope::subscribe_data(DEFAULT_SERVICE_TAG, json!({"LAST_PRICE": 140.25})),
        ];

        for envelope in envelopes {
            let wire = encode(&envelope).expect("encode should succeed");
            let decoded = decode(&wire).expect("decode should succeed");
            assert_eq!(decoded, envelope, "roundtrip changed {wire}");
        }
    }

    #[test]
    fn unknown_fields_are_preserved() {
        let wire = r#"{"type":"chat","text":"hi","sentAt":1700000000,"meta":{"lang":"en"}}"#;
        let envelope = decode(wire).expect("decode should succeed");
        assert_eq!(envelope.extra.get("sentAt"), Some(&json!(1700000000)));

        let reencoded: Value =
            serde_json::from_str(&encode(&envelope).expect("encode should succeed"))
                .expect("re-encoded text should be JSON");
        let original: Value = serde_json::from_str(wire).expect("wire should be JSON");
        assert_eq!(reencoded, original);
    }

    #[test]
    fn missing_type_decodes_without_kind() {
        let envelope = decode(r#"{"text":"orphan"}"#).expect("decode should succeed");
        assert_eq!(envelope.kind(), None);
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(
            decode("{not json"),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert!(matches!(decode("[1,2,3]"), Err(CodecError::NotAnObject)));
        assert!(matches!(decode("\"chat\""), Err(CodecError::NotAnObject)));
    }

    #[test]
    fn wrong_field_type_is_malformed() {
        assert!(matches!(
            decode(r#"{"type":"chat","text":42}"#),
            Err(CodecError::Malformed(_))
        ));
        assert!(matches!(
            decode(r#"{"type":7}"#),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn payload_limit_is_enforced() {
        let config = CodecConfig {
            max_payload_size: 16,
        };
        let result = decode_with_config(r#"{"type":"chat","text":"too long"}"#, &config);
        assert!(matches!(
            result,
            Err(CodecError::PayloadTooLarge { max: 16, .. })
        ));
    }
}
