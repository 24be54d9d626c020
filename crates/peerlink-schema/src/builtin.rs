//! Schemas for the envelope kinds peerlink itself produces.

use peerlink_codec::{ACTION_REQUEST_REF_DATA, ACTION_SUBSCRIBE, CHAT};
use serde_json::{json, Value};

/// Schema for `{"type":"chat","text":...}`.
pub fn chat_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "type": { "const": CHAT },
            "text": { "type": "string" }
        },
        "required": ["type", "text"]
    })
}

/// Schema for the service family identified by `service_tag`.
///
/// A request carries `action` and `request`. A reply carries exactly one of
/// `response` and `subscribeData`, and no `action`.
pub fn service_schema(service_tag: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "type": { "const": service_tag },
            "action": { "enum": [ACTION_REQUEST_REF_DATA, ACTION_SUBSCRIBE] },
            "request": true,
            "response": { "type": "string" },
            "subscribeData": { "type": "object" }
        },
        "required": ["type"],
        "oneOf": [
            { "required": ["action", "request"] },
            {
                "required": ["response"],
                "not": { "anyOf": [{ "required": ["action"] }, { "required": ["subscribeData"] }] }
            },
            {
                "required": ["subscribeData"],
                "not": { "anyOf": [{ "required": ["action"] }, { "required": ["response"] }] }
            }
        ]
    })
}
