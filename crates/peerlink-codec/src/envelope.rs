use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope type: text chat between peers.
pub const CHAT: &str = "chat";
/// Default service-family envelope type.
pub const DEFAULT_SERVICE_TAG: &str = "bloomberg";
/// Service action: one-shot reference data request.
pub const ACTION_REQUEST_REF_DATA: &str = "requestRefData";
/// Service action: streaming subscription.
pub const ACTION_SUBSCRIBE: &str = "subscribe";

/// One discriminated JSON message exchanged over a data channel.
///
/// Unknown fields are kept in `extra` and written back on encode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Discriminant. Missing on envelopes from peers that predate it.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Chat text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Service request action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Service request parameters, opaque to routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,

    /// Reply to a reference data request: the JSON text of the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    /// One streaming subscription event.
    #[serde(
        rename = "subscribeData",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub subscribe_data: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// A chat envelope.
    pub fn chat(text: impl Into<String>) -> Self {
        Self {
            kind: Some(CHAT.to_string()),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// A service-family request.
    pub fn service_request(service_tag: &str, action: Action, request: Value) -> Self {
        Self {
            kind: Some(service_tag.to_string()),
            action: Some(action.as_str().to_string()),
            request: Some(request),
            ..Self::default()
        }
    }

    /// A service-family reply to a reference data request.
    pub fn response(service_tag: &str, response: impl Into<String>) -> Self {
        Self {
            kind: Some(service_tag.to_string()),
            response: Some(response.into()),
            ..Self::default()
        }
    }

    /// A service-family streaming push.
    pub fn subscribe_data(service_tag: &str, data: Value) -> Self {
        Self {
            kind: Some(service_tag.to_string()),
            subscribe_data: Some(data),
            ..Self::default()
        }
    }

    /// The `type` field, if present.
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Whether this envelope has the given `type` (exact, case-sensitive).
    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind() == Some(kind)
    }

    /// JSON value form, used for schema validation.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Known service request actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    RequestRefData,
    Subscribe,
}

impl Action {
    /// Wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::RequestRefData => ACTION_REQUEST_REF_DATA,
            Action::Subscribe => ACTION_SUBSCRIBE,
        }
    }

    /// Parse the wire spelling (case-sensitive).
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            ACTION_REQUEST_REF_DATA => Some(Action::RequestRefData),
            ACTION_SUBSCRIBE => Some(Action::Subscribe),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
