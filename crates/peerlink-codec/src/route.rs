use serde_json::Value;

use crate::envelope::{Action, Envelope, CHAT};
use crate::error::{CodecError, Result};

/// Where an inbound envelope goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Chat text for the channel's chat sink.
    Chat(String),
    /// A service-family envelope, handed to the proxy uninterpreted.
    Service(Envelope),
    /// Unknown or missing `type`. Dropped without error.
    Ignore,
}

/// Decide where an envelope goes, matching `type` exactly.
pub fn classify(envelope: Envelope, service_tag: &str) -> Result<Route> {
    if envelope.is_kind(CHAT) {
        return envelope
            .text
            .map(Route::Chat)
            .ok_or(CodecError::MissingField {
                kind: "chat",
                field: "text",
            });
    }
    if envelope.is_kind(service_tag) {
        return Ok(Route::Service(envelope));
    }
    Ok(Route::Ignore)
}

/// Interpretation of a service-family envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceMessage {
    /// A request to run against the privileged service.
    Request { action: Action, request: Value },
    /// Result of a reference data request, as JSON text.
    Response(String),
    /// One subscription event.
    SubscribeData(Value),
    /// A request action this side does not know, or an envelope carrying
    /// neither a request nor a reply.
    Unknown,
}

impl ServiceMessage {
    /// Interpret a service-family envelope.
    ///
    /// A recognized `action` makes the envelope a request and it must carry
    /// `request`. Otherwise it is a reply and may carry only one of
    /// `response` and `subscribeData`.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
        if let Some(action) = envelope.action.as_deref() {
            let Some(action) = Action::parse(action) else {
                return Ok(ServiceMessage::Unknown);
            };
            let request = envelope
                .request
                .clone()
                .ok_or(CodecError::MissingField {
                    kind: "service request",
                    field: "request",
                })?;
            return Ok(ServiceMessage::Request { action, request });
        }

        match (&envelope.response, &envelope.subscribe_data) {
            (Some(_), Some(_)) => Err(CodecError::InvalidEnvelope(
                "reply carries both 'response' and 'subscribeData'".to_string(),
            )),
            (Some(response), None) => Ok(ServiceMessage::Response(response.clone())),
            (None, Some(data)) => Ok(ServiceMessage::SubscribeData(data.clone())),
            (None, None) => Ok(ServiceMessage::Unknown),
        }
    }
}
