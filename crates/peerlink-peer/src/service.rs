use std::sync::Arc;

use async_trait::async_trait;
use peerlink_codec::CodecError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{PeerError, Result};

/// Failure reported by a market-data service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("session error: {0}")]
    Session(String),
}

/// Stream of subscription events.
pub type FeedReceiver = broadcast::Receiver<Value>;

/// The privileged market-data capability.
///
/// Only a process running inside the terminal environment has one. Peers
/// without it forward service requests to a peer that does.
#[async_trait]
pub trait MarketDataService: Send + Sync {
    /// Start (or reuse) the service session. False means unavailable.
    async fn start_session(&self) -> bool;

    /// Run one request/response operation.
    async fn service_request(
        &self,
        service_uri: &str,
        operation_name: &str,
        request: &Value,
    ) -> std::result::Result<Value, ServiceError>;

    /// Start a subscription. Events arrive on [`MarketDataService::feed`].
    async fn subscribe(&self, subscriptions: &Value) -> std::result::Result<(), ServiceError>;

    /// A new receiver for subscription events.
    fn feed(&self) -> FeedReceiver;
}

pub type SharedService = Arc<dyn MarketDataService>;

/// The `request` body of a `requestRefData` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub service_uri: String,
    pub operation_name: String,
    #[serde(default)]
    pub request_object: Value,
}

impl ServiceRequest {
    pub fn from_value(request: &Value) -> Result<Self> {
        Self::deserialize(request)
            .map_err(|e| PeerError::MalformedPayload(CodecError::Malformed(e)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_camel_case_request() {
        let request = ServiceRequest::from_value(&json!({
            "serviceUri": "//blp/refdata",
            "operationName": "ReferenceDataRequest",
            "requestObject": {"securities": ["IBM US Equity"]}
        }))
        .expect("request should parse");

        assert_eq!(request.service_uri, "//blp/refdata");
        assert_eq!(request.operation_name, "ReferenceDataRequest");
        assert_eq!(request.request_object["securities"][0], "IBM US Equity");
    }

    #[test]
    fn missing_operation_is_malformed() {
        let err = ServiceRequest::from_value(&json!({"serviceUri": "//blp/refdata"}))
            .expect_err("operationName is required");
        assert!(matches!(err, PeerError::MalformedPayload(_)));
    }
}
