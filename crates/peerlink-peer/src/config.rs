use std::time::Duration;

use peerlink_codec::{DEFAULT_MAX_PAYLOAD, DEFAULT_SERVICE_TAG};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

/// Session behavior.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Number of channel slots.
    pub slots: usize,
    /// Largest inbound message accepted, in bytes.
    pub max_payload_size: usize,
    /// Market-data proxy settings.
    pub proxy: ProxyConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            slots: 2,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            proxy: ProxyConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Override the slot count.
    pub fn with_slots(mut self, slots: usize) -> Self {
        self.slots = slots;
        self
    }

    /// Override the proxy settings.
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = proxy;
        self
    }
}

/// Market-data proxy settings.
///
/// The canned requests are what the "request" and "subscribe" actions send.
/// They are client defaults, not part of the protocol.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProxyConfig {
    /// `type` of service-family envelopes.
    pub service_tag: String,
    /// `request` body of the reference data request.
    pub ref_data_request: Value,
    /// `request` body of the subscription.
    pub subscribe_request: Value,
    /// How long a forwarded reference data request blocks the next one
    /// while no reply arrives. Given in milliseconds as `requestTimeoutMs`.
    #[serde(rename = "requestTimeoutMs", deserialize_with = "duration_from_millis")]
    pub request_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            service_tag: DEFAULT_SERVICE_TAG.to_string(),
            ref_data_request: default_ref_data_request(),
            subscribe_request: default_subscribe_request(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ProxyConfig {
    /// Override the service-family tag.
    pub fn with_service_tag(mut self, tag: impl Into<String>) -> Self {
        self.service_tag = tag.into();
        self
    }

    /// Override the reply timeout for forwarded requests.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Default wait for a forwarded request's reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn duration_from_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

fn default_ref_data_request() -> Value {
    json!({
        "serviceUri": "//blp/refdata",
        "operationName": "ReferenceDataRequest",
        "requestObject": {
            "securities": ["IBM US Equity", "VOD LN Equity"],
            "fields": ["PX_LAST", "DS002", "EQY_WEIGHTED_AVG_PX"],
            "overrides": [
                { "fieldId": "VWAP_START_TIME", "value": "9:30" },
                { "fieldId": "VWAP_END_TIME", "value": "11:30" }
            ]
        }
    })
}

fn default_subscribe_request() -> Value {
    json!([{ "security": "IBM US Equity", "fields": ["LAST_PRICE"] }])
}
