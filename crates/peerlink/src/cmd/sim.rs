//! Simulated market-data service for the demo commands.

use std::time::Duration;

use async_trait::async_trait;
use peerlink_peer::{FeedReceiver, MarketDataService, ServiceError};
use serde_json::{json, Map, Value};
use tokio::sync::broadcast;

const REFERENCE_DATA_REQUEST: &str = "ReferenceDataRequest";
const FEED_CAPACITY: usize = 64;

pub struct SimulatedService {
    refuse_sessions: bool,
    ticks: usize,
    interval: Duration,
    feed: broadcast::Sender<Value>,
}

impl Default for SimulatedService {
    fn default() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            refuse_sessions: false,
            ticks: 5,
            interval: Duration::from_millis(200),
            feed,
        }
    }
}

impl SimulatedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every session start.
    pub fn refusing_sessions(mut self) -> Self {
        self.refuse_sessions = true;
        self
    }

    /// Publish `ticks` events per subscription, `interval` apart. 0 never stops.
    pub fn with_ticks(mut self, ticks: usize, interval: Duration) -> Self {
        self.ticks = ticks;
        self.interval = interval;
        self
    }
}

#[async_trait]
impl MarketDataService for SimulatedService {
    async fn start_session(&self) -> bool {
        tracing::debug!(refused = self.refuse_sessions, "simulated session start");
        !self.refuse_sessions
    }

    async fn service_request(
        &self,
        service_uri: &str,
        operation_name: &str,
        request: &Value,
    ) -> Result<Value, ServiceError> {
        if operation_name != REFERENCE_DATA_REQUEST {
            return Err(ServiceError::Request(format!(
                "unsupported operation '{operation_name}' on {service_uri}"
            )));
        }
        let securities = string_list(request, "securities")
            .ok_or_else(|| ServiceError::Request("missing 'securities'".to_string()))?;
        let fields = string_list(request, "fields")
            .ok_or_else(|| ServiceError::Request("missing 'fields'".to_string()))?;

        let security_data: Vec<Value> = securities
            .iter()
            .map(|security| {
                let mut data = Map::new();
                for (offset, field) in fields.iter().enumerate() {
                    data.insert(field.clone(), json!(price(security, offset)));
                }
                json!({ "security": security, "fieldData": data })
            })
            .collect();
        Ok(json!({ "securityData": security_data }))
    }

    async fn subscribe(&self, subscriptions: &Value) -> Result<(), ServiceError> {
        let securities: Vec<String> = subscriptions
            .as_array()
            .ok_or_else(|| ServiceError::Subscribe("expected a list of subscriptions".to_string()))?
            .iter()
            .filter_map(|entry| entry.get("security").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        if securities.is_empty() {
            return Err(ServiceError::Subscribe("no securities requested".to_string()));
        }

        let feed = self.feed.clone();
        let ticks = self.ticks;
        let interval = self.interval;
        tokio::spawn(async move {
            let mut tick = 0usize;
            while ticks == 0 || tick < ticks {
                tokio::time::sleep(interval).await;
                for security in &securities {
                    let event = json!({
                        "security": security,
                        "LAST_PRICE": price(security, tick),
                    });
                    // no receivers just means nobody is listening yet
                    let _ = feed.send(event);
                }
                tick += 1;
            }
        });
        Ok(())
    }

    fn feed(&self) -> FeedReceiver {
        self.feed.subscribe()
    }
}

fn string_list(request: &Value, key: &str) -> Option<Vec<String>> {
    request.get(key)?.as_array().map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

/// Deterministic price for a security, nudged by `step`.
fn price(security: &str, step: usize) -> f64 {
    let base = security.bytes().map(u64::from).sum::<u64>() % 400 + 50;
    base as f64 + step as f64 * 0.25
}
