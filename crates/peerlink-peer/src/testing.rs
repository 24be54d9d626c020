//! Recording market-data service for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::service::{FeedReceiver, MarketDataService, ServiceError, SharedService};

pub(crate) struct RecordingService {
    session_ok: AtomicBool,
    fail_requests: AtomicBool,
    pub(crate) session_starts: AtomicUsize,
    pub(crate) requests: Mutex<Vec<(String, String, Value)>>,
    pub(crate) subscriptions: Mutex<Vec<Value>>,
    feed: broadcast::Sender<Value>,
}

impl RecordingService {
    pub(crate) fn new() -> Arc<Self> {
        let (feed, _) = broadcast::channel(16);
        Arc::new(Self {
            session_ok: AtomicBool::new(true),
            fail_requests: AtomicBool::new(false),
            session_starts: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            feed,
        })
    }

    pub(crate) fn refusing_sessions() -> Arc<Self> {
        let service = Self::new();
        service.session_ok.store(false, Ordering::SeqCst);
        service
    }

    pub(crate) fn failing_requests() -> Arc<Self> {
        let service = Self::new();
        service.fail_requests.store(true, Ordering::SeqCst);
        service
    }

    pub(crate) fn shared(self: &Arc<Self>) -> SharedService {
        self.clone()
    }

    pub(crate) fn publish(&self, event: Value) -> usize {
        self.feed.send(event).unwrap_or(0)
    }

    pub(crate) fn session_starts(&self) -> usize {
        self.session_starts.load(Ordering::SeqCst)
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

#[async_trait]
impl MarketDataService for RecordingService {
    async fn start_session(&self) -> bool {
        self.session_starts.fetch_add(1, Ordering::SeqCst);
        self.session_ok.load(Ordering::SeqCst)
    }

    async fn service_request(
        &self,
        service_uri: &str,
        operation_name: &str,
        request: &Value,
    ) -> Result<Value, ServiceError> {
        self.requests.lock().expect("requests lock").push((
            service_uri.to_string(),
            operation_name.to_string(),
            request.clone(),
        ));
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(ServiceError::Request("field not permitted".to_string()));
        }
        Ok(json!({"securityData": [{"security": "IBM US Equity", "PX_LAST": 145.2}]}))
    }

    async fn subscribe(&self, subscriptions: &Value) -> Result<(), ServiceError> {
        self.subscriptions
            .lock()
            .expect("subscriptions lock")
            .push(subscriptions.clone());
        Ok(())
    }

    fn feed(&self) -> FeedReceiver {
        self.feed.subscribe()
    }
}
