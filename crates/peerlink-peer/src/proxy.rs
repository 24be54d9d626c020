use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use peerlink_codec::{encode, Action, CodecError, Envelope, ServiceMessage};
use peerlink_transport::ChannelId;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::binder::ChannelLease;
use crate::config::ProxyConfig;
use crate::error::{PeerError, Result};
use crate::event::{emit, EventSink, SessionEvent, Topic};
use crate::service::{FeedReceiver, ServiceRequest, SharedService};

/// How a user-triggered service action was carried out.
#[derive(Debug)]
pub enum Dispatch {
    /// Running against the local capability. Results arrive as events; the
    /// handle resolves when the sequence finishes.
    Local(JoinHandle<Result<()>>),
    /// Sent to the peer over the named channel.
    Forwarded { channel: String },
}

#[derive(Debug, Clone)]
struct PendingRequest {
    channel: ChannelId,
    name: String,
    sent_at: Instant,
}

/// Bridges service envelopes to the market-data capability, or to a peer
/// that has one.
///
/// With the capability, requests run in spawned tasks and replies go back
/// on the channel the request arrived on. Without it, requests travel one
/// hop to the peer unchanged.
pub struct ServiceProxy {
    inner: Arc<ProxyInner>,
    pending_request: Option<PendingRequest>,
}

struct ProxyInner {
    config: ProxyConfig,
    service: Option<SharedService>,
    events: EventSink,
}

impl ServiceProxy {
    pub fn new(config: ProxyConfig, service: Option<SharedService>, events: EventSink) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                config,
                service,
                events,
            }),
            pending_request: None,
        }
    }

    /// Whether this process holds the market-data capability.
    pub fn has_capability(&self) -> bool {
        self.inner.service.is_some()
    }

    pub fn service_tag(&self) -> &str {
        &self.inner.config.service_tag
    }

    /// Whether a forwarded reference data request awaits its reply.
    pub fn has_pending_request(&self) -> bool {
        self.pending_request.is_some()
    }

    /// Issue the configured reference data request.
    ///
    /// `peer` is the channel to forward on when there is no local
    /// capability. Only one forwarded request may wait for its reply; after
    /// `request_timeout` without one the request is given up and a retry
    /// goes out.
    pub fn send_request(&mut self, peer: Option<ChannelLease>) -> Result<Dispatch> {
        let request = self.inner.config.ref_data_request.clone();
        if let Some(service) = self.inner.service.clone() {
            let inner = self.inner.clone();
            return Ok(Dispatch::Local(spawn_logged(
                Action::RequestRefData,
                async move { inner.execute_request(service, request, None).await },
            )));
        }

        let peer = self.inner.require_peer(peer, Topic::Request)?;
        if let Some(pending) = &self.pending_request {
            if pending.sent_at.elapsed() < self.inner.config.request_timeout {
                return Err(PeerError::RequestInFlight(pending.name.clone()));
            }
            tracing::info!(channel = pending.name.as_str(), "no reply to outstanding request; giving up");
            self.pending_request = None;
        }
        self.inner.forward(&peer, Action::RequestRefData, request)?;
        self.pending_request = Some(PendingRequest {
            channel: peer.id(),
            name: peer.name().to_string(),
            sent_at: Instant::now(),
        });
        self.inner.status(Topic::Request, "sending request");
        Ok(Dispatch::Forwarded {
            channel: peer.name().to_string(),
        })
    }

    /// Issue the configured subscription.
    pub fn send_subscribe(&mut self, peer: Option<ChannelLease>) -> Result<Dispatch> {
        let subscriptions = self.inner.config.subscribe_request.clone();
        if let Some(service) = self.inner.service.clone() {
            let inner = self.inner.clone();
            return Ok(Dispatch::Local(spawn_logged(
                Action::Subscribe,
                async move { inner.execute_subscribe(service, subscriptions, None).await },
            )));
        }

        let peer = self.inner.require_peer(peer, Topic::Subscribe)?;
        self.inner.forward(&peer, Action::Subscribe, subscriptions)?;
        self.inner.status(Topic::Subscribe, "sending subscribe request");
        Ok(Dispatch::Forwarded {
            channel: peer.name().to_string(),
        })
    }

    /// Handle a service-family envelope that arrived on `origin`.
    ///
    /// `raw` is the envelope's wire text, forwarded byte for byte when there
    /// is no capability. `onward` is where to forward it.
    pub fn handle_inbound(
        &mut self,
        envelope: &Envelope,
        raw: &str,
        origin: ChannelLease,
        onward: Option<ChannelLease>,
    ) -> Result<()> {
        match ServiceMessage::from_envelope(envelope)? {
            ServiceMessage::Request { action, request } => {
                let Some(service) = self.inner.service.clone() else {
                    let onward = onward.ok_or(PeerError::NoChannelBound)?;
                    tracing::debug!(
                        %action,
                        from = origin.name(),
                        to = onward.name(),
                        "forwarding service request"
                    );
                    return onward.send(raw);
                };

                tracing::debug!(%action, channel = origin.name(), "serving request from peer");
                let inner = self.inner.clone();
                match action {
                    Action::RequestRefData => spawn_logged(action, async move {
                        inner.execute_request(service, request, Some(origin)).await
                    }),
                    Action::Subscribe => spawn_logged(action, async move {
                        inner.execute_subscribe(service, request, Some(origin)).await
                    }),
                };
                Ok(())
            }
            ServiceMessage::Response(text) => {
                if let Some(pending) = &self.pending_request {
                    if pending.channel == origin.id() {
                        self.pending_request = None;
                    } else {
                        tracing::debug!(
                            channel = origin.name(),
                            awaiting = pending.name.as_str(),
                            "reply on another channel; request still outstanding"
                        );
                    }
                }
                emit(&self.inner.events, SessionEvent::RefDataResult { text });
                Ok(())
            }
            ServiceMessage::SubscribeData(data) => {
                emit(&self.inner.events, SessionEvent::SubscriptionData { data });
                Ok(())
            }
            ServiceMessage::Unknown => {
                tracing::trace!(
                    action = envelope.action.as_deref(),
                    channel = origin.name(),
                    "ignoring service envelope"
                );
                Ok(())
            }
        }
    }

    /// A channel was unbound. A forwarded request waiting on it is abandoned.
    pub fn channel_unbound(&mut self, id: ChannelId) {
        if self
            .pending_request
            .as_ref()
            .is_some_and(|pending| pending.channel == id)
        {
            tracing::debug!(channel = %id, "abandoning outstanding request");
            self.pending_request = None;
        }
    }
}

impl ProxyInner {
    fn status(&self, topic: Topic, message: impl Into<String>) {
        emit(&self.events, SessionEvent::status(topic, message));
    }

    fn require_peer(&self, peer: Option<ChannelLease>, topic: Topic) -> Result<ChannelLease> {
        peer.ok_or_else(|| {
            self.status(topic, "Please create a data channel first");
            PeerError::NoChannelBound
        })
    }

    fn forward(&self, peer: &ChannelLease, action: Action, request: Value) -> Result<()> {
        let envelope = Envelope::service_request(&self.config.service_tag, action, request);
        let text = encode(&envelope)?;
        tracing::debug!(%action, channel = peer.name(), "sending service request to peer");
        peer.send(&text)
    }

    /// start session → service request → local result and optional reply.
    async fn execute_request(
        self: Arc<Self>,
        service: SharedService,
        request: Value,
        reply_to: Option<ChannelLease>,
    ) -> Result<()> {
        let request = ServiceRequest::from_value(&request)?;
        self.status(Topic::Request, format!("Processing {}", request.service_uri));

        if !service.start_session().await {
            self.status(Topic::Request, "Error: could not start market data session");
            return Err(PeerError::SessionStartFailure);
        }

        let result = match service
            .service_request(
                &request.service_uri,
                &request.operation_name,
                &request.request_object,
            )
            .await
        {
            Ok(result) => result,
            Err(err) => {
                self.status(Topic::Request, format!("Error: {err}"));
                return Err(err.into());
            }
        };

        let text = serde_json::to_string(&result).map_err(CodecError::from)?;
        emit(
            &self.events,
            SessionEvent::RefDataResult { text: text.clone() },
        );

        if let Some(lease) = reply_to {
            let reply = encode(&Envelope::response(&self.config.service_tag, text))?;
            lease.send(&reply)?;
            tracing::debug!(channel = lease.name(), "reference data reply sent");
        }
        Ok(())
    }

    /// start session → feed listener → subscribe.
    async fn execute_subscribe(
        self: Arc<Self>,
        service: SharedService,
        subscriptions: Value,
        reply_to: Option<ChannelLease>,
    ) -> Result<()> {
        self.status(Topic::Subscribe, "Processing subscribe request");

        if !service.start_session().await {
            self.status(
                Topic::Subscribe,
                "Error: could not start market data session",
            );
            return Err(PeerError::SessionStartFailure);
        }

        let listener = tokio::spawn(self.clone().forward_feed(service.feed(), reply_to));
        if let Err(err) = service.subscribe(&subscriptions).await {
            listener.abort();
            self.status(Topic::Subscribe, format!("Error: {err}"));
            return Err(err.into());
        }
        self.status(Topic::Subscribe, "Subscribed");
        Ok(())
    }

    /// Surface each feed event and push it to the subscriber's channel
    /// until the feed closes.
    async fn forward_feed(self: Arc<Self>, mut feed: FeedReceiver, reply_to: Option<ChannelLease>) {
        let mut reply_to = reply_to;
        loop {
            match feed.recv().await {
                Ok(data) => {
                    if let Some(lease) = &reply_to {
                        if !self.push(lease, data.clone()) {
                            reply_to = None;
                        }
                    }
                    emit(&self.events, SessionEvent::SubscriptionData { data });
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscription feed lagged; events dropped");
                }
                Err(RecvError::Closed) => {
                    tracing::debug!("subscription feed closed");
                    break;
                }
            }
        }
    }

    /// Push one feed event. False once the subscriber's channel is gone.
    fn push(&self, lease: &ChannelLease, data: Value) -> bool {
        let envelope = Envelope::subscribe_data(&self.config.service_tag, data);
        let sent = encode(&envelope)
            .map_err(PeerError::from)
            .and_then(|text| lease.send(&text));
        match sent {
            Ok(()) => true,
            Err(PeerError::StaleChannel) => {
                tracing::debug!(channel = lease.name(), "subscriber channel unbound; stop pushing");
                false
            }
            Err(err) => {
                tracing::warn!(channel = lease.name(), error = %err, "failed to push subscription data");
                true
            }
        }
    }
}

fn spawn_logged<F>(action: Action, task: F) -> JoinHandle<Result<()>>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let result = task.await;
        match &result {
            Ok(()) => {}
            Err(PeerError::StaleChannel) => {
                tracing::debug!(%action, "channel unbound before reply; reply dropped");
            }
            Err(err) => {
                tracing::warn!(%action, error = %err, "service action failed");
            }
        }
        result
    })
}
