#[cfg(feature = "schema")]
use std::sync::Arc;

use peerlink_codec::{encode, CodecConfig, Envelope, Route};
use peerlink_transport::{
    ChannelHandle, ChannelId, Connection, EventReceiver, SharedChannel, TransportError,
    TransportEvent,
};
#[cfg(feature = "schema")]
use peerlink_schema::EnvelopeSchemas;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::binder::{BindOutcome, ChannelBinder, ChannelLease, SlotId};
use crate::config::SessionConfig;
use crate::error::{PeerError, Result};
use crate::event::{emit, event_sink, EventSink, RejectReason, SessionEvent, SessionEvents};
use crate::proxy::{Dispatch, ServiceProxy};
use crate::registry::ChannelRegistry;
use crate::router::Router;
use crate::service::SharedService;

/// A display-layer action queued to a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetSlotName { slot: SlotId, name: String },
    CreateChannel { slot: SlotId },
    SendChat { slot: SlotId, text: String },
    SendRequest,
    SendSubscribe,
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::SetSlotName { .. } => "set_slot_name",
            Command::CreateChannel { .. } => "create_channel",
            Command::SendChat { .. } => "send_chat",
            Command::SendRequest => "send_request",
            Command::SendSubscribe => "send_subscribe",
        }
    }
}

/// One connection to a remote peer, with its slots, registry and proxy.
///
/// All state is owned here and mutated from one place: either the caller
/// drives [`PeerSession::handle_event`] directly, or [`PeerSession::run`]
/// drains the transport and command queues on a single task.
pub struct PeerSession<C> {
    connection: C,
    registry: ChannelRegistry,
    slots: Vec<ChannelBinder>,
    router: Router,
    proxy: ServiceProxy,
    ready: bool,
    events: EventSink,
}

impl<C: Connection> PeerSession<C> {
    /// Create a session over `connection`. `service` is the market-data
    /// capability, if this process has one.
    pub fn new(
        connection: C,
        service: Option<SharedService>,
        config: SessionConfig,
    ) -> (Self, SessionEvents) {
        let (events, receiver) = event_sink();
        let slots = (0..config.slots)
            .map(|index| ChannelBinder::new(SlotId::new(index)))
            .collect();
        let router = Router::new(config.proxy.service_tag.clone()).with_codec_config(CodecConfig {
            max_payload_size: config.max_payload_size,
        });
        let proxy = ServiceProxy::new(config.proxy, service, events.clone());

        let session = Self {
            connection,
            registry: ChannelRegistry::new(),
            slots,
            router,
            proxy,
            ready: false,
            events,
        };
        (session, receiver)
    }

    /// Validate inbound envelopes against `schemas`.
    #[cfg(feature = "schema")]
    pub fn with_schemas(self, schemas: Arc<EnvelopeSchemas>) -> Self {
        Self {
            router: self.router.with_schemas(schemas),
            ..self
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn slots(&self) -> &[ChannelBinder] {
        &self.slots
    }

    pub fn slot(&self, slot: SlotId) -> Result<&ChannelBinder> {
        self.slots
            .get(slot.index())
            .ok_or(PeerError::UnknownSlot(slot.index()))
    }

    pub fn has_capability(&self) -> bool {
        self.proxy.has_capability()
    }

    /// Apply one transport event.
    ///
    /// Errors describe input that was dropped; the session stays usable.
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<()> {
        match event {
            TransportEvent::Ready => {
                if !self.ready {
                    tracing::info!("connection ready");
                    self.ready = true;
                    emit(&self.events, SessionEvent::Ready);
                }
                Ok(())
            }
            TransportEvent::Disconnect => {
                self.teardown(None);
                Ok(())
            }
            TransportEvent::Error(reason) => {
                tracing::warn!(%reason, "connection error");
                self.teardown(Some(reason));
                Ok(())
            }
            TransportEvent::ChannelOpen(channel) => self.on_channel_open(channel),
            TransportEvent::ChannelClosed(id) => {
                self.on_channel_closed(id);
                Ok(())
            }
            TransportEvent::Message { channel, data } => self.on_message(channel, &data),
        }
    }

    /// Edit a slot's name. Refused while the slot is bound.
    pub fn set_slot_name(&mut self, slot: SlotId, name: &str) -> Result<()> {
        self.binder_mut(slot)?.set_name(name)
    }

    /// Ask the connection for a channel named after the slot.
    ///
    /// The slot binds when the resulting channel-open event arrives.
    pub fn create_channel(&mut self, slot: SlotId) -> Result<()> {
        if !self.ready {
            return Err(PeerError::NotReady);
        }
        let binder = self.slot(slot)?;
        if binder.is_bound() {
            return Err(PeerError::SlotBound(slot));
        }
        if binder.name().is_empty() {
            return Err(PeerError::EmptySlotName(slot));
        }
        let name = binder.name().to_string();
        if self.registry.contains(&name) {
            return Err(PeerError::DuplicateBinding(name));
        }

        tracing::info!(%slot, name, "creating channel");
        self.connection.create_channel(&name)?;
        Ok(())
    }

    /// Send chat text on a slot's channel. Empty text is a no-op.
    pub fn send_chat(&mut self, slot: SlotId, text: &str) -> Result<()> {
        if !self.ready {
            return Err(PeerError::NotReady);
        }
        let binder = self.slot(slot)?;
        if text.is_empty() {
            return Ok(());
        }
        let binding = binder.binding().ok_or(PeerError::NoChannelBound)?;
        binding.send(&encode(&Envelope::chat(text))?)
    }

    /// Issue the configured reference data request.
    ///
    /// Forwarding needs a ready connection; a local capability does not.
    pub fn send_request(&mut self) -> Result<Dispatch> {
        let peer = self.forwarding_channel()?;
        self.proxy.send_request(peer)
    }

    /// Issue the configured subscription.
    pub fn send_subscribe(&mut self) -> Result<Dispatch> {
        let peer = self.forwarding_channel()?;
        self.proxy.send_subscribe(peer)
    }

    /// Carry out a queued command.
    pub fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::SetSlotName { slot, name } => self.set_slot_name(slot, &name),
            Command::CreateChannel { slot } => self.create_channel(slot),
            Command::SendChat { slot, text } => self.send_chat(slot, &text),
            Command::SendRequest => self.send_request().map(drop),
            Command::SendSubscribe => self.send_subscribe().map(drop),
        }
    }

    /// The channel used for forwarding and user-triggered sends: the
    /// lowest-numbered bound slot.
    fn peer_channel(&self) -> Option<ChannelLease> {
        self.slots.iter().find_map(ChannelBinder::lease)
    }

    fn forwarding_channel(&self) -> Result<Option<ChannelLease>> {
        if !self.ready && !self.proxy.has_capability() {
            return Err(PeerError::NotReady);
        }
        Ok(self.peer_channel())
    }

    fn binder_mut(&mut self, slot: SlotId) -> Result<&mut ChannelBinder> {
        self.slots
            .get_mut(slot.index())
            .ok_or(PeerError::UnknownSlot(slot.index()))
    }

    /// A slot expecting this name gets first claim, then the first unnamed
    /// unbound slot.
    fn on_channel_open(&mut self, channel: SharedChannel) -> Result<()> {
        let name = channel.name().to_string();
        if name.is_empty() {
            tracing::warn!(channel = %channel.id(), "channel has no name; ignoring channel");
            self.reject(name, RejectReason::InvalidName);
            return Ok(());
        }
        let candidate = self
            .slots
            .iter()
            .position(|binder| binder.expects(&name))
            .or_else(|| self.slots.iter().position(ChannelBinder::is_vacant));

        let Some(index) = candidate else {
            tracing::warn!(name, channel = %channel.id(), "no free slot; ignoring channel");
            self.reject(name, RejectReason::NoFreeSlot);
            return Ok(());
        };

        let binder = &mut self.slots[index];
        match binder.on_channel_open(channel, &mut self.registry) {
            BindOutcome::Bound => {
                emit(
                    &self.events,
                    SessionEvent::SlotBound {
                        slot: binder.slot(),
                        name,
                    },
                );
                Ok(())
            }
            BindOutcome::Duplicate => {
                self.reject(name.clone(), RejectReason::DuplicateBinding);
                Err(PeerError::DuplicateBinding(name))
            }
            BindOutcome::NotForThisSlot => {
                tracing::warn!(name, "channel not bindable; ignoring channel");
                self.reject(name, RejectReason::NoFreeSlot);
                Ok(())
            }
        }
    }

    fn reject(&self, name: String, reason: RejectReason) {
        emit(&self.events, SessionEvent::ChannelRejected { name, reason });
    }

    fn on_channel_closed(&mut self, id: ChannelId) {
        for binder in &mut self.slots {
            let name = binder.name().to_string();
            if binder.on_channel_closed(id, &mut self.registry) {
                self.proxy.channel_unbound(id);
                emit(
                    &self.events,
                    SessionEvent::SlotUnbound {
                        slot: binder.slot(),
                        name,
                    },
                );
                return;
            }
        }
        tracing::debug!(channel = %id, "close for unbound channel");
    }

    fn on_message(&mut self, channel: ChannelId, data: &str) -> Result<()> {
        let Some((index, origin)) = self.slots.iter().enumerate().find_map(|(index, binder)| {
            binder
                .lease()
                .filter(|lease| lease.id() == channel)
                .map(|lease| (index, lease))
        }) else {
            tracing::debug!(%channel, "message on unbound channel dropped");
            return Ok(());
        };

        match self.router.route(data)? {
            Route::Chat(text) => {
                let binder = &self.slots[index];
                emit(
                    &self.events,
                    SessionEvent::Chat {
                        slot: binder.slot(),
                        name: binder.name().to_string(),
                        text,
                    },
                );
                Ok(())
            }
            Route::Service(envelope) => {
                let onward = self
                    .slots
                    .iter()
                    .filter(|binder| binder.slot().index() != index)
                    .find_map(ChannelBinder::lease);
                self.proxy.handle_inbound(&envelope, data, origin, onward)
            }
            Route::Ignore => {
                tracing::trace!(%channel, "ignoring envelope of unknown type");
                Ok(())
            }
        }
    }

    /// Connection-level teardown: every slot unbinds and forgets its name.
    fn teardown(&mut self, reason: Option<String>) {
        self.ready = false;
        for binder in &mut self.slots {
            let bound = binder
                .binding()
                .map(|binding| (binding.channel_id(), binding.name().to_string()));
            binder.on_connection_lost(&mut self.registry);
            if let Some((id, name)) = bound {
                self.proxy.channel_unbound(id);
                emit(
                    &self.events,
                    SessionEvent::SlotUnbound {
                        slot: binder.slot(),
                        name,
                    },
                );
            }
        }
        tracing::info!(reason = reason.as_deref(), "connection lost");
        emit(&self.events, SessionEvent::Disconnected { reason });
    }
}

impl<C: Connection + 'static> PeerSession<C> {
    /// Process transport events and commands until shutdown.
    ///
    /// Command failures are reported as [`SessionEvent::CommandFailed`].
    pub async fn run(
        mut self,
        mut transport: EventReceiver,
        mut commands: mpsc::UnboundedReceiver<Command>,
        shutdown: CancellationToken,
    ) {
        let mut accepting_commands = true;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("session shutting down");
                    break;
                }
                event = transport.recv() => match event {
                    Some(event) => {
                        let kind = event.kind();
                        if let Err(err) = self.handle_event(event) {
                            log_dropped(kind, &err);
                        }
                    }
                    None => {
                        tracing::info!("transport event queue closed");
                        if self.ready {
                            self.teardown(None);
                        }
                        break;
                    }
                },
                command = commands.recv(), if accepting_commands => match command {
                    Some(command) => {
                        let kind = command.kind();
                        if let Err(err) = self.execute(command) {
                            tracing::warn!(command = kind, error = %err, "command failed");
                            emit(
                                &self.events,
                                SessionEvent::CommandFailed {
                                    command: kind.to_string(),
                                    error: err.to_string(),
                                },
                            );
                        }
                    }
                    None => accepting_commands = false,
                },
            }
        }
    }

    /// Run the session on a new task.
    pub fn spawn(self, transport: EventReceiver) -> (SessionHandle, JoinHandle<()>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.run(transport, receiver, shutdown.clone()));
        (SessionHandle { commands, shutdown }, task)
    }
}

fn log_dropped(kind: &'static str, err: &PeerError) {
    match err {
        // the binder already logged the rejected channel
        PeerError::DuplicateBinding(_) => {
            tracing::debug!(event = kind, error = %err, "transport event dropped");
        }
        _ => tracing::warn!(event = kind, error = %err, "transport event dropped"),
    }
}

/// Cloneable handle to a spawned session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    /// Queue a command. Fails only once the session has stopped.
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| PeerError::Transport(TransportError::Shutdown))
    }

    pub fn set_slot_name(&self, slot: SlotId, name: impl Into<String>) -> Result<()> {
        self.send(Command::SetSlotName {
            slot,
            name: name.into(),
        })
    }

    pub fn create_channel(&self, slot: SlotId) -> Result<()> {
        self.send(Command::CreateChannel { slot })
    }

    pub fn send_chat(&self, slot: SlotId, text: impl Into<String>) -> Result<()> {
        self.send(Command::SendChat {
            slot,
            text: text.into(),
        })
    }

    pub fn send_request(&self) -> Result<()> {
        self.send(Command::SendRequest)
    }

    pub fn send_subscribe(&self) -> Result<()> {
        self.send(Command::SendSubscribe)
    }

    /// Stop the session task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use peerlink_transport::memory::{self, MemoryEndpoint};
    use peerlink_transport::{event_queue, MemoryChannel, MemoryConnection};
    use serde_json::json;

    use super::*;
    use crate::config::ProxyConfig;
    use crate::event::Topic;
    use crate::testing::RecordingService;

    struct Peer {
        session: PeerSession<MemoryConnection>,
        transport: EventReceiver,
        events: SessionEvents,
    }

    impl Peer {
        fn new(endpoint: MemoryEndpoint, service: Option<SharedService>) -> Self {
            Self::with_config(endpoint, service, SessionConfig::default())
        }

        fn with_config(
            endpoint: MemoryEndpoint,
            service: Option<SharedService>,
            config: SessionConfig,
        ) -> Self {
            let (session, events) = PeerSession::new(endpoint.connection, service, config);
            Self {
                session,
                transport: endpoint.events,
                events,
            }
        }

        /// Apply every queued transport event, returning the errors.
        fn pump(&mut self) -> Vec<PeerError> {
            let mut errors = Vec::new();
            while let Ok(event) = self.transport.try_recv() {
                if let Err(err) = self.session.handle_event(event) {
                    errors.push(err);
                }
            }
            errors
        }

        fn drain(&mut self) -> Vec<SessionEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }
    }

    fn slot(index: usize) -> SlotId {
        SlotId::new(index)
    }

    fn connected(a_service: Option<SharedService>, b_service: Option<SharedService>) -> (Peer, Peer) {
        connected_with(SessionConfig::default(), a_service, b_service)
    }

    fn connected_with(
        config: SessionConfig,
        a_service: Option<SharedService>,
        b_service: Option<SharedService>,
    ) -> (Peer, Peer) {
        let (a, b) = memory::pair();
        a.connection.connect();
        let mut a = Peer::with_config(a, a_service, config.clone());
        let mut b = Peer::with_config(b, b_service, config);
        a.pump();
        b.pump();
        assert!(a.session.is_ready() && b.session.is_ready());
        a.drain();
        b.drain();
        (a, b)
    }

    /// Peers joined by one channel `room1` in slot 1 on both sides.
    fn linked(a_service: Option<SharedService>, b_service: Option<SharedService>) -> (Peer, Peer) {
        linked_with(SessionConfig::default(), a_service, b_service)
    }

    fn linked_with(
        config: SessionConfig,
        a_service: Option<SharedService>,
        b_service: Option<SharedService>,
    ) -> (Peer, Peer) {
        let (mut a, mut b) = connected_with(config, a_service, b_service);
        a.session
            .set_slot_name(slot(0), "room1")
            .expect("slot should accept a name");
        a.session
            .create_channel(slot(0))
            .expect("channel should be requested");
        assert!(a.pump().is_empty());
        assert!(b.pump().is_empty());
        a.drain();
        b.drain();
        (a, b)
    }

    #[tokio::test]
    async fn channel_binds_on_both_sides() {
        let (mut a, mut b) = connected(None, None);
        a.session.set_slot_name(slot(0), "room1").expect("name");
        a.session.create_channel(slot(0)).expect("create");
        a.pump();
        b.pump();

        assert_eq!(
            a.drain(),
            vec![SessionEvent::SlotBound {
                slot: slot(0),
                name: "room1".to_string()
            }]
        );
        assert_eq!(
            b.drain(),
            vec![SessionEvent::SlotBound {
                slot: slot(0),
                name: "room1".to_string()
            }]
        );
        assert_eq!(b.session.slot(slot(0)).expect("slot").name(), "room1");
        assert_eq!(b.session.registry().names(), vec!["room1"]);
    }

    #[tokio::test]
    async fn chat_reaches_remote_sink_exactly_once() {
        let (mut a, mut b) = linked(None, None);

        a.session.send_chat(slot(0), "hello").expect("chat should send");
        b.pump();

        assert_eq!(
            b.drain(),
            vec![SessionEvent::Chat {
                slot: slot(0),
                name: "room1".to_string(),
                text: "hello".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn empty_chat_is_a_no_op() {
        let (mut a, mut b) = linked(None, None);
        a.session.send_chat(slot(0), "").expect("empty chat is fine");
        b.pump();
        assert!(b.drain().is_empty());
    }

    #[tokio::test]
    async fn chat_without_channel_fails() {
        let (mut a, _b) = connected(None, None);
        assert!(matches!(
            a.session.send_chat(slot(1), "hello"),
            Err(PeerError::NoChannelBound)
        ));
    }

    #[tokio::test]
    async fn create_channel_preconditions() {
        let (a, _b) = memory::pair();
        let mut idle = Peer::new(a, None);
        idle.session.set_slot_name(slot(0), "room1").expect("name");
        assert!(matches!(
            idle.session.create_channel(slot(0)),
            Err(PeerError::NotReady)
        ));

        let (mut a, _b) = linked(None, None);
        assert!(matches!(
            a.session.create_channel(slot(0)),
            Err(PeerError::SlotBound(_))
        ));
        assert!(matches!(
            a.session.create_channel(slot(1)),
            Err(PeerError::EmptySlotName(_))
        ));
        assert!(matches!(
            a.session.create_channel(slot(7)),
            Err(PeerError::UnknownSlot(7))
        ));
        a.session.set_slot_name(slot(1), "room1").expect("name");
        assert!(matches!(
            a.session.create_channel(slot(1)),
            Err(PeerError::DuplicateBinding(_))
        ));
    }

    #[tokio::test]
    async fn simultaneous_opens_of_one_name_bind_once() {
        let (mut a, mut b) = connected(None, None);
        a.session.set_slot_name(slot(0), "room1").expect("name");
        b.session.set_slot_name(slot(0), "room1").expect("name");
        a.session.create_channel(slot(0)).expect("create");
        b.session.create_channel(slot(0)).expect("create");

        let errors = a.pump();
        b.pump();

        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], PeerError::DuplicateBinding(_)));
        assert_eq!(a.session.registry().len(), 1);
        assert!(!a.session.slot(slot(1)).expect("slot").is_bound());
        assert!(a.drain().contains(&SessionEvent::ChannelRejected {
            name: "room1".to_string(),
            reason: RejectReason::DuplicateBinding
        }));
        assert_eq!(b.session.registry().len(), 1);
    }

    #[tokio::test]
    async fn channel_without_free_slot_is_rejected() {
        let (mut a, mut b) = connected(None, None);
        for (index, name) in ["room1", "room2"].into_iter().enumerate() {
            a.session.set_slot_name(slot(index), name).expect("name");
            a.session.create_channel(slot(index)).expect("create");
        }
        a.pump();
        b.pump();
        b.drain();

        a.session.connection.create_channel("room3").expect("create");
        b.pump();

        assert_eq!(
            b.drain(),
            vec![SessionEvent::ChannelRejected {
                name: "room3".to_string(),
                reason: RejectReason::NoFreeSlot
            }]
        );
        assert_eq!(b.session.registry().names(), vec!["room1", "room2"]);
    }

    #[tokio::test]
    async fn unnamed_channel_is_rejected_as_invalid() {
        let (_a, mut b) = connected(None, None);
        let (sender, _receiver) = event_queue();
        let (near, _far) = MemoryChannel::pair("", sender.clone(), sender);

        b.session
            .handle_event(TransportEvent::ChannelOpen(near as SharedChannel))
            .expect("rejection is not an error");

        assert_eq!(
            b.drain(),
            vec![SessionEvent::ChannelRejected {
                name: String::new(),
                reason: RejectReason::InvalidName
            }]
        );
        assert!(b.session.registry().is_empty());
        assert!(b.session.slots().iter().all(ChannelBinder::is_vacant));
    }

    #[tokio::test]
    async fn channel_close_unbinds_slot() {
        let (_a, mut b) = linked(None, None);
        let id = b
            .session
            .slot(slot(0))
            .expect("slot")
            .channel_id()
            .expect("bound");

        b.session
            .handle_event(TransportEvent::ChannelClosed(id))
            .expect("close should apply");

        let slot0 = b.session.slot(slot(0)).expect("slot");
        assert!(!slot0.is_bound());
        assert_eq!(slot0.name(), "");
        assert!(b.session.registry().is_empty());
        assert_eq!(
            b.drain(),
            vec![SessionEvent::SlotUnbound {
                slot: slot(0),
                name: "room1".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn disconnect_unbinds_everything() {
        let (mut a, mut b) = linked(None, None);
        a.session.set_slot_name(slot(1), "pending").expect("name");

        a.session.connection.disconnect();
        a.pump();
        b.pump();

        assert!(!a.session.is_ready());
        assert!(a.session.registry().is_empty());
        assert!(a.session.slots().iter().all(ChannelBinder::is_vacant));
        assert_eq!(
            a.drain(),
            vec![
                SessionEvent::SlotUnbound {
                    slot: slot(0),
                    name: "room1".to_string()
                },
                SessionEvent::Disconnected { reason: None }
            ]
        );
        assert!(b.session.registry().is_empty());
    }

    #[tokio::test]
    async fn connection_error_carries_reason() {
        let (mut a, _b) = linked(None, None);
        a.session.connection.fail("ice failed");
        a.pump();
        assert!(a.drain().contains(&SessionEvent::Disconnected {
            reason: Some("ice failed".to_string())
        }));
    }

    #[tokio::test]
    async fn malformed_message_is_dropped() {
        let (a, mut b) = linked(None, None);
        let binding = a
            .session
            .slot(slot(0))
            .expect("slot")
            .binding()
            .expect("bound")
            .clone();

        binding.send("not json").expect("raw send");
        binding
            .send(r#"{"type":"presence","online":true}"#)
            .expect("raw send");

        let errors = b.pump();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], PeerError::MalformedPayload(_)));
        assert!(b.drain().is_empty());
    }

    #[tokio::test]
    async fn request_is_forwarded_and_answered() {
        let service = RecordingService::new();
        let (mut a, mut b) = linked(None, Some(service.shared()));

        let dispatch = a.session.send_request().expect("request should go out");
        assert!(matches!(dispatch, Dispatch::Forwarded { .. }));
        b.pump();
        tokio::time::sleep(Duration::from_millis(20)).await;
        a.pump();

        assert_eq!(service.session_starts(), 1);
        assert_eq!(service.request_count(), 1);
        let events = a.drain();
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::RefDataResult { text } if text.contains("PX_LAST")
        )));
    }

    #[tokio::test]
    async fn refused_session_sends_nothing_back() {
        let service = RecordingService::refusing_sessions();
        let (mut a, mut b) = linked(None, Some(service.shared()));

        a.session.send_request().expect("request should go out");
        b.pump();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(service.request_count(), 0);
        assert!(a.transport.try_recv().is_err());
        assert!(b.drain().iter().any(|event| matches!(
            event,
            SessionEvent::Status { topic: Topic::Request, message } if message.starts_with("Error")
        )));
    }

    #[tokio::test]
    async fn request_can_be_retried_after_remote_session_failure() {
        let service = RecordingService::refusing_sessions();
        let config = SessionConfig::default().with_proxy(
            ProxyConfig::default().with_request_timeout(Duration::from_millis(10)),
        );
        let (mut a, mut b) = linked_with(config, None, Some(service.shared()));

        a.session.send_request().expect("request should go out");
        b.pump();
        tokio::time::sleep(Duration::from_millis(20)).await;
        a.pump();
        assert!(b.drain().iter().any(|event| matches!(
            event,
            SessionEvent::Status { message, .. } if message == "Error: could not start market data session"
        )));

        let retry = a.session.send_request().expect("retry should go out");
        assert!(matches!(retry, Dispatch::Forwarded { ref channel } if channel == "room1"));
        b.pump();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(service.session_starts(), 2);
    }

    #[tokio::test]
    async fn service_actions_wait_for_ready_connection() {
        let (a, _b) = memory::pair();
        let mut idle = Peer::new(a, None);
        assert!(matches!(idle.session.send_request(), Err(PeerError::NotReady)));
        assert!(matches!(idle.session.send_subscribe(), Err(PeerError::NotReady)));

        let service = RecordingService::new();
        let (a, _b) = memory::pair();
        let mut local = Peer::new(a, Some(service.shared()));
        let dispatch = local.session.send_request().expect("local capability needs no connection");
        let Dispatch::Local(handle) = dispatch else {
            panic!("capability should run locally");
        };
        handle
            .await
            .expect("task should not panic")
            .expect("request should succeed");
        assert_eq!(service.request_count(), 1);
    }

    #[tokio::test]
    async fn request_without_any_channel_is_refused() {
        let (mut a, _b) = connected(None, None);
        assert!(matches!(
            a.session.send_request(),
            Err(PeerError::NoChannelBound)
        ));
        assert!(matches!(
            a.session.send_subscribe(),
            Err(PeerError::NoChannelBound)
        ));
    }

    #[tokio::test]
    async fn subscription_streams_to_requester() {
        let service = RecordingService::new();
        let (mut a, mut b) = linked(None, Some(service.shared()));

        a.session.send_subscribe().expect("subscribe should go out");
        b.pump();
        tokio::time::sleep(Duration::from_millis(20)).await;
        service.publish(json!({"LAST_PRICE": 145.3}));
        tokio::time::sleep(Duration::from_millis(20)).await;
        a.pump();

        assert!(a.drain().contains(&SessionEvent::SubscriptionData {
            data: json!({"LAST_PRICE": 145.3})
        }));
    }

    #[tokio::test]
    async fn spawned_session_reports_command_failures() {
        let (a, b) = memory::pair();
        let (session, mut events) = PeerSession::new(a.connection, None, SessionConfig::default());
        let (handle, task) = session.spawn(a.events);
        let _b = b;

        handle.create_channel(slot(0)).expect("queue command");
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("event should arrive")
            .expect("queue open");
        assert_eq!(
            event,
            SessionEvent::CommandFailed {
                command: "create_channel".to_string(),
                error: PeerError::NotReady.to_string()
            }
        );

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("session should stop")
            .expect("task should not panic");
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn spawned_sessions_exchange_chat() {
        let (a, b) = memory::pair();
        let connection = a.connection.clone();
        let (a_session, mut a_events) = PeerSession::new(a.connection, None, SessionConfig::default());
        let (b_session, mut b_events) = PeerSession::new(b.connection, None, SessionConfig::default());
        let (a_handle, _a_task) = a_session.spawn(a.events);
        let (_b_handle, _b_task) = b_session.spawn(b.events);

        connection.connect();
        assert_eq!(a_events.recv().await, Some(SessionEvent::Ready));
        assert_eq!(b_events.recv().await, Some(SessionEvent::Ready));

        a_handle.set_slot_name(slot(0), "room1").expect("queue");
        a_handle.create_channel(slot(0)).expect("queue");
        assert!(matches!(
            b_events.recv().await,
            Some(SessionEvent::SlotBound { .. })
        ));
        assert!(matches!(
            a_events.recv().await,
            Some(SessionEvent::SlotBound { .. })
        ));

        a_handle.send_chat(slot(0), "hello").expect("queue");
        let chat = tokio::time::timeout(Duration::from_secs(1), b_events.recv())
            .await
            .expect("chat should arrive");
        assert_eq!(
            chat,
            Some(SessionEvent::Chat {
                slot: slot(0),
                name: "room1".to_string(),
                text: "hello".to_string()
            })
        );
    }
}
