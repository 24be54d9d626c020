//! Two peer sessions joined by an in-memory connection.

use std::sync::Arc;
use std::time::Duration;

use peerlink_peer::{
    PeerSession, ProxyConfig, SessionConfig, SessionEvent, SessionEvents, SessionHandle,
    SharedService, SlotId,
};
use peerlink_schema::{EnvelopeSchemas, RegistryConfig};
use peerlink_transport::memory::{self, MemoryConnection};
use tokio::task::JoinHandle;

use crate::cmd::{parse_duration, DemoArgs};
use crate::exit::{peer_error, schema_error, CliError, CliResult, FAILURE, TIMEOUT};
use crate::output::{print_event, OutputFormat, Side};

/// Peer `a` creates the channel; peer `b` accepts it.
pub struct Demo {
    pub a: SessionHandle,
    pub b: SessionHandle,
    a_events: SessionEvents,
    b_events: SessionEvents,
    connection: MemoryConnection,
    tasks: Vec<JoinHandle<()>>,
    channel: String,
    timeout: Duration,
    format: OutputFormat,
}

impl Demo {
    pub fn start(
        args: &DemoArgs,
        format: OutputFormat,
        a_service: Option<SharedService>,
        b_service: Option<SharedService>,
    ) -> CliResult<Self> {
        let timeout = parse_duration(&args.timeout)?;
        let config = SessionConfig::default()
            .with_proxy(ProxyConfig::default().with_service_tag(args.service_tag.clone()));
        let schemas = load_schemas(args)?;

        let (a_end, b_end) = memory::pair();
        let connection = a_end.connection.clone();

        let (a_session, a_events) = PeerSession::new(a_end.connection, a_service, config.clone());
        let (b_session, b_events) = PeerSession::new(b_end.connection, b_service, config);
        let (a_session, b_session) = match &schemas {
            Some(schemas) => (
                a_session.with_schemas(schemas.clone()),
                b_session.with_schemas(schemas.clone()),
            ),
            None => (a_session, b_session),
        };

        let (a, a_task) = a_session.spawn(a_end.events);
        let (b, b_task) = b_session.spawn(b_end.events);

        Ok(Self {
            a,
            b,
            a_events,
            b_events,
            connection,
            tasks: vec![a_task, b_task],
            channel: args.channel.clone(),
            timeout,
            format,
        })
    }

    /// Complete the handshake and bind the channel on both sides.
    pub async fn link(&mut self) -> CliResult<()> {
        self.connection.connect();
        let mut ready = (false, false);
        while !(ready.0 && ready.1) {
            match self.next().await? {
                (Side::A, SessionEvent::Ready) => ready.0 = true,
                (Side::B, SessionEvent::Ready) => ready.1 = true,
                _ => {}
            }
        }

        let slot = SlotId::new(0);
        self.a
            .set_slot_name(slot, self.channel.clone())
            .and_then(|()| self.a.create_channel(slot))
            .map_err(|err| peer_error("create channel", err))?;

        let mut bound = (false, false);
        while !(bound.0 && bound.1) {
            match self.next().await? {
                (Side::A, SessionEvent::SlotBound { .. }) => bound.0 = true,
                (Side::B, SessionEvent::SlotBound { .. }) => bound.1 = true,
                (side, SessionEvent::CommandFailed { command, error }) => {
                    return Err(CliError::new(
                        FAILURE,
                        format!("peer {side}: {command} failed: {error}"),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Wait for the next event from either peer and print it.
    pub async fn next(&mut self) -> CliResult<(Side, SessionEvent)> {
        let next = tokio::time::timeout(self.timeout, async {
            tokio::select! {
                event = self.a_events.recv() => event.map(|event| (Side::A, event)),
                event = self.b_events.recv() => event.map(|event| (Side::B, event)),
            }
        })
        .await
        .map_err(|_| CliError::new(TIMEOUT, "timed out waiting for session events"))?;

        let (side, event) =
            next.ok_or_else(|| CliError::new(FAILURE, "session stopped unexpectedly"))?;
        print_event(side, &event, self.format);
        Ok((side, event))
    }

    pub async fn shutdown(self) {
        self.a.shutdown();
        self.b.shutdown();
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "session task ended abnormally");
            }
        }
    }
}

fn load_schemas(args: &DemoArgs) -> CliResult<Option<Arc<EnvelopeSchemas>>> {
    let schemas = if let Some(dir) = &args.schema_dir {
        EnvelopeSchemas::from_directory_with_config(
            dir,
            RegistryConfig {
                strict_mode: true,
                fail_on_missing_schema: false,
                ..RegistryConfig::default()
            },
        )
        .map_err(|err| schema_error("schema load failed", err))?
    } else if args.validate {
        EnvelopeSchemas::builtin(&args.service_tag)
            .map_err(|err| schema_error("schema load failed", err))?
    } else {
        return Ok(None);
    };
    tracing::debug!(kinds = ?schemas.kinds(), "envelope schemas loaded");
    Ok(Some(Arc::new(schemas)))
}
