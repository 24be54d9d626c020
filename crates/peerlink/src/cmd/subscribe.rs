use std::sync::Arc;

use peerlink_peer::{SessionEvent, Topic};

use crate::cmd::demo::Demo;
use crate::cmd::sim::SimulatedService;
use crate::cmd::{parse_duration, SubscribeArgs};
use crate::exit::{peer_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS};
use crate::output::{OutputFormat, Side};

pub async fn run(args: SubscribeArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let service = SimulatedService::new().with_ticks(args.count, interval);
    let mut demo = Demo::start(&args.demo, format, None, Some(Arc::new(service)))?;

    let result = tokio::select! {
        result = stream(&mut demo, args.count) => result,
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                tracing::info!("interrupted; stopping");
                Ok(SUCCESS)
            }
            Err(err) => Err(CliError::new(
                INTERNAL,
                format!("signal handler setup failed: {err}"),
            )),
        },
    };
    demo.shutdown().await;
    result
}

async fn stream(demo: &mut Demo, count: usize) -> CliResult<i32> {
    demo.link().await?;
    demo.a
        .send_subscribe()
        .map_err(|err| peer_error("send subscribe", err))?;

    let mut received = 0usize;
    loop {
        match demo.next().await? {
            (Side::A, SessionEvent::SubscriptionData { .. }) => {
                received += 1;
                if count != 0 && received >= count {
                    return Ok(SUCCESS);
                }
            }
            (
                side,
                SessionEvent::Status {
                    topic: Topic::Subscribe,
                    message,
                },
            ) if message.starts_with("Error") => {
                return Err(CliError::new(FAILURE, format!("peer {side}: {message}")));
            }
            (side, SessionEvent::CommandFailed { command, error }) => {
                return Err(CliError::new(
                    FAILURE,
                    format!("peer {side}: {command} failed: {error}"),
                ));
            }
            _ => {}
        }
    }
}
