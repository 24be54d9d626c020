use std::sync::Arc;

use peerlink_peer::{SessionEvent, SharedService, Topic};

use crate::cmd::demo::Demo;
use crate::cmd::sim::SimulatedService;
use crate::cmd::RequestArgs;
use crate::exit::{peer_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{OutputFormat, Side};

pub async fn run(args: RequestArgs, format: OutputFormat) -> CliResult<i32> {
    let service = service_for(&args);
    let mut demo = Demo::start(&args.demo, format, None, service)?;
    let result = request(&mut demo).await;
    demo.shutdown().await;
    result
}

fn service_for(args: &RequestArgs) -> Option<SharedService> {
    if args.no_service {
        return None;
    }
    let service = if args.fail_session {
        SimulatedService::new().refusing_sessions()
    } else {
        SimulatedService::new()
    };
    Some(Arc::new(service))
}

async fn request(demo: &mut Demo) -> CliResult<i32> {
    demo.link().await?;
    demo.a
        .send_request()
        .map_err(|err| peer_error("send request", err))?;

    loop {
        match demo.next().await? {
            (Side::A, SessionEvent::RefDataResult { .. }) => return Ok(SUCCESS),
            (
                side,
                SessionEvent::Status {
                    topic: Topic::Request,
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
