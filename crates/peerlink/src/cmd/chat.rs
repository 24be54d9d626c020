use peerlink_peer::{SessionEvent, SlotId};

use crate::cmd::demo::Demo;
use crate::cmd::ChatArgs;
use crate::exit::{peer_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{OutputFormat, Side};

pub async fn run(args: ChatArgs, format: OutputFormat) -> CliResult<i32> {
    if args.text.is_empty() {
        return Err(CliError::new(USAGE, "chat text must not be empty"));
    }

    let mut demo = Demo::start(&args.demo, format, None, None)?;
    let result = exchange(&mut demo, &args.text).await;
    demo.shutdown().await;
    result
}

async fn exchange(demo: &mut Demo, text: &str) -> CliResult<i32> {
    demo.link().await?;
    demo.a
        .send_chat(SlotId::new(0), text)
        .map_err(|err| peer_error("send chat", err))?;

    loop {
        match demo.next().await? {
            (Side::B, SessionEvent::Chat { text: received, .. }) if received == text => {
                return Ok(SUCCESS);
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
