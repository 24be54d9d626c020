use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod chat;
pub mod demo;
pub mod request;
pub mod sim;
pub mod subscribe;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open a channel between two local peers and send one chat message.
    Chat(ChatArgs),
    /// Forward a reference data request to a peer holding the service.
    Request(RequestArgs),
    /// Stream subscription events from a peer holding the service.
    Subscribe(SubscribeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    let command = match command {
        Command::Version(args) => return version::run(args),
        other => other,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))?;

    runtime.block_on(async move {
        match command {
            Command::Chat(args) => chat::run(args, format).await,
            Command::Request(args) => request::run(args, format).await,
            Command::Subscribe(args) => subscribe::run(args, format).await,
            Command::Version(args) => version::run(args),
        }
    })
}

/// Options shared by the two-peer demo commands.
#[derive(Args, Debug, Clone)]
pub struct DemoArgs {
    /// Channel name to open between the peers.
    #[arg(long, short = 'c', default_value = "room1")]
    pub channel: String,
    /// Service-family envelope type.
    #[arg(long, env = "PEERLINK_SERVICE_TAG", default_value = "bloomberg")]
    pub service_tag: String,
    /// Maximum time to wait for each session event (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Validate inbound envelopes against the builtin schemas.
    #[arg(long)]
    pub validate: bool,
    /// Validate inbound envelopes against `<type>.schema.json` files.
    #[arg(long, value_name = "DIR", conflicts_with = "validate")]
    pub schema_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    #[command(flatten)]
    pub demo: DemoArgs,
    /// Chat text to send from peer a.
    #[arg(long, short = 't')]
    pub text: String,
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    #[command(flatten)]
    pub demo: DemoArgs,
    /// Run peer b without the market-data service.
    #[arg(long)]
    pub no_service: bool,
    /// Make the simulated service refuse to start a session.
    #[arg(long, conflicts_with = "no_service")]
    pub fail_session: bool,
}

#[derive(Args, Debug)]
pub struct SubscribeArgs {
    #[command(flatten)]
    pub demo: DemoArgs,
    /// Stop after N subscription events on peer a. 0 streams until Ctrl-C.
    #[arg(long, default_value = "5")]
    pub count: usize,
    /// Interval between simulated feed events (e.g. 200ms).
    #[arg(long, default_value = "200ms")]
    pub interval: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}
