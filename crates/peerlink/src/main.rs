mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "peerlink",
    version,
    about = "Peer chat and market-data proxy demo"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chat_subcommand() {
        let cli = Cli::try_parse_from([
            "peerlink",
            "chat",
            "--channel",
            "room7",
            "--text",
            "hello",
        ])
        .expect("chat args should parse");

        let Command::Chat(args) = cli.command else {
            panic!("expected chat command");
        };
        assert_eq!(args.demo.channel, "room7");
        assert_eq!(args.text, "hello");
    }

    #[test]
    fn rejects_conflicting_request_flags() {
        let err = Cli::try_parse_from(["peerlink", "request", "--no-service", "--fail-session"])
            .expect_err("conflicting flags should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_subscribe_count() {
        let cli = Cli::try_parse_from(["peerlink", "--format", "json", "subscribe", "--count", "3"])
            .expect("subscribe args should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        assert!(matches!(cli.command, Command::Subscribe(ref args) if args.count == 3));
    }

    #[test]
    fn chat_requires_text() {
        let err = Cli::try_parse_from(["peerlink", "chat"]).expect_err("text is required");
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }
}
