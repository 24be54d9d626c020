use std::fmt;
use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use peerlink_peer::SessionEvent;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Which of the two demo peers produced an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    A,
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => f.write_str("a"),
            Side::B => f.write_str("b"),
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    schema_id: &'a str,
    peer: Side,
    #[serde(flatten)]
    event: &'a SessionEvent,
    timestamp: String,
}

pub fn print_event(side: Side, event: &SessionEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = EventOutput {
                schema_id: "https://schemas.3leaps.dev/peerlink/cli/v1/session-event.schema.json",
                peer: side,
                event,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PEER", "EVENT", "DETAIL"])
                .add_row(vec![
                    side.to_string(),
                    event.kind().to_string(),
                    event_detail(event),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let detail = event_detail(event);
            if detail.is_empty() {
                println!("peer={side} event={}", event.kind());
            } else {
                println!("peer={side} event={} {detail}", event.kind());
            }
        }
    }
}

/// One-line `key=value` rendering of an event's fields.
pub fn event_detail(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Ready => String::new(),
        SessionEvent::Disconnected { reason } => reason
            .as_deref()
            .map(|reason| format!("reason={reason}"))
            .unwrap_or_default(),
        SessionEvent::SlotBound { slot, name } | SessionEvent::SlotUnbound { slot, name } => {
            format!("slot={} name={name}", slot.index() + 1)
        }
        SessionEvent::ChannelRejected { name, reason } => {
            format!("name={name} reason={}", json_label(reason))
        }
        SessionEvent::Chat { slot, name, text } => {
            format!("slot={} name={name} text={text}", slot.index() + 1)
        }
        SessionEvent::RefDataResult { text } => format!("result={text}"),
        SessionEvent::SubscriptionData { data } => format!("data={data}"),
        SessionEvent::Status { topic, message } => {
            format!("topic={} message={message}", json_label(topic))
        }
        SessionEvent::CommandFailed { command, error } => {
            format!("command={command} error={error}")
        }
    }
}

fn json_label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(label)) => label,
        _ => String::from("unknown"),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
