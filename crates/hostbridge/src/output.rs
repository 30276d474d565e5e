use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use hostbridge_frame::{Message, StreamEvent};
use hostbridge_peer::{ControlEvent, ShutdownReport};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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

#[derive(Serialize)]
struct ListeningOutput<'a> {
    event: &'static str,
    addr: String,
    port: u16,
    config: &'a str,
    timestamp: String,
}

#[derive(Serialize)]
struct RecordOutput<'a> {
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    peer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    discarded: Option<usize>,
    timestamp: String,
}

impl<'a> RecordOutput<'a> {
    fn new(event: &'static str) -> Self {
        Self {
            event,
            peer: None,
            source: None,
            function: None,
            id: None,
            data: None,
            line: None,
            reason: None,
            discarded: None,
            timestamp: now_unix_seconds(),
        }
    }

    fn with_message(mut self, message: &'a Message) -> Self {
        self.function = Some(message.function.as_str());
        self.id = message.id.as_deref();
        self.data = message.data.as_ref();
        self
    }
}

#[derive(Serialize)]
struct ExitOutput {
    event: &'static str,
    code: Option<i32>,
    success: bool,
    cleanup_confirmed: bool,
    forced: bool,
    timestamp: String,
}

#[derive(Serialize)]
pub struct GateRow {
    pub channel: String,
    pub mode: &'static str,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub fn print_listening(addr: std::net::SocketAddr, config: &str, format: OutputFormat) {
    let out = ListeningOutput {
        event: "listening",
        addr: addr.to_string(),
        port: addr.port(),
        config,
        timestamp: now_unix_seconds(),
    };
    render(&[out], Some(addr.port().to_string().as_str()), format);
}

pub fn print_control_event(event: &ControlEvent, format: OutputFormat) {
    match event {
        ControlEvent::Connected(peer) => {
            let mut out = RecordOutput::new("connected");
            out.peer = Some(peer.to_string());
            render(&[out], None, format);
        }
        ControlEvent::Disconnected(peer) => {
            let mut out = RecordOutput::new("disconnected");
            out.peer = Some(peer.to_string());
            render(&[out], None, format);
        }
        ControlEvent::Command { message, .. } => {
            let out = RecordOutput::new("command").with_message(message);
            render(&[out], message.to_json().ok().as_deref(), format);
        }
        ControlEvent::Unhandled(message) => {
            let out = RecordOutput::new("unhandled").with_message(message);
            render(&[out], message.to_json().ok().as_deref(), format);
        }
    }
}

pub fn print_message(event: &'static str, message: &Message, format: OutputFormat) {
    let out = RecordOutput::new(event).with_message(message);
    render(&[out], message.to_json().ok().as_deref(), format);
}

pub fn print_stream_event(event: &StreamEvent, format: OutputFormat) {
    match event {
        StreamEvent::Message(message) => print_message("message", message, format),
        StreamEvent::Log { source, line } => {
            let mut out = RecordOutput::new("log");
            out.source = Some(source.as_str());
            out.line = Some(line.as_str());
            render(&[out], Some(line.as_str()), format);
        }
        StreamEvent::ParseError { line, reason } => {
            let mut out = RecordOutput::new("parse_error");
            out.line = Some(line.as_str());
            out.reason = Some(reason.as_str());
            render(&[out], Some(line.as_str()), format);
        }
        StreamEvent::Overflow { source, discarded } => {
            let mut out = RecordOutput::new("overflow");
            out.source = Some(source.as_str());
            out.discarded = Some(*discarded);
            render(&[out], None, format);
        }
    }
}

pub fn print_exit(report: &ShutdownReport, format: OutputFormat) {
    let out = ExitOutput {
        event: "exited",
        code: report.status.code(),
        success: report.status.success(),
        cleanup_confirmed: report.cleanup_confirmed,
        forced: report.forced,
        timestamp: now_unix_seconds(),
    };
    render(&[out], None, format);
}

pub fn print_gate_rows(rows: &[GateRow], format: OutputFormat) {
    render(rows, None, format);
}

/// Print records in the requested format. `raw` is the payload for
/// [`OutputFormat::Raw`]; records without one fall back to JSON lines.
fn render<T: Serialize>(records: &[T], raw: Option<&str>, format: OutputFormat) {
    let values: Vec<Map<String, Value>> = records
        .iter()
        .filter_map(|record| match serde_json::to_value(record) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        })
        .collect();

    match format {
        OutputFormat::Json => {
            for value in &values {
                println!(
                    "{}",
                    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let Some(first) = values.first() else {
                return;
            };
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(first.keys().map(|key| key.to_uppercase()).collect::<Vec<_>>());
            for value in &values {
                table.add_row(
                    first
                        .keys()
                        .map(|key| value.get(key).map(cell).unwrap_or_default())
                        .collect::<Vec<_>>(),
                );
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for value in &values {
                let line = value
                    .iter()
                    .filter(|(key, _)| key.as_str() != "timestamp")
                    .map(|(key, value)| format!("{key}={}", cell(value)))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("{line}");
            }
        }
        OutputFormat::Raw => match raw {
            Some(text) => print_raw(text),
            None => {
                for value in &values {
                    print_raw(&serde_json::to_string(value).unwrap_or_default());
                }
            }
        },
    }
}

pub fn print_raw(text: &str) {
    let mut out = std::io::stdout();
    let _ = writeln!(out, "{text}");
    let _ = out.flush();
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_skips_absent_fields() {
        let message = Message::new("start").with_id("7");
        let value = serde_json::to_value(RecordOutput::new("command").with_message(&message))
            .expect("record should serialize");
        assert_eq!(value["event"], "command");
        assert_eq!(value["function"], "start");
        assert_eq!(value["id"], "7");
        assert!(value.get("data").is_none());
        assert!(value.get("peer").is_none());
    }

    #[test]
    fn cell_unquotes_strings() {
        assert_eq!(cell(&json!("invoke")), "invoke");
        assert_eq!(cell(&json!(true)), "true");
        assert_eq!(cell(&Value::Null), "");
    }
}
