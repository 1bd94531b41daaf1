//! Rendering of command results.
//!
//! Results go to stdout and status lines go to stderr, so `--format json`
//! output can be piped straight into another tool.

use std::fmt::Display;

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::types::Message;
use crate::PullSummary;

/// How `pull` renders what it consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// One table row per message, then a summary line.
    #[default]
    Table,
    /// A single JSON document with the messages and the summary.
    Json,
}

/// Kind of status line written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The command did what was asked.
    Done,
    /// Something needs attention but the command went on.
    Warn,
    /// Progress information.
    Note,
    /// The command failed.
    Failed,
}

impl Status {
    fn marker(self) -> colored::ColoredString {
        match self {
            Status::Done => "✓".green().bold(),
            Status::Warn => "⚠".yellow().bold(),
            Status::Note => "ℹ".blue().bold(),
            Status::Failed => "✗".red().bold(),
        }
    }
}

/// Write a status line to stderr.
pub fn status(kind: Status, message: impl Display) {
    eprintln!("{} {}", kind.marker(), message);
}

#[derive(Serialize)]
struct PullReport<'a, T> {
    messages: &'a [T],
    summary: &'a PullSummary,
}

/// Print the messages of a pull run together with its summary.
pub fn print_pull_report<T>(rows: &[T], summary: &PullSummary, format: OutputFormat) -> anyhow::Result<()>
where
    T: Tabled + Serialize,
{
    println!("{}", render_pull_report(rows, summary, format)?);
    if !summary.failed.is_empty() {
        status(
            Status::Warn,
            format!("{} message(s) failed and were returned to the subscription", summary.failed.len()),
        );
    }
    Ok(())
}

fn render_pull_report<T>(rows: &[T], summary: &PullSummary, format: OutputFormat) -> anyhow::Result<String>
where
    T: Tabled + Serialize,
{
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&PullReport {
            messages: rows,
            summary,
        })?),
        OutputFormat::Table => {
            let body = if rows.is_empty() {
                "No messages".dimmed().to_string()
            } else {
                Table::new(rows).to_string()
            };
            Ok(format!(
                "{}\nDelivered {}, acked {}, nacked {}",
                body, summary.delivered, summary.acked, summary.nacked
            ))
        }
    }
}

/// One line per message streamed by `receive`.
pub fn print_delivery(message: &Message, attributes: &str) {
    println!(
        "{} {} {}",
        message.id.to_string().cyan(),
        String::from_utf8_lossy(&message.data),
        attributes.dimmed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageId;

    #[derive(Serialize, Tabled)]
    struct Row {
        message_id: String,
        data: String,
    }

    #[test]
    fn test_json_report_carries_messages_and_summary() {
        let rows = vec![Row {
            message_id: "m-1".to_string(),
            data: "hello".to_string(),
        }];
        let summary = PullSummary {
            delivered: 2,
            acked: 1,
            nacked: 1,
            failed: vec![MessageId::from_string("m-2".to_string())],
        };

        let rendered = render_pull_report(&rows, &summary, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["messages"][0]["data"], "hello");
        assert_eq!(value["summary"]["acked"], 1);
        assert_eq!(value["summary"]["failed"][0], "m-2");
    }

    #[test]
    fn test_table_report_for_empty_run() {
        let rows: Vec<Row> = Vec::new();
        let rendered = render_pull_report(&rows, &PullSummary::default(), OutputFormat::Table).unwrap();
        assert!(rendered.contains("No messages"));
        assert!(rendered.ends_with("Delivered 0, acked 0, nacked 0"));
    }

    #[test]
    fn test_format_values() {
        assert_eq!(OutputFormat::from_str("json", true).unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str("TABLE", true).unwrap(), OutputFormat::Table);
        assert!(OutputFormat::from_str("yaml", true).is_err());
    }
}
