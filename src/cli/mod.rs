// CLI module for pubsub-facade
/// Command execution handlers
pub mod commands;
/// Output formatting utilities
pub mod output;
/// Signal handling for long-running commands
pub mod shutdown;

use clap::{Args, Parser, Subcommand};
use output::OutputFormat;
use std::path::PathBuf;

/// Command-line interface for pubsub-facade
#[derive(Parser)]
#[command(name = "pubsub-facade")]
#[command(author, version, about = "Provision, publish to and consume from Google Cloud Pub/Sub", long_about = None)]
pub struct Cli {
    /// Options shared by every command
    #[command(flatten)]
    pub global: GlobalArgs,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Path to a TOML configuration file
    #[arg(long, short, global = true, env = "PUBSUB_FACADE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Project ID (overrides the configuration file)
    #[arg(long, global = true)]
    pub project: Option<String>,

    /// Pub/Sub emulator address, host:port
    #[arg(long, global = true)]
    pub emulator_host: Option<String>,

    /// Use the in-process backend instead of Google Cloud
    #[arg(long, global = true)]
    pub in_memory: bool,

    /// Print Prometheus metrics after the command finishes
    #[arg(long, global = true)]
    pub metrics: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a topic unless it already exists
    EnsureTopic {
        /// Topic ID or full resource name
        topic: String,
    },

    /// Create a subscription unless it already exists
    EnsureSubscription {
        /// Topic the subscription is bound to
        topic: String,

        /// Subscription ID or full resource name
        subscription: String,

        /// Ack deadline in seconds (defaults to the configured value)
        #[arg(long)]
        ack_deadline: Option<u64>,
    },

    /// Publish one message
    Publish {
        /// Topic ID or full resource name
        topic: String,

        /// Message payload
        #[arg(default_value = "")]
        message: String,

        /// Message attribute as key=value (repeatable)
        #[arg(long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,
    },

    /// Pull and acknowledge messages until the subscription is drained
    Pull {
        /// Subscription ID or full resource name
        subscription: String,

        /// Messages per pull request
        #[arg(long)]
        max_messages: Option<u32>,

        /// Output format
        #[arg(long, short, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Stream messages until interrupted
    Receive {
        /// Subscription ID or full resource name
        subscription: String,

        /// Stop after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Number of concurrent delivery workers
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Show the effective configuration
    Config,
}

/// Parse a `key=value` attribute argument.
pub fn parse_attribute(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got {:?}", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attribute() {
        assert_eq!(
            parse_attribute("priority=high").unwrap(),
            ("priority".to_string(), "high".to_string())
        );
        assert_eq!(
            parse_attribute("query=a=b").unwrap(),
            ("query".to_string(), "a=b".to_string())
        );
        assert!(parse_attribute("=x").is_err());
        assert!(parse_attribute("novalue").is_err());
    }

    #[test]
    fn test_parse_publish_command() {
        let cli = Cli::try_parse_from([
            "pubsub-facade",
            "--in-memory",
            "publish",
            "orders",
            "hello",
            "--attr",
            "a=1",
            "--attr",
            "b=2",
        ])
        .unwrap();

        assert!(cli.global.in_memory);
        match cli.command {
            Commands::Publish {
                topic,
                message,
                attributes,
            } => {
                assert_eq!(topic, "orders");
                assert_eq!(message, "hello");
                assert_eq!(attributes.len(), 2);
            }
            other => panic!("Expected publish command, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_pull_format() {
        let cli = Cli::try_parse_from(["pubsub-facade", "pull", "orders-sub", "--format", "json"]).unwrap();
        match cli.command {
            Commands::Pull { format, .. } => assert_eq!(format, OutputFormat::Json),
            other => panic!("Expected pull command, got {other:?}"),
        }

        let cli = Cli::try_parse_from(["pubsub-facade", "pull", "orders-sub"]).unwrap();
        assert!(matches!(cli.command, Commands::Pull { format: OutputFormat::Table, .. }));

        assert!(Cli::try_parse_from(["pubsub-facade", "pull", "orders-sub", "-f", "yaml"]).is_err());
    }
}
