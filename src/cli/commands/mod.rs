// Command handlers
use crate::cli::shutdown::{cancel_after, cancel_on_signal};
use crate::cli::{output::*, Cli, Commands, GlobalArgs};
use crate::config::{BackendConfig, FacadeConfig};
use crate::pubsub::PubSub;
use crate::types::{Attributes, Message};
use anyhow::Context;
use serde::Serialize;
use std::time::Duration;
use tabled::Tabled;
use tokio_util::sync::CancellationToken;

/// Message row printed by `pull`
#[derive(Debug, Serialize, Tabled)]
struct MessageRow {
    message_id: String,
    data: String,
    #[tabled(display_with = "display_attributes")]
    attributes: Attributes,
    delivery_attempt: u32,
    publish_time: String,
}

impl From<&Message> for MessageRow {
    fn from(message: &Message) -> Self {
        Self {
            message_id: message.id.to_string(),
            data: String::from_utf8_lossy(&message.data).into_owned(),
            attributes: message.attributes.clone(),
            delivery_attempt: message.delivery_attempt,
            publish_time: message.publish_time.to_rfc3339(),
        }
    }
}

/// Display function for attribute maps in tables
fn display_attributes(attributes: &Attributes) -> String {
    if attributes.is_empty() {
        return "-".to_string();
    }
    let mut pairs: Vec<String> = attributes.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    pairs.sort();
    pairs.join(", ")
}

/// Load the configuration file (if any), then apply environment and flag overrides.
pub fn load_config(global: &GlobalArgs) -> anyhow::Result<FacadeConfig> {
    let mut config = match &global.config {
        Some(path) => FacadeConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => FacadeConfig::default(),
    };

    config.apply_env();

    if let Some(project) = &global.project {
        config.project_id = project.clone();
    }
    if global.in_memory {
        config.backend = BackendConfig::InMemory;
    } else if let Some(host) = &global.emulator_host {
        config.backend = match config.backend {
            BackendConfig::Gcp { endpoint, .. } => BackendConfig::Gcp {
                emulator_host: Some(host.clone()),
                endpoint,
            },
            BackendConfig::InMemory => BackendConfig::Gcp {
                emulator_host: Some(host.clone()),
                endpoint: None,
            },
        };
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Execute a CLI command
pub async fn execute_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.global)?;
    crate::logging::init(&config.logging)?;

    if let Commands::Config = cli.command {
        return execute_config(&config);
    }

    let pubsub = PubSub::connect(&config)
        .await
        .context("Failed to create Pub/Sub client")?;
    let cancel = CancellationToken::new();
    let signal_watcher = cancel_on_signal(cancel.clone());

    let result = run(&pubsub, &config, cli.command, &cancel).await;

    // Stop the signal watcher before tearing down the client.
    cancel.cancel();
    let _ = signal_watcher.await;
    pubsub.close().await.context("Failed to close Pub/Sub client")?;

    if let Err(e) = &result {
        status(Status::Failed, format!("{:#}", e));
    }
    if cli.global.metrics {
        println!("{}", crate::metrics::gather()?);
    }
    result
}

async fn run(
    pubsub: &PubSub,
    config: &FacadeConfig,
    command: Commands,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    match command {
        Commands::EnsureTopic { topic } => {
            let topic = pubsub.ensure_topic(&topic, cancel).await?;
            status(Status::Done, format!("Topic ready: {}", topic.name()));
            Ok(())
        }
        Commands::EnsureSubscription {
            topic,
            subscription,
            ack_deadline,
        } => {
            let topic = pubsub.ensure_topic(&topic, cancel).await?;
            let deadline = ack_deadline
                .map(Duration::from_secs)
                .unwrap_or_else(|| pubsub.default_ack_deadline());
            let subscription = pubsub
                .ensure_subscription_with_deadline(&topic, &subscription, deadline, cancel)
                .await?;
            status(
                Status::Done,
                format!(
                    "Subscription ready: {} (topic {}, ack deadline {}s)",
                    subscription.name(),
                    subscription.topic(),
                    subscription.ack_deadline().as_secs()
                ),
            );
            Ok(())
        }
        Commands::Publish {
            topic,
            message,
            attributes,
        } => {
            let attributes: Attributes = attributes.into_iter().collect();
            let message_id = pubsub
                .publish_with_attributes(&topic, message.into_bytes(), attributes, cancel)
                .await?;
            status(Status::Done, format!("Published message {}", message_id));
            Ok(())
        }
        Commands::Pull {
            subscription,
            max_messages,
            format,
        } => execute_pull(pubsub, &subscription, max_messages, format, cancel).await,
        Commands::Receive {
            subscription,
            timeout,
            workers,
        } => execute_receive(pubsub, &subscription, timeout, workers, cancel).await,
        Commands::Config => execute_config(config),
    }
}

async fn execute_pull(
    pubsub: &PubSub,
    subscription: &str,
    max_messages: Option<u32>,
    format: OutputFormat,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let mut client = pubsub.clone();
    if let Some(max) = max_messages {
        client = client.with_max_messages(max);
    }

    let mut rows = Vec::new();
    let summary = client
        .pull_messages(subscription, cancel, |message| {
            rows.push(MessageRow::from(&message));
            async { Ok(()) }
        })
        .await?;

    print_pull_report(&rows, &summary, format)
}

async fn execute_receive(
    pubsub: &PubSub,
    subscription: &str,
    timeout: Option<u64>,
    workers: Option<usize>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let mut options = pubsub.receive_options().clone();
    if let Some(workers) = workers {
        options.worker_count = workers.max(1);
    }

    let receive_cancel = cancel.child_token();
    if let Some(seconds) = timeout {
        cancel_after(receive_cancel.clone(), Duration::from_secs(seconds));
    }

    status(Status::Note, format!("Receiving from {} (Ctrl+C to stop)", subscription));
    pubsub
        .receive_with_options(subscription, options, receive_cancel, |message: Message| async move {
            print_delivery(&message, &display_attributes(&message.attributes));
            Ok(())
        })
        .await?;

    status(Status::Done, "Receive stopped");
    Ok(())
}

fn execute_config(config: &FacadeConfig) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_attributes_sorted() {
        let mut attributes = Attributes::new();
        attributes.insert("b".to_string(), "2".to_string());
        attributes.insert("a".to_string(), "1".to_string());
        assert_eq!(display_attributes(&attributes), "a=1, b=2");
        assert_eq!(display_attributes(&Attributes::new()), "-");
    }

    #[test]
    fn test_flags_override_config() {
        let global = GlobalArgs {
            project: Some("flag-project".to_string()),
            in_memory: true,
            ..GlobalArgs::default()
        };
        let config = load_config(&global).unwrap();
        assert_eq!(config.backend, BackendConfig::InMemory);
        if std::env::var("PUBSUB_PROJECT_ID").is_err() {
            assert_eq!(config.project_id, "flag-project");
        }
    }

    #[test]
    fn test_emulator_flag_selects_gcp() {
        let global = GlobalArgs {
            emulator_host: Some("localhost:8085".to_string()),
            ..GlobalArgs::default()
        };
        let config = load_config(&global).unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::Gcp {
                emulator_host: Some("localhost:8085".to_string()),
                endpoint: None,
            }
        );
    }

    #[tokio::test]
    async fn test_publish_then_pull_in_memory() {
        let global = GlobalArgs {
            in_memory: true,
            ..GlobalArgs::default()
        };
        let config = load_config(&global).unwrap();
        let pubsub = PubSub::connect(&config).await.unwrap();
        let cancel = CancellationToken::new();

        run(
            &pubsub,
            &config,
            Commands::EnsureSubscription {
                topic: "orders".to_string(),
                subscription: "orders-sub".to_string(),
                ack_deadline: Some(30),
            },
            &cancel,
        )
        .await
        .unwrap();

        run(
            &pubsub,
            &config,
            Commands::Publish {
                topic: "orders".to_string(),
                message: "hello".to_string(),
                attributes: vec![("k".to_string(), "v".to_string())],
            },
            &cancel,
        )
        .await
        .unwrap();

        execute_pull(&pubsub, "orders-sub", Some(5), OutputFormat::Json, &cancel)
            .await
            .unwrap();
    }
}
