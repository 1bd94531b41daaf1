//! Google Cloud Pub/Sub backend.
//!
//! Thin forwarding layer over the `google-cloud-pubsub` client. Works against
//! the production service (credentials resolved by `with_auth`) or against the
//! Pub/Sub emulator when an emulator host is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_cloud_gax::conn::Environment;
use google_cloud_gax::grpc::{Code, Status};
use google_cloud_googleapis::pubsub::v1::PubsubMessage;
use google_cloud_pubsub::client::{Client, ClientConfig};
use google_cloud_pubsub::publisher::Publisher;
use google_cloud_pubsub::subscriber::ReceivedMessage;
use google_cloud_pubsub::subscription::{ReceiveConfig, SubscriptionConfig as GcpSubscriptionConfig};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::{AckReply, Delivery, DeliveryHandler, MessagingBackend};
use crate::types::{Message, MessageId, OutgoingMessage, ReceiveOptions, SubscriptionConfig, TopicConfig};
use crate::{Error, Result};

/// Connection options for [`GcpBackend`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcpOptions {
    /// Emulator address (`host:port`); credentials are not loaded when set.
    pub emulator_host: Option<String>,
    /// Endpoint override for the production service.
    pub endpoint: Option<String>,
}

/// Google Cloud Pub/Sub backend.
pub struct GcpBackend {
    client: Client,
    /// Publishers are long-lived and batch internally, so one per topic is kept.
    publishers: RwLock<HashMap<String, Publisher>>,
}

impl GcpBackend {
    /// Build a client for `project_id`.
    pub async fn connect(project_id: &str, options: GcpOptions) -> Result<Self> {
        let mut config = ClientConfig::default();

        match &options.emulator_host {
            Some(host) => {
                info!(emulator_host = %host, "Connecting to Pub/Sub emulator");
                config.environment = Environment::Emulator(host.clone());
            }
            None => {
                config = config
                    .with_auth()
                    .await
                    .map_err(|e| Error::Connection(format!("Failed to load credentials: {}", e)))?;
            }
        }

        if let Some(endpoint) = options.endpoint {
            config.endpoint = endpoint;
        }
        config.project_id = Some(project_id.to_string());

        let client = Client::new(config)
            .await
            .map_err(|e| Error::Connection(format!("Failed to create Pub/Sub client: {}", e)))?;

        info!(project_id = %project_id, "Pub/Sub client created");

        Ok(Self {
            client,
            publishers: RwLock::new(HashMap::new()),
        })
    }

    /// Cached publisher for a topic, created on first use.
    async fn publisher(&self, topic: &str) -> Publisher {
        if let Some(publisher) = self.publishers.read().await.get(topic) {
            return publisher.clone();
        }

        let mut publishers = self.publishers.write().await;
        publishers
            .entry(topic.to_string())
            .or_insert_with(|| {
                debug!(topic = %topic, "Starting publisher");
                self.client.topic(topic).new_publisher(None)
            })
            .clone()
    }
}

/// Map a gRPC status from a provisioning or lookup call.
fn status_error(operation: &str, name: &str, status: Status) -> Error {
    match status.code() {
        Code::AlreadyExists => Error::AlreadyExists(name.to_string()),
        Code::Cancelled => Error::Cancelled(format!("{} {}", operation, name)),
        _ => Error::Backend(format!("{} {} failed: {}", operation, name, status)),
    }
}

/// Move the payload out of a received message, leaving the ack handle usable.
fn take_message(received: &mut ReceivedMessage) -> Message {
    let delivery_attempt = received.delivery_attempt().map(|n| n as u32).unwrap_or(1);
    let msg = &mut received.message;

    Message {
        id: MessageId::from_string(msg.message_id.clone()),
        data: std::mem::take(&mut msg.data),
        attributes: std::mem::take(&mut msg.attributes),
        publish_time: msg
            .publish_time
            .as_ref()
            .and_then(|t| DateTime::from_timestamp(t.seconds, t.nanos.max(0) as u32))
            .unwrap_or_else(Utc::now),
        delivery_attempt,
    }
}

fn into_delivery(mut received: ReceivedMessage) -> Delivery {
    let message = take_message(&mut received);
    Delivery::new(message, Box::new(GcpAckReply { received }))
}

/// Ack reply wrapping the client's received message.
struct GcpAckReply {
    received: ReceivedMessage,
}

#[async_trait]
impl AckReply for GcpAckReply {
    async fn ack(self: Box<Self>) -> Result<()> {
        self.received
            .ack()
            .await
            .map_err(|s| Error::Backend(format!("Ack failed: {}", s)))
    }

    async fn nack(self: Box<Self>) -> Result<()> {
        self.received
            .nack()
            .await
            .map_err(|s| Error::Backend(format!("Nack failed: {}", s)))
    }
}

#[async_trait]
impl MessagingBackend for GcpBackend {
    fn name(&self) -> &'static str {
        "gcp"
    }

    async fn get_topic(&self, name: &str) -> Result<Option<TopicConfig>> {
        let exists = self
            .client
            .topic(name)
            .exists(None)
            .await
            .map_err(|s| status_error("Topic existence check", name, s))?;

        Ok(exists.then(|| TopicConfig::new(name)))
    }

    async fn create_topic(&self, config: TopicConfig) -> Result<TopicConfig> {
        self.client
            .create_topic(&config.name, None, None)
            .await
            .map_err(|s| status_error("Create topic", &config.name, s))?;

        info!(topic = %config.name, "Topic created");
        Ok(config)
    }

    async fn get_subscription(&self, name: &str) -> Result<Option<SubscriptionConfig>> {
        match self.client.subscription(name).config(None).await {
            Ok((topic, config)) => Ok(Some(SubscriptionConfig {
                name: name.to_string(),
                topic,
                ack_deadline_seconds: config.ack_deadline_seconds.max(0) as u32,
            })),
            Err(status) if status.code() == Code::NotFound => Ok(None),
            Err(status) => Err(status_error("Subscription lookup", name, status)),
        }
    }

    async fn create_subscription(&self, config: SubscriptionConfig) -> Result<SubscriptionConfig> {
        let gcp_config = GcpSubscriptionConfig {
            ack_deadline_seconds: config.ack_deadline_seconds as i32,
            ..Default::default()
        };

        self.client
            .create_subscription(&config.name, &config.topic, gcp_config, None)
            .await
            .map_err(|s| match s.code() {
                Code::NotFound => Error::TopicNotFound(config.topic.clone()),
                _ => status_error("Create subscription", &config.name, s),
            })?;

        info!(subscription = %config.name, topic = %config.topic, "Subscription created");
        Ok(config)
    }

    async fn publish(&self, topic: &str, message: OutgoingMessage) -> Result<MessageId> {
        let publisher = self.publisher(topic).await;

        let awaiter = publisher
            .publish(PubsubMessage {
                data: message.data,
                attributes: message.attributes,
                ..Default::default()
            })
            .await;

        let message_id = awaiter.get().await.map_err(|s| match s.code() {
            Code::NotFound => Error::TopicNotFound(topic.to_string()),
            _ => Error::Publish {
                topic: topic.to_string(),
                reason: s.to_string(),
            },
        })?;

        debug!(topic = %topic, message_id = %message_id, "Message published");
        Ok(MessageId::from_string(message_id))
    }

    async fn pull(&self, subscription: &str, max_messages: u32) -> Result<Vec<Delivery>> {
        let received = self
            .client
            .subscription(subscription)
            .pull(max_messages.max(1) as i32, None)
            .await
            .map_err(|s| match s.code() {
                Code::NotFound => Error::SubscriptionNotFound(subscription.to_string()),
                _ => status_error("Pull", subscription, s),
            })?;

        debug!(subscription = %subscription, count = received.len(), "Messages pulled");
        Ok(received.into_iter().map(into_delivery).collect())
    }

    async fn receive(
        &self,
        subscription: &str,
        handler: DeliveryHandler,
        options: ReceiveOptions,
        cancel: CancellationToken,
    ) -> Result<()> {
        let config = ReceiveConfig {
            worker_count: options.worker_count.max(1),
            ..Default::default()
        };

        info!(
            subscription = %subscription,
            workers = config.worker_count,
            "Starting streaming receive"
        );

        self.client
            .subscription(subscription)
            .receive(
                move |received, _cancel| {
                    let handler = handler.clone();
                    async move {
                        handler(into_delivery(received)).await;
                    }
                },
                cancel,
                Some(config),
            )
            .await
            .map_err(|s| match s.code() {
                Code::NotFound => Error::SubscriptionNotFound(subscription.to_string()),
                _ => status_error("Receive", subscription, s),
            })?;

        info!(subscription = %subscription, "Streaming receive stopped");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut publishers = self.publishers.write().await;
        for (topic, mut publisher) in publishers.drain() {
            debug!(topic = %topic, "Shutting down publisher");
            publisher.shutdown().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_mapping() {
        let err = status_error("Create topic", "projects/p/topics/t", Status::new(Code::AlreadyExists, "exists"));
        assert!(matches!(err, Error::AlreadyExists(_)));

        let err = status_error("Create topic", "projects/p/topics/t", Status::new(Code::Unavailable, "down"));
        match err {
            Error::Backend(reason) => assert!(reason.contains("projects/p/topics/t")),
            other => panic!("Expected Backend error, got {other:?}"),
        }
    }

    #[test]
    fn test_default_options() {
        let options = GcpOptions::default();
        assert!(options.emulator_host.is_none());
        assert!(options.endpoint.is_none());
    }
}
