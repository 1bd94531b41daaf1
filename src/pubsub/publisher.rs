//! Topic provisioning and publishing.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pubsub::{cancellable, PubSub, ResourceName, Topic};
use crate::types::validation::validate_outgoing_message;
use crate::types::{Attributes, MessageId, OutgoingMessage, TopicConfig};
use crate::{Error, Result};

impl PubSub {
    /// Make sure a topic exists, creating it if needed.
    ///
    /// `topic_name` may be a short ID or a fully-qualified name. Calling this
    /// for an existing topic leaves it untouched. A topic created concurrently
    /// by another caller is treated as existing.
    pub async fn ensure_topic(&self, topic_name: &str, cancel: &CancellationToken) -> Result<Topic> {
        let resource = ResourceName::resolve_topic(&self.project, topic_name)?;
        let name = resource.to_string();

        let existing = cancellable(cancel, "topic lookup", self.backend.get_topic(&name))
            .await
            .map_err(|e| self.backend_failure("get_topic", e))?;

        if existing.is_some() {
            info!(topic = %name, "Topic already exists");
            self.record_provisioning("topic", false);
            return Ok(Topic::new(&resource));
        }

        info!(topic = %name, "Creating topic");
        match cancellable(cancel, "topic creation", self.backend.create_topic(TopicConfig::new(&name))).await {
            Ok(_) => {
                info!(topic = %name, "Topic created");
                self.record_provisioning("topic", true);
            }
            Err(Error::AlreadyExists(_)) => {
                debug!(topic = %name, "Topic created concurrently");
                self.record_provisioning("topic", false);
            }
            Err(e) => return Err(self.backend_failure("create_topic", e)),
        }

        Ok(Topic::new(&resource))
    }

    /// Publish a payload and wait for the backend to confirm it.
    pub async fn publish(
        &self,
        topic_name: &str,
        data: impl Into<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> Result<MessageId> {
        self.publish_message(topic_name, OutgoingMessage::new(data), cancel)
            .await
    }

    /// Publish a payload with attributes and wait for confirmation.
    pub async fn publish_with_attributes(
        &self,
        topic_name: &str,
        data: impl Into<Vec<u8>>,
        attributes: Attributes,
        cancel: &CancellationToken,
    ) -> Result<MessageId> {
        let message = OutgoingMessage::new(data).with_attributes(attributes);
        self.publish_message(topic_name, message, cancel).await
    }

    /// Publish a prepared message.
    ///
    /// Returns the backend-assigned ID once the backend has accepted the
    /// message. Any rejection or unconfirmed round-trip surfaces as
    /// [`Error::Publish`].
    pub async fn publish_message(
        &self,
        topic_name: &str,
        message: OutgoingMessage,
        cancel: &CancellationToken,
    ) -> Result<MessageId> {
        let resource = ResourceName::resolve_topic(&self.project, topic_name)?;
        validate_outgoing_message(&message)?;
        let topic = resource.to_string();

        let start = Instant::now();
        let result = cancellable(cancel, "publish", self.backend.publish(&topic, message)).await;

        match result {
            Ok(message_id) => {
                debug!(topic = %topic, message_id = %message_id, "Published message");
                if let Some(metrics) = &self.metrics {
                    metrics.record_publish(self.backend.name(), &topic, start.elapsed().as_secs_f64());
                }
                Ok(message_id)
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Publish failed");
                if let Some(metrics) = &self.metrics {
                    metrics.record_publish_failure(&topic);
                }
                Err(match e {
                    e @ (Error::Publish { .. } | Error::Cancelled(_) | Error::Validation(_)) => e,
                    other => Error::Publish {
                        topic,
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    pub(crate) fn record_provisioning(&self, resource: &str, created: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_provisioning(resource, created);
        }
    }
}
