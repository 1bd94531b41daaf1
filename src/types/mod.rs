//! Common data types for pubsub-facade.

pub mod validation;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Ack deadline applied to new subscriptions when none is configured.
pub const DEFAULT_ACK_DEADLINE_SECONDS: u32 = 20;

/// Default number of messages requested per pull.
pub const DEFAULT_MAX_MESSAGES: u32 = 10;

/// Unique message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Create a new random message ID.
    pub fn new() -> Self {
        MessageId(Uuid::new_v4().to_string())
    }

    /// Create a message ID from a string.
    pub fn from_string(s: String) -> Self {
        MessageId(s)
    }

    /// Borrow the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message attributes.
pub type Attributes = HashMap<String, String>;

/// A message as delivered by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Backend-assigned message ID.
    pub id: MessageId,
    /// Opaque payload.
    pub data: Vec<u8>,
    /// String attributes published alongside the payload.
    pub attributes: Attributes,
    /// When the backend accepted the message.
    pub publish_time: DateTime<Utc>,
    /// How many times this message has been delivered, starting at 1.
    pub delivery_attempt: u32,
}

impl Message {
    /// Payload as UTF-8, if it is valid UTF-8.
    pub fn data_as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

/// A message on its way to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Opaque payload.
    pub data: Vec<u8>,
    /// String attributes.
    pub attributes: Attributes,
}

impl OutgoingMessage {
    /// Create a message without attributes.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            attributes: Attributes::new(),
        }
    }

    /// Attach attributes to the message.
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Encoded size as counted against the provider's request limit.
    pub fn size(&self) -> usize {
        self.data.len()
            + self
                .attributes
                .iter()
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>()
    }
}

/// Topic configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Fully-qualified topic name.
    pub name: String,
}

impl TopicConfig {
    /// Create a topic configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Subscription configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Fully-qualified subscription name.
    pub name: String,
    /// Fully-qualified name of the topic the subscription is bound to.
    pub topic: String,
    /// Ack deadline in seconds (10-600).
    pub ack_deadline_seconds: u32,
}

impl SubscriptionConfig {
    /// Ack deadline as a duration.
    pub fn ack_deadline(&self) -> Duration {
        Duration::from_secs(self.ack_deadline_seconds as u64)
    }
}

/// Options for consuming messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Maximum number of messages per pull.
    pub max_messages: u32,
    /// Number of concurrent delivery workers for streaming receive.
    pub worker_count: usize,
    /// How long an idle in-memory worker waits before pulling again.
    pub poll_interval: Duration,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
            worker_count: num_cpus::get() * 2,
            poll_interval: Duration::from_millis(100),
        }
    }
}
