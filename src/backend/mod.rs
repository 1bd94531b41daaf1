//! Messaging backend traits and implementations.
//!
//! The facade talks to the provider only through [`MessagingBackend`]. Two
//! implementations ship with the crate:
//!
//! - [`gcp::GcpBackend`] forwards to Google Cloud Pub/Sub (or its emulator).
//! - [`memory::InMemoryBackend`] keeps topics and subscriptions in process,
//!   with the same fan-out, ack deadline and redelivery behavior.
//!
//! All resource names crossing this trait are fully qualified
//! (`projects/{project}/topics/{topic}`).

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::types::{Message, MessageId, OutgoingMessage, ReceiveOptions, SubscriptionConfig, TopicConfig};
use crate::Result;

pub mod gcp;
pub mod memory;
pub mod receipt;

/// One-shot acknowledgment reply for a delivered message.
///
/// Both methods consume the reply, so a delivery is decided at most once.
#[async_trait]
pub trait AckReply: Send + Sync {
    /// Acknowledge the delivery; the backend considers the message consumed.
    async fn ack(self: Box<Self>) -> Result<()>;

    /// Negatively acknowledge the delivery; the backend redelivers it.
    async fn nack(self: Box<Self>) -> Result<()>;
}

/// A delivered message together with its ack reply.
pub struct Delivery {
    /// The delivered message.
    pub message: Message,
    reply: Box<dyn AckReply>,
}

impl Delivery {
    /// Pair a message with the reply that settles it.
    pub fn new(message: Message, reply: Box<dyn AckReply>) -> Self {
        Self { message, reply }
    }

    /// ID of the delivered message.
    pub fn id(&self) -> &MessageId {
        &self.message.id
    }

    /// Acknowledge the delivery.
    pub async fn ack(self) -> Result<()> {
        self.reply.ack().await
    }

    /// Negatively acknowledge the delivery.
    pub async fn nack(self) -> Result<()> {
        self.reply.nack().await
    }

    /// Split into the message and its reply.
    pub fn into_parts(self) -> (Message, Box<dyn AckReply>) {
        (self.message, self.reply)
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Handler invoked by a backend's streaming delivery machinery.
///
/// The handler owns the decision: it must ack or nack every delivery it is given.
pub type DeliveryHandler = Arc<dyn Fn(Delivery) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`DeliveryHandler`].
pub fn delivery_handler<F, Fut>(f: F) -> DeliveryHandler
where
    F: Fn(Delivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |delivery| Box::pin(f(delivery)))
}

/// Messaging backend trait.
#[async_trait]
pub trait MessagingBackend: Send + Sync {
    /// Short backend name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Look up a topic; `Ok(None)` when it does not exist.
    async fn get_topic(&self, name: &str) -> Result<Option<TopicConfig>>;

    /// Create a topic.
    async fn create_topic(&self, config: TopicConfig) -> Result<TopicConfig>;

    /// Look up a subscription; `Ok(None)` when it does not exist.
    async fn get_subscription(&self, name: &str) -> Result<Option<SubscriptionConfig>>;

    /// Create a subscription bound to `config.topic`.
    async fn create_subscription(&self, config: SubscriptionConfig) -> Result<SubscriptionConfig>;

    /// Publish one message and wait for the backend to confirm it.
    async fn publish(&self, topic: &str, message: OutgoingMessage) -> Result<MessageId>;

    /// Pull up to `max_messages` currently available messages.
    async fn pull(&self, subscription: &str, max_messages: u32) -> Result<Vec<Delivery>>;

    /// Stream deliveries into `handler` until `cancel` fires.
    async fn receive(
        &self,
        subscription: &str,
        handler: DeliveryHandler,
        options: ReceiveOptions,
        cancel: CancellationToken,
    ) -> Result<()>;

    /// Release backend resources (flush publishers and the like).
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
