//! In-memory messaging backend implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::receipt::{generate_ack_id, parse_ack_id};
use crate::backend::{AckReply, Delivery, DeliveryHandler, MessagingBackend};
use crate::types::{Message, MessageId, OutgoingMessage, ReceiveOptions, SubscriptionConfig, TopicConfig};
use crate::{Error, Result};

/// In-memory messaging backend.
///
/// Messages published to a topic are copied into every subscription bound to
/// it. Pulled messages stay in flight until acked, nacked, or until their
/// subscription's ack deadline passes.
#[derive(Clone)]
pub struct InMemoryBackend {
    inner: Arc<InMemoryBackendInner>,
}

struct InMemoryBackendInner {
    /// Topics storage.
    topics: RwLock<HashMap<String, TopicConfig>>,
    /// Subscriptions storage, including their message queues.
    subscriptions: RwLock<HashMap<String, SubscriptionData>>,
    /// Wakes idle receive workers when messages become available.
    available: Notify,
}

/// Per-subscription state.
struct SubscriptionData {
    /// Subscription configuration.
    config: SubscriptionConfig,
    /// Messages ready for delivery.
    available_messages: VecDeque<Message>,
    /// Messages delivered and awaiting a decision, keyed by ack ID.
    in_flight_messages: HashMap<String, InFlightMessage>,
}

/// In-flight message with its deadline.
struct InFlightMessage {
    /// The message.
    message: Message,
    /// When the ack deadline expires.
    ack_expires_at: DateTime<Utc>,
}

impl SubscriptionData {
    /// Return messages whose ack deadline passed to the available queue.
    fn requeue_expired(&mut self, now: DateTime<Utc>) -> usize {
        let expired_ack_ids: Vec<String> = self
            .in_flight_messages
            .iter()
            .filter(|(_, m)| m.ack_expires_at <= now)
            .map(|(ack_id, _)| ack_id.clone())
            .collect();

        let count = expired_ack_ids.len();
        for ack_id in expired_ack_ids {
            if let Some(in_flight) = self.in_flight_messages.remove(&ack_id) {
                self.available_messages.push_back(in_flight.message);
            }
        }

        if count > 0 {
            debug!(
                subscription = %self.config.name,
                count = count,
                "Returned expired in-flight messages to available queue"
            );
        }

        count
    }
}

impl InMemoryBackend {
    /// Create a new, empty in-memory backend.
    pub fn new() -> Self {
        info!("Initializing in-memory backend");

        Self {
            inner: Arc::new(InMemoryBackendInner {
                topics: RwLock::new(HashMap::new()),
                subscriptions: RwLock::new(HashMap::new()),
                available: Notify::new(),
            }),
        }
    }

    /// Acknowledge a delivery by ack ID.
    pub async fn acknowledge(&self, subscription: &str, ack_id: &str) -> Result<()> {
        let data = parse_ack_id(ack_id)?;
        if data.subscription != subscription {
            return Err(Error::InvalidAckId);
        }

        let mut subscriptions = self.inner.subscriptions.write().await;
        let sub = subscriptions
            .get_mut(subscription)
            .ok_or_else(|| Error::SubscriptionNotFound(subscription.to_string()))?;

        sub.in_flight_messages
            .remove(ack_id)
            .ok_or(Error::InvalidAckId)?;

        debug!(subscription = %subscription, message_id = %data.message_id, "Message acknowledged");
        Ok(())
    }

    /// Negatively acknowledge a delivery; the message is immediately redeliverable.
    pub async fn nack(&self, subscription: &str, ack_id: &str) -> Result<()> {
        let data = parse_ack_id(ack_id)?;
        if data.subscription != subscription {
            return Err(Error::InvalidAckId);
        }

        {
            let mut subscriptions = self.inner.subscriptions.write().await;
            let sub = subscriptions
                .get_mut(subscription)
                .ok_or_else(|| Error::SubscriptionNotFound(subscription.to_string()))?;

            let in_flight = sub
                .in_flight_messages
                .remove(ack_id)
                .ok_or(Error::InvalidAckId)?;

            sub.available_messages.push_front(in_flight.message);
        }

        self.inner.available.notify_waiters();
        debug!(subscription = %subscription, message_id = %data.message_id, "Message nacked");
        Ok(())
    }

    /// Number of messages waiting for delivery on a subscription.
    pub async fn pending_count(&self, subscription: &str) -> Result<usize> {
        let subscriptions = self.inner.subscriptions.read().await;
        subscriptions
            .get(subscription)
            .map(|s| s.available_messages.len())
            .ok_or_else(|| Error::SubscriptionNotFound(subscription.to_string()))
    }

    /// Number of delivered messages awaiting a decision on a subscription.
    pub async fn in_flight_count(&self, subscription: &str) -> Result<usize> {
        let subscriptions = self.inner.subscriptions.read().await;
        subscriptions
            .get(subscription)
            .map(|s| s.in_flight_messages.len())
            .ok_or_else(|| Error::SubscriptionNotFound(subscription.to_string()))
    }

    /// Pull loop run by one streaming worker.
    async fn run_worker(
        self,
        id: usize,
        subscription: String,
        handler: DeliveryHandler,
        options: ReceiveOptions,
        cancel: CancellationToken,
    ) -> Result<()> {
        debug!(worker = id, subscription = %subscription, "Receive worker started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let batch = self.pull(&subscription, options.max_messages).await?;

            if batch.is_empty() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.inner.available.notified() => {}
                    _ = tokio::time::sleep(options.poll_interval) => {}
                }
                continue;
            }

            for delivery in batch {
                if cancel.is_cancelled() {
                    // Hand undelivered messages straight back.
                    if let Err(e) = delivery.nack().await {
                        warn!(worker = id, error = %e, "Failed to return message on shutdown");
                    }
                    continue;
                }
                handler(delivery).await;
            }
        }

        debug!(worker = id, subscription = %subscription, "Receive worker stopped");
        Ok(())
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Ack reply bound to one in-memory delivery.
struct MemoryAckReply {
    backend: InMemoryBackend,
    subscription: String,
    ack_id: String,
}

#[async_trait]
impl AckReply for MemoryAckReply {
    async fn ack(self: Box<Self>) -> Result<()> {
        self.backend.acknowledge(&self.subscription, &self.ack_id).await
    }

    async fn nack(self: Box<Self>) -> Result<()> {
        self.backend.nack(&self.subscription, &self.ack_id).await
    }
}

#[async_trait]
impl MessagingBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_topic(&self, name: &str) -> Result<Option<TopicConfig>> {
        let topics = self.inner.topics.read().await;
        Ok(topics.get(name).cloned())
    }

    async fn create_topic(&self, config: TopicConfig) -> Result<TopicConfig> {
        debug!(topic = %config.name, "Creating topic");

        let mut topics = self.inner.topics.write().await;

        if topics.contains_key(&config.name) {
            return Err(Error::AlreadyExists(config.name.clone()));
        }

        topics.insert(config.name.clone(), config.clone());

        info!(topic = %config.name, "Topic created");
        Ok(config)
    }

    async fn get_subscription(&self, name: &str) -> Result<Option<SubscriptionConfig>> {
        let subscriptions = self.inner.subscriptions.read().await;
        Ok(subscriptions.get(name).map(|s| s.config.clone()))
    }

    async fn create_subscription(&self, config: SubscriptionConfig) -> Result<SubscriptionConfig> {
        debug!(subscription = %config.name, topic = %config.topic, "Creating subscription");

        let topics = self.inner.topics.read().await;
        if !topics.contains_key(&config.topic) {
            return Err(Error::TopicNotFound(config.topic.clone()));
        }

        let mut subscriptions = self.inner.subscriptions.write().await;

        if subscriptions.contains_key(&config.name) {
            return Err(Error::AlreadyExists(config.name.clone()));
        }

        subscriptions.insert(
            config.name.clone(),
            SubscriptionData {
                config: config.clone(),
                available_messages: VecDeque::new(),
                in_flight_messages: HashMap::new(),
            },
        );

        info!(subscription = %config.name, topic = %config.topic, "Subscription created");
        Ok(config)
    }

    async fn publish(&self, topic: &str, message: OutgoingMessage) -> Result<MessageId> {
        let topics = self.inner.topics.read().await;
        if !topics.contains_key(topic) {
            return Err(Error::TopicNotFound(topic.to_string()));
        }

        let stored = Message {
            id: MessageId::new(),
            data: message.data,
            attributes: message.attributes,
            publish_time: Utc::now(),
            delivery_attempt: 0,
        };

        let mut fanned_out = 0usize;
        {
            let mut subscriptions = self.inner.subscriptions.write().await;
            for sub in subscriptions.values_mut().filter(|s| s.config.topic == topic) {
                sub.available_messages.push_back(stored.clone());
                fanned_out += 1;
            }
        }

        self.inner.available.notify_waiters();

        debug!(
            topic = %topic,
            message_id = %stored.id,
            subscriptions = fanned_out,
            "Message published"
        );

        Ok(stored.id)
    }

    async fn pull(&self, subscription: &str, max_messages: u32) -> Result<Vec<Delivery>> {
        let mut subscriptions = self.inner.subscriptions.write().await;
        let sub = subscriptions
            .get_mut(subscription)
            .ok_or_else(|| Error::SubscriptionNotFound(subscription.to_string()))?;

        let now = Utc::now();
        sub.requeue_expired(now);

        let ack_expires_at = now + Duration::seconds(sub.config.ack_deadline_seconds as i64);
        let max = max_messages.max(1) as usize;
        let mut deliveries = Vec::with_capacity(max.min(sub.available_messages.len()));

        while deliveries.len() < max {
            let Some(mut message) = sub.available_messages.pop_front() else {
                break;
            };

            message.delivery_attempt += 1;
            let ack_id = generate_ack_id(subscription, &message.id)?;

            sub.in_flight_messages.insert(
                ack_id.clone(),
                InFlightMessage {
                    message: message.clone(),
                    ack_expires_at,
                },
            );

            deliveries.push(Delivery::new(
                message,
                Box::new(MemoryAckReply {
                    backend: self.clone(),
                    subscription: subscription.to_string(),
                    ack_id,
                }),
            ));
        }

        debug!(subscription = %subscription, count = deliveries.len(), "Messages pulled");
        Ok(deliveries)
    }

    async fn receive(
        &self,
        subscription: &str,
        handler: DeliveryHandler,
        options: ReceiveOptions,
        cancel: CancellationToken,
    ) -> Result<()> {
        if self.get_subscription(subscription).await?.is_none() {
            return Err(Error::SubscriptionNotFound(subscription.to_string()));
        }

        let worker_count = options.worker_count.max(1);
        info!(
            subscription = %subscription,
            workers = worker_count,
            "Starting in-memory receive"
        );

        // Stops sibling workers if one of them fails, without cancelling the caller's token.
        let stop = cancel.child_token();
        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            workers.spawn(self.clone().run_worker(
                id,
                subscription.to_string(),
                handler.clone(),
                options.clone(),
                stop.clone(),
            ));
        }

        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            let outcome = joined.map_err(|e| Error::Internal(format!("Receive worker failed: {}", e)));
            if let Err(e) = outcome.and_then(|r| r) {
                error!(subscription = %subscription, error = %e, "Receive worker error");
                stop.cancel();
                first_error.get_or_insert(e);
            }
        }

        info!(subscription = %subscription, "In-memory receive stopped");
        first_error.map_or(Ok(()), Err)
    }
}
