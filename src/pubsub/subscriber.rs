//! Subscription provisioning and message consumption.
//!
//! Two consumption models share the same settle rule: a callback that returns
//! `Ok(())` gets its message acked, anything else (an error or a panic) gets it
//! nacked. The failure is logged and counted, and consumption carries on.
//!
//! Streaming receive nacks a failed message right away. A pull run holds on to
//! failed deliveries and nacks them once the run is over, so a message that
//! keeps failing cannot crowd the rest of the backlog out of later batches.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{delivery_handler, AckReply, Delivery};
use crate::metrics::{ConsumeMode, Metrics};
use crate::pubsub::{cancellable, PubSub, ResourceName, Subscription, Topic};
use crate::types::validation::validate_ack_deadline;
use crate::types::{Message, MessageId, ReceiveOptions, SubscriptionConfig};
use crate::{Error, Result};

/// Outcome of one [`PubSub::pull_messages`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullSummary {
    /// Messages handed to the callback.
    pub delivered: usize,
    /// Messages acknowledged.
    pub acked: usize,
    /// Messages negatively acknowledged: failed ones returned when the run
    /// ends, plus deliveries handed back untouched after cancellation.
    pub nacked: usize,
    /// IDs of messages whose callback failed.
    pub failed: Vec<MessageId>,
}

/// How a delivery ended up being settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Acked,
    Nacked,
    /// The ack or nack call itself failed; the backend redelivers after the deadline.
    Unsettled,
}

/// Run `callback` on one message.
///
/// An error returned by the callback, a panic while building its future and a
/// panic while polling it all come back as [`Error::Callback`], already logged
/// and counted.
async fn invoke<F, Fut>(
    subscription: &str,
    mode: ConsumeMode,
    metrics: Option<&Metrics>,
    message: Message,
    callback: F,
) -> Result<()>
where
    F: FnOnce(Message) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let message_id = message.id.clone();

    if let Some(metrics) = metrics {
        metrics.record_delivery(subscription, mode);
    }
    debug!(
        subscription = %subscription,
        message_id = %message_id,
        delivery_attempt = message.delivery_attempt,
        "Delivering message"
    );

    let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| callback(message))) {
        Ok(fut) => match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(panicked(payload)),
        },
        Err(payload) => Err(panicked(payload)),
    };

    outcome.map_err(|e| {
        let err = Error::Callback {
            message_id: message_id.to_string(),
            reason: format!("{:#}", e),
        };
        warn!(subscription = %subscription, error = %err, "Message processing failed");
        if let Some(metrics) = metrics {
            metrics.record_callback_failure(subscription);
        }
        err
    })
}

fn panicked(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match detail {
        Some(detail) => anyhow::anyhow!("callback panicked: {}", detail),
        None => anyhow::anyhow!("callback panicked"),
    }
}

async fn ack(subscription: &str, metrics: Option<&Metrics>, message_id: &MessageId, reply: Box<dyn AckReply>) -> Settled {
    match reply.ack().await {
        Ok(()) => {
            if let Some(metrics) = metrics {
                metrics.record_ack(subscription);
            }
            Settled::Acked
        }
        Err(e) => {
            warn!(subscription = %subscription, message_id = %message_id, error = %e, "Ack failed");
            Settled::Unsettled
        }
    }
}

async fn nack(subscription: &str, metrics: Option<&Metrics>, message_id: &MessageId, reply: Box<dyn AckReply>) -> Settled {
    match reply.nack().await {
        Ok(()) => {
            if let Some(metrics) = metrics {
                metrics.record_nack(subscription);
            }
            Settled::Nacked
        }
        Err(e) => {
            warn!(subscription = %subscription, message_id = %message_id, error = %e, "Nack failed");
            Settled::Unsettled
        }
    }
}

impl PubSub {
    /// Make sure a subscription bound to `topic` exists, creating it with the
    /// client's default ack deadline if needed.
    pub async fn ensure_subscription(
        &self,
        topic: &Topic,
        subscription_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Subscription> {
        self.ensure_subscription_with_deadline(topic, subscription_name, self.default_ack_deadline(), cancel)
            .await
    }

    /// Make sure a subscription exists, creating it with `ack_deadline` if needed.
    ///
    /// An existing subscription is returned as-is, with whatever topic binding
    /// and deadline it already has. Creating one for a topic that does not
    /// exist fails with [`Error::TopicNotFound`], the backend-failure kind
    /// for a missing topic.
    pub async fn ensure_subscription_with_deadline(
        &self,
        topic: &Topic,
        subscription_name: &str,
        ack_deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<Subscription> {
        let ack_deadline_seconds = u32::try_from(ack_deadline.as_secs()).unwrap_or(u32::MAX);
        validate_ack_deadline(ack_deadline_seconds)?;

        let resource = ResourceName::resolve_subscription(&self.project, subscription_name)?;
        let name = resource.to_string();

        if let Some(existing) = self.lookup_subscription(&name, cancel).await? {
            info!(subscription = %name, "Subscription already exists");
            if existing.topic != topic.name() {
                warn!(
                    subscription = %name,
                    bound_topic = %existing.topic,
                    requested_topic = %topic.name(),
                    "Existing subscription is bound to a different topic"
                );
            }
            self.record_provisioning("subscription", false);
            return Ok(Subscription::from_config(&resource, &existing));
        }

        info!(subscription = %name, topic = %topic.name(), "Creating subscription");
        let config = SubscriptionConfig {
            name: name.clone(),
            topic: topic.name().to_string(),
            ack_deadline_seconds,
        };

        let created = match cancellable(cancel, "subscription creation", self.backend.create_subscription(config))
            .await
        {
            Ok(created) => {
                info!(subscription = %name, "Subscription created");
                self.record_provisioning("subscription", true);
                created
            }
            Err(Error::AlreadyExists(_)) => {
                debug!(subscription = %name, "Subscription created concurrently");
                self.record_provisioning("subscription", false);
                self.lookup_subscription(&name, cancel).await?.ok_or_else(|| {
                    Error::Backend(format!("Subscription {} vanished after creation", name))
                })?
            }
            Err(e) => return Err(self.backend_failure("create_subscription", e)),
        };

        Ok(Subscription::from_config(&resource, &created))
    }

    async fn lookup_subscription(&self, name: &str, cancel: &CancellationToken) -> Result<Option<SubscriptionConfig>> {
        cancellable(cancel, "subscription lookup", self.backend.get_subscription(name))
            .await
            .map_err(|e| self.backend_failure("get_subscription", e))
    }

    /// Pull and process messages until the subscription has nothing new.
    ///
    /// Batches are pulled one at a time and each message is handed to
    /// `callback` in order. Successful messages are acked immediately. Failed
    /// ones stay leased until the run ends and are nacked then, so every pull
    /// in between only returns messages the run has not tried yet. The loop
    /// ends when a pull comes back empty or when `cancel` fires; deliveries
    /// still undecided at that point are nacked.
    pub async fn pull_messages<F, Fut>(
        &self,
        subscription_name: &str,
        cancel: &CancellationToken,
        mut callback: F,
    ) -> Result<PullSummary>
    where
        F: FnMut(Message) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let resource = ResourceName::resolve_subscription(&self.project, subscription_name)?;
        let name = resource.to_string();
        let max_messages = self.receive_options.max_messages;
        let metrics = self.metrics.as_deref();

        let mut summary = PullSummary::default();
        let mut held: Vec<(MessageId, Box<dyn AckReply>)> = Vec::new();
        let mut failure = None;

        info!(subscription = %name, max_messages = max_messages, "Pulling messages");

        loop {
            if cancel.is_cancelled() {
                info!(subscription = %name, "Pull cancelled");
                break;
            }

            let batch = match cancellable(cancel, "pull", self.backend.pull(&name, max_messages)).await {
                Ok(batch) => batch,
                Err(Error::Cancelled(_)) => {
                    info!(subscription = %name, "Pull cancelled");
                    break;
                }
                Err(e) => {
                    failure = Some(self.backend_failure("pull", e));
                    break;
                }
            };

            if batch.is_empty() {
                debug!(subscription = %name, "No more messages");
                break;
            }

            for delivery in batch {
                let (message, reply) = delivery.into_parts();
                let message_id = message.id.clone();

                if cancel.is_cancelled() {
                    if nack(&name, metrics, &message_id, reply).await == Settled::Nacked {
                        summary.nacked += 1;
                    }
                    continue;
                }

                // A held message only comes back once its lease ran out; keep the fresh lease.
                if let Some((_, lease)) = held.iter_mut().find(|(id, _)| *id == message_id) {
                    debug!(subscription = %name, message_id = %message_id, "Failed message redelivered");
                    *lease = reply;
                    continue;
                }

                summary.delivered += 1;
                match invoke(&name, ConsumeMode::Pull, metrics, message, &mut callback).await {
                    Ok(()) => {
                        if ack(&name, metrics, &message_id, reply).await == Settled::Acked {
                            summary.acked += 1;
                        }
                    }
                    Err(_) => {
                        summary.failed.push(message_id.clone());
                        held.push((message_id, reply));
                    }
                }
            }
        }

        // Reverse order keeps the backlog's original order for backends that
        // requeue nacked messages at the front.
        for (message_id, reply) in held.into_iter().rev() {
            if nack(&name, metrics, &message_id, reply).await == Settled::Nacked {
                summary.nacked += 1;
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        info!(
            subscription = %name,
            delivered = summary.delivered,
            acked = summary.acked,
            nacked = summary.nacked,
            failed = summary.failed.len(),
            "Pull finished"
        );

        Ok(summary)
    }

    /// Receive messages through the backend's streaming machinery.
    ///
    /// Runs until `cancel` fires or the backend fails. `callback` may run
    /// concurrently for different messages.
    pub async fn receive<F, Fut>(&self, subscription_name: &str, cancel: CancellationToken, callback: F) -> Result<()>
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let options = self.receive_options.clone();
        self.receive_with_options(subscription_name, options, cancel, callback)
            .await
    }

    /// [`PubSub::receive`] with explicit worker and batch settings.
    pub async fn receive_with_options<F, Fut>(
        &self,
        subscription_name: &str,
        options: ReceiveOptions,
        cancel: CancellationToken,
        callback: F,
    ) -> Result<()>
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let resource = ResourceName::resolve_subscription(&self.project, subscription_name)?;
        let name = resource.to_string();

        let callback = Arc::new(callback);
        let metrics = self.metrics.clone();
        let label = name.clone();
        let handler = delivery_handler(move |delivery: Delivery| {
            let callback = callback.clone();
            let metrics = metrics.clone();
            let subscription = label.clone();
            async move {
                let metrics = metrics.as_deref();
                let (message, reply) = delivery.into_parts();
                let message_id = message.id.clone();
                match invoke(&subscription, ConsumeMode::Stream, metrics, message, |message| callback(message)).await {
                    Ok(()) => ack(&subscription, metrics, &message_id, reply).await,
                    Err(_) => nack(&subscription, metrics, &message_id, reply).await,
                };
            }
        });

        info!(subscription = %name, workers = options.worker_count, "Receiving messages");

        if let Some(metrics) = &self.metrics {
            metrics.active_receivers.with_label_values(&[name.as_str()]).inc();
        }
        let result = self.backend.receive(&name, handler, options, cancel).await;
        if let Some(metrics) = &self.metrics {
            metrics.active_receivers.with_label_values(&[name.as_str()]).dec();
        }

        match result {
            Ok(()) => {
                info!(subscription = %name, "Receive stopped");
                Ok(())
            }
            Err(Error::Cancelled(_)) => {
                info!(subscription = %name, "Receive cancelled");
                Ok(())
            }
            Err(e) => Err(self.backend_failure("receive", e)),
        }
    }
}
