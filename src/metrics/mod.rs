//! Metrics and monitoring using Prometheus.
//!
//! Metrics live in a process-wide registry and cover the facade's operations:
//!
//! - **Counters**: messages published, delivered, acked, nacked; callback,
//!   publish and backend failures; provisioning outcomes
//! - **Histograms**: publish round-trip latency
//! - **Gauges**: active streaming receivers

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use tracing::error;

/// Global metrics registry
static METRICS_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Global metrics instance
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    let metrics = Metrics::new();
    if let Err(e) = metrics.register(&METRICS_REGISTRY) {
        error!("Failed to register metrics: {}", e);
    }
    Arc::new(metrics)
});

/// Consumption model a delivery came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeMode {
    /// Sequential pull loop.
    Pull,
    /// Streaming receive.
    Stream,
}

impl ConsumeMode {
    fn as_label(self) -> &'static str {
        match self {
            ConsumeMode::Pull => "pull",
            ConsumeMode::Stream => "stream",
        }
    }
}

/// Metrics collector for pubsub-facade
pub struct Metrics {
    /// Messages confirmed by the backend (counter)
    pub messages_published_total: IntCounterVec,
    /// Publishes rejected or left unconfirmed (counter)
    pub publish_failures_total: IntCounterVec,
    /// Messages handed to a callback (counter)
    pub messages_delivered_total: IntCounterVec,
    /// Messages acknowledged (counter)
    pub messages_acked_total: IntCounterVec,
    /// Messages negatively acknowledged (counter)
    pub messages_nacked_total: IntCounterVec,
    /// Callback failures (counter)
    pub callback_failures_total: IntCounterVec,
    /// ensure_topic / ensure_subscription outcomes (counter)
    pub provisioning_total: IntCounterVec,
    /// Backend call failures (counter)
    pub backend_errors_total: IntCounterVec,

    /// Publish round-trip latency in seconds (histogram)
    pub publish_latency_seconds: HistogramVec,

    /// Streaming receivers currently running (gauge)
    pub active_receivers: IntGaugeVec,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        let messages_published_total = IntCounterVec::new(
            Opts::new(
                "pubsub_facade_messages_published_total",
                "Messages confirmed by the backend",
            ),
            &["topic"],
        )
        .expect("Failed to create messages_published_total metric");

        let publish_failures_total = IntCounterVec::new(
            Opts::new(
                "pubsub_facade_publish_failures_total",
                "Publishes rejected or left unconfirmed",
            ),
            &["topic"],
        )
        .expect("Failed to create publish_failures_total metric");

        let messages_delivered_total = IntCounterVec::new(
            Opts::new(
                "pubsub_facade_messages_delivered_total",
                "Messages handed to a callback",
            ),
            &["subscription", "mode"],
        )
        .expect("Failed to create messages_delivered_total metric");

        let messages_acked_total = IntCounterVec::new(
            Opts::new("pubsub_facade_messages_acked_total", "Messages acknowledged"),
            &["subscription"],
        )
        .expect("Failed to create messages_acked_total metric");

        let messages_nacked_total = IntCounterVec::new(
            Opts::new(
                "pubsub_facade_messages_nacked_total",
                "Messages negatively acknowledged",
            ),
            &["subscription"],
        )
        .expect("Failed to create messages_nacked_total metric");

        let callback_failures_total = IntCounterVec::new(
            Opts::new(
                "pubsub_facade_callback_failures_total",
                "Message callbacks that reported failure",
            ),
            &["subscription"],
        )
        .expect("Failed to create callback_failures_total metric");

        let provisioning_total = IntCounterVec::new(
            Opts::new(
                "pubsub_facade_provisioning_total",
                "Topic and subscription provisioning outcomes",
            ),
            &["resource", "outcome"],
        )
        .expect("Failed to create provisioning_total metric");

        let backend_errors_total = IntCounterVec::new(
            Opts::new("pubsub_facade_backend_errors_total", "Total backend errors"),
            &["backend", "operation"],
        )
        .expect("Failed to create backend_errors_total metric");

        let publish_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "pubsub_facade_publish_latency_seconds",
                "Publish round-trip latency in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["backend"],
        )
        .expect("Failed to create publish_latency_seconds metric");

        let active_receivers = IntGaugeVec::new(
            Opts::new(
                "pubsub_facade_active_receivers",
                "Streaming receivers currently running",
            ),
            &["subscription"],
        )
        .expect("Failed to create active_receivers metric");

        Self {
            messages_published_total,
            publish_failures_total,
            messages_delivered_total,
            messages_acked_total,
            messages_nacked_total,
            callback_failures_total,
            provisioning_total,
            backend_errors_total,
            publish_latency_seconds,
            active_receivers,
        }
    }

    /// Register all metrics with the registry
    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.messages_published_total.clone()))?;
        registry.register(Box::new(self.publish_failures_total.clone()))?;
        registry.register(Box::new(self.messages_delivered_total.clone()))?;
        registry.register(Box::new(self.messages_acked_total.clone()))?;
        registry.register(Box::new(self.messages_nacked_total.clone()))?;
        registry.register(Box::new(self.callback_failures_total.clone()))?;
        registry.register(Box::new(self.provisioning_total.clone()))?;
        registry.register(Box::new(self.backend_errors_total.clone()))?;
        registry.register(Box::new(self.publish_latency_seconds.clone()))?;
        registry.register(Box::new(self.active_receivers.clone()))?;
        Ok(())
    }

    /// Gather metrics in Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = METRICS_REGISTRY.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("Metrics are not valid UTF-8: {}", e)))
    }

    /// Record a confirmed publish and its latency.
    pub fn record_publish(&self, backend: &str, topic: &str, latency_secs: f64) {
        self.messages_published_total.with_label_values(&[topic]).inc();
        self.publish_latency_seconds
            .with_label_values(&[backend])
            .observe(latency_secs);
    }

    /// Record a failed publish.
    pub fn record_publish_failure(&self, topic: &str) {
        self.publish_failures_total.with_label_values(&[topic]).inc();
    }

    /// Record a delivery handed to a callback.
    pub fn record_delivery(&self, subscription: &str, mode: ConsumeMode) {
        self.messages_delivered_total
            .with_label_values(&[subscription, mode.as_label()])
            .inc();
    }

    /// Record an ack.
    pub fn record_ack(&self, subscription: &str) {
        self.messages_acked_total.with_label_values(&[subscription]).inc();
    }

    /// Record a nack.
    pub fn record_nack(&self, subscription: &str) {
        self.messages_nacked_total.with_label_values(&[subscription]).inc();
    }

    /// Record a callback failure.
    pub fn record_callback_failure(&self, subscription: &str) {
        self.callback_failures_total
            .with_label_values(&[subscription])
            .inc();
    }

    /// Record whether ensure_* created a resource or found it.
    pub fn record_provisioning(&self, resource: &str, created: bool) {
        let outcome = if created { "created" } else { "existing" };
        self.provisioning_total
            .with_label_values(&[resource, outcome])
            .inc();
    }

    /// Record a backend failure.
    pub fn record_backend_error(&self, backend: &str, operation: &str) {
        self.backend_errors_total
            .with_label_values(&[backend, operation])
            .inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Gather all registered metrics in Prometheus text format.
pub fn gather() -> Result<String, prometheus::Error> {
    METRICS.gather()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        metrics.record_ack("projects/p/subscriptions/s");
        assert_eq!(
            metrics
                .messages_acked_total
                .with_label_values(&["projects/p/subscriptions/s"])
                .get(),
            1
        );
    }

    #[test]
    fn test_provisioning_outcomes() {
        let metrics = Metrics::new();
        metrics.record_provisioning("topic", true);
        metrics.record_provisioning("topic", false);
        metrics.record_provisioning("topic", false);

        assert_eq!(
            metrics.provisioning_total.with_label_values(&["topic", "created"]).get(),
            1
        );
        assert_eq!(
            metrics.provisioning_total.with_label_values(&["topic", "existing"]).get(),
            2
        );
    }

    #[test]
    fn test_gather_global_metrics() {
        METRICS.record_publish("memory", "projects/p/topics/metrics-test", 0.002);
        METRICS.record_delivery("projects/p/subscriptions/metrics-test", ConsumeMode::Stream);

        let output = gather().unwrap();
        assert!(output.contains("pubsub_facade_messages_published_total"));
        assert!(output.contains("pubsub_facade_publish_latency_seconds"));
        assert!(output.contains("mode=\"stream\""));
    }
}
