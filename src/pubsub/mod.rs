//! Broker facade over a managed Pub/Sub backend.
//!
//! [`PubSub`] holds a live backend client and exposes:
//! - `create_client` / `connect` to build the handle
//! - `ensure_topic` and `ensure_subscription`, idempotent provisioning
//! - `publish` and `publish_with_attributes`, confirmed round-trips
//! - `pull_messages`, a sequential pull loop
//! - `receive`, callback-driven streaming receive
//!
//! Every network operation takes a `CancellationToken`. Callback outcomes
//! decide ack (success) or nack (failure) for each delivered message, and a
//! failing callback never stops the surrounding pull or receive.

pub mod publisher;
pub mod subscriber;
pub mod types;

pub use subscriber::PullSummary;
pub use types::{ResourceName, Subscription, Topic};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::gcp::{GcpBackend, GcpOptions};
use crate::backend::memory::InMemoryBackend;
use crate::backend::MessagingBackend;
use crate::config::{BackendConfig, FacadeConfig};
use crate::metrics::{Metrics, METRICS};
use crate::types::validation::{validate_ack_deadline, validate_project_id};
use crate::types::{ReceiveOptions, DEFAULT_ACK_DEADLINE_SECONDS};
use crate::{Error, Result};

/// Options used when creating a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Which backend to connect to.
    pub backend: BackendConfig,
    /// Ack deadline for subscriptions created without an explicit one.
    pub ack_deadline_seconds: u32,
    /// Defaults for pull and receive.
    pub receive: ReceiveOptions,
    /// Record Prometheus metrics.
    pub metrics_enabled: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            ack_deadline_seconds: DEFAULT_ACK_DEADLINE_SECONDS,
            receive: ReceiveOptions::default(),
            metrics_enabled: true,
        }
    }
}

impl ClientOptions {
    /// Options for the in-memory backend.
    pub fn in_memory() -> Self {
        Self {
            backend: BackendConfig::InMemory,
            ..Self::default()
        }
    }
}

impl From<&FacadeConfig> for ClientOptions {
    fn from(config: &FacadeConfig) -> Self {
        Self {
            backend: config.backend.clone(),
            ack_deadline_seconds: config.subscription.ack_deadline_seconds,
            receive: config.receive.to_options(),
            metrics_enabled: config.metrics.enabled,
        }
    }
}

/// Handle to a messaging backend.
///
/// Cheap to clone; all clones share the same backend client, which is safe
/// for concurrent use by publish, consume and provisioning calls.
#[derive(Clone)]
pub struct PubSub {
    project: String,
    backend: Arc<dyn MessagingBackend>,
    ack_deadline_seconds: u32,
    receive_options: ReceiveOptions,
    metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for PubSub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSub")
            .field("project", &self.project)
            .field("backend", &self.backend.name())
            .field("ack_deadline_seconds", &self.ack_deadline_seconds)
            .field("receive_options", &self.receive_options)
            .finish()
    }
}

impl PubSub {
    /// Initialize a backend client for `project`.
    ///
    /// The project ID is passed through to the backend, which has the final
    /// say on it; only IDs that cannot form a resource name (empty, or holding
    /// `/` or whitespace) are refused locally. Fails with
    /// [`Error::Connection`] for such an ID or when the backend cannot be
    /// initialized.
    pub async fn create_client(project: impl Into<String>, options: ClientOptions) -> Result<Self> {
        let project = project.into();
        validate_project_id(&project)
            .map_err(|e| Error::Connection(format!("Invalid project {}: {}", project, e)))?;
        validate_ack_deadline(options.ack_deadline_seconds)?;

        info!(project = %project, "Creating Pub/Sub client");

        let backend: Arc<dyn MessagingBackend> = match &options.backend {
            BackendConfig::Gcp {
                emulator_host,
                endpoint,
            } => {
                let gcp_options = GcpOptions {
                    emulator_host: emulator_host.clone(),
                    endpoint: endpoint.clone(),
                };
                Arc::new(GcpBackend::connect(&project, gcp_options).await?)
            }
            BackendConfig::InMemory => Arc::new(InMemoryBackend::new()),
        };

        Ok(Self::assemble(project, backend, &options))
    }

    /// Build a handle from loaded configuration.
    pub async fn connect(config: &FacadeConfig) -> Result<Self> {
        config.validate()?;
        Self::create_client(config.project_id.clone(), ClientOptions::from(config)).await
    }

    /// Wrap an already-constructed backend.
    pub fn with_backend(project: impl Into<String>, backend: Arc<dyn MessagingBackend>) -> Result<Self> {
        Self::with_backend_and_options(project, backend, ClientOptions::default())
    }

    /// Wrap an already-constructed backend with explicit options.
    ///
    /// `options.backend` is ignored; the given backend is used instead.
    pub fn with_backend_and_options(
        project: impl Into<String>,
        backend: Arc<dyn MessagingBackend>,
        options: ClientOptions,
    ) -> Result<Self> {
        let project = project.into();
        validate_project_id(&project)
            .map_err(|e| Error::Connection(format!("Invalid project {}: {}", project, e)))?;
        validate_ack_deadline(options.ack_deadline_seconds)?;

        Ok(Self::assemble(project, backend, &options))
    }

    fn assemble(project: String, backend: Arc<dyn MessagingBackend>, options: &ClientOptions) -> Self {
        info!(
            project = %project,
            backend = backend.name(),
            ack_deadline_seconds = options.ack_deadline_seconds,
            "Pub/Sub client ready"
        );

        Self {
            project,
            backend,
            ack_deadline_seconds: options.ack_deadline_seconds,
            receive_options: options.receive.clone(),
            metrics: options.metrics_enabled.then(|| METRICS.clone()),
        }
    }

    /// Project the handle operates in.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// The underlying backend.
    pub fn backend(&self) -> &Arc<dyn MessagingBackend> {
        &self.backend
    }

    /// Ack deadline used by [`PubSub::ensure_subscription`].
    pub fn default_ack_deadline(&self) -> Duration {
        Duration::from_secs(self.ack_deadline_seconds as u64)
    }

    /// Defaults used by pull and receive.
    pub fn receive_options(&self) -> &ReceiveOptions {
        &self.receive_options
    }

    /// Replace the pull and receive defaults.
    pub fn with_receive_options(mut self, options: ReceiveOptions) -> Self {
        self.receive_options = options;
        self
    }

    /// Override the batch size used by pull and receive.
    pub fn with_max_messages(mut self, max_messages: u32) -> Self {
        self.receive_options.max_messages = max_messages.max(1);
        self
    }

    /// Look up a topic handle by name without checking that it exists.
    pub fn topic(&self, topic_name: &str) -> Result<Topic> {
        let resource = ResourceName::resolve_topic(&self.project, topic_name)?;
        Ok(Topic::new(&resource))
    }

    /// Flush and release backend resources.
    pub async fn close(&self) -> Result<()> {
        info!(project = %self.project, "Closing Pub/Sub client");
        self.backend.close().await
    }

    /// Count a backend failure and classify it as a provisioning error.
    fn backend_failure(&self, operation: &str, error: Error) -> Error {
        if !matches!(error, Error::Cancelled(_) | Error::Validation(_)) {
            warn!(operation = operation, error = %error, "Backend call failed");
            if let Some(metrics) = &self.metrics {
                metrics.record_backend_error(self.backend.name(), operation);
            }
        }
        error.into_backend()
    }
}

/// Run `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled(operation.to_string())),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_in_memory_client() {
        let pubsub = PubSub::create_client("test-project", ClientOptions::in_memory())
            .await
            .unwrap();
        assert_eq!(pubsub.project(), "test-project");
        assert_eq!(pubsub.backend().name(), "memory");
        assert_eq!(pubsub.default_ack_deadline(), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_invalid_project_is_connection_error() {
        let result = PubSub::create_client("", ClientOptions::in_memory()).await;
        assert!(matches!(result, Err(Error::Connection(_))));

        let result = PubSub::create_client("Not A Project", ClientOptions::in_memory()).await;
        assert!(matches!(result, Err(Error::Connection(_))));
    }

    #[tokio::test]
    async fn test_backend_decides_unusual_project_ids() {
        let cancel = CancellationToken::new();
        for project in ["test", "example.com:my-project"] {
            let pubsub = PubSub::create_client(project, ClientOptions::in_memory())
                .await
                .unwrap();
            assert_eq!(pubsub.project(), project);

            let topic = pubsub.ensure_topic("orders", &cancel).await.unwrap();
            assert_eq!(topic.name(), format!("projects/{}/topics/orders", project));
            pubsub.publish("orders", "hello", &cancel).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_invalid_default_deadline_rejected() {
        let options = ClientOptions {
            ack_deadline_seconds: 1,
            ..ClientOptions::in_memory()
        };
        let result = PubSub::create_client("test-project", options).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_connect_from_config() {
        let config = FacadeConfig {
            project_id: "config-project".to_string(),
            backend: BackendConfig::InMemory,
            ..FacadeConfig::default()
        };
        let pubsub = PubSub::connect(&config).await.unwrap();
        assert_eq!(pubsub.project(), "config-project");
    }

    #[tokio::test]
    async fn test_topic_lookup_does_not_touch_backend() {
        let pubsub = PubSub::create_client("test-project", ClientOptions::in_memory())
            .await
            .unwrap();
        let topic = pubsub.topic("orders").unwrap();
        assert_eq!(topic.name(), "projects/test-project/topics/orders");
        assert!(pubsub.backend().get_topic(topic.name()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancellable_returns_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<()> = cancellable(&cancel, "publish", std::future::pending()).await;
        assert!(matches!(result, Err(Error::Cancelled(_))));
    }
}
