//! Configuration system for pubsub-facade.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::types::validation::{validate_ack_deadline, validate_project_id};
use crate::types::{ReceiveOptions, DEFAULT_ACK_DEADLINE_SECONDS, DEFAULT_MAX_MESSAGES};
use crate::{Error, Result};

/// Environment variable overriding the project ID.
pub const ENV_PROJECT_ID: &str = "PUBSUB_PROJECT_ID";
/// Environment variable naming a Pub/Sub emulator (`host:port`).
pub const ENV_EMULATOR_HOST: &str = "PUBSUB_EMULATOR_HOST";
/// Environment variable overriding the log level.
pub const ENV_LOG_LEVEL: &str = "PUBSUB_FACADE_LOG_LEVEL";

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacadeConfig {
    /// Project the topics and subscriptions live in.
    pub project_id: String,
    /// Backend configuration.
    pub backend: BackendConfig,
    /// Defaults for new subscriptions.
    pub subscription: SubscriptionDefaults,
    /// Consumption settings.
    pub receive: ReceiveConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BackendConfig {
    /// Google Cloud Pub/Sub, or its emulator.
    Gcp {
        /// Emulator address (`host:port`). Credentials are skipped when set.
        #[serde(default)]
        emulator_host: Option<String>,
        /// Endpoint override for the production service.
        #[serde(default)]
        endpoint: Option<String>,
    },
    /// In-process backend with provider semantics.
    InMemory,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Gcp {
            emulator_host: None,
            endpoint: None,
        }
    }
}

/// Defaults applied when provisioning subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionDefaults {
    /// Ack deadline in seconds (10-600).
    pub ack_deadline_seconds: u32,
}

impl Default for SubscriptionDefaults {
    fn default() -> Self {
        Self {
            ack_deadline_seconds: DEFAULT_ACK_DEADLINE_SECONDS,
        }
    }
}

/// Consumption settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiveConfig {
    /// Concurrent delivery workers; `None` means `num_cpus * 2`.
    pub worker_count: Option<usize>,
    /// Messages requested per pull.
    pub max_messages: u32,
    /// Idle poll interval for the in-memory backend, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            max_messages: DEFAULT_MAX_MESSAGES,
            poll_interval_ms: 100,
        }
    }
}

impl ReceiveConfig {
    /// Resolve into options used by the consumption loops.
    pub fn to_options(&self) -> ReceiveOptions {
        let defaults = ReceiveOptions::default();
        ReceiveOptions {
            max_messages: self.max_messages,
            worker_count: self.worker_count.unwrap_or(defaults.worker_count),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: String,
    /// Log format (text or json).
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Log format enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text format.
    Text,
    /// JSON format.
    Json,
}

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Record Prometheus metrics.
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            project_id: "local-project".to_string(),
            backend: BackendConfig::default(),
            subscription: SubscriptionDefaults::default(),
            receive: ReceiveConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl FacadeConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(project) = lookup(ENV_PROJECT_ID).filter(|v| !v.is_empty()) {
            self.project_id = project;
        }

        if let Some(host) = lookup(ENV_EMULATOR_HOST).filter(|v| !v.is_empty()) {
            match &mut self.backend {
                BackendConfig::Gcp { emulator_host, .. } => *emulator_host = Some(host),
                BackendConfig::InMemory => {}
            }
        }

        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.is_empty()) {
            self.logging.level = level;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validate_project_id(&self.project_id)?;
        validate_ack_deadline(self.subscription.ack_deadline_seconds)?;

        if self.receive.max_messages == 0 {
            return Err(Error::Config("receive.max_messages must be at least 1".to_string()));
        }
        if self.receive.worker_count == Some(0) {
            return Err(Error::Config("receive.worker_count must be at least 1".to_string()));
        }
        if let BackendConfig::Gcp {
            emulator_host: Some(host),
            ..
        } = &self.backend
        {
            if host.trim().is_empty() {
                return Err(Error::Config("backend.emulator_host must not be empty".to_string()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = FacadeConfig::default();
        assert_eq!(config.subscription.ack_deadline_seconds, 20);
        assert_eq!(config.receive.max_messages, 10);
        assert!(matches!(config.backend, BackendConfig::Gcp { .. }));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = FacadeConfig::from_toml_str(
            r#"
            project_id = "orders-project"

            [backend]
            type = "Gcp"
            emulator_host = "localhost:8085"

            [receive]
            worker_count = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.project_id, "orders-project");
        assert_eq!(
            config.backend,
            BackendConfig::Gcp {
                emulator_host: Some("localhost:8085".to_string()),
                endpoint: None,
            }
        );
        assert_eq!(config.receive.worker_count, Some(4));
        assert_eq!(config.receive.max_messages, 10);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_parse_in_memory_backend() {
        let config = FacadeConfig::from_toml_str(
            r#"
            [backend]
            type = "InMemory"

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend, BackendConfig::InMemory);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_invalid_toml() {
        let result = FacadeConfig::from_toml_str("project_id = ");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "project_id = \"file-project\"").unwrap();
        writeln!(file, "[subscription]").unwrap();
        writeln!(file, "ack_deadline_seconds = 45").unwrap();

        let config = FacadeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.project_id, "file-project");
        assert_eq!(config.subscription.ack_deadline_seconds, 45);
    }

    #[test]
    fn test_from_missing_file() {
        let result = FacadeConfig::from_file(Path::new("/nonexistent/pubsub-facade.toml"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_PROJECT_ID, "env-project"),
            (ENV_EMULATOR_HOST, "127.0.0.1:8681"),
            (ENV_LOG_LEVEL, "trace"),
        ]
        .into_iter()
        .collect();

        let mut config = FacadeConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.project_id, "env-project");
        assert_eq!(config.logging.level, "trace");
        assert_eq!(
            config.backend,
            BackendConfig::Gcp {
                emulator_host: Some("127.0.0.1:8681".to_string()),
                endpoint: None,
            }
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = FacadeConfig::default();
        config.subscription.ack_deadline_seconds = 5;
        assert!(config.validate().is_err());

        let mut config = FacadeConfig::default();
        config.receive.worker_count = Some(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = FacadeConfig::default();
        config.project_id = "my project".to_string();
        assert!(matches!(config.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_receive_options() {
        let config = ReceiveConfig {
            worker_count: Some(3),
            max_messages: 5,
            poll_interval_ms: 20,
        };
        let options = config.to_options();
        assert_eq!(options.worker_count, 3);
        assert_eq!(options.max_messages, 5);
        assert_eq!(options.poll_interval, Duration::from_millis(20));
    }
}
