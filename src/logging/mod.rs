//! Tracing subscriber setup.
//!
//! Logs go to stderr so that command output on stdout (tables, JSON, the
//! Prometheus dump) stays machine-readable.

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};
use crate::{Error, Result};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.level` when set. Fails if the
/// level is not a valid filter directive or a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_filter(&config.level)?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(build_layer(config.format, std::io::stderr))
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

fn build_layer<S, W>(format: LogFormat, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_current_span(false)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_target(false)
            .compact()
            .boxed(),
    }
}

fn build_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| Error::Config(format!("Invalid log level {}: {}", level, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_filter_accepts_directives() {
        if std::env::var("RUST_LOG").is_err() {
            assert!(build_filter("info").is_ok());
            assert!(build_filter("pubsub_facade=debug,warn").is_ok());
        }
    }

    #[test]
    fn test_layer_writes_to_given_writer() {
        for format in [LogFormat::Json, LogFormat::Text] {
            let captured = Captured::default();
            let sink = captured.clone();
            let subscriber = tracing_subscriber::registry().with(build_layer(format, move || sink.clone()));

            tracing::subscriber::with_default(subscriber, || {
                tracing::info!(subscription = "orders-sub", "Pulling messages");
            });

            let out = captured.contents();
            assert!(out.contains("Pulling messages"), "{format:?} output: {out}");
            assert!(out.contains("orders-sub"));
        }
    }
}
