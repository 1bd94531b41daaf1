//! # pubsub-facade
//!
//! A thin, safe facade over Google Cloud Pub/Sub.
//!
//! pubsub-facade provisions topics and subscriptions idempotently, publishes
//! messages with optional attributes, and consumes them either through a
//! sequential pull loop or through callback-driven streaming receive. Every
//! delivered message is acked when its callback succeeds and nacked when it
//! fails. An in-memory backend with the same semantics backs local runs and
//! tests.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
/// Command-line interface
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pubsub;
pub mod types;

pub use error::{Error, Result, ValidationError};
pub use pubsub::{ClientOptions, PubSub, PullSummary, Subscription, Topic};
pub use types::{Attributes, Message, MessageId};
