//! Error types for pubsub-facade.

use thiserror::Error;

/// Result type for pubsub-facade operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pubsub-facade.
#[derive(Error, Debug)]
pub enum Error {
    /// Backend client could not be constructed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Existence check, provisioning call or delivery loop failed.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Publish was rejected or could not be confirmed.
    #[error("Publish to {topic} failed: {reason}")]
    Publish {
        /// Fully-qualified topic name.
        topic: String,
        /// Backend reason.
        reason: String,
    },

    /// Caller-supplied callback failed for one message.
    #[error("Callback failed for message {message_id}: {reason}")]
    Callback {
        /// ID of the message being processed.
        message_id: String,
        /// Callback error, rendered.
        reason: String,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Topic not found.
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    /// Subscription not found.
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// Topic or subscription already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Ack ID is malformed, unknown or already decided.
    #[error("Invalid ack ID")]
    InvalidAckId,

    /// Operation was cancelled through its token.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error reports a missing topic or subscription.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::TopicNotFound(_) | Error::SubscriptionNotFound(_))
    }

    /// Whether this is a backend failure: [`Error::Backend`] or one of its
    /// finer kinds, a missing topic or subscription reported by the backend.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Error::Backend(_)) || self.is_not_found()
    }

    /// Re-classify a backend failure as a provisioning error, keeping errors
    /// that already carry a more precise meaning.
    pub(crate) fn into_backend(self) -> Error {
        match self {
            e @ (Error::Validation(_)
            | Error::Cancelled(_)
            | Error::TopicNotFound(_)
            | Error::SubscriptionNotFound(_)
            | Error::Backend(_)) => e,
            other => Error::Backend(other.to_string()),
        }
    }
}

/// Validation error types.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid project ID.
    #[error("Invalid project ID: {0}")]
    InvalidProjectId(String),

    /// Invalid topic ID.
    #[error("Invalid topic ID: {0}")]
    InvalidTopicId(String),

    /// Invalid subscription ID.
    #[error("Invalid subscription ID: {0}")]
    InvalidSubscriptionId(String),

    /// Message too large.
    #[error("Message too large: {size} bytes (max: {max} bytes)")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Invalid attribute.
    #[error("Invalid attribute: {0}")]
    InvalidAttribute(String),

    /// Invalid parameter.
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Reason for invalidity.
        reason: String,
    },
}
