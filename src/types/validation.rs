//! Validation functions for project IDs, resource IDs, messages and ack deadlines.

use crate::error::ValidationError;
use crate::types::{Attributes, OutgoingMessage};
use crate::Result;

/// Pub/Sub maximum message size (10 MB).
pub const PUBSUB_MAX_MESSAGE_SIZE: usize = 10_485_760;

/// Maximum number of attributes per message.
pub const MAX_ATTRIBUTES: usize = 100;

/// Maximum attribute key length in bytes.
pub const MAX_ATTRIBUTE_KEY_BYTES: usize = 256;

/// Maximum attribute value length in bytes.
pub const MAX_ATTRIBUTE_VALUE_BYTES: usize = 1024;

/// Smallest ack deadline the provider accepts, in seconds.
pub const MIN_ACK_DEADLINE_SECONDS: u32 = 10;

/// Largest ack deadline the provider accepts, in seconds.
pub const MAX_ACK_DEADLINE_SECONDS: u32 = 600;

/// Project ID validation.
///
/// Only rejects IDs that cannot be embedded in a resource name: empty ones and
/// ones containing `/` or whitespace. Everything else (short IDs, legacy
/// `domain.com:project` IDs, emulator projects) is left for the backend to judge.
pub fn validate_project_id(project_id: &str) -> Result<()> {
    if project_id.is_empty() {
        return Err(ValidationError::InvalidProjectId("Project ID must not be empty".to_string()).into());
    }

    if let Some(ch) = project_id.chars().find(|ch| *ch == '/' || ch.is_whitespace()) {
        return Err(ValidationError::InvalidProjectId(format!(
            "Project ID contains invalid character: {:?}",
            ch
        ))
        .into());
    }

    Ok(())
}

/// Checks the 3-255 char, starts-with-letter rule shared by topic and subscription IDs.
fn check_resource_id(id: &str) -> std::result::Result<(), String> {
    if id.len() < 3 || id.len() > 255 {
        return Err(format!("must be 3-255 characters, got {}", id.len()));
    }

    if let Some(first) = id.chars().next() {
        if !first.is_ascii_alphabetic() {
            return Err("must start with a letter".to_string());
        }
    }

    if id.starts_with("goog") {
        return Err("must not start with \"goog\"".to_string());
    }

    for ch in id.chars() {
        if !matches!(ch, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '~' | '+' | '%') {
            return Err(format!("contains invalid character: '{}'", ch));
        }
    }

    Ok(())
}

/// Pub/Sub topic ID validation (3-255 chars, must start with letter).
pub fn validate_topic_id(topic_id: &str) -> Result<()> {
    check_resource_id(topic_id)
        .map_err(|reason| ValidationError::InvalidTopicId(format!("Topic ID {}", reason)).into())
}

/// Pub/Sub subscription ID validation (3-255 chars, must start with letter).
pub fn validate_subscription_id(subscription_id: &str) -> Result<()> {
    check_resource_id(subscription_id).map_err(|reason| {
        ValidationError::InvalidSubscriptionId(format!("Subscription ID {}", reason)).into()
    })
}

/// Validate message size against a maximum.
pub fn validate_message_size(size: usize, max_size: usize) -> Result<()> {
    if size > max_size {
        return Err(ValidationError::MessageTooLarge { size, max: max_size }.into());
    }
    Ok(())
}

/// Attribute count, key and value limits.
pub fn validate_attributes(attributes: &Attributes) -> Result<()> {
    if attributes.len() > MAX_ATTRIBUTES {
        return Err(ValidationError::InvalidAttribute(format!(
            "At most {} attributes are allowed, got {}",
            MAX_ATTRIBUTES,
            attributes.len()
        ))
        .into());
    }

    for (key, value) in attributes {
        if key.is_empty() {
            return Err(ValidationError::InvalidAttribute(
                "Attribute keys must not be empty".to_string(),
            )
            .into());
        }
        if key.starts_with("goog") {
            return Err(ValidationError::InvalidAttribute(format!(
                "Attribute key '{}' uses the reserved \"goog\" prefix",
                key
            ))
            .into());
        }
        if key.len() > MAX_ATTRIBUTE_KEY_BYTES {
            return Err(ValidationError::InvalidAttribute(format!(
                "Attribute key exceeds {} bytes",
                MAX_ATTRIBUTE_KEY_BYTES
            ))
            .into());
        }
        if value.len() > MAX_ATTRIBUTE_VALUE_BYTES {
            return Err(ValidationError::InvalidAttribute(format!(
                "Value of attribute '{}' exceeds {} bytes",
                key, MAX_ATTRIBUTE_VALUE_BYTES
            ))
            .into());
        }
    }

    Ok(())
}

/// Validate a message before publishing.
///
/// A message needs a payload or at least one attribute, and must fit in the
/// provider's size limit.
pub fn validate_outgoing_message(message: &OutgoingMessage) -> Result<()> {
    if message.data.is_empty() && message.attributes.is_empty() {
        return Err(ValidationError::InvalidParameter {
            name: "message".to_string(),
            reason: "Message must contain data or at least one attribute".to_string(),
        }
        .into());
    }

    validate_attributes(&message.attributes)?;
    validate_message_size(message.size(), PUBSUB_MAX_MESSAGE_SIZE)
}

/// Ack deadline must be within 10-600 seconds.
pub fn validate_ack_deadline(seconds: u32) -> Result<()> {
    if !(MIN_ACK_DEADLINE_SECONDS..=MAX_ACK_DEADLINE_SECONDS).contains(&seconds) {
        return Err(ValidationError::InvalidParameter {
            name: "ack_deadline_seconds".to_string(),
            reason: format!(
                "must be between {} and {} seconds, got {}",
                MIN_ACK_DEADLINE_SECONDS, MAX_ACK_DEADLINE_SECONDS, seconds
            ),
        }
        .into());
    }
    Ok(())
}
