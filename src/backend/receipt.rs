//! Ack ID generation and parsing for the in-memory backend.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::MessageId;
use crate::{Error, Result};

/// Data encoded into an ack ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckIdData {
    /// Fully-qualified subscription name.
    pub subscription: String,
    /// Message ID.
    pub message_id: MessageId,
    /// Nonce, so each delivery of the same message gets a distinct ack ID.
    pub nonce: String,
}

/// Generate an ack ID for one delivery of a message.
pub fn generate_ack_id(subscription: &str, message_id: &MessageId) -> Result<String> {
    let data = AckIdData {
        subscription: subscription.to_string(),
        message_id: message_id.clone(),
        nonce: Uuid::new_v4().to_string(),
    };

    let json = serde_json::to_string(&data)?;
    Ok(STANDARD.encode(json.as_bytes()))
}

/// Parse an ack ID and extract the data.
pub fn parse_ack_id(ack_id: &str) -> Result<AckIdData> {
    let decoded = STANDARD.decode(ack_id).map_err(|_| Error::InvalidAckId)?;

    let json = String::from_utf8(decoded).map_err(|_| Error::InvalidAckId)?;

    serde_json::from_str(&json).map_err(|_| Error::InvalidAckId)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_id_roundtrip() {
        let subscription = "projects/test-project/subscriptions/orders-sub";
        let message_id = MessageId::new();

        let ack_id = generate_ack_id(subscription, &message_id).unwrap();
        let parsed = parse_ack_id(&ack_id).unwrap();

        assert_eq!(parsed.subscription, subscription);
        assert_eq!(parsed.message_id, message_id);
        assert!(!parsed.nonce.is_empty());
    }

    #[test]
    fn test_redelivery_gets_new_ack_id() {
        let message_id = MessageId::new();
        let first = generate_ack_id("sub", &message_id).unwrap();
        let second = generate_ack_id("sub", &message_id).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_parse_invalid_ack_id() {
        assert!(matches!(parse_ack_id("invalid"), Err(Error::InvalidAckId)));
        assert!(matches!(parse_ack_id(""), Err(Error::InvalidAckId)));
    }
}
