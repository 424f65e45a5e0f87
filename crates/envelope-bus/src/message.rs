//! # Bus Messages
//!
//! What a publisher hands to the transport and what a subscriber receives.
//! Payloads are opaque bytes; metadata is a flat string map, so binary
//! values must be base64 encoded by the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// String key/value metadata attached to a message.
pub type Metadata = BTreeMap<String, String>;

/// Transport-assigned message identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A message as stored by the bus and presented to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubsubMessage {
    /// Identifier returned to the publisher.
    pub id: MessageId,
    /// When the bus accepted the message.
    pub publish_time: DateTime<Utc>,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
    /// String metadata.
    pub metadata: Metadata,
}

impl PubsubMessage {
    /// Stamp a payload with a new id and the current time.
    #[must_use]
    pub fn new(payload: Vec<u8>, metadata: Metadata) -> Self {
        Self {
            id: MessageId::new(),
            publish_time: Utc::now(),
            payload,
            metadata,
        }
    }

    /// Metadata value for `key`, if present.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids_unique() {
        assert_ne!(MessageId::new(), MessageId::new());
    }

    #[test]
    fn test_attribute_lookup() {
        let mut metadata = Metadata::new();
        metadata.insert("kms_key".into(), "projects/p/locations/l".into());
        let message = PubsubMessage::new(b"payload".to_vec(), metadata);

        assert_eq!(message.attribute("kms_key"), Some("projects/p/locations/l"));
        assert_eq!(message.attribute("dek_wrapped"), None);
    }

    #[test]
    fn test_message_serializes() {
        let message = PubsubMessage::new(b"abc".to_vec(), Metadata::new());
        let json = serde_json::to_string(&message).unwrap();
        let back: PubsubMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
    }
}
