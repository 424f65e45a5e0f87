//! # Inbound Ports (Driving Ports / API)
//!
//! What an application calls. Implemented by `EnvelopePublisher` and
//! `EnvelopeSubscriber`.

use crate::domain::errors::EnvelopeError;
use async_trait::async_trait;
use envelope_bus::{MessageId, Metadata};

/// Protect a payload and hand it to the transport.
#[async_trait]
pub trait EnvelopePublisherApi: Send + Sync {
    /// SelectKey, WrapKey, ProtectPayload and Emit for one message.
    ///
    /// # Returns
    /// The transport's message id.
    async fn publish(&self, payload: &[u8]) -> Result<MessageId, EnvelopeError>;
}

/// Recover a protected payload.
#[async_trait]
pub trait EnvelopeSubscriberApi: Send + Sync {
    /// ResolveKey and Unprotect for one received message.
    ///
    /// # Returns
    /// The decrypted payload, or the verified plaintext for signing schemes.
    async fn open(&self, payload: &[u8], metadata: &Metadata) -> Result<Vec<u8>, EnvelopeError>;
}
