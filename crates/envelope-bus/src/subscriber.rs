//! # Subscriber
//!
//! Pulls deliveries off the shared queue. Each [`Delivery`] is settled
//! exactly once, either explicitly or by being dropped.

use crate::errors::BusError;
use crate::message::{MessageId, Metadata, PubsubMessage};
use crate::publisher::{BusState, Pending};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::debug;

/// A handle for receiving deliveries.
#[derive(Clone)]
pub struct Subscription {
    state: Arc<BusState>,
}

impl Subscription {
    pub(crate) fn new(state: Arc<BusState>) -> Self {
        Self { state }
    }

    /// Wait for the next delivery.
    ///
    /// # Returns
    ///
    /// - `Some(delivery)` - The next queued message
    /// - `None` - The bus was closed and the queue is drained
    pub async fn recv(&self) -> Option<Delivery> {
        let pending = self.state.receiver.lock().await.recv().await?;
        Some(self.deliver(pending))
    }

    /// Take the next delivery without waiting.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(delivery))` - A message was queued
    /// - `Ok(None)` - Nothing queued, or another handle is receiving
    /// - `Err(BusError::Closed)` - The bus was closed and the queue is drained
    pub fn try_recv(&self) -> Result<Option<Delivery>, BusError> {
        let Ok(mut receiver) = self.state.receiver.try_lock() else {
            return Ok(None);
        };
        match receiver.try_recv() {
            Ok(pending) => Ok(Some(self.deliver(pending))),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(BusError::Closed),
        }
    }

    fn deliver(&self, pending: Pending) -> Delivery {
        self.state.record_delivery();
        let attempt = pending.attempts + 1;
        debug!(message_id = %pending.message.id, attempt, "Message delivered");
        Delivery {
            message: pending.message,
            attempt,
            settlement: Settlement::Pending,
            state: self.state.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    Pending,
    Acked,
    Nacked,
}

/// One delivery of a message to a subscriber.
pub struct Delivery {
    message: PubsubMessage,
    attempt: u32,
    settlement: Settlement,
    state: Arc<BusState>,
}

impl Delivery {
    /// Message identifier.
    #[must_use]
    pub fn id(&self) -> MessageId {
        self.message.id
    }

    /// When the bus accepted the message.
    #[must_use]
    pub fn publish_time(&self) -> DateTime<Utc> {
        self.message.publish_time
    }

    /// Payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    /// Metadata map.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.message.metadata
    }

    /// Metadata value for `key`, if present.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.message.attribute(key)
    }

    /// 1 on first delivery, incremented on each redelivery.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The full message.
    #[must_use]
    pub fn message(&self) -> &PubsubMessage {
        &self.message
    }

    /// Acknowledge: the message is done and will not be delivered again.
    pub fn ack(mut self) {
        self.settlement = Settlement::Acked;
    }

    /// Negative acknowledge: the message is redelivered or dead-lettered.
    pub fn nack(mut self) {
        self.settlement = Settlement::Nacked;
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("id", &self.message.id)
            .field("attempt", &self.attempt)
            .field("payload_len", &self.message.payload.len())
            .field("metadata", &self.message.metadata)
            .finish()
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        match self.settlement {
            Settlement::Acked => self.state.ack(self.message.id),
            Settlement::Nacked => self.state.nack(self.message.clone(), self.attempt),
            Settlement::Pending => {
                debug!(message_id = %self.message.id, "Delivery dropped unsettled");
                self.state.nack(self.message.clone(), self.attempt);
            }
        }
    }
}
