//! # Publisher
//!
//! The publishing side of the bus and the shared queue state behind it.

use crate::errors::BusError;
use crate::message::{MessageId, Metadata, PubsubMessage};
use crate::subscriber::Subscription;
use crate::{DEFAULT_MAX_DELIVERY_ATTEMPTS, DEFAULT_MAX_MESSAGE_BYTES};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Anything that can carry a payload and its metadata to subscribers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a message.
    ///
    /// # Returns
    ///
    /// The identifier the transport assigned to the message.
    async fn publish(&self, payload: Vec<u8>, metadata: Metadata) -> Result<MessageId, BusError>;
}

/// Bus tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Deliveries before a message is dead-lettered.
    pub max_delivery_attempts: u32,
    /// Largest accepted payload plus metadata, in bytes.
    pub max_message_bytes: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_delivery_attempts: DEFAULT_MAX_DELIVERY_ATTEMPTS,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

/// Snapshot of the bus counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    /// Messages accepted by `publish`.
    pub published: u64,
    /// Deliveries handed to subscribers, including redeliveries.
    pub delivered: u64,
    /// Deliveries acknowledged.
    pub acked: u64,
    /// Deliveries negatively acknowledged or dropped unsettled.
    pub nacked: u64,
    /// Nacked messages queued again.
    pub redelivered: u64,
    /// Messages moved to the dead-letter queue.
    pub dead_lettered: u64,
}

/// A queued message and how many times it has been delivered so far.
pub(crate) struct Pending {
    pub(crate) message: PubsubMessage,
    pub(crate) attempts: u32,
}

/// State shared by the bus handle, its subscriptions and outstanding deliveries.
pub(crate) struct BusState {
    config: BusConfig,
    sender: Mutex<Option<mpsc::UnboundedSender<Pending>>>,
    pub(crate) receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Pending>>,
    dead_letters: Mutex<Vec<PubsubMessage>>,
    published: AtomicU64,
    delivered: AtomicU64,
    acked: AtomicU64,
    nacked: AtomicU64,
    redelivered: AtomicU64,
    dead_lettered: AtomicU64,
}

impl BusState {
    pub(crate) fn record_delivery(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn ack(&self, id: MessageId) {
        self.acked.fetch_add(1, Ordering::Relaxed);
        debug!(message_id = %id, "Message acknowledged");
    }

    /// Requeue `message`, or dead-letter it once attempts are exhausted or
    /// the bus is closed.
    pub(crate) fn nack(&self, message: PubsubMessage, attempts: u32) {
        self.nacked.fetch_add(1, Ordering::Relaxed);
        let id = message.id;

        if attempts < self.config.max_delivery_attempts {
            let sender = self.sender.lock().clone();
            if let Some(sender) = sender {
                match sender.send(Pending { message, attempts }) {
                    Ok(()) => {
                        self.redelivered.fetch_add(1, Ordering::Relaxed);
                        debug!(message_id = %id, attempts, "Message queued for redelivery");
                        return;
                    }
                    Err(mpsc::error::SendError(pending)) => {
                        self.dead_letter(pending.message, attempts);
                        return;
                    }
                }
            }
        }
        self.dead_letter(message, attempts);
    }

    fn dead_letter(&self, message: PubsubMessage, attempts: u32) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
        warn!(message_id = %message.id, attempts, "Message moved to dead-letter queue");
        self.dead_letters.lock().push(message);
    }
}

/// In-memory bus with a single subscription queue.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct InMemoryPubSub {
    state: Arc<BusState>,
}

impl InMemoryPubSub {
    /// Create a bus with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus with explicit settings.
    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(BusState {
                config,
                sender: Mutex::new(Some(sender)),
                receiver: tokio::sync::Mutex::new(receiver),
                dead_letters: Mutex::new(Vec::new()),
                published: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                acked: AtomicU64::new(0),
                nacked: AtomicU64::new(0),
                redelivered: AtomicU64::new(0),
                dead_lettered: AtomicU64::new(0),
            }),
        }
    }

    /// Open a handle on the subscription queue.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription::new(self.state.clone())
    }

    /// Stop accepting messages.
    ///
    /// Subscriptions drain what is already queued and then observe the end
    /// of the stream. Deliveries nacked after this point are dead-lettered.
    pub fn close(&self) {
        if self.state.sender.lock().take().is_some() {
            debug!("Bus closed");
        }
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.sender.lock().is_none()
    }

    /// Messages that exhausted their delivery attempts.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<PubsubMessage> {
        self.state.dead_letters.lock().clone()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        let s = &self.state;
        BusStats {
            published: s.published.load(Ordering::Relaxed),
            delivered: s.delivered.load(Ordering::Relaxed),
            acked: s.acked.load(Ordering::Relaxed),
            nacked: s.nacked.load(Ordering::Relaxed),
            redelivered: s.redelivered.load(Ordering::Relaxed),
            dead_lettered: s.dead_lettered.load(Ordering::Relaxed),
        }
    }

    /// The settings this bus was built with.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.state.config
    }
}

impl Default for InMemoryPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryPubSub {
    async fn publish(&self, payload: Vec<u8>, metadata: Metadata) -> Result<MessageId, BusError> {
        let size = payload.len()
            + metadata
                .iter()
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>();
        let max = self.state.config.max_message_bytes;
        if size > max {
            warn!(size, max, "Message rejected (too large)");
            return Err(BusError::MessageTooLarge { size, max });
        }

        let message = PubsubMessage::new(payload, metadata);
        let id = message.id;

        let sender = self.state.sender.lock().clone().ok_or(BusError::Closed)?;
        sender
            .send(Pending {
                message,
                attempts: 0,
            })
            .map_err(|_| BusError::Closed)?;

        self.state.published.fetch_add(1, Ordering::Relaxed);
        debug!(message_id = %id, size, "Message published");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_assigns_ids() {
        let bus = InMemoryPubSub::new();
        let a = bus.publish(b"a".to_vec(), Metadata::new()).await.unwrap();
        let b = bus.publish(b"b".to_vec(), Metadata::new()).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(bus.stats().published, 2);
    }

    #[tokio::test]
    async fn test_publish_after_close() {
        let bus = InMemoryPubSub::new();
        bus.close();

        assert!(bus.is_closed());
        let result = bus.publish(b"late".to_vec(), Metadata::new()).await;
        assert_eq!(result, Err(BusError::Closed));
        assert_eq!(bus.stats().published, 0);
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let bus = InMemoryPubSub::with_config(BusConfig {
            max_message_bytes: 8,
            ..BusConfig::default()
        });
        let mut metadata = Metadata::new();
        metadata.insert("k".into(), "v".into());

        assert!(bus.publish(b"123456".to_vec(), metadata.clone()).await.is_ok());
        assert_eq!(
            bus.publish(b"1234567".to_vec(), metadata).await,
            Err(BusError::MessageTooLarge { size: 9, max: 8 })
        );
    }

    #[test]
    fn test_default_bus() {
        let bus = InMemoryPubSub::default();
        assert_eq!(bus.config().max_delivery_attempts, DEFAULT_MAX_DELIVERY_ATTEMPTS);
        assert_eq!(bus.stats(), BusStats::default());
        assert!(bus.dead_letters().is_empty());
        assert!(!bus.is_closed());
    }
}
