//! # Envelope Bus - In-Memory Publish/Subscribe Transport
//!
//! Carries opaque payloads plus string metadata from publishers to a single
//! subscription with at-least-once delivery.
//!
//! ```text
//! ┌──────────────┐  publish()   ┌────────────────┐  recv()   ┌──────────────┐
//! │  Publisher   │ ───────────→ │ InMemoryPubSub │ ────────→ │ Subscription │
//! └──────────────┘              │                │           └──────┬───────┘
//!                               │   redelivery   │ ←── nack() ───────┤
//!                               │  dead letters  │                   │
//!                               └────────────────┘ ←── ack() ────────┘
//! ```
//!
//! ## Delivery Semantics
//!
//! - A [`Delivery`] must be settled with [`Delivery::ack`] or
//!   [`Delivery::nack`]. Dropping it unsettled counts as a nack.
//! - A nacked message is queued again until it has been delivered
//!   `max_delivery_attempts` times, then moved to the dead-letter queue.
//! - Every [`Subscription`] handle pulls from the same queue, so concurrent
//!   consumers compete for messages rather than each seeing every message.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod errors;
pub mod message;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use errors::BusError;
pub use message::{MessageId, Metadata, PubsubMessage};
pub use publisher::{BusConfig, BusStats, InMemoryPubSub, Transport};
pub use subscriber::{Delivery, Subscription};

/// Delivery attempts before a message is dead-lettered.
pub const DEFAULT_MAX_DELIVERY_ATTEMPTS: u32 = 5;

/// Largest payload the bus accepts (10 MiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;
