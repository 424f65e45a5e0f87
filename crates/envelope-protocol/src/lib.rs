//! # Envelope Protocol
//!
//! Envelope encryption and MAC for publish/subscribe messages.
//!
//! ## Architecture
//!
//! This crate follows hexagonal architecture:
//! - **Domain Layer** (`domain/`): metadata codec, schemes, key sources,
//!   rotation policy, key cache, errors
//! - **Ports Layer** (`ports/`): inbound publisher/subscriber API, outbound
//!   KMS and certificate directory
//! - **Adapters** (`adapters/`): in-memory KMS and static certificate directory
//! - **Service Layer** (`service/`): KEK gateway, publisher, subscriber
//!
//! ```text
//! publish(payload)                                    open(payload, metadata)
//!   SelectKey ── WrapKey ── Protect ── Emit ──→ bus ──→ ResolveKey ── Unprotect ── ack/nack
//!                  │                                        │
//!                  └────────── KekGateway / WrapCipher ─────┘
//!                                    (KeyCache on receipt)
//! ```
//!
//! ## Security Notes
//!
//! - The tenant tag is associated data on every KEK wrap and payload AEAD.
//! - A message missing a required field is rejected like a bad signature.
//! - Key material and plaintext are never logged above `trace`.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

// Re-export public API
pub use adapters::directory::StaticCertificateDirectory;
pub use adapters::kms::{InMemoryKms, KmsCallCounts};
pub use config::{EnvelopeConfig, Role};
pub use domain::errors::{ConfigError, EnvelopeError, ErrorKind, RemoteKeyServiceError};
pub use domain::key_cache::{CacheStats, KeyCache, KeyCacheConfig};
pub use domain::key_source::KeySource;
pub use domain::metadata::{fields, EnvelopeHeader, ServiceIdentity};
pub use domain::rotation::RotationPolicy;
pub use domain::scheme::Scheme;
pub use domain::session_key::SessionKey;
pub use ports::inbound::{EnvelopePublisherApi, EnvelopeSubscriberApi};
pub use ports::outbound::{CertificateDirectory, DirectoryError, KmsClient, KmsError};
pub use service::gateway::KekGateway;
pub use service::publisher::EnvelopePublisher;
pub use service::subscriber::{EnvelopeSubscriber, Outcome, SubscriberStats};
pub use service::Collaborators;
