//! # Key Rotation
//!
//! When a publisher retires its current session key. Either bound alone
//! triggers rotation; with neither set a key lives for the process lifetime.

use crate::domain::session_key::SessionKey;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default key lifetime, matching the receiver cache TTL.
pub const DEFAULT_ROTATION_AGE: Duration = Duration::from_secs(20);

/// Bounds on how long one session key is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationPolicy {
    /// Rotate after this many messages.
    pub max_messages: Option<u64>,
    /// Rotate once the key is this old.
    pub max_age: Option<Duration>,
}

impl RotationPolicy {
    /// A new key for every message.
    pub const fn every_message() -> Self {
        Self {
            max_messages: Some(1),
            max_age: None,
        }
    }

    /// Whether a key used `uses` times and created `age` ago must be retired.
    pub fn is_due(&self, uses: u64, age: Duration) -> bool {
        self.max_messages.is_some_and(|max| uses >= max)
            || self.max_age.is_some_and(|max| age >= max)
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_messages: None,
            max_age: Some(DEFAULT_ROTATION_AGE),
        }
    }
}

/// The session key a publisher is currently using, with its wrapped form.
#[derive(Clone, Debug)]
pub struct ActiveKey {
    /// Usable key.
    pub key: SessionKey,
    /// Wrapped form attached to each message.
    pub wrapped: Arc<[u8]>,
    created: Instant,
    uses: u64,
}

impl ActiveKey {
    /// Freshly generated and wrapped key.
    pub fn new(key: SessionKey, wrapped: Vec<u8>) -> Self {
        Self {
            key,
            wrapped: wrapped.into(),
            created: Instant::now(),
            uses: 0,
        }
    }

    /// Whether `policy` retires this key now.
    pub fn is_due(&self, policy: &RotationPolicy) -> bool {
        policy.is_due(self.uses, self.created.elapsed())
    }

    /// Count one more message under this key.
    pub fn record_use(&mut self) {
        self.uses += 1;
    }

    /// Messages protected so far.
    pub fn uses(&self) -> u64 {
        self.uses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envelope_crypto::{Algorithm, AlgorithmRegistry};

    #[test]
    fn test_message_bound() {
        let policy = RotationPolicy {
            max_messages: Some(3),
            max_age: None,
        };
        assert!(!policy.is_due(2, Duration::from_secs(3600)));
        assert!(policy.is_due(3, Duration::ZERO));
    }

    #[test]
    fn test_age_bound() {
        let policy = RotationPolicy::default();
        assert!(!policy.is_due(1_000_000, Duration::from_secs(19)));
        assert!(policy.is_due(0, Duration::from_secs(20)));
    }

    #[test]
    fn test_unbounded_never_due() {
        let policy = RotationPolicy {
            max_messages: None,
            max_age: None,
        };
        assert!(!policy.is_due(u64::MAX, Duration::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_key_ages() {
        let key = SessionKey::generate(&AlgorithmRegistry::init(), Algorithm::Aes256Gcm).unwrap();
        let mut active = ActiveKey::new(key, vec![1, 2, 3]);
        let policy = RotationPolicy::default();

        active.record_use();
        assert_eq!(active.uses(), 1);
        assert!(!active.is_due(&policy));
        tokio::time::advance(DEFAULT_ROTATION_AGE).await;
        assert!(active.is_due(&policy));
        assert!(active.is_due(&RotationPolicy::every_message()));
    }
}
