//! # Algorithm Registry
//!
//! Every primitive in this crate is constructed from an explicit
//! [`AlgorithmRegistry`]. The registry is built once at startup and handed
//! to constructors; nothing is registered as a side effect of linking.

use crate::CryptoError;
use std::collections::BTreeSet;
use std::fmt;

/// Fixed, versioned algorithms understood by this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Algorithm {
    /// AES-256-GCM, 96-bit random nonce, 128-bit tag
    Aes256Gcm,
    /// HMAC-SHA-256 with a 256-bit key and full 256-bit tag
    HmacSha256,
    /// RSA-OAEP, SHA-256 for both digest and MGF1
    RsaOaepSha256,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    RsaPkcs1Sha256,
}

impl Algorithm {
    /// Stable name used in logs and key descriptions.
    pub const fn name(self) -> &'static str {
        match self {
            Algorithm::Aes256Gcm => "AES256_GCM",
            Algorithm::HmacSha256 => "HMAC_SHA256_256BITTAG",
            Algorithm::RsaOaepSha256 => "RSA_OAEP_SHA256",
            Algorithm::RsaPkcs1Sha256 => "RSA_SIGN_PKCS1_SHA256",
        }
    }

    /// Symmetric key length, `None` for asymmetric algorithms.
    pub const fn key_len(self) -> Option<usize> {
        match self {
            Algorithm::Aes256Gcm | Algorithm::HmacSha256 => Some(crate::keys::KEY_LEN),
            Algorithm::RsaOaepSha256 | Algorithm::RsaPkcs1Sha256 => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The set of algorithms a process is willing to use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlgorithmRegistry {
    enabled: BTreeSet<Algorithm>,
}

impl AlgorithmRegistry {
    /// Registry with every algorithm this crate implements.
    #[must_use]
    pub fn init() -> Self {
        Self::with_algorithms([
            Algorithm::Aes256Gcm,
            Algorithm::HmacSha256,
            Algorithm::RsaOaepSha256,
            Algorithm::RsaPkcs1Sha256,
        ])
    }

    /// Registry restricted to the given algorithms.
    #[must_use]
    pub fn with_algorithms(algorithms: impl IntoIterator<Item = Algorithm>) -> Self {
        Self {
            enabled: algorithms.into_iter().collect(),
        }
    }

    /// Whether an algorithm is enabled.
    #[must_use]
    pub fn contains(&self, algorithm: Algorithm) -> bool {
        self.enabled.contains(&algorithm)
    }

    /// Fail with `UnsupportedAlgorithm` unless `algorithm` is enabled.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::UnsupportedAlgorithm` when not registered.
    pub fn ensure(&self, algorithm: Algorithm) -> Result<(), CryptoError> {
        if self.contains(algorithm) {
            Ok(())
        } else {
            Err(CryptoError::UnsupportedAlgorithm(algorithm))
        }
    }

    /// Enabled algorithms in a stable order.
    pub fn algorithms(&self) -> impl Iterator<Item = Algorithm> + '_ {
        self.enabled.iter().copied()
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_enables_everything() {
        let registry = AlgorithmRegistry::init();
        assert_eq!(registry.algorithms().count(), 4);
        assert!(registry.ensure(Algorithm::Aes256Gcm).is_ok());
    }

    #[test]
    fn test_restricted_registry_rejects_missing() {
        let registry = AlgorithmRegistry::with_algorithms([Algorithm::HmacSha256]);
        assert_eq!(
            registry.ensure(Algorithm::Aes256Gcm),
            Err(CryptoError::UnsupportedAlgorithm(Algorithm::Aes256Gcm))
        );
    }

    #[test]
    fn test_symmetric_key_lengths() {
        assert_eq!(Algorithm::Aes256Gcm.key_len(), Some(32));
        assert_eq!(Algorithm::HmacSha256.key_len(), Some(32));
        assert_eq!(Algorithm::RsaOaepSha256.key_len(), None);
    }
}
