//! # Key Material
//!
//! Fixed-length symmetric keys tagged with the algorithm they were made for.
//! Key bytes are zeroized on drop and never appear in `Debug` output.

use crate::kdf::PasswordKdf;
use crate::registry::Algorithm;
use crate::CryptoError;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::SystemTime;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric key length (AES-256 and HMAC-SHA-256).
pub const KEY_LEN: usize = 32;

/// Secret key bytes bundled with their algorithm and creation time.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    bytes: [u8; KEY_LEN],
    #[zeroize(skip)]
    algorithm: Algorithm,
    #[zeroize(skip)]
    created_at: SystemTime,
}

impl KeyMaterial {
    /// Generate a key from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::KeyGenerationFailed` for asymmetric algorithms.
    pub fn generate(algorithm: Algorithm) -> Result<Self, CryptoError> {
        if algorithm.key_len().is_none() {
            return Err(CryptoError::KeyGenerationFailed(format!(
                "{algorithm} has no symmetric key"
            )));
        }
        let mut bytes = [0u8; KEY_LEN];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
        Ok(Self {
            bytes,
            algorithm,
            created_at: SystemTime::now(),
        })
    }

    /// Import raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` unless `bytes` is exactly 32 bytes.
    pub fn from_bytes(algorithm: Algorithm, bytes: &[u8]) -> Result<Self, CryptoError> {
        let expected = algorithm.key_len().ok_or_else(|| {
            CryptoError::KeyGenerationFailed(format!("{algorithm} has no symmetric key"))
        })?;
        if bytes.len() != expected {
            return Err(CryptoError::InvalidKeyLength {
                expected,
                actual: bytes.len(),
            });
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(bytes);
        Ok(Self {
            bytes: key,
            algorithm,
            created_at: SystemTime::now(),
        })
    }

    /// Derive a key from a password with PBKDF2-HMAC-SHA-256.
    ///
    /// Shorthand for [`PasswordKdf::with_iterations`] followed by
    /// [`PasswordKdf::derive`].
    ///
    /// # Errors
    ///
    /// Returns `WeakKdfParameters` for a short salt or too few iterations.
    pub fn derive_from_password(
        algorithm: Algorithm,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
    ) -> Result<Self, CryptoError> {
        PasswordKdf::with_iterations(salt, iterations)?.derive(password, algorithm)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Algorithm this key belongs to.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// When the key was generated or imported.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Non-secret description suitable for logs.
    pub fn info(&self) -> KeyInfo {
        KeyInfo {
            algorithm: self.algorithm,
            fingerprint: fingerprint(&self.bytes),
        }
    }

    pub(crate) fn expect_algorithm(&self, expected: Algorithm) -> Result<(), CryptoError> {
        if self.algorithm == expected {
            Ok(())
        } else {
            Err(CryptoError::AlgorithmMismatch {
                expected,
                actual: self.algorithm,
            })
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("algorithm", &self.algorithm)
            .field("created_at", &self.created_at)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Algorithm and fingerprint of a key; safe to log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyInfo {
    /// Key algorithm
    pub algorithm: Algorithm,
    /// First 8 bytes of SHA-256 over the key, hex encoded
    pub fingerprint: String,
}

impl fmt::Display for KeyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.fingerprint)
    }
}

fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_differ() {
        let k1 = KeyMaterial::generate(Algorithm::Aes256Gcm).unwrap();
        let k2 = KeyMaterial::generate(Algorithm::Aes256Gcm).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_generate_rejects_asymmetric() {
        assert!(matches!(
            KeyMaterial::generate(Algorithm::RsaOaepSha256),
            Err(CryptoError::KeyGenerationFailed(_))
        ));
    }

    #[test]
    fn test_from_bytes_length_checked() {
        let result = KeyMaterial::from_bytes(Algorithm::HmacSha256, &[7u8; 16]);
        assert_eq!(
            result.unwrap_err(),
            CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16
            }
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = KeyMaterial::from_bytes(Algorithm::Aes256Gcm, &[0xAB; 32]).unwrap();
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.to_lowercase().contains("abab"));
    }

    #[test]
    fn test_info_is_stable_per_key() {
        let key = KeyMaterial::from_bytes(Algorithm::Aes256Gcm, &[1u8; 32]).unwrap();
        let copy = KeyMaterial::from_bytes(Algorithm::Aes256Gcm, &[1u8; 32]).unwrap();
        assert_eq!(key.info(), copy.info());
        assert_eq!(key.info().fingerprint.len(), 16);
    }

    #[test]
    fn test_derive_from_password_matches_kdf() {
        let salt = b"sixteen-byte-salt";
        let direct = KeyMaterial::derive_from_password(Algorithm::HmacSha256, b"pw", salt, 100_000).unwrap();
        let via_kdf = PasswordKdf::with_iterations(salt, 100_000)
            .unwrap()
            .derive(b"pw", Algorithm::HmacSha256)
            .unwrap();
        assert_eq!(direct.as_bytes(), via_kdf.as_bytes());
    }

    #[test]
    fn test_derive_from_password_rejects_few_iterations() {
        assert!(matches!(
            KeyMaterial::derive_from_password(Algorithm::Aes256Gcm, b"pw", b"sixteen-byte-salt", 1_000),
            Err(CryptoError::WeakKdfParameters(_))
        ));
    }
}
