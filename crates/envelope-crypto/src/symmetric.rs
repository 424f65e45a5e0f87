//! # AEAD Envelope Cipher
//!
//! AES-256-GCM with a self-describing ciphertext layout:
//!
//! ```text
//! ┌─────────┬──────────────┬─────────────────────────────┐
//! │ version │ nonce (12 B) │ ciphertext ‖ tag (16 B)     │
//! └─────────┴──────────────┴─────────────────────────────┘
//! ```
//!
//! The version byte pins the algorithm, so a ciphertext produced under one
//! layout is never decrypted as another. Decryption either returns the full
//! plaintext or fails; partial plaintext is never exposed.

use crate::keys::{KeyInfo, KeyMaterial};
use crate::registry::{Algorithm, AlgorithmRegistry};
use crate::CryptoError;
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};

/// Layout version for AES-256-GCM ciphertexts.
pub const CIPHERTEXT_VERSION: u8 = 0x01;

/// GCM nonce length.
pub const NONCE_LEN: usize = 12;

/// GCM tag length.
pub const TAG_LEN: usize = 16;

/// Smallest well-formed ciphertext (empty plaintext).
pub const MIN_CIPHERTEXT_LEN: usize = 1 + NONCE_LEN + TAG_LEN;

/// AES-256-GCM cipher bound to one key.
pub struct AeadCipher {
    cipher: Aes256Gcm,
    info: KeyInfo,
}

impl AeadCipher {
    /// Build a cipher from an `Aes256Gcm` key.
    ///
    /// # Errors
    ///
    /// - `UnsupportedAlgorithm` if AES-256-GCM is not in `registry`
    /// - `AlgorithmMismatch` if `key` was made for another algorithm
    pub fn new(registry: &AlgorithmRegistry, key: &KeyMaterial) -> Result<Self, CryptoError> {
        registry.ensure(Algorithm::Aes256Gcm)?;
        key.expect_algorithm(Algorithm::Aes256Gcm)?;
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: 32,
                actual: key.as_bytes().len(),
            }
        })?;
        Ok(Self {
            cipher,
            info: key.info(),
        })
    }

    /// Encrypt `plaintext`, binding `associated_data`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` if the AEAD rejects the input.
    pub fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: associated_data,
                },
            )
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut out = Vec::with_capacity(1 + NONCE_LEN + sealed.len());
        out.push(CIPHERTEXT_VERSION);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Decrypt a ciphertext produced by [`AeadCipher::encrypt`].
    ///
    /// # Errors
    ///
    /// - `Decode` if the input is shorter than a header plus tag
    /// - `AuthenticationFailed` on tag mismatch, associated data mismatch,
    ///   wrong key, or an unknown version byte
    pub fn decrypt(&self, ciphertext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < MIN_CIPHERTEXT_LEN {
            return Err(CryptoError::Decode(format!(
                "ciphertext is {} bytes, minimum is {MIN_CIPHERTEXT_LEN}",
                ciphertext.len()
            )));
        }
        // The version byte is not covered by the tag; any other value is
        // indistinguishable from tampering.
        if ciphertext[0] != CIPHERTEXT_VERSION {
            return Err(CryptoError::AuthenticationFailed);
        }
        let (nonce, sealed) = ciphertext[1..].split_at(NONCE_LEN);

        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: associated_data,
                },
            )
            .map_err(|_| CryptoError::AuthenticationFailed)
    }

    /// Algorithm and key fingerprint.
    pub fn key_info(&self) -> &KeyInfo {
        &self.info
    }
}

impl std::fmt::Debug for AeadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeadCipher").field("key", &self.info).finish()
    }
}
