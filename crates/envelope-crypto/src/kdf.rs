//! # Password-Based Key Derivation
//!
//! PBKDF2-HMAC-SHA-256 for the password key-establishment mode. Machine
//! generated keys never go through this path; callers opt in explicitly.

use crate::keys::{KeyMaterial, KEY_LEN};
use crate::registry::Algorithm;
use crate::CryptoError;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Lowest accepted iteration count.
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;

/// Iteration count used by [`PasswordKdf::new`].
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 310_000;

/// Shortest accepted salt.
pub const MIN_SALT_LEN: usize = 16;

/// Salted PBKDF2 parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordKdf {
    salt: Vec<u8>,
    iterations: u32,
}

impl PasswordKdf {
    /// Parameters with the default iteration count.
    ///
    /// # Errors
    ///
    /// Returns `WeakKdfParameters` if the salt is shorter than 16 bytes.
    pub fn new(salt: &[u8]) -> Result<Self, CryptoError> {
        Self::with_iterations(salt, DEFAULT_PBKDF2_ITERATIONS)
    }

    /// Parameters with an explicit iteration count.
    ///
    /// # Errors
    ///
    /// Returns `WeakKdfParameters` if the salt is shorter than 16 bytes or
    /// `iterations` is below 100,000.
    pub fn with_iterations(salt: &[u8], iterations: u32) -> Result<Self, CryptoError> {
        if salt.len() < MIN_SALT_LEN {
            return Err(CryptoError::WeakKdfParameters(format!(
                "salt is {} bytes, minimum is {MIN_SALT_LEN}",
                salt.len()
            )));
        }
        if iterations < MIN_PBKDF2_ITERATIONS {
            return Err(CryptoError::WeakKdfParameters(format!(
                "{iterations} iterations, minimum is {MIN_PBKDF2_ITERATIONS}"
            )));
        }
        Ok(Self {
            salt: salt.to_vec(),
            iterations,
        })
    }

    /// Derive a symmetric key for `algorithm` from `password`.
    ///
    /// # Errors
    ///
    /// Returns `KeyGenerationFailed` for asymmetric algorithms.
    pub fn derive(&self, password: &[u8], algorithm: Algorithm) -> Result<KeyMaterial, CryptoError> {
        let mut out = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2::pbkdf2_hmac::<Sha256>(password, &self.salt, self.iterations, &mut out[..]);
        KeyMaterial::from_bytes(algorithm, &out[..])
    }

    /// Salt bytes.
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Iteration count.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}
