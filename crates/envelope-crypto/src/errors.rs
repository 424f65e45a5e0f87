//! Crypto error types.

use crate::registry::Algorithm;
use thiserror::Error;

/// Cryptographic operation errors.
///
/// Authentication and decryption failures carry no detail on purpose: the
/// caller only learns that the input was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Tag did not verify, or associated data differs from encryption time
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Asymmetric unwrap rejected the input (padding or key mismatch)
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Input is structurally malformed (truncated ciphertext, bad tag length)
    #[error("Malformed input: {0}")]
    Decode(String),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Invalid key length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes
        expected: usize,
        /// Actual key length in bytes
        actual: usize,
    },

    /// Key was generated for a different algorithm than the one requested
    #[error("Key algorithm mismatch: expected {expected}, got {actual}")]
    AlgorithmMismatch {
        /// Algorithm the primitive implements
        expected: Algorithm,
        /// Algorithm the key was created for
        actual: Algorithm,
    },

    /// Algorithm is not enabled in the registry the primitive was built from
    #[error("Algorithm not registered: {0}")]
    UnsupportedAlgorithm(Algorithm),

    /// Password KDF parameters are below the accepted minimum
    #[error("Weak KDF parameters: {0}")]
    WeakKdfParameters(String),

    /// Invalid public key
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Invalid private key
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Key generation failed
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),
}
