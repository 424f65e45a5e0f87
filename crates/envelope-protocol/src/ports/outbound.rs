//! # Outbound Ports (Driven Ports / SPI)
//!
//! Remote services the protocol depends on. Both are external
//! collaborators; adapters for tests and demos live in `adapters/`.

use crate::domain::errors::{EnvelopeError, RemoteKeyServiceError};
use crate::domain::metadata::ServiceIdentity;
use async_trait::async_trait;
use envelope_crypto::RecipientPublicKey;
use thiserror::Error;

/// Error reported by a KMS.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KmsError {
    /// Service unreachable or overloaded
    #[error("KMS unavailable: {0}")]
    Unavailable(String),

    /// Caller lacks permission on the key
    #[error("Permission denied on {0}")]
    PermissionDenied(String),

    /// Key does not exist
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Request is malformed for the key (e.g. MAC call on an encryption key)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Ciphertext failed authentication, including associated data mismatch
    #[error("Ciphertext failed authentication")]
    InvalidCiphertext,
}

/// Remote key management service.
///
/// Wire contract: `Encrypt(keyName, plaintext, aad)`,
/// `Decrypt(keyName, ciphertext, aad)`, `MacSign(keyName, data)`,
/// `MacVerify(keyName, data, tag)`.
#[async_trait]
pub trait KmsClient: Send + Sync {
    /// Encrypt `plaintext` under `key_name`, binding `aad`.
    async fn encrypt(&self, key_name: &str, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, KmsError>;

    /// Decrypt `ciphertext` under `key_name`; `aad` must match encryption.
    ///
    /// # Errors
    /// * `KmsError::InvalidCiphertext` - tag or associated data mismatch
    async fn decrypt(&self, key_name: &str, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, KmsError>;

    /// MAC `data` with the MAC key `key_name`.
    async fn mac_sign(&self, key_name: &str, data: &[u8]) -> Result<Vec<u8>, KmsError>;

    /// Check `tag` over `data` with the MAC key `key_name`.
    async fn mac_verify(&self, key_name: &str, data: &[u8], tag: &[u8]) -> Result<bool, KmsError>;
}

/// Error from a certificate directory.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    /// No certificate published for the identity
    #[error("No certificate for {0}")]
    NotFound(ServiceIdentity),

    /// Directory could not be reached
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    /// Published certificate does not parse or is too weak
    #[error("Invalid certificate for {identity}: {reason}")]
    InvalidCertificate {
        /// Whose certificate
        identity: ServiceIdentity,
        /// Parse failure
        reason: String,
    },
}

impl From<DirectoryError> for EnvelopeError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound(identity) => {
                RemoteKeyServiceError::NotFound(identity.to_string()).into()
            }
            DirectoryError::Unavailable(reason) => RemoteKeyServiceError::Unavailable(reason).into(),
            DirectoryError::InvalidCertificate { identity, reason } => {
                EnvelopeError::Decode(format!("certificate for {identity}: {reason}"))
            }
        }
    }
}

/// Publishes service-account certificates (public keys) by key id.
#[async_trait]
pub trait CertificateDirectory: Send + Sync {
    /// Public key for `identity`.
    async fn public_key(&self, identity: &ServiceIdentity) -> Result<RecipientPublicKey, DirectoryError>;
}
