//! # Envelope Errors
//!
//! Receive-path failures fall into four kinds. The subscriber turns all
//! of them into a nack; only remote key service errors are worth retrying.

use envelope_crypto::CryptoError;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of an [`EnvelopeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Tag, signature, tenant or key identifier did not check out.
    Authentication,
    /// Metadata or ciphertext structure is malformed or incomplete.
    Decode,
    /// The KMS or certificate directory failed or timed out.
    RemoteKeyService,
    /// Required key, identifier or material missing at startup.
    Configuration,
    /// The transport refused a publish.
    Transport,
}

/// Failure of a remote key service call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteKeyServiceError {
    /// Service unreachable or refusing load.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Caller may not use the named key.
    #[error("Permission denied on {0}")]
    PermissionDenied(String),

    /// Named key does not exist.
    #[error("Key not found: {0}")]
    NotFound(String),

    /// The service rejected the request shape (wrong key purpose, etc).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The call did not complete within the configured bound.
    #[error("Call timed out after {0:?}")]
    Timeout(Duration),
}

/// Missing or inconsistent configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A value required by the selected scheme is absent.
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// A value is present but unusable.
    #[error("Invalid setting {field}: {reason}")]
    Invalid {
        /// Setting name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// A collaborator required by the selected scheme was not supplied.
    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),
}

/// Errors from the envelope protocol.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Tag, signature or AEAD verification failed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    /// Message was produced for a different key or identity.
    #[error("Key identifier mismatch: expected {expected}, got {actual}")]
    KeyIdentifierMismatch {
        /// Identifier this process is configured with
        expected: String,
        /// Identifier carried by the message
        actual: String,
    },

    /// A metadata field required by the scheme is absent.
    #[error("Missing metadata field: {0}")]
    MissingField(&'static str),

    /// Metadata or ciphertext is malformed.
    #[error("Decode error: {0}")]
    Decode(String),

    /// KMS or directory failure.
    #[error("Remote key service error: {0}")]
    RemoteKeyService(#[from] RemoteKeyServiceError),

    /// Startup configuration problem.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Publish refused by the transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Local cryptographic operation failed outside of verification.
    #[error("Crypto error: {0}")]
    Crypto(CryptoError),
}

impl EnvelopeError {
    /// Which of the error kinds this is.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthenticationFailure(_) | Self::KeyIdentifierMismatch { .. } => {
                ErrorKind::Authentication
            }
            Self::MissingField(_) | Self::Decode(_) => ErrorKind::Decode,
            Self::RemoteKeyService(_) => ErrorKind::RemoteKeyService,
            Self::Configuration(_) | Self::Crypto(_) => ErrorKind::Configuration,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }

    /// Whether retrying the same message could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteKeyService(_))
    }
}

impl From<CryptoError> for EnvelopeError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::AuthenticationFailed | CryptoError::DecryptionFailed => {
                Self::AuthenticationFailure(err.to_string())
            }
            CryptoError::Decode(reason) => Self::Decode(reason),
            CryptoError::InvalidKeyLength { .. } => Self::Decode(err.to_string()),
            other => Self::Crypto(other),
        }
    }
}
