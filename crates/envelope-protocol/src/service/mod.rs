//! # Service Layer
//!
//! The KEK Gateway plus the publisher and subscriber halves of the
//! envelope protocol, wired from configuration and collaborators.

pub mod gateway;
pub mod publisher;
pub mod subscriber;

use crate::domain::errors::{EnvelopeError, RemoteKeyServiceError};
use crate::domain::metadata::ServiceIdentity;
use crate::domain::scheme::Scheme;
use crate::ports::outbound::CertificateDirectory;
use envelope_crypto::{AlgorithmRegistry, OwnPrivateKey, RecipientPublicKey};
use gateway::KekGateway;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// External pieces a publisher or subscriber may need, depending on scheme.
#[derive(Clone)]
pub struct Collaborators {
    /// Algorithms constructors may use.
    pub registry: AlgorithmRegistry,
    /// KMS front end, for `Kms*` schemes and KMS-wrapped shared keys.
    pub gateway: Option<KekGateway>,
    /// Certificate lookup, for identity schemes.
    pub directory: Option<Arc<dyn CertificateDirectory>>,
    /// This process's RSA key, for identity schemes.
    pub identity_key: Option<OwnPrivateKey>,
}

impl Collaborators {
    /// No collaborators beyond the given registry.
    pub fn new(registry: AlgorithmRegistry) -> Self {
        Self {
            registry,
            gateway: None,
            directory: None,
            identity_key: None,
        }
    }

    /// Add a KEK gateway.
    pub fn with_gateway(mut self, gateway: KekGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Add a certificate directory.
    pub fn with_directory(mut self, directory: Arc<dyn CertificateDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Add this process's identity key.
    pub fn with_identity_key(mut self, key: OwnPrivateKey) -> Self {
        self.identity_key = Some(key);
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("registry", &self.registry)
            .field("gateway", &self.gateway)
            .field("directory", &self.directory.is_some())
            .field("identity_key", &self.identity_key)
            .finish()
    }
}

/// The four KMS-backed schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KmsMode {
    Encrypt,
    Sign,
    DekEncrypt,
    DekSign,
}

impl KmsMode {
    pub(crate) fn of(scheme: Scheme) -> Option<Self> {
        match scheme {
            Scheme::KmsEncrypt => Some(Self::Encrypt),
            Scheme::KmsSign => Some(Self::Sign),
            Scheme::KmsDekEncrypt => Some(Self::DekEncrypt),
            Scheme::KmsDekSign => Some(Self::DekSign),
            Scheme::SymmetricEncrypt
            | Scheme::SymmetricSign
            | Scheme::IdentityEncrypt
            | Scheme::IdentitySign => None,
        }
    }
}

/// Certificate lookup bounded by `timeout`.
///
/// # Errors
/// * `RemoteKeyService` - directory failure, unknown identity or timeout
pub(crate) async fn lookup_public_key(
    directory: &dyn CertificateDirectory,
    identity: &ServiceIdentity,
    timeout: Duration,
) -> Result<RecipientPublicKey, EnvelopeError> {
    match tokio::time::timeout(timeout, directory.public_key(identity)).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            warn!(identity = %identity, timeout_ms = timeout.as_millis() as u64, "Certificate lookup timed out");
            Err(RemoteKeyServiceError::Timeout(timeout).into())
        }
    }
}
