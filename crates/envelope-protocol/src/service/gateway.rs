//! # KEK Gateway
//!
//! Wraps and unwraps short secrets under a named KMS master key, binding
//! the tenant tag as associated data on every call.
//!
//! The gateway neither caches nor generates keys. Each call is bounded by
//! a timeout; a call that overruns fails with
//! `RemoteKeyServiceError::Timeout` and affects only its own message.

use crate::domain::errors::{ConfigError, EnvelopeError, RemoteKeyServiceError};
use crate::domain::key_source::KeySource;
use crate::ports::outbound::{KmsClient, KmsError};
use envelope_crypto::{Algorithm, KeyMaterial};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Default bound on a single KMS call.
pub const DEFAULT_KMS_TIMEOUT: Duration = Duration::from_secs(5);

/// Front end to the remote KMS.
#[derive(Clone)]
pub struct KekGateway {
    client: Arc<dyn KmsClient>,
    timeout: Duration,
}

impl KekGateway {
    /// Gateway over `client` with the default timeout.
    pub fn new(client: Arc<dyn KmsClient>) -> Self {
        Self::with_timeout(client, DEFAULT_KMS_TIMEOUT)
    }

    /// Gateway over `client` with an explicit per-call timeout.
    pub fn with_timeout(client: Arc<dyn KmsClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wrap `plaintext_key` under `key_id`, binding `tenant`.
    ///
    /// # Errors
    /// * `RemoteKeyService` - KMS failure or timeout
    pub async fn wrap(&self, plaintext_key: &[u8], key_id: &str, tenant: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        let wrapped = self
            .call("wrap", key_id, self.client.encrypt(key_id, plaintext_key, tenant))
            .await?;
        debug!(kms_key = key_id, wrapped_len = wrapped.len(), "Key wrapped");
        Ok(wrapped)
    }

    /// Unwrap a key wrapped by [`wrap`](Self::wrap).
    ///
    /// # Errors
    /// * `AuthenticationFailure` - ciphertext or tenant tag does not match
    /// * `RemoteKeyService` - KMS failure or timeout
    pub async fn unwrap(&self, wrapped: &[u8], key_id: &str, tenant: &[u8]) -> Result<Zeroizing<Vec<u8>>, EnvelopeError> {
        let plaintext = self
            .call("unwrap", key_id, self.client.decrypt(key_id, wrapped, tenant))
            .await?;
        debug!(kms_key = key_id, "Key unwrapped");
        Ok(Zeroizing::new(plaintext))
    }

    /// Encrypt a whole payload with the KMS.
    ///
    /// # Errors
    /// As for [`wrap`](Self::wrap).
    pub async fn encrypt(&self, plaintext: &[u8], key_id: &str, tenant: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        self.call("encrypt", key_id, self.client.encrypt(key_id, plaintext, tenant))
            .await
    }

    /// Decrypt a payload encrypted by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    /// As for [`unwrap`](Self::unwrap).
    pub async fn decrypt(&self, ciphertext: &[u8], key_id: &str, tenant: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        self.call("decrypt", key_id, self.client.decrypt(key_id, ciphertext, tenant))
            .await
    }

    /// KMS MAC over `data`.
    ///
    /// # Errors
    /// * `RemoteKeyService` - KMS failure or timeout
    pub async fn mac_sign(&self, data: &[u8], key_id: &str) -> Result<Vec<u8>, EnvelopeError> {
        self.call("mac_sign", key_id, self.client.mac_sign(key_id, data))
            .await
    }

    /// Check a KMS MAC over `data`.
    ///
    /// # Errors
    /// * `RemoteKeyService` - KMS failure or timeout
    pub async fn mac_verify(&self, data: &[u8], tag: &[u8], key_id: &str) -> Result<bool, EnvelopeError> {
        self.call("mac_verify", key_id, self.client.mac_verify(key_id, data, tag))
            .await
    }

    async fn call<T>(
        &self,
        op: &'static str,
        key_id: &str,
        fut: impl Future<Output = Result<T, KmsError>>,
    ) -> Result<T, EnvelopeError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                warn!(op, kms_key = key_id, error = %err, "KMS call failed");
                Err(classify(err))
            }
            Err(_) => {
                warn!(op, kms_key = key_id, timeout_ms = self.timeout.as_millis() as u64, "KMS call timed out");
                Err(RemoteKeyServiceError::Timeout(self.timeout).into())
            }
        }
    }
}

impl std::fmt::Debug for KekGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KekGateway")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Ciphertext rejection is a verification failure; everything else is the
/// remote service's problem.
fn classify(err: KmsError) -> EnvelopeError {
    match err {
        KmsError::InvalidCiphertext => {
            EnvelopeError::AuthenticationFailure("KMS rejected ciphertext".into())
        }
        KmsError::Unavailable(reason) => RemoteKeyServiceError::Unavailable(reason).into(),
        KmsError::PermissionDenied(key) => RemoteKeyServiceError::PermissionDenied(key).into(),
        KmsError::NotFound(key) => RemoteKeyServiceError::NotFound(key).into(),
        KmsError::InvalidArgument(reason) => RemoteKeyServiceError::InvalidArgument(reason).into(),
    }
}

impl KeySource {
    /// Turn the source into key material for `algorithm`.
    ///
    /// `KmsWrapped` keys are unwrapped through `gateway` with `tenant` as
    /// associated data.
    ///
    /// # Errors
    /// * `Configuration` - `KmsWrapped` without a gateway
    /// * `Decode` - imported or unwrapped bytes of the wrong length
    /// * anything [`KekGateway::unwrap`] returns
    pub async fn resolve(
        &self,
        algorithm: Algorithm,
        gateway: Option<&KekGateway>,
        tenant: &[u8],
    ) -> Result<KeyMaterial, EnvelopeError> {
        let material = match self {
            Self::Generated => KeyMaterial::generate(algorithm)?,
            Self::Imported(bytes) => KeyMaterial::from_bytes(algorithm, bytes)?,
            Self::KmsWrapped { kms_key, wrapped } => {
                let gateway = gateway.ok_or(ConfigError::MissingCollaborator("KEK gateway"))?;
                let bytes = gateway.unwrap(wrapped, kms_key, tenant).await?;
                KeyMaterial::from_bytes(algorithm, &bytes)?
            }
            Self::Passphrase { passphrase, kdf } => kdf.derive(passphrase.as_bytes(), algorithm)?,
        };
        debug!(source = self.label(), key = %material.info(), "Key source resolved");
        Ok(material)
    }
}
