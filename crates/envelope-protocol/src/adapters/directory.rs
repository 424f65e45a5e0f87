//! # Static Certificate Directory
//!
//! A fixed table of service-account public keys, standing in for the
//! public certificate endpoint of an identity provider.

use crate::domain::metadata::ServiceIdentity;
use crate::ports::outbound::{CertificateDirectory, DirectoryError};
use async_trait::async_trait;
use envelope_crypto::RecipientPublicKey;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// In-memory certificate directory.
#[derive(Debug, Default)]
pub struct StaticCertificateDirectory {
    keys: RwLock<HashMap<ServiceIdentity, RecipientPublicKey>>,
    lookups: AtomicU64,
}

impl StaticCertificateDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a public key for `identity`.
    pub fn insert(&self, identity: ServiceIdentity, key: RecipientPublicKey) {
        debug!(identity = %identity, "Published public key");
        self.keys.write().insert(identity, key);
    }

    /// Publish the key from a PEM X.509 certificate.
    ///
    /// # Errors
    ///
    /// `InvalidCertificate` if the PEM does not yield an RSA key of at
    /// least 2048 bits.
    pub fn insert_certificate_pem(&self, identity: ServiceIdentity, pem: &str) -> Result<(), DirectoryError> {
        let key = RecipientPublicKey::from_x509_pem(pem).map_err(|e| {
            DirectoryError::InvalidCertificate {
                identity: identity.clone(),
                reason: e.to_string(),
            }
        })?;
        self.insert(identity, key);
        Ok(())
    }

    /// Withdraw a key.
    pub fn remove(&self, identity: &ServiceIdentity) -> bool {
        self.keys.write().remove(identity).is_some()
    }

    /// Lookups served so far, including misses.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CertificateDirectory for StaticCertificateDirectory {
    async fn public_key(&self, identity: &ServiceIdentity) -> Result<RecipientPublicKey, DirectoryError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.keys
            .read()
            .get(identity)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(identity.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envelope_crypto::OwnPrivateKey;

    #[tokio::test]
    async fn test_lookup() {
        let directory = StaticCertificateDirectory::new();
        let identity = ServiceIdentity::new("publisher@p.iam.gserviceaccount.com", "k1");
        let key = OwnPrivateKey::generate(2048).unwrap().public_key();

        directory.insert(identity.clone(), key.clone());
        assert_eq!(directory.public_key(&identity).await.unwrap(), key);

        let stranger = ServiceIdentity::new("publisher@p.iam.gserviceaccount.com", "k2");
        assert_eq!(
            directory.public_key(&stranger).await,
            Err(DirectoryError::NotFound(stranger.clone()))
        );
        assert_eq!(directory.lookups(), 2);
    }

    #[test]
    fn test_bad_certificate() {
        let directory = StaticCertificateDirectory::new();
        let identity = ServiceIdentity::new("svc", "k1");
        let result = directory.insert_certificate_pem(identity, "not a certificate");
        assert!(matches!(result, Err(DirectoryError::InvalidCertificate { .. })));
    }
}
