//! Ready-to-use symmetric keys, shared between the publisher's active key
//! slot and the subscriber's key cache.

use crate::domain::errors::EnvelopeError;
use envelope_crypto::{
    AeadCipher, Algorithm, AlgorithmRegistry, CryptoError, KeyInfo, KeyMaterial, MacSigner,
};
use std::sync::Arc;

/// An AEAD cipher or MAC signer built from unwrapped key material.
#[derive(Clone, Debug)]
pub enum SessionKey {
    /// AES-256-GCM data key.
    Aead(Arc<AeadCipher>),
    /// HMAC-SHA-256 signing key.
    Mac(Arc<MacSigner>),
}

impl SessionKey {
    /// Build the primitive matching `material`'s algorithm.
    ///
    /// # Errors
    ///
    /// `UnsupportedAlgorithm` for asymmetric or unregistered algorithms.
    pub fn from_material(
        registry: &AlgorithmRegistry,
        material: KeyMaterial,
    ) -> Result<Self, CryptoError> {
        match material.algorithm() {
            Algorithm::Aes256Gcm => Ok(Self::Aead(Arc::new(AeadCipher::new(registry, &material)?))),
            Algorithm::HmacSha256 => Ok(Self::Mac(Arc::new(MacSigner::new(registry, material)?))),
            other => Err(CryptoError::UnsupportedAlgorithm(other)),
        }
    }

    /// Fresh random key for `algorithm`.
    ///
    /// # Errors
    ///
    /// As for [`from_material`](Self::from_material).
    pub fn generate(registry: &AlgorithmRegistry, algorithm: Algorithm) -> Result<Self, CryptoError> {
        Self::from_material(registry, KeyMaterial::generate(algorithm)?)
    }

    /// The AEAD cipher, or a crypto error if this is a MAC key.
    pub fn aead(&self) -> Result<&AeadCipher, EnvelopeError> {
        match self {
            Self::Aead(cipher) => Ok(cipher),
            Self::Mac(_) => Err(EnvelopeError::Crypto(CryptoError::AlgorithmMismatch {
                expected: Algorithm::Aes256Gcm,
                actual: Algorithm::HmacSha256,
            })),
        }
    }

    /// The MAC signer, or a crypto error if this is an AEAD key.
    pub fn mac(&self) -> Result<&MacSigner, EnvelopeError> {
        match self {
            Self::Mac(signer) => Ok(signer),
            Self::Aead(_) => Err(EnvelopeError::Crypto(CryptoError::AlgorithmMismatch {
                expected: Algorithm::HmacSha256,
                actual: Algorithm::Aes256Gcm,
            })),
        }
    }

    /// Algorithm and fingerprint, for logs.
    pub fn info(&self) -> KeyInfo {
        match self {
            Self::Aead(cipher) => cipher.key_info().clone(),
            Self::Mac(signer) => signer.key_info(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_matching_primitive() {
        let registry = AlgorithmRegistry::init();
        let aead = SessionKey::generate(&registry, Algorithm::Aes256Gcm).unwrap();
        let mac = SessionKey::generate(&registry, Algorithm::HmacSha256).unwrap();

        assert!(aead.aead().is_ok());
        assert!(aead.mac().is_err());
        assert!(mac.mac().is_ok());
        assert_eq!(mac.info().algorithm, Algorithm::HmacSha256);
    }

    #[test]
    fn test_rejects_asymmetric() {
        let registry = AlgorithmRegistry::init();
        assert!(SessionKey::generate(&registry, Algorithm::RsaOaepSha256).is_err());
    }
}
