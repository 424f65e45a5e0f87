//! # Asymmetric Wrap Cipher
//!
//! RSA-OAEP with SHA-256 for both the digest and MGF1. Intended only for
//! short secrets such as a DEK; payloads go through the AEAD cipher.
//!
//! Recipient keys usually come from an X.509 certificate published by a
//! directory service. Unwrap failures are reported as a single
//! `DecryptionFailed` regardless of cause, and the underlying OAEP unpad is
//! constant time.

use crate::registry::{Algorithm, AlgorithmRegistry};
use crate::CryptoError;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use x509_cert::der::{DecodePem, Encode};
use x509_cert::Certificate;
use zeroize::Zeroizing;

/// Smallest modulus accepted for generated or imported keys.
pub const MIN_RSA_BITS: usize = 2048;

/// OAEP-SHA-256 overhead: `2 * hLen + 2`.
const OAEP_SHA256_OVERHEAD: usize = 2 * 32 + 2;

/// A recipient's RSA public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecipientPublicKey(RsaPublicKey);

impl RecipientPublicKey {
    /// Extract the public key from a PEM encoded X.509 certificate.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPublicKey` if the certificate does not parse or does
    /// not carry an RSA key of at least 2048 bits.
    pub fn from_x509_pem(pem: &str) -> Result<Self, CryptoError> {
        let cert = Certificate::from_pem(pem.as_bytes())
            .map_err(|e| CryptoError::InvalidPublicKey(format!("certificate: {e}")))?;
        let spki = cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| CryptoError::InvalidPublicKey(format!("subject key: {e}")))?;
        let key = RsaPublicKey::from_public_key_der(&spki)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Self::checked(key)
    }

    /// Parse a PEM encoded SubjectPublicKeyInfo.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPublicKey` on malformed input or a short modulus.
    pub fn from_public_key_pem(pem: &str) -> Result<Self, CryptoError> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Self::checked(key)
    }

    /// Encode as PEM SubjectPublicKeyInfo.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPublicKey` if encoding fails.
    pub fn to_public_key_pem(&self) -> Result<String, CryptoError> {
        self.0
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    /// Modulus size in bytes.
    pub fn size(&self) -> usize {
        self.0.size()
    }

    /// Largest secret [`WrapCipher::encrypt`] accepts for this key.
    pub fn max_secret_len(&self) -> usize {
        self.size().saturating_sub(OAEP_SHA256_OVERHEAD)
    }

    pub(crate) fn inner(&self) -> &RsaPublicKey {
        &self.0
    }

    fn checked(key: RsaPublicKey) -> Result<Self, CryptoError> {
        let bits = key.size() * 8;
        if bits < MIN_RSA_BITS {
            return Err(CryptoError::InvalidPublicKey(format!(
                "{bits}-bit modulus, minimum is {MIN_RSA_BITS}"
            )));
        }
        Ok(Self(key))
    }
}

/// This process's own RSA private key.
#[derive(Clone)]
pub struct OwnPrivateKey(RsaPrivateKey);

impl OwnPrivateKey {
    /// Generate a fresh key pair.
    ///
    /// # Errors
    ///
    /// Returns `KeyGenerationFailed` for moduli below 2048 bits or on RNG failure.
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        if bits < MIN_RSA_BITS {
            return Err(CryptoError::KeyGenerationFailed(format!(
                "{bits}-bit modulus, minimum is {MIN_RSA_BITS}"
            )));
        }
        RsaPrivateKey::new(&mut OsRng, bits)
            .map(Self)
            .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))
    }

    /// Parse a PKCS#8 PEM private key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPrivateKey` on malformed input.
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, CryptoError> {
        RsaPrivateKey::from_pkcs8_pem(pem)
            .map(Self)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
    }

    /// Encode as PKCS#8 PEM.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPrivateKey` if encoding fails.
    pub fn to_pkcs8_pem(&self) -> Result<Zeroizing<String>, CryptoError> {
        self.0
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
    }

    /// Matching public key.
    pub fn public_key(&self) -> RecipientPublicKey {
        RecipientPublicKey(self.0.to_public_key())
    }

    pub(crate) fn inner(&self) -> &RsaPrivateKey {
        &self.0
    }
}

impl std::fmt::Debug for OwnPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnPrivateKey")
            .field("bits", &(self.0.size() * 8))
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// RSA-OAEP wrap/unwrap bound to the registry it was built from.
#[derive(Clone, Copy, Debug)]
pub struct WrapCipher {
    algorithm: Algorithm,
}

impl WrapCipher {
    /// Build the wrap cipher.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAlgorithm` if RSA-OAEP-SHA-256 is not registered.
    pub fn new(registry: &AlgorithmRegistry) -> Result<Self, CryptoError> {
        registry.ensure(Algorithm::RsaOaepSha256)?;
        Ok(Self {
            algorithm: Algorithm::RsaOaepSha256,
        })
    }

    /// Always `RsaOaepSha256`.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Encrypt a short `secret` to `recipient`.
    ///
    /// # Errors
    ///
    /// Returns `EncryptionFailed` if `secret` exceeds the OAEP limit.
    pub fn encrypt(&self, secret: &[u8], recipient: &RecipientPublicKey) -> Result<Vec<u8>, CryptoError> {
        if secret.len() > recipient.max_secret_len() {
            return Err(CryptoError::EncryptionFailed(format!(
                "secret is {} bytes, OAEP limit is {}",
                secret.len(),
                recipient.max_secret_len()
            )));
        }
        recipient
            .inner()
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), secret)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
    }

    /// Decrypt a wrapped secret with our own private key.
    ///
    /// # Errors
    ///
    /// Returns `DecryptionFailed` for any failure, without further detail.
    pub fn decrypt(&self, wrapped: &[u8], own: &OwnPrivateKey) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        own.inner()
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}
