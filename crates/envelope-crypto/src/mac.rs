//! # MAC Signer/Verifier
//!
//! HMAC-SHA-256 with a 256-bit key and an untruncated 32-byte tag.
//! Verification compares in constant time.

use crate::keys::{KeyInfo, KeyMaterial};
use crate::registry::{Algorithm, AlgorithmRegistry};
use crate::CryptoError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA-256 tag length.
pub const MAC_TAG_LEN: usize = 32;

/// Keyed MAC over arbitrary messages.
#[derive(Clone)]
pub struct MacSigner {
    key: KeyMaterial,
    keyed: HmacSha256,
}

impl MacSigner {
    /// Build a signer from an `HmacSha256` key.
    ///
    /// # Errors
    ///
    /// - `UnsupportedAlgorithm` if HMAC-SHA-256 is not in `registry`
    /// - `AlgorithmMismatch` if `key` was made for another algorithm
    pub fn new(registry: &AlgorithmRegistry, key: KeyMaterial) -> Result<Self, CryptoError> {
        registry.ensure(Algorithm::HmacSha256)?;
        key.expect_algorithm(Algorithm::HmacSha256)?;
        let keyed = <HmacSha256 as Mac>::new_from_slice(key.as_bytes()).map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: 32,
                actual: key.as_bytes().len(),
            }
        })?;
        Ok(Self { key, keyed })
    }

    /// Build a signer around a freshly generated random key.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAlgorithm` if HMAC-SHA-256 is not registered.
    pub fn generate(registry: &AlgorithmRegistry) -> Result<Self, CryptoError> {
        Self::new(registry, KeyMaterial::generate(Algorithm::HmacSha256)?)
    }

    /// Compute the tag for `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; MAC_TAG_LEN] {
        let mut mac = self.keyed.clone();
        mac.update(message);
        mac.finalize().into_bytes().into()
    }

    /// Check `tag` against `message`.
    ///
    /// Returns `Ok(false)` for a well-formed tag that does not match.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Decode` if `tag` is not exactly 32 bytes.
    pub fn verify(&self, message: &[u8], tag: &[u8]) -> Result<bool, CryptoError> {
        if tag.len() != MAC_TAG_LEN {
            return Err(CryptoError::Decode(format!(
                "MAC tag is {} bytes, expected {MAC_TAG_LEN}",
                tag.len()
            )));
        }
        let mut mac = self.keyed.clone();
        mac.update(message);
        Ok(mac.verify_slice(tag).is_ok())
    }

    /// Underlying key, e.g. to wrap it for transport.
    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }

    /// Algorithm and key fingerprint.
    pub fn key_info(&self) -> KeyInfo {
        self.key.info()
    }
}

impl std::fmt::Debug for MacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacSigner")
            .field("key", &self.key.info())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> MacSigner {
        MacSigner::generate(&AlgorithmRegistry::init()).unwrap()
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let signer = signer();
        let tag = signer.sign(b"payload");
        assert!(signer.verify(b"payload", &tag).unwrap());
    }

    #[test]
    fn test_flipped_tag_bit_is_false() {
        let signer = signer();
        let mut tag = signer.sign(b"payload");
        tag[7] ^= 0x01;
        assert!(!signer.verify(b"payload", &tag).unwrap());
    }

    #[test]
    fn test_different_message_is_false() {
        let signer = signer();
        let tag = signer.sign(b"payload");
        assert!(!signer.verify(b"other payload", &tag).unwrap());
    }

    #[test]
    fn test_truncated_tag_is_decode_error() {
        let signer = signer();
        let tag = signer.sign(b"payload");
        assert!(matches!(
            signer.verify(b"payload", &tag[..16]),
            Err(CryptoError::Decode(_))
        ));
    }

    #[test]
    fn test_imported_key_is_deterministic() {
        let registry = AlgorithmRegistry::init();
        let k1 = KeyMaterial::from_bytes(Algorithm::HmacSha256, &[0x0b; 32]).unwrap();
        let k2 = KeyMaterial::from_bytes(Algorithm::HmacSha256, &[0x0b; 32]).unwrap();
        let s1 = MacSigner::new(&registry, k1).unwrap();
        let s2 = MacSigner::new(&registry, k2).unwrap();
        assert_eq!(s1.sign(b"Hi There"), s2.sign(b"Hi There"));
    }

    #[test]
    fn test_distinct_keys_distinct_tags() {
        assert_ne!(signer().sign(b"data"), signer().sign(b"data"));
    }

    #[test]
    fn test_rejects_aead_key() {
        let key = KeyMaterial::generate(Algorithm::Aes256Gcm).unwrap();
        assert!(matches!(
            MacSigner::new(&AlgorithmRegistry::init(), key),
            Err(CryptoError::AlgorithmMismatch { .. })
        ));
    }
}
