//! # Identity Signatures
//!
//! RSASSA-PKCS1-v1_5 over SHA-256, the signature a service account produces
//! with its private key and anyone can check against its published
//! certificate.

use crate::registry::{Algorithm, AlgorithmRegistry};
use crate::wrap::{OwnPrivateKey, RecipientPublicKey};
use crate::CryptoError;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use sha2::Sha256;

/// Signs with this process's identity key.
#[derive(Clone)]
pub struct IdentitySigner {
    key: SigningKey<Sha256>,
}

impl IdentitySigner {
    /// Build a signer from our private key.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAlgorithm` if PKCS#1 v1.5 signing is not registered.
    pub fn new(registry: &AlgorithmRegistry, own: &OwnPrivateKey) -> Result<Self, CryptoError> {
        registry.ensure(Algorithm::RsaPkcs1Sha256)?;
        Ok(Self {
            key: SigningKey::<Sha256>::new(own.inner().clone()),
        })
    }

    /// Sign `message`.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.key.sign(message).to_vec()
    }
}

impl std::fmt::Debug for IdentitySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IdentitySigner { key: [REDACTED] }")
    }
}

/// Checks signatures made by a peer's identity key.
#[derive(Clone, Debug)]
pub struct IdentityVerifier {
    key: VerifyingKey<Sha256>,
    signature_len: usize,
}

impl IdentityVerifier {
    /// Build a verifier from the signer's public key.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAlgorithm` if PKCS#1 v1.5 signing is not registered.
    pub fn new(registry: &AlgorithmRegistry, public: &RecipientPublicKey) -> Result<Self, CryptoError> {
        registry.ensure(Algorithm::RsaPkcs1Sha256)?;
        Ok(Self {
            key: VerifyingKey::<Sha256>::new(public.inner().clone()),
            signature_len: public.size(),
        })
    }

    /// Check `signature` over `message`.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not verify.
    ///
    /// # Errors
    ///
    /// Returns `Decode` if the signature length differs from the modulus size.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool, CryptoError> {
        if signature.len() != self.signature_len {
            return Err(CryptoError::Decode(format!(
                "signature is {} bytes, expected {}",
                signature.len(),
                self.signature_len
            )));
        }
        let signature =
            Signature::try_from(signature).map_err(|e| CryptoError::Decode(e.to_string()))?;
        Ok(self.key.verify(message, &signature).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrap::tests::test_key;

    fn pair() -> (IdentitySigner, IdentityVerifier) {
        let registry = AlgorithmRegistry::init();
        let own = test_key();
        (
            IdentitySigner::new(&registry, own).unwrap(),
            IdentityVerifier::new(&registry, &own.public_key()).unwrap(),
        )
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let (signer, verifier) = pair();
        let signature = signer.sign(b"message body");
        assert!(verifier.verify(b"message body", &signature).unwrap());
    }

    #[test]
    fn test_other_message_is_false() {
        let (signer, verifier) = pair();
        let signature = signer.sign(b"message body");
        assert!(!verifier.verify(b"message b0dy", &signature).unwrap());
    }

    #[test]
    fn test_flipped_signature_is_false() {
        let (signer, verifier) = pair();
        let mut signature = signer.sign(b"message body");
        signature[20] ^= 0x04;
        assert!(!verifier.verify(b"message body", &signature).unwrap());
    }

    #[test]
    fn test_short_signature_is_decode_error() {
        let (signer, verifier) = pair();
        let signature = signer.sign(b"message body");
        assert!(matches!(
            verifier.verify(b"message body", &signature[1..]),
            Err(CryptoError::Decode(_))
        ));
    }
}
