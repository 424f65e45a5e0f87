//! # Envelope Crypto - Primitives for Envelope-Protected Messages
//!
//! Pure cryptographic transforms. Nothing here talks to a KMS, caches a key
//! or touches a transport; those concerns live in `envelope-protocol`.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `symmetric` | AES-256-GCM | Payload encryption under a DEK |
//! | `mac` | HMAC-SHA-256 | Payload authentication |
//! | `kdf` | PBKDF2-HMAC-SHA-256 | Password key establishment (opt-in) |
//! | `wrap` | RSA-OAEP-SHA-256 | Wrapping a DEK to a recipient certificate |
//! | `signatures` | RSA PKCS#1 v1.5 SHA-256 | Service-account identity signatures |
//!
//! ## Registry
//!
//! Constructors take an [`AlgorithmRegistry`] built once at startup with
//! [`AlgorithmRegistry::init`]. There is no global provider registration.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod errors;
pub mod kdf;
pub mod keys;
pub mod mac;
pub mod registry;
pub mod signatures;
pub mod symmetric;
pub mod wrap;

// Re-exports
pub use errors::CryptoError;
pub use kdf::PasswordKdf;
pub use keys::{KeyInfo, KeyMaterial, KEY_LEN};
pub use mac::{MacSigner, MAC_TAG_LEN};
pub use registry::{Algorithm, AlgorithmRegistry};
pub use signatures::{IdentitySigner, IdentityVerifier};
pub use symmetric::AeadCipher;
pub use wrap::{OwnPrivateKey, RecipientPublicKey, WrapCipher};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
