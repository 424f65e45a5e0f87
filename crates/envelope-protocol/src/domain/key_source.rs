//! # Key Source
//!
//! Where a long-lived key comes from. Resolved exactly once at construction
//! (see `KeySource::resolve` in the service layer).

use envelope_crypto::PasswordKdf;
use std::fmt;
use zeroize::Zeroizing;

/// Origin of a long-lived symmetric key.
#[derive(Clone)]
pub enum KeySource {
    /// Generate a random key at startup.
    Generated,
    /// Raw key bytes supplied out of band.
    Imported(Zeroizing<Vec<u8>>),
    /// Key bytes wrapped under a KMS master key.
    KmsWrapped {
        /// Master key resource name.
        kms_key: String,
        /// Wrapped key bytes.
        wrapped: Vec<u8>,
    },
    /// Key derived from a shared passphrase with PBKDF2. Opt-in only.
    Passphrase {
        /// The passphrase itself.
        passphrase: Zeroizing<String>,
        /// Salt and iteration count.
        kdf: PasswordKdf,
    },
}

impl KeySource {
    /// Import raw bytes.
    pub fn imported(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Imported(Zeroizing::new(bytes.into()))
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Imported(_) => "imported",
            Self::KmsWrapped { .. } => "kms_wrapped",
            Self::Passphrase { .. } => "passphrase",
        }
    }
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generated => f.write_str("Generated"),
            Self::Imported(_) => f.write_str("Imported([REDACTED])"),
            Self::KmsWrapped { kms_key, wrapped } => f
                .debug_struct("KmsWrapped")
                .field("kms_key", kms_key)
                .field("wrapped_len", &wrapped.len())
                .finish(),
            Self::Passphrase { kdf, .. } => f
                .debug_struct("Passphrase")
                .field("passphrase", &"[REDACTED]")
                .field("iterations", &kdf.iterations())
                .finish(),
        }
    }
}
