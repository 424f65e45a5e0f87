//! # Protection Schemes
//!
//! Each scheme fixes how the payload is protected and which metadata
//! fields travel with it.

use crate::domain::errors::ConfigError;
use crate::domain::metadata::fields;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a message is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    /// AES-256-GCM under a long-lived pre-shared key.
    SymmetricEncrypt,
    /// HMAC-SHA-256 under a long-lived pre-shared key.
    SymmetricSign,
    /// Per-period DEK wrapped to the recipient's RSA certificate.
    IdentityEncrypt,
    /// RSA signature by the publisher's service-account key.
    IdentitySign,
    /// Payload encrypted by the KMS itself.
    KmsEncrypt,
    /// KMS MAC over the payload digest.
    KmsSign,
    /// Rotated DEK wrapped under a KMS KEK.
    KmsDekEncrypt,
    /// Rotated HMAC key wrapped under a KMS KEK.
    KmsDekSign,
}

impl Scheme {
    /// Every scheme, in declaration order.
    pub const ALL: [Scheme; 8] = [
        Scheme::SymmetricEncrypt,
        Scheme::SymmetricSign,
        Scheme::IdentityEncrypt,
        Scheme::IdentitySign,
        Scheme::KmsEncrypt,
        Scheme::KmsSign,
        Scheme::KmsDekEncrypt,
        Scheme::KmsDekSign,
    ];

    /// Stable name carried in the `scheme` metadata field.
    pub const fn name(self) -> &'static str {
        match self {
            Self::SymmetricEncrypt => "symmetric_encrypt",
            Self::SymmetricSign => "symmetric_sign",
            Self::IdentityEncrypt => "identity_encrypt",
            Self::IdentitySign => "identity_sign",
            Self::KmsEncrypt => "kms_encrypt",
            Self::KmsSign => "kms_sign",
            Self::KmsDekEncrypt => "kms_dek_encrypt",
            Self::KmsDekSign => "kms_dek_sign",
        }
    }

    /// Scheme-specific metadata fields that must be present.
    ///
    /// `scheme` is always required and `tenant_id` always optional; neither
    /// is listed here.
    pub const fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::SymmetricEncrypt => &[],
            Self::SymmetricSign => &[fields::SIGNATURE],
            Self::IdentityEncrypt => &[fields::SERVICE_ACCOUNT, fields::KEY_ID, fields::DEK_WRAPPED],
            Self::IdentitySign => &[fields::SERVICE_ACCOUNT, fields::KEY_ID, fields::SIGNATURE],
            Self::KmsEncrypt => &[fields::KMS_KEY],
            Self::KmsSign => &[fields::KMS_KEY, fields::SIGNATURE],
            Self::KmsDekEncrypt => &[fields::KMS_KEY, fields::DEK_WRAPPED],
            Self::KmsDekSign => &[fields::KMS_KEY, fields::SIGN_KEY_WRAPPED, fields::SIGNATURE],
        }
    }

    /// Payload is ciphertext rather than signed plaintext.
    pub const fn encrypts(self) -> bool {
        matches!(
            self,
            Self::SymmetricEncrypt | Self::IdentityEncrypt | Self::KmsEncrypt | Self::KmsDekEncrypt
        )
    }

    /// Needs a KMS master key name.
    pub const fn uses_kms(self) -> bool {
        matches!(
            self,
            Self::KmsEncrypt | Self::KmsSign | Self::KmsDekEncrypt | Self::KmsDekSign
        )
    }

    /// Uses a long-lived pre-shared key.
    pub const fn uses_shared_key(self) -> bool {
        matches!(self, Self::SymmetricEncrypt | Self::SymmetricSign)
    }

    /// Uses service-account identities.
    pub const fn uses_identity(self) -> bool {
        matches!(self, Self::IdentityEncrypt | Self::IdentitySign)
    }

    /// Generates and wraps per-period session keys.
    pub const fn rotates_keys(self) -> bool {
        matches!(self, Self::IdentityEncrypt | Self::KmsDekEncrypt | Self::KmsDekSign)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scheme| scheme.name() == s)
            .ok_or_else(|| ConfigError::Invalid {
                field: "ENVELOPE_SCHEME",
                reason: format!("unknown scheme {s:?}"),
            })
    }
}
