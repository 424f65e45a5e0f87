//! # Envelope Metadata
//!
//! Typed view of the string metadata attached to a protected message.
//! Binary values are base64 (standard alphabet, padded).
//!
//! Parsing is strict: every field the scheme requires must be present and
//! protocol fields the scheme does not use must be absent. Keys outside the
//! protocol's field set belong to the application and are ignored.

use crate::domain::errors::EnvelopeError;
use crate::domain::scheme::Scheme;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use envelope_bus::Metadata;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata field names.
pub mod fields {
    /// KMS master key resource name.
    pub const KMS_KEY: &str = "kms_key";
    /// Wrapped AEAD key.
    pub const DEK_WRAPPED: &str = "dek_wrapped";
    /// Wrapped MAC key.
    pub const SIGN_KEY_WRAPPED: &str = "sign_key_wrapped";
    /// MAC tag or identity signature.
    pub const SIGNATURE: &str = "signature";
    /// Service account that signed, or that a DEK was wrapped for.
    pub const SERVICE_ACCOUNT: &str = "service_account";
    /// Key id within the service account.
    pub const KEY_ID: &str = "key_id";
    /// Tenant tag.
    pub const TENANT_ID: &str = "tenant_id";
    /// Scheme name.
    pub const SCHEME: &str = "scheme";

    /// Fields whose presence is governed by the scheme.
    pub const SCHEME_GOVERNED: [&str; 6] = [
        KMS_KEY,
        SERVICE_ACCOUNT,
        KEY_ID,
        DEK_WRAPPED,
        SIGN_KEY_WRAPPED,
        SIGNATURE,
    ];
}

/// A service account and one of its key ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceIdentity {
    /// Account email or name.
    pub service_account: String,
    /// Key id within the account.
    pub key_id: String,
}

impl ServiceIdentity {
    /// Build an identity.
    pub fn new(service_account: impl Into<String>, key_id: impl Into<String>) -> Self {
        Self {
            service_account: service_account.into(),
            key_id: key_id.into(),
        }
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service_account, self.key_id)
    }
}

/// Base64 encode binary metadata.
pub fn encode_binary(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Base64 decode a metadata value, naming `field` on failure.
pub fn decode_binary(field: &str, value: &str) -> Result<Vec<u8>, EnvelopeError> {
    STANDARD
        .decode(value)
        .map_err(|e| EnvelopeError::Decode(format!("{field}: {e}")))
}

/// Protocol fields of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    /// Scheme the publisher used.
    pub scheme: Scheme,
    /// Tenant tag, when carried.
    pub tenant: Option<Vec<u8>>,
    /// KMS master key name.
    pub kms_key: Option<String>,
    /// Signer or recipient identity.
    pub identity: Option<ServiceIdentity>,
    /// Wrapped DEK.
    pub dek_wrapped: Option<Vec<u8>>,
    /// Wrapped MAC key.
    pub sign_key_wrapped: Option<Vec<u8>>,
    /// MAC tag or signature.
    pub signature: Option<Vec<u8>>,
}

impl EnvelopeHeader {
    /// Header for `scheme` carrying `tenant`.
    pub fn new(scheme: Scheme, tenant: &[u8]) -> Self {
        Self {
            scheme,
            tenant: Some(tenant.to_vec()),
            kms_key: None,
            identity: None,
            dek_wrapped: None,
            sign_key_wrapped: None,
            signature: None,
        }
    }

    /// Set the KMS key name.
    pub fn with_kms_key(mut self, kms_key: impl Into<String>) -> Self {
        self.kms_key = Some(kms_key.into());
        self
    }

    /// Set the service identity.
    pub fn with_identity(mut self, identity: ServiceIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Set the wrapped DEK.
    pub fn with_dek_wrapped(mut self, wrapped: impl Into<Vec<u8>>) -> Self {
        self.dek_wrapped = Some(wrapped.into());
        self
    }

    /// Set the wrapped MAC key.
    pub fn with_sign_key_wrapped(mut self, wrapped: impl Into<Vec<u8>>) -> Self {
        self.sign_key_wrapped = Some(wrapped.into());
        self
    }

    /// Set the tag or signature.
    pub fn with_signature(mut self, signature: impl Into<Vec<u8>>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Render as transport metadata.
    pub fn to_metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(fields::SCHEME.into(), self.scheme.name().into());
        if let Some(tenant) = &self.tenant {
            metadata.insert(fields::TENANT_ID.into(), encode_binary(tenant));
        }
        if let Some(kms_key) = &self.kms_key {
            metadata.insert(fields::KMS_KEY.into(), kms_key.clone());
        }
        if let Some(identity) = &self.identity {
            metadata.insert(fields::SERVICE_ACCOUNT.into(), identity.service_account.clone());
            metadata.insert(fields::KEY_ID.into(), identity.key_id.clone());
        }
        if let Some(wrapped) = &self.dek_wrapped {
            metadata.insert(fields::DEK_WRAPPED.into(), encode_binary(wrapped));
        }
        if let Some(wrapped) = &self.sign_key_wrapped {
            metadata.insert(fields::SIGN_KEY_WRAPPED.into(), encode_binary(wrapped));
        }
        if let Some(signature) = &self.signature {
            metadata.insert(fields::SIGNATURE.into(), encode_binary(signature));
        }
        metadata
    }

    /// Parse and check transport metadata.
    ///
    /// # Errors
    ///
    /// - `MissingField` when the scheme or a field it requires is absent
    /// - `Decode` for an unknown scheme, bad base64, an empty required value,
    ///   or a protocol field the scheme does not use
    pub fn parse(metadata: &Metadata) -> Result<Self, EnvelopeError> {
        let scheme_name = metadata
            .get(fields::SCHEME)
            .ok_or(EnvelopeError::MissingField(fields::SCHEME))?;
        let scheme: Scheme = scheme_name
            .parse()
            .map_err(|_| EnvelopeError::Decode(format!("unknown scheme {scheme_name:?}")))?;

        let required = scheme.required_fields();
        for field in fields::SCHEME_GOVERNED {
            match (required.contains(&field), metadata.get(field)) {
                (true, None) => return Err(EnvelopeError::MissingField(field)),
                (true, Some(value)) if value.is_empty() => {
                    return Err(EnvelopeError::Decode(format!("{field} is empty")))
                }
                (false, Some(_)) => {
                    return Err(EnvelopeError::Decode(format!(
                        "{field} is not used by scheme {scheme}"
                    )))
                }
                _ => {}
            }
        }

        let binary = |field: &str| -> Result<Option<Vec<u8>>, EnvelopeError> {
            metadata
                .get(field)
                .map(|value| decode_binary(field, value))
                .transpose()
        };

        let identity = match (metadata.get(fields::SERVICE_ACCOUNT), metadata.get(fields::KEY_ID)) {
            (Some(account), Some(key_id)) => Some(ServiceIdentity::new(account.clone(), key_id.clone())),
            _ => None,
        };

        Ok(Self {
            scheme,
            tenant: binary(fields::TENANT_ID)?,
            kms_key: metadata.get(fields::KMS_KEY).cloned(),
            identity,
            dek_wrapped: binary(fields::DEK_WRAPPED)?,
            sign_key_wrapped: binary(fields::SIGN_KEY_WRAPPED)?,
            signature: binary(fields::SIGNATURE)?,
        })
    }

    /// KMS key name, or `MissingField`.
    pub fn require_kms_key(&self) -> Result<&str, EnvelopeError> {
        self.kms_key
            .as_deref()
            .ok_or(EnvelopeError::MissingField(fields::KMS_KEY))
    }

    /// Service identity, or `MissingField`.
    pub fn require_identity(&self) -> Result<&ServiceIdentity, EnvelopeError> {
        self.identity
            .as_ref()
            .ok_or(EnvelopeError::MissingField(fields::SERVICE_ACCOUNT))
    }

    /// Wrapped DEK, or `MissingField`.
    pub fn require_dek_wrapped(&self) -> Result<&[u8], EnvelopeError> {
        self.dek_wrapped
            .as_deref()
            .ok_or(EnvelopeError::MissingField(fields::DEK_WRAPPED))
    }

    /// Wrapped MAC key, or `MissingField`.
    pub fn require_sign_key_wrapped(&self) -> Result<&[u8], EnvelopeError> {
        self.sign_key_wrapped
            .as_deref()
            .ok_or(EnvelopeError::MissingField(fields::SIGN_KEY_WRAPPED))
    }

    /// Tag or signature, or `MissingField`.
    pub fn require_signature(&self) -> Result<&[u8], EnvelopeError> {
        self.signature
            .as_deref()
            .ok_or(EnvelopeError::MissingField(fields::SIGNATURE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dek_header() -> EnvelopeHeader {
        EnvelopeHeader::new(Scheme::KmsDekEncrypt, b"tenantKey")
            .with_kms_key("projects/p/locations/l/keyRings/r/cryptoKeys/k1")
            .with_dek_wrapped(vec![1, 2, 3, 250])
    }

    #[test]
    fn test_metadata_roundtrip() {
        let header = dek_header();
        let metadata = header.to_metadata();

        assert_eq!(metadata.get(fields::TENANT_ID).unwrap(), "dGVuYW50S2V5");
        assert_eq!(metadata.get(fields::SCHEME).unwrap(), "kms_dek_encrypt");
        assert_eq!(EnvelopeHeader::parse(&metadata).unwrap(), header);
    }

    #[test]
    fn test_missing_required_field() {
        let mut metadata = dek_header().to_metadata();
        metadata.remove(fields::DEK_WRAPPED);

        assert_eq!(
            EnvelopeHeader::parse(&metadata).unwrap_err(),
            EnvelopeError::MissingField(fields::DEK_WRAPPED)
        );
    }

    #[test]
    fn test_missing_scheme() {
        let mut metadata = dek_header().to_metadata();
        metadata.remove(fields::SCHEME);
        assert_eq!(
            EnvelopeHeader::parse(&metadata).unwrap_err(),
            EnvelopeError::MissingField(fields::SCHEME)
        );
    }

    #[test]
    fn test_foreign_protocol_field_rejected() {
        let mut metadata = dek_header().to_metadata();
        metadata.insert(fields::SIGNATURE.into(), encode_binary(b"tag"));
        assert!(matches!(
            EnvelopeHeader::parse(&metadata),
            Err(EnvelopeError::Decode(_))
        ));
    }

    #[test]
    fn test_application_fields_ignored() {
        let mut metadata = dek_header().to_metadata();
        metadata.insert("a".into(), "aaa".into());
        assert_eq!(EnvelopeHeader::parse(&metadata).unwrap(), dek_header());
    }

    #[test]
    fn test_bad_base64() {
        let mut metadata = dek_header().to_metadata();
        metadata.insert(fields::DEK_WRAPPED.into(), "not base64!".into());
        assert!(matches!(
            EnvelopeHeader::parse(&metadata),
            Err(EnvelopeError::Decode(_))
        ));
    }

    #[test]
    fn test_empty_required_value() {
        let mut metadata = dek_header().to_metadata();
        metadata.insert(fields::KMS_KEY.into(), String::new());
        assert!(matches!(
            EnvelopeHeader::parse(&metadata),
            Err(EnvelopeError::Decode(_))
        ));
    }

    #[test]
    fn test_tenant_is_optional() {
        let mut metadata = dek_header().to_metadata();
        metadata.remove(fields::TENANT_ID);
        assert_eq!(EnvelopeHeader::parse(&metadata).unwrap().tenant, None);
    }

    #[test]
    fn test_identity_fields() {
        let identity = ServiceIdentity::new("svc@p.iam.gserviceaccount.com", "abc123");
        let header = EnvelopeHeader::new(Scheme::IdentitySign, b"t")
            .with_identity(identity.clone())
            .with_signature(vec![9; 256]);

        let parsed = EnvelopeHeader::parse(&header.to_metadata()).unwrap();
        assert_eq!(parsed.require_identity().unwrap(), &identity);
        assert_eq!(parsed.require_signature().unwrap().len(), 256);
        assert_eq!(
            parsed.require_kms_key().unwrap_err(),
            EnvelopeError::MissingField(fields::KMS_KEY)
        );
    }
}
