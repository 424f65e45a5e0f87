//! # Envelope Configuration
//!
//! One struct for both roles. Defaults cover timeouts, cache bounds and
//! rotation; keys, identities and the tenant must be supplied.
//!
//! ## Environment
//!
//! | Variable | Field |
//! |----------|-------|
//! | `ENVELOPE_SCHEME` | `scheme` (e.g. `kms_dek_encrypt`) |
//! | `ENVELOPE_TENANT_ID` | `tenant_id` |
//! | `ENVELOPE_KMS_KEY` | `kms_key` |
//! | `ENVELOPE_SHARED_KEY` | `shared_key` (base64) |
//! | `ENVELOPE_SHARED_KEY_WRAPPED` | `shared_key_wrapped` (base64, under `kms_key`) |
//! | `ENVELOPE_SHARED_PASSPHRASE` / `ENVELOPE_SHARED_SALT` | `shared_passphrase`, `shared_salt` (base64, ≥ 16 bytes) |
//! | `ENVELOPE_SERVICE_ACCOUNT` / `ENVELOPE_KEY_ID` | `identity` |
//! | `ENVELOPE_PEER_SERVICE_ACCOUNT` / `ENVELOPE_PEER_KEY_ID` | `peer` |
//! | `ENVELOPE_CACHE_CAPACITY` / `ENVELOPE_CACHE_TTL_SECS` | `cache` |
//! | `ENVELOPE_ROTATE_AFTER_MESSAGES` / `ENVELOPE_ROTATE_AFTER_SECS` | `rotation` |
//! | `ENVELOPE_KMS_TIMEOUT_MS` | `kms_timeout` |

use crate::domain::errors::ConfigError;
use crate::domain::key_cache::{KeyCacheConfig, MAX_CACHE_TTL};
use crate::domain::key_source::KeySource;
use crate::domain::metadata::{decode_binary, ServiceIdentity};
use crate::domain::rotation::RotationPolicy;
use crate::domain::scheme::Scheme;
use crate::service::gateway::DEFAULT_KMS_TIMEOUT;
use envelope_crypto::PasswordKdf;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use zeroize::Zeroizing;

/// Which side of the channel a configuration is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Protects and publishes.
    Publisher,
    /// Receives and opens.
    Subscriber,
}

/// Envelope protocol settings.
#[derive(Clone)]
pub struct EnvelopeConfig {
    /// Protection scheme.
    pub scheme: Scheme,
    /// Tenant tag, bound as associated data.
    pub tenant_id: String,
    /// KMS master key resource name.
    pub kms_key: Option<String>,
    /// Pre-shared key, base64.
    pub shared_key: Option<Zeroizing<String>>,
    /// Pre-shared key wrapped under `kms_key`, base64.
    pub shared_key_wrapped: Option<String>,
    /// Passphrase the pre-shared key is derived from.
    pub shared_passphrase: Option<Zeroizing<String>>,
    /// PBKDF2 salt for `shared_passphrase`, base64.
    pub shared_salt: Option<String>,
    /// This process's service identity.
    pub identity: Option<ServiceIdentity>,
    /// The other side's identity: recipient for identity encryption,
    /// expected signer for identity signatures.
    pub peer: Option<ServiceIdentity>,
    /// Receiver key cache bounds.
    pub cache: KeyCacheConfig,
    /// Publisher key rotation.
    pub rotation: RotationPolicy,
    /// Bound on each KMS call.
    pub kms_timeout: Duration,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            scheme: Scheme::KmsDekEncrypt,
            tenant_id: String::new(),
            kms_key: None,
            shared_key: None,
            shared_key_wrapped: None,
            shared_passphrase: None,
            shared_salt: None,
            identity: None,
            peer: None,
            cache: KeyCacheConfig::default(),
            rotation: RotationPolicy::default(),
            kms_timeout: DEFAULT_KMS_TIMEOUT,
        }
    }
}

impl fmt::Debug for EnvelopeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeConfig")
            .field("scheme", &self.scheme)
            .field("tenant_id", &self.tenant_id)
            .field("kms_key", &self.kms_key)
            .field("shared_key", &self.shared_key.as_ref().map(|_| "[REDACTED]"))
            .field("shared_key_wrapped", &self.shared_key_wrapped.is_some())
            .field("shared_passphrase", &self.shared_passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("shared_salt", &self.shared_salt)
            .field("identity", &self.identity)
            .field("peer", &self.peer)
            .field("cache", &self.cache)
            .field("rotation", &self.rotation)
            .field("kms_timeout", &self.kms_timeout)
            .finish()
    }
}

impl EnvelopeConfig {
    /// Defaults overridden from `ENVELOPE_*` environment variables.
    ///
    /// # Errors
    ///
    /// `Invalid` for values that do not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// `Invalid` for values that do not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(scheme) = lookup("ENVELOPE_SCHEME") {
            config.scheme = scheme.parse()?;
        }
        if let Some(tenant) = lookup("ENVELOPE_TENANT_ID") {
            config.tenant_id = tenant;
        }
        config.kms_key = lookup("ENVELOPE_KMS_KEY");
        config.shared_key = lookup("ENVELOPE_SHARED_KEY").map(Zeroizing::new);
        config.shared_key_wrapped = lookup("ENVELOPE_SHARED_KEY_WRAPPED");
        config.shared_passphrase = lookup("ENVELOPE_SHARED_PASSPHRASE").map(Zeroizing::new);
        config.shared_salt = lookup("ENVELOPE_SHARED_SALT");
        config.identity = identity_from(&lookup, "ENVELOPE_SERVICE_ACCOUNT", "ENVELOPE_KEY_ID");
        config.peer = identity_from(&lookup, "ENVELOPE_PEER_SERVICE_ACCOUNT", "ENVELOPE_PEER_KEY_ID");

        if let Some(capacity) = parse_var(&lookup, "ENVELOPE_CACHE_CAPACITY")? {
            config.cache.capacity = capacity;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "ENVELOPE_CACHE_TTL_SECS")? {
            config.cache.ttl = Duration::from_secs(secs);
        }
        if let Some(messages) = parse_var(&lookup, "ENVELOPE_ROTATE_AFTER_MESSAGES")? {
            config.rotation.max_messages = Some(messages);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "ENVELOPE_ROTATE_AFTER_SECS")? {
            config.rotation.max_age = Some(Duration::from_secs(secs));
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "ENVELOPE_KMS_TIMEOUT_MS")? {
            config.kms_timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Check that everything `role` needs for the selected scheme is present.
    ///
    /// # Errors
    ///
    /// `Missing` or `Invalid` naming the offending setting.
    pub fn validate(&self, role: Role) -> Result<(), ConfigError> {
        if self.tenant_id.is_empty() {
            return Err(ConfigError::Missing("ENVELOPE_TENANT_ID"));
        }
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "ENVELOPE_CACHE_CAPACITY",
                reason: "must be at least 1".into(),
            });
        }
        if self.cache.ttl.is_zero() {
            return Err(ConfigError::Invalid {
                field: "ENVELOPE_CACHE_TTL_SECS",
                reason: "must be positive".into(),
            });
        }
        if self.cache.ttl > MAX_CACHE_TTL {
            return Err(ConfigError::Invalid {
                field: "ENVELOPE_CACHE_TTL_SECS",
                reason: format!("must be at most {}", MAX_CACHE_TTL.as_secs()),
            });
        }
        if self.kms_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "ENVELOPE_KMS_TIMEOUT_MS",
                reason: "must be positive".into(),
            });
        }
        if self.rotation.max_messages == Some(0) {
            return Err(ConfigError::Invalid {
                field: "ENVELOPE_ROTATE_AFTER_MESSAGES",
                reason: "must be at least 1".into(),
            });
        }

        if self.scheme.uses_kms() {
            self.require_kms_key()?;
        }
        if self.scheme.uses_shared_key() {
            // A generated key is only usable by the side that generated it.
            let source = self.key_source()?;
            if role == Role::Subscriber && matches!(source, KeySource::Generated) {
                return Err(ConfigError::Missing("ENVELOPE_SHARED_KEY"));
            }
        }
        match (self.scheme, role) {
            (Scheme::IdentityEncrypt, Role::Publisher) => {
                self.require_peer()?;
            }
            (Scheme::IdentityEncrypt, Role::Subscriber) | (Scheme::IdentitySign, Role::Publisher) => {
                self.require_identity()?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Tenant tag bytes.
    pub fn tenant_tag(&self) -> Vec<u8> {
        self.tenant_id.as_bytes().to_vec()
    }

    /// Where the pre-shared key comes from.
    ///
    /// # Errors
    ///
    /// `Invalid` for bad base64, a wrapped key without a KMS key, a weak
    /// salt, or more than one key setting; `Missing` for a passphrase
    /// without a salt.
    pub fn key_source(&self) -> Result<KeySource, ConfigError> {
        if let Some(passphrase) = &self.shared_passphrase {
            if self.shared_key.is_some() || self.shared_key_wrapped.is_some() {
                return Err(ConfigError::Invalid {
                    field: "ENVELOPE_SHARED_PASSPHRASE",
                    reason: "cannot be combined with ENVELOPE_SHARED_KEY or ENVELOPE_SHARED_KEY_WRAPPED"
                        .into(),
                });
            }
            let salt = self
                .shared_salt
                .as_deref()
                .ok_or(ConfigError::Missing("ENVELOPE_SHARED_SALT"))?;
            let invalid_salt = |reason: String| ConfigError::Invalid {
                field: "ENVELOPE_SHARED_SALT",
                reason,
            };
            let salt = decode_binary("ENVELOPE_SHARED_SALT", salt).map_err(|e| invalid_salt(e.to_string()))?;
            let kdf = PasswordKdf::new(&salt).map_err(|e| invalid_salt(e.to_string()))?;
            return Ok(KeySource::Passphrase {
                passphrase: passphrase.clone(),
                kdf,
            });
        }

        match (&self.shared_key, &self.shared_key_wrapped) {
            (Some(_), Some(_)) => Err(ConfigError::Invalid {
                field: "ENVELOPE_SHARED_KEY_WRAPPED",
                reason: "set either ENVELOPE_SHARED_KEY or ENVELOPE_SHARED_KEY_WRAPPED".into(),
            }),
            (Some(key), None) => decode_binary("ENVELOPE_SHARED_KEY", key)
                .map(KeySource::imported)
                .map_err(|e| ConfigError::Invalid {
                    field: "ENVELOPE_SHARED_KEY",
                    reason: e.to_string(),
                }),
            (None, Some(wrapped)) => {
                let kms_key = self.require_kms_key()?.to_string();
                let wrapped = decode_binary("ENVELOPE_SHARED_KEY_WRAPPED", wrapped).map_err(|e| {
                    ConfigError::Invalid {
                        field: "ENVELOPE_SHARED_KEY_WRAPPED",
                        reason: e.to_string(),
                    }
                })?;
                Ok(KeySource::KmsWrapped { kms_key, wrapped })
            }
            (None, None) => Ok(KeySource::Generated),
        }
    }

    /// KMS key name.
    ///
    /// # Errors
    ///
    /// `Missing` if unset or empty.
    pub fn require_kms_key(&self) -> Result<&str, ConfigError> {
        self.kms_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::Missing("ENVELOPE_KMS_KEY"))
    }

    /// Own identity.
    ///
    /// # Errors
    ///
    /// `Missing` if unset.
    pub fn require_identity(&self) -> Result<&ServiceIdentity, ConfigError> {
        self.identity
            .as_ref()
            .ok_or(ConfigError::Missing("ENVELOPE_SERVICE_ACCOUNT"))
    }

    /// Peer identity.
    ///
    /// # Errors
    ///
    /// `Missing` if unset.
    pub fn require_peer(&self) -> Result<&ServiceIdentity, ConfigError> {
        self.peer
            .as_ref()
            .ok_or(ConfigError::Missing("ENVELOPE_PEER_SERVICE_ACCOUNT"))
    }
}

fn identity_from(
    lookup: &impl Fn(&str) -> Option<String>,
    account_var: &str,
    key_id_var: &str,
) -> Option<ServiceIdentity> {
    let account = lookup(account_var)?;
    let key_id = lookup(key_id_var)?;
    Some(ServiceIdentity::new(account, key_id))
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: fmt::Display,
{
    lookup(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                field: name,
                reason: e.to_string(),
            })
        })
        .transpose()
}
