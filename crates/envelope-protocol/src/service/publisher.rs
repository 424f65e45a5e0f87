//! # Envelope Publisher
//!
//! Per message: SelectKey, WrapKey, ProtectPayload, Emit.
//!
//! ## Session Keys
//!
//! Rotating schemes keep one active key (with its wrapped form) behind an
//! async mutex. Concurrent publishes share the key until the rotation
//! policy retires it, and only one of them performs the rotation. Reusing
//! the wrapped form means no KMS call between rotations.

use crate::config::{EnvelopeConfig, Role};
use crate::domain::errors::{ConfigError, EnvelopeError};
use crate::domain::metadata::{encode_binary, EnvelopeHeader, ServiceIdentity};
use crate::domain::rotation::{ActiveKey, RotationPolicy};
use crate::domain::scheme::Scheme;
use crate::domain::session_key::SessionKey;
use crate::ports::inbound::EnvelopePublisherApi;
use crate::service::gateway::KekGateway;
use crate::service::{lookup_public_key, Collaborators, KmsMode};
use async_trait::async_trait;
use envelope_bus::{MessageId, Transport};
use envelope_crypto::{
    Algorithm, AlgorithmRegistry, IdentitySigner, KeyMaterial, RecipientPublicKey, WrapCipher,
};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

enum Protection {
    SymmetricEncrypt(SessionKey),
    SymmetricSign(SessionKey),
    IdentityEncrypt {
        recipient: ServiceIdentity,
        public_key: RecipientPublicKey,
        wrap: WrapCipher,
    },
    IdentitySign {
        identity: ServiceIdentity,
        signer: IdentitySigner,
    },
    Kms {
        mode: KmsMode,
        gateway: KekGateway,
        kms_key: String,
    },
}

/// How a freshly generated session key is wrapped.
enum KeyWrapper<'a> {
    Kek {
        gateway: &'a KekGateway,
        kms_key: &'a str,
    },
    Recipient {
        wrap: &'a WrapCipher,
        public_key: &'a RecipientPublicKey,
    },
}

/// Publisher half of the envelope protocol.
pub struct EnvelopePublisher {
    scheme: Scheme,
    tenant: Vec<u8>,
    registry: AlgorithmRegistry,
    protection: Protection,
    rotation: RotationPolicy,
    active: Mutex<Option<ActiveKey>>,
    transport: Arc<dyn Transport>,
    published: AtomicU64,
    rotations: AtomicU64,
}

impl EnvelopePublisher {
    /// Build a publisher for `config.scheme`.
    ///
    /// Shared keys are resolved and recipient certificates fetched here,
    /// once.
    ///
    /// # Errors
    /// * `Configuration` - missing setting or collaborator
    /// * `RemoteKeyService` - KMS or directory failure while resolving keys
    pub async fn new(
        config: &EnvelopeConfig,
        collaborators: Collaborators,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, EnvelopeError> {
        config.validate(Role::Publisher)?;
        let tenant = config.tenant_tag();
        let Collaborators {
            registry,
            gateway,
            directory,
            identity_key,
        } = collaborators;

        let protection = match config.scheme {
            Scheme::SymmetricEncrypt | Scheme::SymmetricSign => {
                let algorithm = if config.scheme == Scheme::SymmetricEncrypt {
                    Algorithm::Aes256Gcm
                } else {
                    Algorithm::HmacSha256
                };
                let material = config
                    .key_source()?
                    .resolve(algorithm, gateway.as_ref(), &tenant)
                    .await?;
                let key = SessionKey::from_material(&registry, material)?;
                if config.scheme == Scheme::SymmetricEncrypt {
                    Protection::SymmetricEncrypt(key)
                } else {
                    Protection::SymmetricSign(key)
                }
            }
            Scheme::IdentityEncrypt => {
                let recipient = config.require_peer()?.clone();
                let directory =
                    directory.ok_or(ConfigError::MissingCollaborator("certificate directory"))?;
                let public_key =
                    lookup_public_key(directory.as_ref(), &recipient, config.kms_timeout).await?;
                Protection::IdentityEncrypt {
                    recipient,
                    public_key,
                    wrap: WrapCipher::new(&registry)?,
                }
            }
            Scheme::IdentitySign => {
                let own = identity_key.ok_or(ConfigError::MissingCollaborator("identity key"))?;
                Protection::IdentitySign {
                    identity: config.require_identity()?.clone(),
                    signer: IdentitySigner::new(&registry, &own)?,
                }
            }
            scheme @ (Scheme::KmsEncrypt
            | Scheme::KmsSign
            | Scheme::KmsDekEncrypt
            | Scheme::KmsDekSign) => Protection::Kms {
                mode: KmsMode::of(scheme).ok_or_else(|| ConfigError::Invalid {
                    field: "ENVELOPE_SCHEME",
                    reason: format!("{scheme} is not a KMS scheme"),
                })?,
                gateway: gateway.ok_or(ConfigError::MissingCollaborator("KEK gateway"))?,
                kms_key: config.require_kms_key()?.to_string(),
            },
        };

        info!(scheme = %config.scheme, "Envelope publisher ready");
        Ok(Self {
            scheme: config.scheme,
            tenant,
            registry,
            protection,
            rotation: config.rotation,
            active: Mutex::new(None),
            transport,
            published: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
        })
    }

    /// Scheme in use.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Messages published so far.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Session keys generated so far.
    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    /// Protect `payload` without publishing it.
    ///
    /// # Returns
    /// The bytes to put on the wire and the header to attach.
    pub async fn protect(&self, payload: &[u8]) -> Result<(Vec<u8>, EnvelopeHeader), EnvelopeError> {
        let header = EnvelopeHeader::new(self.scheme, &self.tenant);

        match &self.protection {
            Protection::SymmetricEncrypt(key) => {
                let body = key.aead()?.encrypt(payload, &self.tenant)?;
                Ok((body, header))
            }
            Protection::SymmetricSign(key) => {
                let tag = key.mac()?.sign(payload);
                Ok((payload.to_vec(), header.with_signature(tag.to_vec())))
            }
            Protection::IdentityEncrypt {
                recipient,
                public_key,
                wrap,
            } => {
                let wrapper = KeyWrapper::Recipient { wrap, public_key };
                let active = self.active_key(Algorithm::Aes256Gcm, wrapper).await?;
                let body = active.key.aead()?.encrypt(payload, &self.tenant)?;
                Ok((
                    body,
                    header
                        .with_identity(recipient.clone())
                        .with_dek_wrapped(active.wrapped.to_vec()),
                ))
            }
            Protection::IdentitySign { identity, signer } => {
                let signature = signer.sign(payload);
                Ok((
                    payload.to_vec(),
                    header.with_identity(identity.clone()).with_signature(signature),
                ))
            }
            Protection::Kms {
                mode,
                gateway,
                kms_key,
            } => {
                let header = header.with_kms_key(kms_key.as_str());
                match mode {
                    KmsMode::Encrypt => {
                        let ciphertext = gateway.encrypt(payload, kms_key, &self.tenant).await?;
                        Ok((encode_binary(&ciphertext).into_bytes(), header))
                    }
                    KmsMode::Sign => {
                        let digest = Sha256::digest(payload);
                        let tag = gateway.mac_sign(&digest, kms_key).await?;
                        Ok((payload.to_vec(), header.with_signature(tag)))
                    }
                    KmsMode::DekEncrypt => {
                        let wrapper = KeyWrapper::Kek { gateway, kms_key };
                        let active = self.active_key(Algorithm::Aes256Gcm, wrapper).await?;
                        let body = active.key.aead()?.encrypt(payload, &self.tenant)?;
                        Ok((body, header.with_dek_wrapped(active.wrapped.to_vec())))
                    }
                    KmsMode::DekSign => {
                        let wrapper = KeyWrapper::Kek { gateway, kms_key };
                        let active = self.active_key(Algorithm::HmacSha256, wrapper).await?;
                        let tag = active.key.mac()?.sign(payload);
                        Ok((
                            payload.to_vec(),
                            header
                                .with_sign_key_wrapped(active.wrapped.to_vec())
                                .with_signature(tag.to_vec()),
                        ))
                    }
                }
            }
        }
    }

    /// Current session key, rotating first if the policy says so.
    async fn active_key(
        &self,
        algorithm: Algorithm,
        wrapper: KeyWrapper<'_>,
    ) -> Result<ActiveKey, EnvelopeError> {
        let mut slot = self.active.lock().await;
        if let Some(active) = slot.as_mut() {
            if !active.is_due(&self.rotation) {
                active.record_use();
                return Ok(active.clone());
            }
        }

        let material = KeyMaterial::generate(algorithm)?;
        let wrapped = match wrapper {
            KeyWrapper::Kek { gateway, kms_key } => {
                gateway.wrap(material.as_bytes(), kms_key, &self.tenant).await?
            }
            KeyWrapper::Recipient { wrap, public_key } => {
                wrap.encrypt(material.as_bytes(), public_key)?
            }
        };
        let mut active = ActiveKey::new(SessionKey::from_material(&self.registry, material)?, wrapped);
        active.record_use();

        self.rotations.fetch_add(1, Ordering::Relaxed);
        info!(scheme = %self.scheme, key = %active.key.info(), "Rotated session key");
        *slot = Some(active.clone());
        Ok(active)
    }
}

#[async_trait]
impl EnvelopePublisherApi for EnvelopePublisher {
    async fn publish(&self, payload: &[u8]) -> Result<MessageId, EnvelopeError> {
        let (body, header) = self.protect(payload).await?;
        let id = self
            .transport
            .publish(body, header.to_metadata())
            .await
            .map_err(|e| EnvelopeError::Transport(e.to_string()))?;

        self.published.fetch_add(1, Ordering::Relaxed);
        debug!(message_id = %id, scheme = %self.scheme, payload_len = payload.len(), "Published protected message");
        Ok(id)
    }
}

impl std::fmt::Debug for EnvelopePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopePublisher")
            .field("scheme", &self.scheme)
            .field("rotation", &self.rotation)
            .field("published", &self.published())
            .finish_non_exhaustive()
    }
}
