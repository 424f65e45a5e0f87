//! # Envelope Subscriber
//!
//! Per message: Receive, ResolveKey, Unprotect, Finalize.
//!
//! ## Checks Before Any Key Work
//!
//! 1. Metadata parses strictly for the scheme it names.
//! 2. That scheme is the configured one.
//! 3. A carried `tenant_id` equals the configured tenant tag
//!    (constant-time). The configured tag is what gets bound as AAD.
//! 4. The key identifier (`kms_key` or identity) is the expected one.
//!
//! ## Finalize
//!
//! Every failure becomes a nack. Nothing a message carries can stop
//! [`EnvelopeSubscriber::run`].

use crate::config::{EnvelopeConfig, Role};
use crate::domain::errors::{ConfigError, EnvelopeError};
use crate::domain::key_cache::{CacheStats, KeyCache};
use crate::domain::metadata::{decode_binary, EnvelopeHeader, ServiceIdentity};
use crate::domain::scheme::Scheme;
use crate::domain::session_key::SessionKey;
use crate::ports::inbound::EnvelopeSubscriberApi;
use crate::ports::outbound::CertificateDirectory;
use crate::service::gateway::KekGateway;
use crate::service::{lookup_public_key, Collaborators, KmsMode};
use async_trait::async_trait;
use envelope_bus::{Delivery, MessageId, Metadata, Subscription};
use envelope_crypto::{
    Algorithm, AlgorithmRegistry, IdentityVerifier, KeyMaterial, OwnPrivateKey, WrapCipher,
};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tokio::sync::Semaphore;
use tracing::{debug, info, trace, warn};

/// Upper bound on in-flight messages in [`EnvelopeSubscriber::run`].
pub const MAX_CONCURRENCY: usize = 1024;

enum Opening {
    SymmetricEncrypt(SessionKey),
    SymmetricSign(SessionKey),
    IdentityEncrypt {
        identity: ServiceIdentity,
        own: OwnPrivateKey,
        wrap: WrapCipher,
    },
    IdentitySign {
        directory: Arc<dyn CertificateDirectory>,
        peer: Option<ServiceIdentity>,
        timeout: Duration,
    },
    Kms {
        mode: KmsMode,
        gateway: KekGateway,
        kms_key: String,
    },
}

/// How a cache miss is unwrapped.
enum KeyUnwrapper<'a> {
    Kek {
        gateway: &'a KekGateway,
        kms_key: &'a str,
    },
    Identity {
        wrap: &'a WrapCipher,
        own: &'a OwnPrivateKey,
    },
}

/// Result of handling one delivery.
#[derive(Debug)]
pub enum Outcome {
    /// Recovered (or verified) payload; the delivery is acknowledged.
    Ack(Vec<u8>),
    /// Why the delivery was rejected; it is negatively acknowledged.
    Nack(EnvelopeError),
}

impl Outcome {
    /// Whether the delivery was acknowledged.
    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack(_))
    }
}

/// Ack/nack counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    /// Messages acknowledged
    pub acked: u64,
    /// Messages negatively acknowledged
    pub nacked: u64,
}

/// Subscriber half of the envelope protocol.
pub struct EnvelopeSubscriber {
    scheme: Scheme,
    tenant: Vec<u8>,
    registry: AlgorithmRegistry,
    opening: Opening,
    cache: KeyCache<SessionKey>,
    acked: AtomicU64,
    nacked: AtomicU64,
}

impl EnvelopeSubscriber {
    /// Build a subscriber for `config.scheme`.
    ///
    /// # Errors
    /// * `Configuration` - missing setting or collaborator
    /// * `RemoteKeyService` - KMS failure while unwrapping a shared key
    pub async fn new(config: &EnvelopeConfig, collaborators: Collaborators) -> Result<Self, EnvelopeError> {
        config.validate(Role::Subscriber)?;
        let tenant = config.tenant_tag();
        let Collaborators {
            registry,
            gateway,
            directory,
            identity_key,
        } = collaborators;

        let opening = match config.scheme {
            Scheme::SymmetricEncrypt => {
                let material = config
                    .key_source()?
                    .resolve(Algorithm::Aes256Gcm, gateway.as_ref(), &tenant)
                    .await?;
                Opening::SymmetricEncrypt(SessionKey::from_material(&registry, material)?)
            }
            Scheme::SymmetricSign => {
                let material = config
                    .key_source()?
                    .resolve(Algorithm::HmacSha256, gateway.as_ref(), &tenant)
                    .await?;
                Opening::SymmetricSign(SessionKey::from_material(&registry, material)?)
            }
            Scheme::IdentityEncrypt => Opening::IdentityEncrypt {
                identity: config.require_identity()?.clone(),
                own: identity_key.ok_or(ConfigError::MissingCollaborator("identity key"))?,
                wrap: WrapCipher::new(&registry)?,
            },
            Scheme::IdentitySign => {
                registry.ensure(Algorithm::RsaPkcs1Sha256)?;
                Opening::IdentitySign {
                    directory: directory
                        .ok_or(ConfigError::MissingCollaborator("certificate directory"))?,
                    peer: config.peer.clone(),
                    timeout: config.kms_timeout,
                }
            }
            scheme @ (Scheme::KmsEncrypt
            | Scheme::KmsSign
            | Scheme::KmsDekEncrypt
            | Scheme::KmsDekSign) => {
                Opening::Kms {
                    mode: KmsMode::of(scheme).ok_or_else(|| ConfigError::Invalid {
                        field: "ENVELOPE_SCHEME",
                        reason: format!("{scheme} is not a KMS scheme"),
                    })?,
                    gateway: gateway.ok_or(ConfigError::MissingCollaborator("KEK gateway"))?,
                    kms_key: config.require_kms_key()?.to_string(),
                }
            }
        };

        info!(
            scheme = %config.scheme,
            cache_capacity = config.cache.capacity,
            cache_ttl_secs = config.cache.ttl.as_secs(),
            "Envelope subscriber ready"
        );
        Ok(Self {
            scheme: config.scheme,
            tenant,
            registry,
            opening,
            cache: KeyCache::new(config.cache),
            acked: AtomicU64::new(0),
            nacked: AtomicU64::new(0),
        })
    }

    /// Scheme in use.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Ack/nack counts so far.
    pub fn stats(&self) -> SubscriberStats {
        SubscriberStats {
            acked: self.acked.load(Ordering::Relaxed),
            nacked: self.nacked.load(Ordering::Relaxed),
        }
    }

    /// Key cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Open one delivery without settling it.
    pub async fn handle(&self, delivery: &Delivery) -> Outcome {
        match self.open(delivery.payload(), delivery.metadata()).await {
            Ok(payload) => {
                trace!(message_id = %delivery.id(), payload_len = payload.len(), "Message opened");
                Outcome::Ack(payload)
            }
            Err(err) => {
                warn!(
                    message_id = %delivery.id(),
                    scheme = %self.scheme,
                    attempt = delivery.attempt(),
                    kind = ?err.kind(),
                    retryable = err.is_retryable(),
                    error = %err,
                    "Rejecting message"
                );
                Outcome::Nack(err)
            }
        }
    }

    /// Open one delivery and ack or nack it.
    pub async fn process(&self, delivery: Delivery) -> Outcome {
        let outcome = self.handle(&delivery).await;
        if outcome.is_ack() {
            self.acked.fetch_add(1, Ordering::Relaxed);
            delivery.ack();
        } else {
            self.nacked.fetch_add(1, Ordering::Relaxed);
            delivery.nack();
        }
        outcome
    }

    /// Consume `subscription` until it ends, with up to `concurrency`
    /// messages in flight.
    ///
    /// `on_message` receives every acknowledged payload. Returns once the
    /// subscription is closed and drained and every spawned handler has
    /// finished.
    pub async fn run<F>(self: Arc<Self>, subscription: Subscription, concurrency: usize, on_message: F)
    where
        F: Fn(MessageId, Vec<u8>) + Send + Sync + 'static,
    {
        let concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let on_message = Arc::new(on_message);
        info!(scheme = %self.scheme, concurrency, "Subscriber loop started");

        while let Some(delivery) = subscription.recv().await {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let this = self.clone();
            let on_message = on_message.clone();
            tokio::spawn(async move {
                let id = delivery.id();
                if let Outcome::Ack(payload) = this.process(delivery).await {
                    on_message(id, payload);
                }
                drop(permit);
            });
        }

        // Wait for in-flight handlers.
        match semaphore.acquire_many(concurrency as u32).await {
            Ok(_drained) => {}
            Err(err) => warn!(error = %err, "Could not wait for in-flight handlers"),
        }
        let stats = self.stats();
        info!(acked = stats.acked, nacked = stats.nacked, "Subscriber loop finished");
    }

    fn check_tenant(&self, header: &EnvelopeHeader) -> Result<(), EnvelopeError> {
        match &header.tenant {
            Some(carried) if !bool::from(carried.as_slice().ct_eq(&self.tenant)) => Err(
                EnvelopeError::AuthenticationFailure("tenant tag does not match".into()),
            ),
            _ => Ok(()),
        }
    }

    /// Cached session key for `wrapped`, unwrapping on a miss.
    async fn resolve_key(
        &self,
        wrapped: &[u8],
        algorithm: Algorithm,
        unwrapper: KeyUnwrapper<'_>,
    ) -> Result<SessionKey, EnvelopeError> {
        if let Some(key) = self.cache.get(wrapped) {
            return Ok(key);
        }

        let bytes = match unwrapper {
            KeyUnwrapper::Kek { gateway, kms_key } => {
                gateway.unwrap(wrapped, kms_key, &self.tenant).await?
            }
            KeyUnwrapper::Identity { wrap, own } => wrap.decrypt(wrapped, own)?,
        };
        let key = SessionKey::from_material(&self.registry, KeyMaterial::from_bytes(algorithm, &bytes)?)?;
        self.cache.put(wrapped, key.clone());
        debug!(key = %key.info(), "Session key unwrapped and cached");
        Ok(key)
    }
}

fn expect_kms_key(header: &EnvelopeHeader, configured: &str) -> Result<(), EnvelopeError> {
    let carried = header.require_kms_key()?;
    if carried == configured {
        Ok(())
    } else {
        Err(EnvelopeError::KeyIdentifierMismatch {
            expected: configured.to_string(),
            actual: carried.to_string(),
        })
    }
}

fn verified(ok: bool, payload: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    if ok {
        Ok(payload.to_vec())
    } else {
        Err(EnvelopeError::AuthenticationFailure("signature does not match payload".into()))
    }
}

#[async_trait]
impl EnvelopeSubscriberApi for EnvelopeSubscriber {
    async fn open(&self, payload: &[u8], metadata: &Metadata) -> Result<Vec<u8>, EnvelopeError> {
        let header = EnvelopeHeader::parse(metadata)?;
        if header.scheme != self.scheme {
            return Err(EnvelopeError::AuthenticationFailure(format!(
                "scheme {} does not match configured {}",
                header.scheme, self.scheme
            )));
        }
        self.check_tenant(&header)?;

        match &self.opening {
            Opening::SymmetricEncrypt(key) => Ok(key.aead()?.decrypt(payload, &self.tenant)?),
            Opening::SymmetricSign(key) => {
                let ok = key.mac()?.verify(payload, header.require_signature()?)?;
                verified(ok, payload)
            }
            Opening::IdentityEncrypt {
                identity,
                own,
                wrap,
            } => {
                let claimed = header.require_identity()?;
                if claimed != identity {
                    return Err(EnvelopeError::KeyIdentifierMismatch {
                        expected: identity.to_string(),
                        actual: claimed.to_string(),
                    });
                }
                let key = self
                    .resolve_key(
                        header.require_dek_wrapped()?,
                        Algorithm::Aes256Gcm,
                        KeyUnwrapper::Identity { wrap, own },
                    )
                    .await?;
                Ok(key.aead()?.decrypt(payload, &self.tenant)?)
            }
            Opening::IdentitySign {
                directory,
                peer,
                timeout,
            } => {
                let signer = header.require_identity()?;
                if let Some(peer) = peer {
                    if signer != peer {
                        return Err(EnvelopeError::KeyIdentifierMismatch {
                            expected: peer.to_string(),
                            actual: signer.to_string(),
                        });
                    }
                }
                let public_key = lookup_public_key(directory.as_ref(), signer, *timeout).await?;
                let verifier = IdentityVerifier::new(&self.registry, &public_key)?;
                let ok = verifier.verify(payload, header.require_signature()?)?;
                verified(ok, payload)
            }
            Opening::Kms {
                mode,
                gateway,
                kms_key,
            } => {
                expect_kms_key(&header, kms_key)?;
                match mode {
                    KmsMode::Encrypt => {
                        let text = std::str::from_utf8(payload)
                            .map_err(|_| EnvelopeError::Decode("payload is not base64 text".into()))?;
                        let ciphertext = decode_binary("payload", text)?;
                        gateway.decrypt(&ciphertext, kms_key, &self.tenant).await
                    }
                    KmsMode::Sign => {
                        let digest = Sha256::digest(payload);
                        let ok = gateway
                            .mac_verify(&digest, header.require_signature()?, kms_key)
                            .await?;
                        verified(ok, payload)
                    }
                    KmsMode::DekEncrypt => {
                        let key = self
                            .resolve_key(
                                header.require_dek_wrapped()?,
                                Algorithm::Aes256Gcm,
                                KeyUnwrapper::Kek { gateway, kms_key },
                            )
                            .await?;
                        Ok(key.aead()?.decrypt(payload, &self.tenant)?)
                    }
                    KmsMode::DekSign => {
                        let key = self
                            .resolve_key(
                                header.require_sign_key_wrapped()?,
                                Algorithm::HmacSha256,
                                KeyUnwrapper::Kek { gateway, kms_key },
                            )
                            .await?;
                        let ok = key.mac()?.verify(payload, header.require_signature()?)?;
                        verified(ok, payload)
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for EnvelopeSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeSubscriber")
            .field("scheme", &self.scheme)
            .field("cache", &self.cache)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
