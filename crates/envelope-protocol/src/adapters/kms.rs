//! # In-Memory KMS Adapter
//!
//! A process-local stand-in for a remote KMS, implementing [`KmsClient`].
//!
//! ## Keys
//!
//! Master keys are named by resource path
//! (`projects/p/locations/l/keyRings/r/cryptoKeys/k1`) and hold either an
//! AES-256-GCM encryption key or an HMAC-SHA-256 MAC key. Using a key for
//! the wrong purpose is `InvalidArgument`, as a real KMS would answer.
//!
//! ## Failure Injection
//!
//! - `set_unavailable(true)` fails every call with `Unavailable`
//! - `set_latency(Some(d))` delays every call by `d` (drives timeout tests)
//! - `deny(name)` fails calls on one key with `PermissionDenied`
//!
//! Every call is counted, including failed ones.

use crate::ports::outbound::{KmsClient, KmsError};
use async_trait::async_trait;
use envelope_crypto::{AeadCipher, Algorithm, AlgorithmRegistry, CryptoError, KeyMaterial, MacSigner};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

enum MasterKey {
    Encrypt(AeadCipher),
    Mac(MacSigner),
}

/// Number of calls per KMS operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KmsCallCounts {
    /// `Encrypt` calls
    pub encrypt: u64,
    /// `Decrypt` calls
    pub decrypt: u64,
    /// `MacSign` calls
    pub mac_sign: u64,
    /// `MacVerify` calls
    pub mac_verify: u64,
}

impl KmsCallCounts {
    /// Sum over all operations.
    pub fn total(&self) -> u64 {
        self.encrypt + self.decrypt + self.mac_sign + self.mac_verify
    }
}

#[derive(Default)]
struct Counters {
    encrypt: AtomicU64,
    decrypt: AtomicU64,
    mac_sign: AtomicU64,
    mac_verify: AtomicU64,
}

/// In-memory KMS.
pub struct InMemoryKms {
    registry: AlgorithmRegistry,
    keys: RwLock<HashMap<String, MasterKey>>,
    denied: RwLock<HashSet<String>>,
    unavailable: AtomicBool,
    latency: Mutex<Option<Duration>>,
    counters: Counters,
}

impl InMemoryKms {
    /// Empty KMS with every algorithm registered.
    pub fn new() -> Self {
        Self::with_registry(AlgorithmRegistry::init())
    }

    /// Empty KMS restricted to `registry`.
    pub fn with_registry(registry: AlgorithmRegistry) -> Self {
        Self {
            registry,
            keys: RwLock::new(HashMap::new()),
            denied: RwLock::new(HashSet::new()),
            unavailable: AtomicBool::new(false),
            latency: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    /// Create (or replace) an encryption master key.
    ///
    /// # Errors
    ///
    /// Fails if AES-256-GCM is not registered.
    pub fn create_encryption_key(&self, name: &str) -> Result<(), CryptoError> {
        let material = KeyMaterial::generate(Algorithm::Aes256Gcm)?;
        let cipher = AeadCipher::new(&self.registry, &material)?;
        self.keys.write().insert(name.to_string(), MasterKey::Encrypt(cipher));
        debug!(kms_key = name, "Created encryption key");
        Ok(())
    }

    /// Create (or replace) a MAC master key.
    ///
    /// # Errors
    ///
    /// Fails if HMAC-SHA-256 is not registered.
    pub fn create_mac_key(&self, name: &str) -> Result<(), CryptoError> {
        let signer = MacSigner::generate(&self.registry)?;
        self.keys.write().insert(name.to_string(), MasterKey::Mac(signer));
        debug!(kms_key = name, "Created MAC key");
        Ok(())
    }

    /// Delete a key; later calls on it fail with `NotFound`.
    pub fn destroy_key(&self, name: &str) -> bool {
        self.keys.write().remove(name).is_some()
    }

    /// Fail calls on `name` with `PermissionDenied`.
    pub fn deny(&self, name: &str) {
        self.denied.write().insert(name.to_string());
    }

    /// Fail every call with `Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every call.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Calls so far.
    pub fn calls(&self) -> KmsCallCounts {
        KmsCallCounts {
            encrypt: self.counters.encrypt.load(Ordering::SeqCst),
            decrypt: self.counters.decrypt.load(Ordering::SeqCst),
            mac_sign: self.counters.mac_sign.load(Ordering::SeqCst),
            mac_verify: self.counters.mac_verify.load(Ordering::SeqCst),
        }
    }

    async fn admit(&self, counter: &AtomicU64, key_name: &str) -> Result<(), KmsError> {
        counter.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(KmsError::Unavailable("injected outage".into()));
        }
        if self.denied.read().contains(key_name) {
            return Err(KmsError::PermissionDenied(key_name.to_string()));
        }
        Ok(())
    }

    fn with_key<T>(
        &self,
        key_name: &str,
        op: impl FnOnce(&MasterKey) -> Result<T, KmsError>,
    ) -> Result<T, KmsError> {
        let keys = self.keys.read();
        let key = keys
            .get(key_name)
            .ok_or_else(|| KmsError::NotFound(key_name.to_string()))?;
        op(key)
    }
}

impl Default for InMemoryKms {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryKms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryKms")
            .field("keys", &self.keys.read().len())
            .field("calls", &self.calls())
            .finish()
    }
}

fn wrong_purpose(key_name: &str, wanted: &str) -> KmsError {
    KmsError::InvalidArgument(format!("{key_name} is not a {wanted} key"))
}

#[async_trait]
impl KmsClient for InMemoryKms {
    async fn encrypt(&self, key_name: &str, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, KmsError> {
        self.admit(&self.counters.encrypt, key_name).await?;
        self.with_key(key_name, |key| match key {
            MasterKey::Encrypt(cipher) => cipher
                .encrypt(plaintext, aad)
                .map_err(|e| KmsError::InvalidArgument(e.to_string())),
            MasterKey::Mac(_) => Err(wrong_purpose(key_name, "encryption")),
        })
    }

    async fn decrypt(&self, key_name: &str, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, KmsError> {
        self.admit(&self.counters.decrypt, key_name).await?;
        self.with_key(key_name, |key| match key {
            MasterKey::Encrypt(cipher) => cipher
                .decrypt(ciphertext, aad)
                .map_err(|_| KmsError::InvalidCiphertext),
            MasterKey::Mac(_) => Err(wrong_purpose(key_name, "encryption")),
        })
    }

    async fn mac_sign(&self, key_name: &str, data: &[u8]) -> Result<Vec<u8>, KmsError> {
        self.admit(&self.counters.mac_sign, key_name).await?;
        self.with_key(key_name, |key| match key {
            MasterKey::Mac(signer) => Ok(signer.sign(data).to_vec()),
            MasterKey::Encrypt(_) => Err(wrong_purpose(key_name, "MAC")),
        })
    }

    async fn mac_verify(&self, key_name: &str, data: &[u8], tag: &[u8]) -> Result<bool, KmsError> {
        self.admit(&self.counters.mac_verify, key_name).await?;
        self.with_key(key_name, |key| match key {
            // A malformed tag simply does not verify.
            MasterKey::Mac(signer) => Ok(signer.verify(data, tag).unwrap_or(false)),
            MasterKey::Encrypt(_) => Err(wrong_purpose(key_name, "MAC")),
        })
    }
}
