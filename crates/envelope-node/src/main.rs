//! # Envelope Node
//!
//! Demo entry point for the envelope protocol.
//!
//! ## Wiring
//!
//! ```text
//! EnvelopePublisher ──publish──→ InMemoryPubSub ──recv──→ EnvelopeSubscriber
//!        │                                                      │
//!        └──────── InMemoryKms / StaticCertificateDirectory ────┘
//! ```
//!
//! ## Startup Sequence
//!
//! 1. Install the log subscriber (`ENVELOPE_LOG`, then `RUST_LOG`)
//! 2. Load `ENVELOPE_*` configuration
//! 3. Create KMS master keys, identity key pairs and a shared key
//! 4. For each scheme (or only `ENVELOPE_SCHEME` when set), publish the
//!    reference message and consume it with the subscriber loop

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

use envelope_bus::InMemoryPubSub;
use envelope_crypto::{AlgorithmRegistry, OwnPrivateKey};
use envelope_protocol::domain::metadata::encode_binary;
use envelope_protocol::{
    Collaborators, EnvelopeConfig, EnvelopePublisher, EnvelopePublisherApi, EnvelopeSubscriber,
    InMemoryKms, KekGateway, Scheme, ServiceIdentity, StaticCertificateDirectory,
};

/// KEK used when `ENVELOPE_KMS_KEY` is unset.
const DEFAULT_KEK: &str = "projects/p/locations/l/keyRings/r/cryptoKeys/k1";
/// MAC master key for `kms_sign`.
const DEFAULT_MAC_KEY: &str = "projects/p/locations/l/keyRings/r/cryptoKeys/mac";
const DEFAULT_TENANT: &str = "tenantKey";
const DEFAULT_CONCURRENCY: usize = 8;
const RSA_BITS: usize = 2048;

/// The reference message body.
#[derive(Serialize)]
struct DemoMessage {
    data: String,
    attributes: BTreeMap<String, String>,
}

impl DemoMessage {
    fn reference() -> Self {
        Self {
            data: "foo".into(),
            attributes: BTreeMap::from([("a".to_string(), "aaa".to_string())]),
        }
    }
}

/// One side of the channel: its identity and RSA key.
struct Party {
    identity: ServiceIdentity,
    key: OwnPrivateKey,
}

impl Party {
    fn generate(service_account: &str, key_id: &str) -> Result<Self> {
        let key = OwnPrivateKey::generate(RSA_BITS)
            .with_context(|| format!("Failed to generate RSA key for {service_account}"))?;
        Ok(Self {
            identity: ServiceIdentity::new(service_account, key_id),
            key,
        })
    }
}

/// Shared infrastructure for every round trip.
struct NodeRuntime {
    base: EnvelopeConfig,
    kms: Arc<InMemoryKms>,
    directory: Arc<StaticCertificateDirectory>,
    publisher: Party,
    subscriber: Party,
    shared_key: Zeroizing<String>,
    concurrency: usize,
}

impl NodeRuntime {
    /// Create master keys, key pairs and the certificate directory.
    fn new(base: EnvelopeConfig, concurrency: usize) -> Result<Self> {
        let kms = Arc::new(InMemoryKms::new());
        let kek = base.kms_key.clone().unwrap_or_else(|| DEFAULT_KEK.to_string());
        kms.create_encryption_key(&kek)
            .context("Failed to create KEK")?;
        kms.create_mac_key(DEFAULT_MAC_KEY)
            .context("Failed to create MAC master key")?;

        let publisher = match &base.identity {
            Some(identity) => Party::generate(&identity.service_account, &identity.key_id)?,
            None => Party::generate("publisher@p.iam.example", "publisher-key")?,
        };
        let subscriber = match &base.peer {
            Some(peer) => Party::generate(&peer.service_account, &peer.key_id)?,
            None => Party::generate("subscriber@p.iam.example", "subscriber-key")?,
        };

        let directory = Arc::new(StaticCertificateDirectory::new());
        directory.insert(publisher.identity.clone(), publisher.key.public_key());
        directory.insert(subscriber.identity.clone(), subscriber.key.public_key());

        let shared_key = base
            .shared_key
            .clone()
            .unwrap_or_else(|| Zeroizing::new(encode_binary(&rand::random::<[u8; 32]>())));

        info!(kms_key = %kek, concurrency, "Node runtime initialized");
        Ok(Self {
            base,
            kms,
            directory,
            publisher,
            subscriber,
            shared_key,
            concurrency,
        })
    }

    /// Configuration for one side, filled in with demo defaults.
    fn config_for(&self, scheme: Scheme, party: &Party, other: &Party) -> EnvelopeConfig {
        let mut config = self.base.clone();
        config.scheme = scheme;
        if config.tenant_id.is_empty() {
            config.tenant_id = DEFAULT_TENANT.to_string();
        }
        if scheme == Scheme::KmsSign {
            config.kms_key = Some(DEFAULT_MAC_KEY.to_string());
        } else if config.kms_key.is_none() {
            config.kms_key = Some(DEFAULT_KEK.to_string());
        }
        if config.shared_key_wrapped.is_none() && config.shared_passphrase.is_none() {
            config.shared_key = Some(self.shared_key.clone());
        }
        config.identity = Some(party.identity.clone());
        config.peer = Some(other.identity.clone());
        config
    }

    fn collaborators(&self, party: &Party, config: &EnvelopeConfig) -> Collaborators {
        Collaborators::new(AlgorithmRegistry::init())
            .with_gateway(KekGateway::with_timeout(self.kms.clone(), config.kms_timeout))
            .with_directory(self.directory.clone())
            .with_identity_key(party.key.clone())
    }

    /// Publish the reference message under `scheme` and consume it.
    async fn round_trip(&self, scheme: Scheme) -> Result<()> {
        let pub_config = self.config_for(scheme, &self.publisher, &self.subscriber);
        let sub_config = self.config_for(scheme, &self.subscriber, &self.publisher);

        let bus = InMemoryPubSub::new();
        let subscription = bus.subscribe();
        let publisher = EnvelopePublisher::new(
            &pub_config,
            self.collaborators(&self.publisher, &pub_config),
            Arc::new(bus.clone()),
        )
        .await
        .with_context(|| format!("Failed to start {scheme} publisher"))?;
        let subscriber = Arc::new(
            EnvelopeSubscriber::new(&sub_config, self.collaborators(&self.subscriber, &sub_config))
                .await
                .with_context(|| format!("Failed to start {scheme} subscriber"))?,
        );

        let body = serde_json::to_vec(&DemoMessage::reference())?;
        let kms_before = self.kms.calls().total();
        let id = publisher.publish(&body).await?;
        bus.close();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        subscriber
            .clone()
            .run(subscription, self.concurrency, move |id, payload| {
                let _ = tx.send((id, payload));
            })
            .await;

        let Ok((received_id, payload)) = rx.try_recv() else {
            bail!("{scheme}: message {id} was not acknowledged");
        };
        if received_id != id || payload != body {
            bail!("{scheme}: recovered payload differs from the published one");
        }

        info!(
            scheme = %scheme,
            message_id = %id,
            body_len = body.len(),
            kms_calls = self.kms.calls().total() - kms_before,
            "Round trip complete"
        );
        Ok(())
    }
}

fn init_logging() -> Result<()> {
    let filter = std::env::var("ENVELOPE_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let base = EnvelopeConfig::from_env().context("Invalid ENVELOPE_* configuration")?;
    let concurrency = match std::env::var("ENVELOPE_CONCURRENCY") {
        Ok(value) => value
            .parse()
            .with_context(|| format!("ENVELOPE_CONCURRENCY={value:?} is not a number"))?,
        Err(_) => DEFAULT_CONCURRENCY,
    };
    let schemes = if std::env::var("ENVELOPE_SCHEME").is_ok() {
        vec![base.scheme]
    } else {
        Scheme::ALL.to_vec()
    };

    info!("===========================================");
    info!("  Envelope Node v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    let runtime = NodeRuntime::new(base, concurrency)?;
    let mut failed = 0usize;
    for scheme in schemes {
        if let Err(e) = runtime.round_trip(scheme).await {
            error!(scheme = %scheme, error = %format!("{e:#}"), "Round trip failed");
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{failed} scheme(s) failed");
    }
    info!("All round trips complete");
    Ok(())
}
