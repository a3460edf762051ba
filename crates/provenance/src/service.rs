//! The `Provenance` service object.
//!
//! Built once at process start by [`Provenance::init`] and passed by
//! reference to whatever needs it. There are no globals and no lazy
//! first-use construction; [`Provenance::shutdown`] is the explicit
//! teardown.

use std::sync::Arc;

use provenance_core::{BlockHeader, IdentityAddress, LogEvent, RecordRef, SchnorrPublicKey, WireEvent};
use provenance_identity::{ContentSignature, ContentSigner, KeyStore, SignedRecord};
use provenance_relay::{
    Filter, PublishResult, RelayBroadcaster, RelayConnector, RelaySubscriber, SubscriptionStream,
    WebSocketConnector,
};
use provenance_store::{BlockStore, EventStore, JsonlEventStore, SqliteBlockStore};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::ProvenanceConfig;
use crate::error::Result;
use crate::event_log::EventLog;
use crate::memory_chain::{MemoryChain, RecordReceipt, SealSweep};
use crate::wire_builder::WireEventBuilder;

/// Identity, event log, memory chain and relay access behind one handle.
pub struct Provenance<
    E: EventStore = JsonlEventStore,
    B: BlockStore = SqliteBlockStore,
    C: RelayConnector = WebSocketConnector,
> {
    config: ProvenanceConfig,
    keys: Arc<KeyStore>,
    signer: ContentSigner,
    events: EventLog<E>,
    memory: MemoryChain<B>,
    wire: WireEventBuilder,
    broadcaster: RelayBroadcaster<C>,
    subscriber: RelaySubscriber<C>,
}

impl Provenance {
    /// Open everything under `config.data_dir`: the identity key (created
    /// on first run), the JSON-lines event log and the SQLite block store.
    pub async fn init(config: ProvenanceConfig) -> Result<Self> {
        config.validate()?;
        let keys = KeyStore::generate_or_load(
            config.key_dir(),
            &config.identity_name,
            config.signing_algorithm,
        )?;
        let event_store = JsonlEventStore::open(config.event_log_path())?;
        let block_store = SqliteBlockStore::open(config.block_db_path())?;

        Self::with_components(
            config,
            Arc::new(keys),
            event_store,
            block_store,
            Arc::new(WebSocketConnector),
        )
        .await
    }
}

impl<E: EventStore, B: BlockStore, C: RelayConnector> Provenance<E, B, C> {
    /// Assemble the service from prebuilt parts.
    pub async fn with_components(
        config: ProvenanceConfig,
        keys: Arc<KeyStore>,
        event_store: E,
        block_store: B,
        connector: Arc<C>,
    ) -> Result<Self> {
        config.validate()?;
        if keys.algorithm().is_insecure() {
            warn!(
                identity = keys.name(),
                algorithm = %keys.algorithm(),
                "provenance is running on the insecure signing strategy"
            );
        }

        let signer = ContentSigner::new(keys.clone());
        let events = EventLog::open(event_store).await?.with_signer(signer.clone());
        let memory = MemoryChain::new(block_store, config.seal.clone());
        let wire = WireEventBuilder::new(keys.clone());
        let broadcaster = RelayBroadcaster::new(connector.clone(), config.relay.broadcast_config());
        let subscriber = RelaySubscriber::new(connector, config.relay.subscriber_config());

        info!(
            identity = keys.name(),
            address = %keys.address(),
            algorithm = %keys.algorithm(),
            endpoints = config.relay.endpoints.len(),
            "provenance initialized"
        );
        Ok(Self {
            config,
            keys,
            signer,
            events,
            memory,
            wire,
            broadcaster,
            subscriber,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn config(&self) -> &ProvenanceConfig {
        &self.config
    }

    pub fn identity(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    pub fn public_key(&self) -> SchnorrPublicKey {
        self.keys.public_key()
    }

    pub fn address(&self) -> &IdentityAddress {
        self.keys.address()
    }

    pub fn signer(&self) -> &ContentSigner {
        &self.signer
    }

    pub fn event_log(&self) -> &EventLog<E> {
        &self.events
    }

    pub fn memory(&self) -> &MemoryChain<B> {
        &self.memory
    }

    pub fn wire(&self) -> &WireEventBuilder {
        &self.wire
    }

    pub fn broadcaster(&self) -> &RelayBroadcaster<C> {
        &self.broadcaster
    }

    pub fn subscriber(&self) -> &RelaySubscriber<C> {
        &self.subscriber
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entry points
    // ─────────────────────────────────────────────────────────────────────────

    pub fn sign(&self, content: &[u8]) -> Result<ContentSignature> {
        Ok(self.signer.sign(content)?)
    }

    pub fn verify(&self, content: &[u8], signature: &ContentSignature) -> bool {
        self.signer.verify(content, signature)
    }

    pub fn sign_record<T: Serialize>(&self, payload: T) -> Result<SignedRecord<T>> {
        Ok(self.signer.sign_record(payload)?)
    }

    /// Append a state mutation to the event log, authored and signed by
    /// this identity.
    pub async fn record(
        &self,
        subject_id: impl Into<String>,
        action_type: impl Into<String>,
        payload: Value,
        context: Value,
    ) -> Result<LogEvent> {
        self.events
            .append(subject_id, action_type, self.keys.address().as_str(), payload, context)
            .await
    }

    /// Sign `content` and add it to `owner_id`'s memory chain.
    pub async fn remember(
        &self,
        owner_id: &str,
        record_id: impl Into<String>,
        content: &[u8],
        weight: u64,
    ) -> Result<(ContentSignature, RecordReceipt)> {
        let signature = self.signer.sign(content)?;
        let record = RecordRef::new(record_id, signature.content_hash, weight);
        let receipt = self.memory.add_record(owner_id, record).await?;
        Ok((signature, receipt))
    }

    /// Build a block announcement and publish it to the configured relays.
    pub async fn announce_block(&self, header: &BlockHeader) -> Result<PublishResult> {
        let event = self.wire.block_announcement(header)?;
        Ok(self.publish(&event).await)
    }

    /// Publish to the configured endpoints with the configured quorum.
    pub async fn publish(&self, event: &WireEvent) -> PublishResult {
        self.broadcaster
            .publish(event, &self.config.relay.endpoints, self.config.relay.min_success)
            .await
    }

    pub async fn publish_to(
        &self,
        event: &WireEvent,
        endpoints: &[String],
        min_success: usize,
    ) -> PublishResult {
        self.broadcaster.publish(event, endpoints, min_success).await
    }

    /// Subscribe and start listening in one step.
    pub async fn subscribe(&self, endpoint: &str, filters: Vec<Filter>) -> Result<SubscriptionStream> {
        let handle = self.subscriber.subscribe(endpoint, filters).await?;
        Ok(self.subscriber.listen(handle))
    }

    /// Seal every non-empty open block and release the service.
    ///
    /// Owners whose seal fails are reported in the sweep; their records are
    /// not persisted.
    pub async fn shutdown(self) -> SealSweep {
        let sweep = self.memory.seal_all_open().await;
        if !sweep.is_complete() {
            warn!(
                identity = self.keys.name(),
                failed = sweep.failed.len(),
                "open blocks left unsealed at shutdown"
            );
        }
        info!(
            identity = self.keys.name(),
            sealed = sweep.sealed.len(),
            events = self.events.count().await,
            "provenance shut down"
        );
        sweep
    }
}
