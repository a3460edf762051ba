//! End-to-end flows through the `Provenance` service.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use provenance::core::{kinds, EventQuery};
use provenance::relay::{
    FailureReason, Filter, InboundMessage, MemoryConnector, MemoryRelayNetwork, RelayBehaviour,
};
use provenance::store::{MemoryBlockStore, MemoryEventStore};
use provenance::{KeyStore, Provenance, ProvenanceConfig, ProvenanceError, SignatureAlgorithm};
use provenance_testkit::fixtures::TestIdentity;
use serde_json::json;
use tempfile::TempDir;

type MemoryProvenance = Provenance<MemoryEventStore, MemoryBlockStore, MemoryConnector>;

fn fast_config(dir: &Path) -> ProvenanceConfig {
    let mut config = ProvenanceConfig::in_dir(dir);
    config.relay.connect_timeout_ms = 200;
    config.relay.ack_timeout_ms = 200;
    config
}

async fn memory_service(
    config: ProvenanceConfig,
    network: &Arc<MemoryRelayNetwork>,
) -> MemoryProvenance {
    let keys = KeyStore::generate_or_load(
        config.key_dir(),
        &config.identity_name,
        config.signing_algorithm,
    )
    .unwrap();
    Provenance::with_components(
        config,
        Arc::new(keys),
        MemoryEventStore::new(),
        MemoryBlockStore::new(),
        Arc::new(MemoryConnector::new(network.clone())),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_genesis_record_to_rejected_quorum() {
    let dir = TempDir::new().unwrap();
    let network = MemoryRelayNetwork::new();
    network.add_relay("ws://accepting", RelayBehaviour::Accept);
    network.add_relay("ws://rejecting", RelayBehaviour::Reject("blocked: policy".into()));
    let service = memory_service(fast_config(dir.path()), &network).await;

    // Sign and verify a record.
    let record = service.sign_record(json!({ "type": "genesis" })).unwrap();
    assert!(service.signer().verify_record(&record));

    // Wrap its hash in a wire event and check it without the builder.
    let event = service
        .wire()
        .build(kinds::TEXT_NOTE, record.signature.content_hash.to_hex(), vec![])
        .unwrap();
    assert!(event.verify());
    assert_eq!(event.pubkey, service.public_key().to_hex());

    let endpoints = vec!["ws://accepting".to_string(), "ws://rejecting".to_string()];
    let result = service.publish_to(&event, &endpoints, 2).await;

    assert!(!result.published);
    assert_eq!(result.event_id, event.id);
    assert_eq!(result.success, vec!["ws://accepting".to_string()]);
    assert_eq!(result.failure.len(), 1);
    assert_eq!(result.failure[0].endpoint, "ws://rejecting");
    assert_eq!(
        result.failure[0].reason,
        FailureReason::Rejected("blocked: policy".into())
    );
}

#[tokio::test]
async fn test_timeout_counts_as_success_by_default() {
    let dir = TempDir::new().unwrap();
    let network = MemoryRelayNetwork::new();
    network.add_relay("ws://a", RelayBehaviour::Accept);
    network.add_relay("ws://b", RelayBehaviour::Silent);
    network.add_relay("ws://c", RelayBehaviour::Refuse);

    let mut config = fast_config(dir.path());
    config.relay.endpoints = vec!["ws://a".into(), "ws://b".into(), "ws://c".into()];
    config.relay.min_success = 1;
    let service = memory_service(config, &network).await;

    let event = service.wire().build(kinds::TEXT_NOTE, "ping", vec![]).unwrap();
    let result = service.publish(&event).await;

    assert!(result.published);
    assert_eq!(result.success, vec!["ws://a".to_string(), "ws://b".to_string()]);
    assert_eq!(result.timed_out, vec!["ws://b".to_string()]);
    assert_eq!(result.failure.len(), 1);
    assert_eq!(result.failure[0].endpoint, "ws://c");
    assert!(matches!(result.failure[0].reason, FailureReason::Unreachable(_)));
}

#[tokio::test]
async fn test_sealed_block_announced_and_received() {
    let dir = TempDir::new().unwrap();
    let network = MemoryRelayNetwork::new();
    network.add_relay("ws://relay", RelayBehaviour::Accept);

    let mut config = fast_config(dir.path());
    config.seal.max_records = 2;
    config.relay.endpoints = vec!["ws://relay".into()];
    let service = memory_service(config, &network).await;

    let (_, first) = service.remember("owner-1", "m1", b"first memory", 1).await.unwrap();
    assert!(first.sealed.is_none());
    let (signature, second) = service.remember("owner-1", "m2", b"second memory", 1).await.unwrap();
    assert!(service.verify(b"second memory", &signature));
    let header = second.sealed.unwrap();

    let result = service.announce_block(&header).await.unwrap();
    assert!(result.published);

    let mut stream = service
        .subscribe(
            "ws://relay",
            vec![Filter::new()
                .kinds([kinds::BLOCK_ANNOUNCEMENT])
                .identifiers(["owner-1:0"])],
        )
        .await
        .unwrap();
    let Some(InboundMessage::Event(event)) = stream.next().await else {
        panic!("expected the stored announcement");
    };
    assert_eq!(event.id, result.event_id);
    assert_eq!(event.tag_value("block"), Some(header.block_hash.to_hex().as_str()));
    assert_eq!(stream.next().await, Some(InboundMessage::EndOfStoredEvents));
    stream.cancel().await;

    let proof = service.memory().prove("owner-1", 0, 1).await.unwrap().unwrap();
    assert!(proof.verify());
    assert_eq!(Some(proof.merkle_root), header.merkle_root);
}

#[tokio::test]
async fn test_durable_restart_and_tamper_detection() {
    let dir = TempDir::new().unwrap();
    let config = ProvenanceConfig::in_dir(dir.path());

    let public_key = {
        let service = Provenance::init(config.clone()).await.unwrap();
        for amount in [100, 200, 300] {
            service
                .record("account-1", "balance.set", json!({ "amount": amount }), json!({}))
                .await
                .unwrap();
        }
        service.remember("owner-1", "m1", b"kept across restarts", 1).await.unwrap();
        let public_key = service.public_key();
        let sweep = service.shutdown().await;
        assert!(sweep.is_complete());
        let sealed = sweep.sealed;
        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].owner_id, "owner-1");
        public_key
    };

    let service = Provenance::init(config.clone()).await.unwrap();
    assert_eq!(service.public_key(), public_key);
    assert_eq!(service.event_log().count().await, 3);
    assert!(service.event_log().verify_chain().await.unwrap());
    assert!(service.memory().verify_owner("owner-1").await.unwrap());
    assert_eq!(service.memory().sealed_blocks("owner-1").await.unwrap().len(), 1);

    let events = service
        .event_log()
        .query_all(EventQuery::all().subject("account-1"))
        .await
        .unwrap();
    assert!(events.iter().all(|e| e.author == service.address().as_str()));
    assert!(events.iter().all(|e| e
        .author_signature
        .as_ref()
        .is_some_and(|sig| sig.signer_pubkey == service.public_key())));
    let fourth = service
        .record("account-1", "balance.set", json!({ "amount": 400 }), json!({}))
        .await
        .unwrap();
    assert_eq!(fourth.sequence, 4);
    drop(service);

    // Edit the second line in place.
    let path = config.event_log_path();
    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, text.replace("\"amount\":200", "\"amount\":999")).unwrap();

    let service = Provenance::init(config).await.unwrap();
    let audit = service.event_log().audit_chain().await.unwrap();
    assert_eq!(audit.events_checked, 1);
    assert!(!service.event_log().verify_chain().await.unwrap());
}

#[tokio::test]
async fn test_insecure_strategy_signs_content_but_not_wire_events() {
    let dir = TempDir::new().unwrap();
    let network = MemoryRelayNetwork::new();
    let mut config = fast_config(dir.path());
    config.signing_algorithm = SignatureAlgorithm::InsecureHmacSha256;
    let service = memory_service(config, &network).await;

    let signature = service.sign(b"local only").unwrap();
    assert_eq!(signature.algorithm, SignatureAlgorithm::InsecureHmacSha256);
    assert!(service.verify(b"local only", &signature));
    assert!(!signature.verify_public(b"local only"));

    let err = service.wire().build(kinds::TEXT_NOTE, "x", vec![]).unwrap_err();
    assert!(matches!(err, ProvenanceError::UnsupportedAlgorithm { .. }));
}

#[tokio::test]
async fn test_foreign_signature_rejected() {
    let dir = TempDir::new().unwrap();
    let network = MemoryRelayNetwork::new();
    let service = memory_service(fast_config(dir.path()), &network).await;

    let stranger = TestIdentity::new();
    let signature = stranger.signer.sign(b"claim").unwrap();
    assert!(signature.verify_public(b"claim"));
    assert!(!service.verify(b"claim", &signature));
}
