//! WireEventBuilder: NIP-01 events signed by the local identity.

use std::sync::Arc;

use provenance_core::{kinds, now_seconds, BlockHeader, Tag, UnsignedWireEvent, WireEvent};
use provenance_identity::{KeyStore, SignatureAlgorithm};
use tracing::debug;

use crate::error::{ProvenanceError, Result};

/// Builds and signs wire events with a [`KeyStore`].
///
/// Wire events are always BIP-340 signed. A key store running the insecure
/// fallback strategy cannot build them.
#[derive(Debug, Clone)]
pub struct WireEventBuilder {
    keys: Arc<KeyStore>,
}

impl WireEventBuilder {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self { keys }
    }

    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    /// Build an event stamped with the current time.
    pub fn build(&self, kind: u16, content: impl Into<String>, tags: Vec<Tag>) -> Result<WireEvent> {
        self.build_at(now_seconds(), kind, content, tags)
    }

    /// Build an event with an explicit `created_at` (Unix seconds).
    ///
    /// The id depends only on the arguments and the public key, so two
    /// calls with the same inputs produce the same id.
    pub fn build_at(
        &self,
        created_at: u64,
        kind: u16,
        content: impl Into<String>,
        tags: Vec<Tag>,
    ) -> Result<WireEvent> {
        let algorithm = self.keys.algorithm();
        if algorithm != SignatureAlgorithm::SchnorrSecp256k1 {
            return Err(ProvenanceError::UnsupportedAlgorithm {
                algorithm,
                operation: "wire event signing",
            });
        }

        let unsigned =
            UnsignedWireEvent::new(self.keys.public_key(), created_at, kind, tags, content);
        let id = unsigned.id()?;
        let sig = self.keys.sign_schnorr(&id)?;
        debug!(event_id = %id, kind, "wire event built");
        Ok(unsigned.into_signed(id, sig))
    }

    /// Recompute the id from the event's fields and check the signature.
    ///
    /// Works for events from any author, not just the local identity.
    pub fn verify(&self, event: &WireEvent) -> bool {
        event.verify()
    }

    /// Announce a sealed block.
    ///
    /// The event is addressable by `d = "<owner>:<block_number>"` and
    /// carries the header as JSON content.
    pub fn block_announcement(&self, header: &BlockHeader) -> Result<WireEvent> {
        let (Some(merkle_root), Some(_)) = (header.merkle_root, header.sealed_at) else {
            return Err(ProvenanceError::NotSealed {
                owner_id: header.owner_id.clone(),
                block_number: header.block_number,
            });
        };
        let content = serde_json::to_string(header)
            .map_err(|e| provenance_core::CoreError::EncodingError(e.to_string()))?;
        let tags = vec![
            vec![
                "d".to_string(),
                format!("{}:{}", header.owner_id, header.block_number),
            ],
            vec!["merkle".to_string(), merkle_root.to_hex()],
            vec!["block".to_string(), header.block_hash.to_hex()],
        ];
        self.build(kinds::BLOCK_ANNOUNCEMENT, content, tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provenance_core::{MemoryBlock, RecordRef, Sha256Hash};

    fn builder() -> WireEventBuilder {
        WireEventBuilder::new(Arc::new(KeyStore::ephemeral(
            "wire",
            SignatureAlgorithm::SchnorrSecp256k1,
        )))
    }

    #[test]
    fn test_build_and_verify() {
        let builder = builder();
        let event = builder
            .build(kinds::TEXT_NOTE, "hello", vec![vec!["t".into(), "x".into()]])
            .unwrap();
        assert_eq!(event.pubkey, builder.key_store().public_key().to_hex());
        assert_eq!(event.id.len(), 64);
        assert_eq!(event.sig.len(), 128);
        assert!(builder.verify(&event));
    }

    #[test]
    fn test_id_is_deterministic() {
        let builder = builder();
        let a = builder.build_at(1_700_000_000, 1, "hello", vec![]).unwrap();
        let b = builder.build_at(1_700_000_000, 1, "hello", vec![]).unwrap();
        assert_eq!(a.id, b.id);

        let c = builder.build_at(1_700_000_001, 1, "hello", vec![]).unwrap();
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_mutation_after_signing_detected() {
        let builder = builder();
        let event = builder.build_at(1_700_000_000, 1, "hello", vec![]).unwrap();

        let mut content = event.clone();
        content.content.push('!');
        assert!(!builder.verify(&content));

        let mut kind = event.clone();
        kind.kind = 2;
        assert!(!builder.verify(&kind));

        let mut tags = event.clone();
        tags.tags.push(vec!["e".into(), "00".into()]);
        assert!(!builder.verify(&tags));

        let mut id = event;
        id.id = Sha256Hash::hash(b"other").to_hex();
        assert!(!builder.verify(&id));
    }

    #[test]
    fn test_foreign_events_verify() {
        let other = builder().build_at(5, 1, "from elsewhere", vec![]).unwrap();
        assert!(builder().verify(&other));
    }

    #[test]
    fn test_insecure_strategy_cannot_build() {
        let builder = WireEventBuilder::new(Arc::new(KeyStore::ephemeral(
            "fallback",
            SignatureAlgorithm::InsecureHmacSha256,
        )));
        let err = builder.build(1, "x", vec![]).unwrap_err();
        assert!(matches!(
            err,
            ProvenanceError::UnsupportedAlgorithm {
                algorithm: SignatureAlgorithm::InsecureHmacSha256,
                ..
            }
        ));
    }

    #[test]
    fn test_block_announcement() {
        let builder = builder();
        let mut block = MemoryBlock::open("alice", None, 1_000);
        assert!(block.add_record(RecordRef::new("r1", Sha256Hash::hash(b"r1"), 1)));

        let err = builder.block_announcement(block.header()).unwrap_err();
        assert!(matches!(err, ProvenanceError::NotSealed { block_number: 0, .. }));

        let header = block.seal(2_000).unwrap();
        let event = builder.block_announcement(&header).unwrap();
        assert_eq!(event.kind, kinds::BLOCK_ANNOUNCEMENT);
        assert_eq!(event.tag_value("d"), Some("alice:0"));
        assert_eq!(
            event.tag_value("merkle"),
            header.merkle_root.map(|r| r.to_hex()).as_deref()
        );
        assert_eq!(event.tag_value("block"), Some(header.block_hash.to_hex().as_str()));

        let decoded: BlockHeader = serde_json::from_str(&event.content).unwrap();
        assert_eq!(decoded, header);
        assert!(builder.verify(&event));
    }
}
