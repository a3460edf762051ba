//! Test fixtures and helpers.

use std::sync::Arc;

use provenance_core::{
    EventDraft, LogEvent, MemoryBlock, RecordRef, Sha256Hash, UnsignedWireEvent, WireEvent,
};
use provenance_identity::{ContentSigner, KeyStore, SignatureAlgorithm};
use serde_json::json;

/// An in-memory identity with a signer.
pub struct TestIdentity {
    pub keys: Arc<KeyStore>,
    pub signer: ContentSigner,
}

impl TestIdentity {
    /// A random Schnorr identity.
    pub fn new() -> Self {
        Self::from_keys(KeyStore::ephemeral("test", SignatureAlgorithm::SchnorrSecp256k1))
    }

    /// A deterministic Schnorr identity. Panics if `seed` is not a valid
    /// secp256k1 secret key.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        let keys = KeyStore::from_secret_bytes("test", &seed, SignatureAlgorithm::SchnorrSecp256k1)
            .expect("seed is a valid secret key");
        Self::from_keys(keys)
    }

    /// A random identity on the insecure HMAC strategy.
    pub fn insecure() -> Self {
        Self::from_keys(KeyStore::ephemeral("test", SignatureAlgorithm::InsecureHmacSha256))
    }

    fn from_keys(keys: KeyStore) -> Self {
        let keys = Arc::new(keys);
        Self {
            signer: ContentSigner::new(keys.clone()),
            keys,
        }
    }

    pub fn address(&self) -> String {
        self.keys.address().to_string()
    }

    /// `n` correctly linked log events authored and signed by this
    /// identity, timestamped one second apart from a fixed epoch.
    pub fn event_chain(&self, n: u64) -> Vec<LogEvent> {
        let mut events: Vec<LogEvent> = Vec::new();
        for sequence in 1..=n {
            let previous = events.last().map_or(Sha256Hash::ZERO, |e| e.resource_hash);
            let draft = EventDraft::new(format!("subject-{}", sequence % 3), "update", self.address())
                .payload(json!({ "n": sequence }));
            let mut event =
                LogEvent::from_draft(draft, sequence, previous, 1_736_870_400_000 + sequence as i64 * 1000)
                    .expect("fixture events encode");
            let signature = self
                .signer
                .sign(event.signing_bytes())
                .expect("fixture identity signs");
            event.author_signature = Some(signature);
            events.push(event);
        }
        events
    }

    /// A signed text note.
    pub fn note(&self, created_at: u64, content: &str) -> WireEvent {
        let unsigned = UnsignedWireEvent::new(self.keys.public_key(), created_at, 1, vec![], content);
        let id = unsigned.id().expect("fixture ids encode");
        let sig = self.keys.sign_schnorr(&id).expect("fixture identity signs schnorr");
        unsigned.into_signed(id, sig)
    }
}

impl Default for TestIdentity {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic identities for multi-party tests.
pub fn multi_party_identities(count: usize) -> Vec<TestIdentity> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[31] = 1;
            seed[30] = i as u8;
            seed[29] = (i >> 8) as u8;
            TestIdentity::with_seed(seed)
        })
        .collect()
}

/// A record whose content hash is SHA-256 of its id.
pub fn record_ref(id: &str, weight: u64) -> RecordRef {
    RecordRef::new(id, Sha256Hash::hash(id.as_bytes()), weight)
}

/// `blocks` sealed blocks for `owner`, each holding `per_block` records.
pub fn sealed_chain(owner: &str, blocks: u64, per_block: u64) -> Vec<MemoryBlock> {
    let mut chain: Vec<MemoryBlock> = Vec::new();
    for b in 0..blocks {
        let opened_at = 1_736_870_400_000 + b as i64 * 60_000;
        let mut block = MemoryBlock::open(owner, chain.last().map(|p| p.header()), opened_at);
        for r in 0..per_block {
            let added = block.add_record(record_ref(&format!("{owner}-{b}-{r}"), 1));
            assert!(added, "fresh block accepts records");
        }
        block.seal(opened_at + 1000).expect("fixture blocks are non-empty");
        chain.push(block);
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use provenance_core::{audit_event_chain, verify_block_chain};

    #[test]
    fn test_event_chain_is_intact() {
        let alice = TestIdentity::new();
        let chain = alice.event_chain(6);
        assert!(audit_event_chain(&chain).is_intact());
        assert!(chain.iter().all(|e| e.author == alice.address()));
        assert!(chain.iter().all(|e| e
            .author_signature
            .as_ref()
            .is_some_and(|sig| sig.verify_public(e.signing_bytes()))));
    }

    #[test]
    fn test_seeded_identity_is_stable() {
        let a = TestIdentity::with_seed([9; 32]);
        let b = TestIdentity::with_seed([9; 32]);
        assert_eq!(a.keys.public_key(), b.keys.public_key());
    }

    #[test]
    fn test_multi_party() {
        let parties = multi_party_identities(3);
        let pks: Vec<_> = parties.iter().map(|p| p.keys.public_key()).collect();
        assert_ne!(pks[0], pks[1]);
        assert_ne!(pks[1], pks[2]);
        assert_ne!(pks[0], pks[2]);
    }

    #[test]
    fn test_sealed_chain_verifies() {
        let chain = sealed_chain("owner-1", 3, 4);
        assert_eq!(chain.len(), 3);
        assert!(verify_block_chain("owner-1", &chain).is_ok());
    }

    #[test]
    fn test_note_verifies() {
        let note = TestIdentity::new().note(1_700_000_000, "hi");
        assert!(note.verify());
    }

    #[test]
    fn test_insecure_identity_signs_content() {
        let id = TestIdentity::insecure();
        let sig = id.signer.sign(b"x").unwrap();
        assert!(id.signer.verify(b"x", &sig));
    }

    #[tokio::test]
    async fn test_chain_loads_into_store() {
        use provenance_store::{EventStore, MemoryEventStore};

        let store = MemoryEventStore::with_events(TestIdentity::new().event_chain(3));
        assert_eq!(store.count().await.unwrap(), 3);
    }
}
