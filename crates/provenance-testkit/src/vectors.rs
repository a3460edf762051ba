//! Golden test vectors.
//!
//! Wire event ids must match any NIP-01 implementation byte for byte; the
//! pubkey is BIP-340 test vector 0 (secret key 3).

use provenance_core::{merkle_root, Sha256Hash, WireEvent};

/// BIP-340 test vector 0 secret key.
pub const VECTOR_SECRET: [u8; 32] = {
    let mut secret = [0u8; 32];
    secret[31] = 3;
    secret
};

/// The x-only public key of [`VECTOR_SECRET`].
pub const VECTOR_PUBKEY: &str = "f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9";

/// A NIP-01 id computation with a known answer.
#[derive(Debug, Clone)]
pub struct WireVector {
    pub name: &'static str,
    pub pubkey: &'static str,
    pub created_at: u64,
    pub kind: u16,
    pub tags: &'static [&'static [&'static str]],
    pub content: &'static str,
    pub expected_id: &'static str,
}

impl WireVector {
    pub fn tags(&self) -> Vec<Vec<String>> {
        self.tags
            .iter()
            .map(|tag| tag.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    pub fn compute_id(&self) -> Sha256Hash {
        WireEvent::compute_id(self.pubkey, self.created_at, self.kind, &self.tags(), self.content)
            .expect("vector fields encode")
    }
}

/// A Merkle root over SHA-256 of each leaf string.
#[derive(Debug, Clone)]
pub struct MerkleVector {
    pub name: &'static str,
    pub leaves: &'static [&'static str],
    pub expected_root: &'static str,
}

impl MerkleVector {
    pub fn leaf_hashes(&self) -> Vec<Sha256Hash> {
        self.leaves.iter().map(|l| Sha256Hash::hash(l.as_bytes())).collect()
    }
}

pub fn wire_vectors() -> Vec<WireVector> {
    vec![
        WireVector {
            name: "text note hello",
            pubkey: VECTOR_PUBKEY,
            created_at: 1_700_000_000,
            kind: 1,
            tags: &[],
            content: "hello",
            expected_id: "a9d53fee641fe563de947fa330a3b4902e52e249894660aaa521cd039e896128",
        },
        WireVector {
            name: "event and pubkey tags",
            pubkey: VECTOR_PUBKEY,
            created_at: 1_700_000_000,
            kind: 1,
            tags: &[&["e", "abc"], &["p", VECTOR_PUBKEY]],
            content: "hello",
            expected_id: "8de1ea6a5af146ec6f68d616b7691818c47c04828fa50a14587f315b33db1833",
        },
        WireVector {
            name: "all zero fields",
            pubkey: VECTOR_PUBKEY,
            created_at: 0,
            kind: 0,
            tags: &[],
            content: "",
            expected_id: "e37d3d8a5cd27629fd198d21819aedd901a0a84297c9d9259543e162891c72aa",
        },
        WireVector {
            name: "escaped content in an addressable event",
            pubkey: VECTOR_PUBKEY,
            created_at: 1_736_870_400,
            kind: 30078,
            tags: &[&["d", "owner-1"]],
            content: "line\nbreak \"quoted\"",
            expected_id: "590c61adeaf3f0f01773232569c715265bc82c12476c24f2ba2e5e5be4a8d7f9",
        },
    ]
}

pub fn merkle_vectors() -> Vec<MerkleVector> {
    vec![
        MerkleVector {
            name: "single leaf",
            leaves: &["a"],
            expected_root: "ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb",
        },
        MerkleVector {
            name: "two leaves",
            leaves: &["a", "b"],
            expected_root: "e5a01fee14e0ed5c48714f22180f25ad8365b53f9779f79dc4a3d7e93963f94a",
        },
        MerkleVector {
            name: "odd level duplicates last",
            leaves: &["a", "b", "c"],
            expected_root: "d31a37ef6ac14a2db1470c4316beb5592e6afd4465022339adafda76a18ffabe",
        },
        MerkleVector {
            name: "balanced four",
            leaves: &["a", "b", "c", "d"],
            expected_root: "14ede5e8e97ad9372327728f5099b95604a39593cac3bd38a343ad76205213e7",
        },
    ]
}

/// Check every vector. Returns `(name, matches, computed hex)`.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let wire = wire_vectors().into_iter().map(|v| {
        let hex = v.compute_id().to_hex();
        (v.name.to_string(), hex == v.expected_id, hex)
    });
    let merkle = merkle_vectors().into_iter().map(|v| {
        let hex = merkle_root(&v.leaf_hashes())
            .map(|r| r.to_hex())
            .unwrap_or_default();
        (v.name.to_string(), hex == v.expected_root, hex)
    });
    wire.chain(merkle).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use provenance_core::{Keypair, UnsignedWireEvent};

    #[test]
    fn test_all_vectors_match() {
        for (name, ok, hex) in verify_all_vectors() {
            assert!(ok, "vector '{name}' computed {hex}");
        }
    }

    #[test]
    fn test_vector_pubkey_matches_secret() {
        let keypair = Keypair::from_secret_bytes(&VECTOR_SECRET).unwrap();
        assert_eq!(keypair.public_key().to_hex(), VECTOR_PUBKEY);
    }

    #[test]
    fn test_signed_vectors_verify() {
        let keypair = Keypair::from_secret_bytes(&VECTOR_SECRET).unwrap();
        for vector in wire_vectors() {
            let event = UnsignedWireEvent::new(
                keypair.public_key(),
                vector.created_at,
                vector.kind,
                vector.tags(),
                vector.content,
            )
            .sign_with(&keypair)
            .unwrap();
            assert_eq!(event.id, vector.expected_id, "{}", vector.name);
            assert!(event.verify());
        }
    }
}
