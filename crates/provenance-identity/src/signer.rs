//! ContentSigner: signs and verifies bytes and structured records.
//!
//! Content is hashed with SHA-256 and the digest is signed with the
//! KeyStore's active strategy. The verifier always recomputes the hash and
//! dispatches on the algorithm recorded in the signature.

use std::sync::Arc;

use provenance_core::{canonical_json, now_millis, SchnorrPublicKey, Sha256Hash};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::SignatureAlgorithm;
use crate::error::{IdentityError, Result};
use crate::keystore::KeyStore;

pub use provenance_core::ContentSignature;

/// A structured payload travelling with its signature.
///
/// The signature covers the canonical JSON of `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedRecord<T> {
    pub payload: T,
    #[serde(flatten)]
    pub signature: ContentSignature,
}

/// Signs and verifies content on behalf of one identity.
#[derive(Debug, Clone)]
pub struct ContentSigner {
    keys: Arc<KeyStore>,
}

impl ContentSigner {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self { keys }
    }

    pub fn public_key(&self) -> SchnorrPublicKey {
        self.keys.public_key()
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.keys.algorithm()
    }

    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    /// Hash `content` and sign the digest.
    pub fn sign(&self, content: &[u8]) -> Result<ContentSignature> {
        let content_hash = Sha256Hash::hash(content);
        let signature = self.keys.sign_digest(&content_hash)?;
        Ok(ContentSignature {
            content_hash,
            signature: hex::encode(signature),
            signer_pubkey: self.keys.public_key(),
            algorithm: self.keys.algorithm(),
            signed_at: now_millis(),
        })
    }

    /// Check `signature` against `content` and the local identity.
    ///
    /// Returns `false` on a content hash mismatch, on a foreign signer, or
    /// when the strategy named in the signature rejects it.
    pub fn verify(&self, content: &[u8], signature: &ContentSignature) -> bool {
        let digest = Sha256Hash::hash(content);
        if digest != signature.content_hash {
            debug!("content hash mismatch");
            return false;
        }
        if signature.signer_pubkey != self.keys.public_key() {
            debug!(signer = %signature.signer_pubkey, "signer is not the local identity");
            return false;
        }
        let raw = match hex::decode(&signature.signature) {
            Ok(raw) => raw,
            Err(_) => return false,
        };
        self.keys
            .verify_digest(signature.algorithm, &signature.signer_pubkey, &digest, &raw)
    }

    /// Sign the canonical JSON of a record.
    pub fn sign_record<T: Serialize>(&self, payload: T) -> Result<SignedRecord<T>> {
        let bytes = canonical_json(&payload).map_err(|e| IdentityError::Serialization(e.to_string()))?;
        let signature = self.sign(bytes.as_bytes())?;
        Ok(SignedRecord { payload, signature })
    }

    /// Verify a signed record. Unserializable payloads do not verify.
    pub fn verify_record<T: Serialize>(&self, record: &SignedRecord<T>) -> bool {
        match canonical_json(&record.payload) {
            Ok(bytes) => self.verify(bytes.as_bytes(), &record.signature),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn signer(algorithm: SignatureAlgorithm) -> ContentSigner {
        ContentSigner::new(Arc::new(KeyStore::ephemeral("test", algorithm)))
    }

    #[test]
    fn test_sign_verify_schnorr() {
        let signer = signer(SignatureAlgorithm::SchnorrSecp256k1);
        let sig = signer.sign(b"hello").unwrap();
        assert_eq!(sig.algorithm, SignatureAlgorithm::SchnorrSecp256k1);
        assert_eq!(sig.signer_pubkey, signer.public_key());
        assert_eq!(sig.content_hash, Sha256Hash::hash(b"hello"));
        assert!(signer.verify(b"hello", &sig));
        assert!(sig.verify_public(b"hello"));
    }

    #[test]
    fn test_sign_verify_insecure_fallback() {
        let signer = signer(SignatureAlgorithm::InsecureHmacSha256);
        let sig = signer.sign(b"hello").unwrap();
        assert_eq!(sig.algorithm, SignatureAlgorithm::InsecureHmacSha256);
        assert!(signer.verify(b"hello", &sig));
        assert!(!signer.verify(b"hellO", &sig));
        assert!(!sig.verify_public(b"hello"));
    }

    #[test]
    fn test_tampered_content_fails() {
        let signer = signer(SignatureAlgorithm::SchnorrSecp256k1);
        let sig = signer.sign(b"hello").unwrap();
        assert!(!signer.verify(b"hellO", &sig));
    }

    #[test]
    fn test_stored_hash_is_not_trusted() {
        let signer = signer(SignatureAlgorithm::SchnorrSecp256k1);
        let mut sig = signer.sign(b"hello").unwrap();
        sig.content_hash = Sha256Hash::hash(b"other");
        assert!(!signer.verify(b"other", &sig));
    }

    #[test]
    fn test_foreign_signer_fails() {
        let alice = signer(SignatureAlgorithm::SchnorrSecp256k1);
        let bob = signer(SignatureAlgorithm::SchnorrSecp256k1);
        let sig = alice.sign(b"hello").unwrap();
        assert!(!bob.verify(b"hello", &sig));
        assert!(sig.verify_public(b"hello"));
    }

    #[test]
    fn test_relabelled_algorithm_fails() {
        let signer = signer(SignatureAlgorithm::SchnorrSecp256k1);
        let mut sig = signer.sign(b"hello").unwrap();
        sig.algorithm = SignatureAlgorithm::InsecureHmacSha256;
        assert!(!signer.verify(b"hello", &sig));
    }

    #[test]
    fn test_garbage_signature_hex_fails() {
        let signer = signer(SignatureAlgorithm::SchnorrSecp256k1);
        let mut sig = signer.sign(b"hello").unwrap();
        sig.signature = "zz".into();
        assert!(!signer.verify(b"hello", &sig));
    }

    #[test]
    fn test_signed_record_roundtrip() {
        let signer = signer(SignatureAlgorithm::SchnorrSecp256k1);
        let record = signer.sign_record(json!({"type": "genesis"})).unwrap();
        assert!(signer.verify_record(&record));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["payload"], json!({"type": "genesis"}));
        assert_eq!(json["algorithm"], json!("schnorr-secp256k1"));

        let back: SignedRecord<serde_json::Value> = serde_json::from_value(json).unwrap();
        assert!(signer.verify_record(&back));

        let mut tampered = back;
        tampered.payload = json!({"type": "exodus"});
        assert!(!signer.verify_record(&tampered));
    }

    #[test]
    fn test_record_key_order_does_not_matter() {
        let signer = signer(SignatureAlgorithm::SchnorrSecp256k1);
        let record = signer.sign_record(json!({"a": 1, "b": 2})).unwrap();
        let reordered: serde_json::Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        let same = SignedRecord {
            payload: reordered,
            signature: record.signature.clone(),
        };
        assert!(signer.verify_record(&same));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn any_content_verifies(content in prop::collection::vec(any::<u8>(), 0..256)) {
            let signer = signer(SignatureAlgorithm::SchnorrSecp256k1);
            let sig = signer.sign(&content).unwrap();
            prop_assert!(signer.verify(&content, &sig));
        }

        #[test]
        fn single_bit_flip_fails(
            content in prop::collection::vec(any::<u8>(), 1..256),
            pick in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let signer = signer(SignatureAlgorithm::SchnorrSecp256k1);
            let sig = signer.sign(&content).unwrap();
            let mut flipped = content.clone();
            let idx = pick.index(flipped.len());
            flipped[idx] ^= 1 << bit;
            prop_assert!(!signer.verify(&flipped, &sig));
        }
    }
}
