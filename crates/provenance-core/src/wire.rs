//! WireEvent: NIP-01 events as they travel to and from relays.
//!
//! The event id is SHA-256 of `[0,pubkey,created_at,kind,tags,content]`
//! serialized as compact JSON. The signature is BIP-340 Schnorr over the
//! 32 id bytes. Fields are kept as hex strings because inbound events come
//! from untrusted relays and must be representable before they are checked.

use serde::{Deserialize, Serialize};

use crate::canonical::nip01_preimage;
use crate::crypto::{Keypair, SchnorrPublicKey, SchnorrSignature, Sha256Hash};
use crate::error::Result;

/// An ordered list of strings, e.g. `["e", "<event id>"]`.
pub type Tag = Vec<String>;

/// Event kinds used by the provenance subsystem.
pub mod kinds {
    /// Profile metadata.
    pub const METADATA: u16 = 0;
    /// Short text note.
    pub const TEXT_NOTE: u16 = 1;
    /// Addressable application data; used to announce sealed memory blocks.
    pub const BLOCK_ANNOUNCEMENT: u16 = 30078;
}

/// A signed NIP-01 event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEvent {
    pub id: String,
    pub pubkey: String,
    /// Unix seconds.
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Tag>,
    pub content: String,
    pub sig: String,
}

/// The fields of an event before its id and signature are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedWireEvent {
    pub pubkey: SchnorrPublicKey,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Tag>,
    pub content: String,
}

impl UnsignedWireEvent {
    pub fn new(
        pubkey: SchnorrPublicKey,
        created_at: u64,
        kind: u16,
        tags: Vec<Tag>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            pubkey,
            created_at,
            kind,
            tags,
            content: content.into(),
        }
    }

    /// The canonical event id.
    pub fn id(&self) -> Result<Sha256Hash> {
        WireEvent::compute_id(
            &self.pubkey.to_hex(),
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )
    }

    /// Attach a precomputed id and its signature.
    pub fn into_signed(self, id: Sha256Hash, sig: SchnorrSignature) -> WireEvent {
        WireEvent {
            id: id.to_hex(),
            pubkey: self.pubkey.to_hex(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig: sig.to_hex(),
        }
    }

    /// Compute the id and sign it with `keypair`.
    pub fn sign_with(self, keypair: &Keypair) -> Result<WireEvent> {
        let id = self.id()?;
        let sig = keypair.sign(id.as_bytes())?;
        Ok(self.into_signed(id, sig))
    }
}

impl WireEvent {
    /// SHA-256 of the NIP-01 serialization.
    pub fn compute_id(
        pubkey_hex: &str,
        created_at: u64,
        kind: u16,
        tags: &[Tag],
        content: &str,
    ) -> Result<Sha256Hash> {
        let preimage = nip01_preimage(pubkey_hex, created_at, kind, tags, content)?;
        Ok(Sha256Hash::hash(preimage.as_bytes()))
    }

    /// Recompute the id from the stated fields.
    pub fn recompute_id(&self) -> Result<Sha256Hash> {
        Self::compute_id(&self.pubkey, self.created_at, self.kind, &self.tags, &self.content)
    }

    /// Check the id against the fields, then the signature against the id.
    ///
    /// Any field mutation after signing makes this return `false`.
    pub fn verify(&self) -> bool {
        let id = match self.recompute_id() {
            Ok(id) => id,
            Err(_) => return false,
        };
        if id.to_hex() != self.id {
            return false;
        }
        let (pubkey, sig) = match (
            SchnorrPublicKey::from_hex(&self.pubkey),
            SchnorrSignature::from_hex(&self.sig),
        ) {
            (Ok(pk), Ok(sig)) => (pk, sig),
            _ => return false,
        };
        pubkey.verify(id.as_bytes(), &sig).is_ok()
    }

    /// Value of the first tag named `name`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }
}
