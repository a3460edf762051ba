//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{json, Value};

use provenance_core::{EventDraft, RecordRef, Sha256Hash, Tag};

/// A random SHA-256 hash.
pub fn sha256_hash() -> impl Strategy<Value = Sha256Hash> {
    any::<[u8; 32]>().prop_map(Sha256Hash::from_bytes)
}

/// A valid secp256k1 secret key.
pub fn secret_key() -> impl Strategy<Value = [u8; 32]> {
    any::<[u8; 32]>().prop_map(|mut bytes| {
        // Keep well below the curve order and away from zero.
        bytes[0] &= 0x7f;
        bytes[31] |= 1;
        bytes
    })
}

pub fn record_ref() -> impl Strategy<Value = RecordRef> {
    ("[a-z0-9-]{1,16}", sha256_hash(), 0u64..1_000)
        .prop_map(|(id, hash, weight)| RecordRef::new(id, hash, weight))
}

/// Ordered record lists with a length in `size`.
pub fn record_refs(size: std::ops::Range<usize>) -> impl Strategy<Value = Vec<RecordRef>> {
    prop::collection::vec(record_ref(), size)
}

/// Small JSON values: scalars, flat arrays and flat objects.
pub fn json_value() -> impl Strategy<Value = Value> {
    let scalar = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[ -~]{0,24}".prop_map(Value::String),
    ]
    .boxed();
    prop_oneof![
        scalar.clone(),
        prop::collection::vec(scalar.clone(), 0..4).prop_map(Value::Array),
        prop::collection::btree_map("[a-z]{1,8}", scalar, 0..4)
            .prop_map(|map| Value::Object(map.into_iter().collect())),
    ]
}

pub fn event_draft() -> impl Strategy<Value = EventDraft> {
    (
        "[a-z0-9-]{1,12}",
        "[a-z]{1,8}\\.[a-z]{1,8}",
        "[0-9a-f]{40}",
        json_value(),
        json_value(),
    )
        .prop_map(|(subject, action, author, payload, context)| {
            EventDraft::new(subject, action, author)
                .payload(payload)
                .context(context)
        })
}

/// Free-form wire event fields; any unicode content.
#[derive(Debug, Clone)]
pub struct WireFields {
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Tag>,
    pub content: String,
}

pub fn wire_fields() -> impl Strategy<Value = WireFields> {
    (
        0u64..=4_102_444_800,
        any::<u16>(),
        prop::collection::vec(prop::collection::vec("[a-z0-9]{0,10}", 1..4), 0..4),
        any::<String>(),
    )
        .prop_map(|(created_at, kind, tags, content)| WireFields {
            created_at,
            kind,
            tags,
            content,
        })
}
