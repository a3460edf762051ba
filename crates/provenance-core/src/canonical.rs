//! Canonical encodings for hashing.
//!
//! Three encodings are used, each frozen once data exists on disk or on the wire:
//!
//! - **Block headers**: deterministic CBOR (RFC 8949 core deterministic encoding).
//!   Map keys sorted by encoded bytes, smallest integer encoding, definite lengths.
//! - **Log events and signed records**: compact JSON with object keys sorted
//!   recursively, no insignificant whitespace.
//! - **Wire events**: the NIP-01 id preimage `[0,pubkey,created_at,kind,tags,content]`.
//!
//! Changing any of these invalidates every stored hash.

use ciborium::value::Value;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::block::BlockHeader;
use crate::error::{CoreError, Result};
use crate::wire::Tag;

/// Domain separation prefix for block hashes.
pub const BLOCK_DOMAIN: &[u8] = b"provenance-block-v0:";

/// Domain separation prefix for owner genesis links.
pub const GENESIS_DOMAIN: &[u8] = b"provenance-genesis-v0:";

/// Header field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR. `block_hash` is not a key:
/// it is the hash of everything else.
mod keys {
    pub const BLOCK_NUMBER: u64 = 0;
    pub const PREVIOUS_HASH: u64 = 1;
    pub const MERKLE_ROOT: u64 = 2;
    pub const RECORD_COUNT: u64 = 3;
    pub const AGGREGATE_WEIGHT: u64 = 4;
    pub const OPENED_AT: u64 = 5;
    pub const SEALED_AT: u64 = 6;
    pub const OWNER_ID: u64 = 7;
}

/// Encode a block header (excluding `block_hash`) to canonical CBOR bytes.
pub fn canonical_header_bytes(header: &BlockHeader) -> Vec<u8> {
    let value = header_to_cbor_value(header);
    let mut buf = Vec::new();
    encode_value_to(&mut buf, &value);
    buf
}

fn header_to_cbor_value(header: &BlockHeader) -> Value {
    let int = |k: u64| Value::Integer(k.into());

    let merkle_root = match &header.merkle_root {
        Some(root) => Value::Bytes(root.0.to_vec()),
        None => Value::Null,
    };
    let sealed_at = match header.sealed_at {
        Some(ts) => Value::Integer(ts.into()),
        None => Value::Null,
    };

    Value::Map(vec![
        (int(keys::BLOCK_NUMBER), Value::Integer(header.block_number.into())),
        (int(keys::PREVIOUS_HASH), Value::Bytes(header.previous_hash.0.to_vec())),
        (int(keys::MERKLE_ROOT), merkle_root),
        (int(keys::RECORD_COUNT), Value::Integer(header.record_count.into())),
        (int(keys::AGGREGATE_WEIGHT), Value::Integer(header.aggregate_weight.into())),
        (int(keys::OPENED_AT), Value::Integer(header.opened_at.into())),
        (int(keys::SEALED_AT), sealed_at),
        (int(keys::OWNER_ID), Value::Text(header.owner_id.clone())),
    ])
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => {
            encode_uint(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Text(s) => {
            encode_uint(buf, 3, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value_to(buf, item);
            }
        }
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Tag(tag, inner) => {
            encode_uint(buf, 6, *tag);
            encode_value_to(buf, inner);
        }
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Float(f) => {
            // Headers never carry floats; encode at full width if one appears.
            buf.push(0xfb);
            buf.extend_from_slice(&f.to_be_bytes());
        }
        _ => buf.push(0xf6),
    }
}

fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer argument with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

/// Serialize a value to canonical JSON: sorted object keys, compact separators.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    serde_json::to_string(&sort_keys(value)).map_err(|e| CoreError::EncodingError(e.to_string()))
}

/// Rebuild objects with keys inserted in sorted order.
///
/// Holds even if `serde_json/preserve_order` is enabled somewhere in the graph.
fn sort_keys(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut entries: Vec<(String, JsonValue)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, sort_keys(v));
            }
            JsonValue::Object(sorted)
        }
        JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// The NIP-01 serialization whose SHA-256 is a wire event id.
///
/// `[0,<pubkey hex>,<created_at>,<kind>,<tags>,<content>]` with no whitespace.
pub fn nip01_preimage(
    pubkey_hex: &str,
    created_at: u64,
    kind: u16,
    tags: &[Tag],
    content: &str,
) -> Result<String> {
    serde_json::to_string(&(0u8, pubkey_hex, created_at, kind, tags, content))
        .map_err(|e| CoreError::EncodingError(e.to_string()))
}
