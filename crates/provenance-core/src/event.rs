//! LogEvent: an entry of the append-only, hash-chained event log.
//!
//! Each event stores the hash of its predecessor and the hash of its own
//! canonical fields. Events are created once by an append and never edited.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::canonical::canonical_json;
use crate::crypto::Sha256Hash;
use crate::error::{CoreError, Result};
use crate::signature::ContentSignature;

/// A single entry of the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Random unique identifier.
    pub event_id: Uuid,

    /// Global sequence number (1-indexed, gapless).
    pub sequence: u64,

    /// What the mutation is about.
    pub subject_id: String,

    /// What kind of mutation happened.
    pub action_type: String,

    pub payload: Value,

    /// Who performed the mutation.
    pub author: String,

    pub context: Value,

    /// Hash of the preceding event, or [`Sha256Hash::ZERO`] for sequence 1.
    pub previous_event_hash: Sha256Hash,

    /// Hash of this event's canonical fields, excluding this one.
    pub resource_hash: Sha256Hash,

    /// Unix milliseconds.
    pub timestamp: i64,

    /// The author's signature over `resource_hash`. Not itself hashed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_signature: Option<ContentSignature>,
}

/// The fields covered by `resource_hash`.
#[derive(Serialize)]
struct HashedFields<'a> {
    event_id: &'a Uuid,
    sequence: u64,
    subject_id: &'a str,
    action_type: &'a str,
    payload: &'a Value,
    author: &'a str,
    context: &'a Value,
    previous_event_hash: &'a Sha256Hash,
    timestamp: i64,
}

impl LogEvent {
    /// Build an event from a draft at a fixed chain position.
    pub fn from_draft(
        draft: EventDraft,
        sequence: u64,
        previous_event_hash: Sha256Hash,
        timestamp: i64,
    ) -> Result<Self> {
        let mut event = Self {
            event_id: Uuid::new_v4(),
            sequence,
            subject_id: draft.subject_id,
            action_type: draft.action_type,
            payload: draft.payload,
            author: draft.author,
            context: draft.context,
            previous_event_hash,
            resource_hash: Sha256Hash::ZERO,
            timestamp,
            author_signature: None,
        };
        event.resource_hash = event.compute_hash()?;
        Ok(event)
    }

    /// Recompute the hash of this event's canonical fields.
    pub fn compute_hash(&self) -> Result<Sha256Hash> {
        let fields = HashedFields {
            event_id: &self.event_id,
            sequence: self.sequence,
            subject_id: &self.subject_id,
            action_type: &self.action_type,
            payload: &self.payload,
            author: &self.author,
            context: &self.context,
            previous_event_hash: &self.previous_event_hash,
            timestamp: self.timestamp,
        };
        Ok(Sha256Hash::hash(canonical_json(&fields)?.as_bytes()))
    }

    /// Whether the stored `resource_hash` matches the fields.
    pub fn has_valid_hash(&self) -> bool {
        matches!(self.compute_hash(), Ok(h) if h == self.resource_hash)
    }

    /// The bytes an author signs: the stored `resource_hash`.
    pub fn signing_bytes(&self) -> &[u8] {
        self.resource_hash.as_bytes()
    }

    /// Serialize to one line of JSON (no trailing newline).
    pub fn to_json_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| CoreError::EncodingError(e.to_string()))
    }

    /// Parse one line of JSON.
    pub fn from_json_line(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| CoreError::MalformedEvent(e.to_string()))
    }
}

/// The caller-supplied part of an event, before it is placed in the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub subject_id: String,
    pub action_type: String,
    pub author: String,
    pub payload: Value,
    pub context: Value,
}

impl EventDraft {
    pub fn new(
        subject_id: impl Into<String>,
        action_type: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            action_type: action_type.into(),
            author: author.into(),
            payload: Value::Null,
            context: Value::Null,
        }
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

/// Filter predicates and paging for event log queries.
///
/// Time bounds are inclusive Unix milliseconds. `offset` and `limit`
/// apply after filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    pub subject_id: Option<String>,
    pub action_type: Option<String>,
    pub author: Option<String>,
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl EventQuery {
    /// A query matching every event.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    pub fn action(mut self, action_type: impl Into<String>) -> Self {
        self.action_type = Some(action_type.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn since(mut self, since: i64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: i64) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Whether an event passes the filter predicates (paging aside).
    pub fn matches(&self, event: &LogEvent) -> bool {
        fn eq(filter: &Option<String>, value: &str) -> bool {
            filter.as_deref().map_or(true, |f| f == value)
        }

        eq(&self.subject_id, &event.subject_id)
            && eq(&self.action_type, &event.action_type)
            && eq(&self.author, &event.author)
            && self.since.map_or(true, |s| event.timestamp >= s)
            && self.until.map_or(true, |u| event.timestamp <= u)
    }
}
