//! EventLog: the append-only, hash-chained record of state mutations.
//!
//! Appends are serialized by one async mutex that also guards the cursor
//! (last sequence, last hash). The store only ever sees complete events in
//! sequence order. Reads go straight to the store and never take the lock,
//! except audits, which must not interleave with a write.
//!
//! A log built [`with_signer`](EventLog::with_signer) is authored: every
//! append must name the signer's address as author, and the signer's
//! signature over the event's `resource_hash` is stored with the event.
//! Audits check those signatures alongside the hash chain.

use std::future::ready;
use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use provenance_core::{
    now_millis, ChainAudit, ChainAuditor, EventDraft, EventQuery, IdentityAddress,
    IntegrityViolation, LogEvent, Sha256Hash,
};
use provenance_identity::ContentSigner;
use provenance_store::{EventStore, StoreError};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ProvenanceError, Result};

#[derive(Debug, Clone, Copy)]
struct Cursor {
    sequence: u64,
    last_hash: Sha256Hash,
}

impl Cursor {
    const EMPTY: Cursor = Cursor {
        sequence: 0,
        last_hash: Sha256Hash::ZERO,
    };
}

/// A hash-chained event log over an [`EventStore`].
pub struct EventLog<S: EventStore> {
    store: Arc<S>,
    cursor: Mutex<Cursor>,
    signer: Option<ContentSigner>,
}

impl<S: EventStore> EventLog<S> {
    /// Open a log, recovering the cursor from the last stored event.
    ///
    /// Fails if any stored entry is unreadable; appending after a torn tail
    /// would extend a chain that can no longer be verified.
    pub async fn open(store: S) -> Result<Self> {
        Self::open_shared(Arc::new(store)).await
    }

    pub async fn open_shared(store: Arc<S>) -> Result<Self> {
        let cursor = match store.last().await? {
            Some(last) => Cursor {
                sequence: last.sequence,
                last_hash: last.resource_hash,
            },
            None => Cursor::EMPTY,
        };
        info!(sequence = cursor.sequence, "event log opened");
        Ok(Self {
            store,
            cursor: Mutex::new(cursor),
            signer: None,
        })
    }

    /// Sign every appended event with `signer` and require signatures
    /// during audits.
    pub fn with_signer(mut self, signer: ContentSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn signer(&self) -> Option<&ContentSigner> {
        self.signer.as_ref()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Append one event and return it as stored.
    pub async fn append(
        &self,
        subject_id: impl Into<String>,
        action_type: impl Into<String>,
        author: impl Into<String>,
        payload: Value,
        context: Value,
    ) -> Result<LogEvent> {
        let draft = EventDraft::new(subject_id, action_type, author)
            .payload(payload)
            .context(context);
        self.append_draft(draft).await
    }

    pub async fn append_draft(&self, draft: EventDraft) -> Result<LogEvent> {
        if let Some(signer) = &self.signer {
            let identity = signer.key_store().address();
            if draft.author != identity.as_str() {
                return Err(ProvenanceError::AuthorMismatch {
                    author: draft.author,
                    identity: identity.to_string(),
                });
            }
        }

        let mut cursor = self.cursor.lock().await;
        let mut event = LogEvent::from_draft(
            draft,
            cursor.sequence + 1,
            cursor.last_hash,
            now_millis(),
        )?;
        if let Some(signer) = &self.signer {
            event.author_signature = Some(signer.sign(event.signing_bytes())?);
        }

        // The cursor only moves once the store has the event.
        self.store.append(&event).await?;
        cursor.sequence = event.sequence;
        cursor.last_hash = event.resource_hash;

        debug!(
            sequence = event.sequence,
            subject = %event.subject_id,
            action = %event.action_type,
            "event appended"
        );
        Ok(event)
    }

    /// Lazily stream events matching `query`, in sequence order.
    ///
    /// Each call rescans the store, so the same query over the same store
    /// yields the same events.
    pub fn query(&self, query: EventQuery) -> BoxStream<'_, Result<LogEvent>> {
        let mut to_skip = query.offset;
        let limit = query.limit.unwrap_or(usize::MAX);
        self.store
            .scan()
            .map_err(ProvenanceError::from)
            .try_filter(move |event| ready(query.matches(event)))
            .filter(move |item| {
                let skip = item.is_ok() && to_skip > 0;
                if skip {
                    to_skip -= 1;
                }
                ready(!skip)
            })
            .take(limit)
            .boxed()
    }

    /// Collect a query into memory.
    pub async fn query_all(&self, query: EventQuery) -> Result<Vec<LogEvent>> {
        self.query(query).try_collect().await
    }

    /// Number of events appended so far.
    pub async fn count(&self) -> u64 {
        self.cursor.lock().await.sequence
    }

    /// Hash of the most recent event, or the zero sentinel for an empty log.
    pub async fn last_hash(&self) -> Sha256Hash {
        self.cursor.lock().await.last_hash
    }

    /// The most recent event.
    pub async fn head(&self) -> Result<Option<LogEvent>> {
        Ok(self.store.last().await?)
    }

    /// Replay the whole store and report the first violation, if any.
    pub async fn audit_chain(&self) -> Result<ChainAudit> {
        let _writer = self.cursor.lock().await;
        audit_event_store(self.store.as_ref(), self.signer.as_ref()).await
    }

    /// `true` iff every stored event links to its predecessor, hashes
    /// to its own `resource_hash` and carries a valid author signature
    /// where one is present or required.
    pub async fn verify_chain(&self) -> Result<bool> {
        let audit = self.audit_chain().await?;
        if let Some(violation) = &audit.broken_at {
            warn!(%violation, checked = audit.events_checked, "event chain verification failed");
        }
        Ok(audit.is_intact())
    }
}

/// Replay any event store from the start.
///
/// With a `signer`, every event must carry a valid author signature;
/// without one, signatures are checked only where present. Unreadable
/// entries are reported as violations; only I/O failures that prevent
/// reading at all are errors.
pub async fn audit_event_store<S: EventStore + ?Sized>(
    store: &S,
    signer: Option<&ContentSigner>,
) -> Result<ChainAudit> {
    let mut auditor = ChainAuditor::new();
    let mut scan = store.scan();
    while let Some(item) = scan.next().await {
        match item {
            Ok(event) => {
                if !auditor.push_checked(&event, |e| check_authorship(e, signer)) {
                    break;
                }
            }
            Err(StoreError::Corrupt { line, reason }) => {
                auditor.push_unreadable(format!("line {line}: {reason}"));
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(auditor.finish())
}

/// The author named in `event` must be the address of the key that signed
/// its `resource_hash`.
///
/// HMAC signatures can only be checked by the local key holder.
fn check_authorship(
    event: &LogEvent,
    signer: Option<&ContentSigner>,
) -> std::result::Result<(), IntegrityViolation> {
    let sequence = event.sequence;
    let Some(signature) = &event.author_signature else {
        return match signer {
            Some(_) => Err(IntegrityViolation::MissingAuthorSignature { sequence }),
            None => Ok(()),
        };
    };
    if IdentityAddress::derive(&signature.signer_pubkey).as_str() != event.author {
        return Err(IntegrityViolation::AuthorSignatureInvalid { sequence });
    }
    let content = event.signing_bytes();
    let valid = if signature.algorithm.is_insecure() {
        signer.is_some_and(|s| s.verify(content, signature))
    } else {
        signature.verify_public(content)
    };
    if valid {
        Ok(())
    } else {
        Err(IntegrityViolation::AuthorSignatureInvalid { sequence })
    }
}
