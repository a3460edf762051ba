//! SQLite implementation of the BlockStore trait.
//!
//! Uses rusqlite with bundled SQLite, wrapped in async via
//! `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use provenance_core::{
    now_millis, BlockHeader, BlockStatus, MemoryBlock, RecordRef, Sha256Hash,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{BlockStore, InsertResult};

/// SQLite-based sealed-block store.
///
/// Thread-safe via an internal mutex; every operation runs on the blocking
/// pool.
#[derive(Clone)]
pub struct SqliteBlockStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBlockStore {
    /// Open a SQLite database at the given path, creating and migrating it
    /// as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        debug!(path = %path.display(), "opened block database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database. Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

impl std::fmt::Debug for SqliteBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBlockStore").finish_non_exhaustive()
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|e| {
        StoreError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            Some(format!("mutex poisoned: {e}")),
        ))
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

fn hash_column(row: &Row<'_>, column: &str) -> rusqlite::Result<Sha256Hash> {
    let bytes: Vec<u8> = row.get(column)?;
    blob_to_hash(bytes, column)
}

fn blob_to_hash(bytes: Vec<u8>, column: &str) -> rusqlite::Result<Sha256Hash> {
    let array: [u8; 32] = bytes.try_into().map_err(|_| {
        rusqlite::Error::InvalidColumnType(0, column.into(), rusqlite::types::Type::Blob)
    })?;
    Ok(Sha256Hash::from_bytes(array))
}

fn row_to_header(row: &Row<'_>) -> rusqlite::Result<(BlockHeader, String)> {
    let merkle_root: Option<Vec<u8>> = row.get("merkle_root")?;
    let header = BlockHeader {
        block_number: row.get("block_number")?,
        block_hash: hash_column(row, "block_hash")?,
        previous_hash: hash_column(row, "previous_hash")?,
        merkle_root: merkle_root
            .map(|bytes| blob_to_hash(bytes, "merkle_root"))
            .transpose()?,
        record_count: row.get("record_count")?,
        aggregate_weight: row.get("aggregate_weight")?,
        opened_at: row.get("opened_at")?,
        sealed_at: row.get("sealed_at")?,
        owner_id: row.get("owner_id")?,
    };
    Ok((header, row.get("status")?))
}

fn parse_status(status: &str) -> Result<BlockStatus> {
    match status {
        "OPEN" => Ok(BlockStatus::Open),
        "SEALED" => Ok(BlockStatus::Sealed),
        other => Err(StoreError::InvalidData(format!("unknown block status {other:?}"))),
    }
}

fn load_records(conn: &Connection, owner_id: &str, block_number: u64) -> Result<Vec<RecordRef>> {
    let mut stmt = conn.prepare_cached(
        "SELECT record_id, content_hash, weight FROM block_records
         WHERE owner_id = ?1 AND block_number = ?2 ORDER BY position",
    )?;
    let records = stmt
        .query_map(params![owner_id, block_number], |row| {
            Ok(RecordRef {
                id: row.get("record_id")?,
                content_hash: hash_column(row, "content_hash")?,
                weight: row.get("weight")?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

fn assemble(conn: &Connection, header: BlockHeader, status: &str) -> Result<MemoryBlock> {
    let status = parse_status(status)?;
    let records = load_records(conn, &header.owner_id, header.block_number)?;
    Ok(MemoryBlock::from_parts(header, records, status))
}

const HEADER_COLUMNS: &str = "owner_id, block_number, block_hash, previous_hash, merkle_root,
    record_count, aggregate_weight, opened_at, sealed_at, status";

#[async_trait]
impl BlockStore for SqliteBlockStore {
    async fn insert_block(&self, block: &MemoryBlock) -> Result<InsertResult> {
        if !block.is_sealed() {
            return Err(StoreError::InvalidData(format!(
                "block {} of {} is not sealed",
                block.block_number(),
                block.owner_id()
            )));
        }
        let block = block.clone();

        self.with_conn(move |conn| {
            let header = block.header();
            let existing: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT block_hash FROM memory_blocks WHERE owner_id = ?1 AND block_number = ?2",
                    params![header.owner_id, header.block_number],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(bytes) = existing {
                let existing = blob_to_hash(bytes, "block_hash")?;
                if existing == header.block_hash {
                    return Ok(InsertResult::AlreadyExists);
                }
                return Ok(InsertResult::Conflict { existing });
            }

            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO memory_blocks (
                    owner_id, block_number, block_hash, previous_hash, merkle_root,
                    record_count, aggregate_weight, opened_at, sealed_at, status, stored_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    header.owner_id,
                    header.block_number,
                    header.block_hash.as_bytes().as_slice(),
                    header.previous_hash.as_bytes().as_slice(),
                    header.merkle_root.as_ref().map(|h| h.as_bytes().to_vec()),
                    header.record_count,
                    header.aggregate_weight,
                    header.opened_at,
                    header.sealed_at,
                    block.status().as_str(),
                    now_millis(),
                ],
            )?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO block_records (
                        owner_id, block_number, position, record_id, content_hash, weight
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for (position, record) in block.records().iter().enumerate() {
                    stmt.execute(params![
                        header.owner_id,
                        header.block_number,
                        position as u64,
                        record.id,
                        record.content_hash.as_bytes().as_slice(),
                        record.weight,
                    ])?;
                }
            }
            tx.commit()?;

            debug!(
                owner = %header.owner_id,
                block_number = header.block_number,
                records = header.record_count,
                "stored sealed block"
            );
            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn get_block(&self, owner_id: &str, block_number: u64) -> Result<Option<MemoryBlock>> {
        let owner_id = owner_id.to_string();
        self.with_conn(move |conn| {
            let found = conn
                .query_row(
                    &format!(
                        "SELECT {HEADER_COLUMNS} FROM memory_blocks
                         WHERE owner_id = ?1 AND block_number = ?2"
                    ),
                    params![owner_id, block_number],
                    row_to_header,
                )
                .optional()?;
            found
                .map(|(header, status)| assemble(conn, header, &status))
                .transpose()
        })
        .await
    }

    async fn latest_header(&self, owner_id: &str) -> Result<Option<BlockHeader>> {
        let owner_id = owner_id.to_string();
        self.with_conn(move |conn| {
            let found = conn
                .query_row(
                    &format!(
                        "SELECT {HEADER_COLUMNS} FROM memory_blocks
                         WHERE owner_id = ?1 ORDER BY block_number DESC LIMIT 1"
                    ),
                    params![owner_id],
                    row_to_header,
                )
                .optional()?;
            Ok(found.map(|(header, _)| header))
        })
        .await
    }

    async fn list_blocks(&self, owner_id: &str) -> Result<Vec<MemoryBlock>> {
        let owner_id = owner_id.to_string();
        self.with_conn(move |conn| {
            let headers = {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {HEADER_COLUMNS} FROM memory_blocks
                     WHERE owner_id = ?1 ORDER BY block_number"
                ))?;
                let rows = stmt
                    .query_map(params![owner_id], row_to_header)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };
            headers
                .into_iter()
                .map(|(header, status)| assemble(conn, header, &status))
                .collect()
        })
        .await
    }

    async fn list_owners(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT owner_id FROM memory_blocks ORDER BY owner_id")?;
            let owners = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(owners)
        })
        .await
    }
}
