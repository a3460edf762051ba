//! Database schema migrations for the SQLite block store.
//!
//! Each migration is a SQL batch that moves the schema from version N to N+1.

use rusqlite::Connection;

use provenance_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Safe to call repeatedly.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {current} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: sealed blocks and their ordered records.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE memory_blocks (
            owner_id TEXT NOT NULL,
            block_number INTEGER NOT NULL,
            block_hash BLOB NOT NULL,         -- 32 bytes, SHA-256 of the canonical header
            previous_hash BLOB NOT NULL,      -- 32 bytes, genesis link for block 0
            merkle_root BLOB,                 -- 32 bytes, NULL only while open
            record_count INTEGER NOT NULL,
            aggregate_weight INTEGER NOT NULL,
            opened_at INTEGER NOT NULL,       -- Unix ms
            sealed_at INTEGER,                -- Unix ms
            status TEXT NOT NULL,             -- OPEN | SEALED
            stored_at INTEGER NOT NULL,       -- local time of insertion

            PRIMARY KEY (owner_id, block_number)
        );

        CREATE TABLE block_records (
            owner_id TEXT NOT NULL,
            block_number INTEGER NOT NULL,
            position INTEGER NOT NULL,        -- order within the block, from 0
            record_id TEXT NOT NULL,
            content_hash BLOB NOT NULL,       -- 32 bytes
            weight INTEGER NOT NULL,

            PRIMARY KEY (owner_id, block_number, position)
        );

        CREATE INDEX idx_memory_blocks_hash ON memory_blocks(block_hash);
        CREATE INDEX idx_block_records_hash ON block_records(content_hash);
        "#,
    )?;

    Ok(())
}
