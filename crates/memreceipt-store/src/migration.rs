//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
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
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, crate::now_millis()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Signing keys: every version ever issued, never deleted
        CREATE TABLE signing_keys (
            version INTEGER PRIMARY KEY,
            key_id TEXT NOT NULL UNIQUE,
            public_key BLOB NOT NULL,         -- 32 bytes, Ed25519
            created_at INTEGER NOT NULL,      -- Unix ms
            retired_at INTEGER,               -- Unix ms, NULL while active
            sealed_seed BLOB                  -- nonce || ciphertext, NULL once retired
        );

        -- Revocations: at most one per fingerprint
        CREATE TABLE revocations (
            fingerprint BLOB PRIMARY KEY,     -- 32 bytes
            receipt BLOB NOT NULL,            -- canonical CBOR of the revoke receipt
            revoked_at INTEGER NOT NULL
        );

        -- Memory items, keyed by fingerprint
        CREATE TABLE memories (
            fingerprint BLOB PRIMARY KEY,
            statement TEXT NOT NULL,
            tags TEXT NOT NULL,               -- JSON array of lowercase tags
            scope TEXT NOT NULL,
            consent TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            expires_at INTEGER
        );

        -- Audit log of issued receipts
        CREATE TABLE actions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fingerprint BLOB NOT NULL,
            action TEXT NOT NULL,
            receipt_id BLOB NOT NULL,
            recorded_at INTEGER NOT NULL
        );

        CREATE INDEX idx_memories_created ON memories(created_at);
        CREATE INDEX idx_revocations_revoked ON revocations(revoked_at);
        CREATE INDEX idx_actions_fingerprint ON actions(fingerprint);
        "#,
    )?;

    Ok(())
}
