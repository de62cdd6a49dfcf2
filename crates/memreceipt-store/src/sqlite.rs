//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for memreceipt. It uses rusqlite
//! with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use memreceipt_core::{
    Action, Blake3Hash, Ed25519PublicKey, Fingerprint, KeyId, KeyRecord, Receipt,
    RevocationRecord,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::records::{ActionRecord, Consent, MemoryQuery, MemoryRecord, Scope, StoredKey};
use crate::traits::{InsertResult, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime. Because every operation holds the
/// connection lock for its whole duration, compare-and-insert sequences are
/// atomic with respect to each other.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking thread pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Task(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// Map a uniqueness violation to `Conflict`.
fn conflict_on_constraint(e: rusqlite::Error, what: impl FnOnce() -> String) -> StoreError {
    match e {
        rusqlite::Error::SqliteFailure(ref err, _) if err.code == ErrorCode::ConstraintViolation => {
            StoreError::Conflict(what())
        }
        other => StoreError::Database(other),
    }
}

fn to_array<const N: usize>(bytes: Vec<u8>, column: &str) -> Result<[u8; N]> {
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        StoreError::InvalidData(format!("{}: expected {} bytes, got {}", column, N, len))
    })
}

fn insert_key_row(conn: &Connection, key: &StoredKey) -> Result<()> {
    conn.execute(
        "INSERT INTO signing_keys (version, key_id, public_key, created_at, retired_at, sealed_seed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            key.version as i64,
            key.record.key_id.as_str(),
            key.record.public_key.as_bytes().as_slice(),
            key.record.created_at,
            key.record.retired_at,
            key.sealed_seed.as_deref(),
        ],
    )
    .map_err(|e| {
        conflict_on_constraint(e, || {
            format!(
                "key {} (version {}) already exists",
                key.record.key_id, key.version
            )
        })
    })?;
    Ok(())
}

type KeyRow = (i64, String, Vec<u8>, i64, Option<i64>, Option<Vec<u8>>);

fn key_from_row((version, key_id, public_key, created_at, retired_at, sealed_seed): KeyRow) -> Result<StoredKey> {
    Ok(StoredKey {
        record: KeyRecord {
            key_id: KeyId::new(key_id)?,
            public_key: Ed25519PublicKey::from_bytes(to_array(public_key, "public_key")?),
            created_at,
            retired_at,
        },
        version: u64::try_from(version)
            .map_err(|_| StoreError::InvalidData(format!("negative key version {}", version)))?,
        sealed_seed,
    })
}

type RevocationRow = (Vec<u8>, Vec<u8>, i64);

fn revocation_from_row((fingerprint, receipt, revoked_at): RevocationRow) -> Result<RevocationRecord> {
    let fingerprint = Fingerprint::from_bytes(to_array(fingerprint, "fingerprint")?);
    let receipt = Receipt::from_cbor(&receipt)?;
    if receipt.fingerprint != fingerprint || receipt.action != Action::Revoke {
        return Err(StoreError::InvalidData(format!(
            "revocation row {} holds a mismatched receipt",
            fingerprint
        )));
    }
    Ok(RevocationRecord {
        fingerprint,
        receipt,
        revoked_at,
    })
}

fn select_revocation(conn: &Connection, fingerprint: &Fingerprint) -> Result<Option<RevocationRecord>> {
    let row: Option<RevocationRow> = conn
        .query_row(
            "SELECT fingerprint, receipt, revoked_at FROM revocations WHERE fingerprint = ?1",
            params![fingerprint.as_bytes().as_slice()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    row.map(revocation_from_row).transpose()
}

type MemoryRow = (Vec<u8>, String, String, String, String, i64, Option<i64>);

const MEMORY_COLUMNS: &str =
    "m.fingerprint, m.statement, m.tags, m.scope, m.consent, m.created_at, m.expires_at";

fn read_memory_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn memory_from_row(
    (fingerprint, statement, tags, scope, consent, created_at, expires_at): MemoryRow,
) -> Result<MemoryRecord> {
    Ok(MemoryRecord {
        fingerprint: Fingerprint::from_bytes(to_array(fingerprint, "fingerprint")?),
        statement,
        tags: serde_json::from_str(&tags)?,
        scope: Scope::parse(&scope)
            .ok_or_else(|| StoreError::InvalidData(format!("unknown scope: {}", scope)))?,
        consent: Consent::parse(&consent)
            .ok_or_else(|| StoreError::InvalidData(format!("unknown consent: {}", consent)))?,
        created_at,
        expires_at,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_key(&self, key: &StoredKey) -> Result<()> {
        let key = key.clone();
        self.blocking(move |conn| insert_key_row(conn, &key)).await
    }

    async fn rotate_key(&self, retiring: &KeyId, retired_at: i64, next: &StoredKey) -> Result<()> {
        let retiring = retiring.clone();
        let next = next.clone();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;

            let changed = tx.execute(
                "UPDATE signing_keys SET retired_at = ?1, sealed_seed = NULL
                 WHERE key_id = ?2 AND retired_at IS NULL",
                params![retired_at, retiring.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::Conflict(format!(
                    "key {} is not active",
                    retiring
                )));
            }

            insert_key_row(&tx, &next)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn retire_key(&self, key_id: &KeyId, retired_at: i64) -> Result<()> {
        let key_id = key_id.clone();

        self.blocking(move |conn| {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT version FROM signing_keys WHERE key_id = ?1",
                    params![key_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::NotFound(format!("key {}", key_id)));
            }

            conn.execute(
                "UPDATE signing_keys SET retired_at = ?1, sealed_seed = NULL
                 WHERE key_id = ?2 AND retired_at IS NULL",
                params![retired_at, key_id.as_str()],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_keys(&self) -> Result<Vec<StoredKey>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(
                "SELECT version, key_id, public_key, created_at, retired_at, sealed_seed
                 FROM signing_keys ORDER BY version ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<KeyRow>>>()?;

            rows.into_iter().map(key_from_row).collect()
        })
        .await
    }

    async fn insert_revocation(&self, record: &RevocationRecord) -> Result<InsertResult> {
        let record = record.clone();

        self.blocking(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO revocations (fingerprint, receipt, revoked_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(fingerprint) DO NOTHING",
                params![
                    record.fingerprint.as_bytes().as_slice(),
                    record.receipt.to_cbor(),
                    record.revoked_at,
                ],
            )?;

            if inserted == 1 {
                return Ok(InsertResult::Inserted);
            }

            let existing = select_revocation(conn, &record.fingerprint)?.ok_or_else(|| {
                StoreError::InvalidData(format!(
                    "revocation for {} vanished after conflict",
                    record.fingerprint
                ))
            })?;
            Ok(InsertResult::AlreadyExists(existing))
        })
        .await
    }

    async fn get_revocation(&self, fingerprint: &Fingerprint) -> Result<Option<RevocationRecord>> {
        let fingerprint = *fingerprint;
        self.blocking(move |conn| select_revocation(conn, &fingerprint))
            .await
    }

    async fn list_revocations(&self) -> Result<Vec<RevocationRecord>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(
                "SELECT fingerprint, receipt, revoked_at FROM revocations
                 ORDER BY revoked_at ASC, fingerprint ASC",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<rusqlite::Result<Vec<RevocationRow>>>()?;

            rows.into_iter().map(revocation_from_row).collect()
        })
        .await
    }

    async fn put_memory(&self, record: &MemoryRecord) -> Result<bool> {
        let record = record.clone();

        self.blocking(move |conn| {
            let tags = serde_json::to_string(&record.tags)?;
            let inserted = conn.execute(
                "INSERT INTO memories (fingerprint, statement, tags, scope, consent, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(fingerprint) DO NOTHING",
                params![
                    record.fingerprint.as_bytes().as_slice(),
                    record.statement,
                    tags,
                    record.scope.as_str(),
                    record.consent.as_str(),
                    record.created_at,
                    record.expires_at,
                ],
            )?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn get_memory(&self, fingerprint: &Fingerprint) -> Result<Option<MemoryRecord>> {
        let fingerprint = *fingerprint;

        self.blocking(move |conn| {
            let sql = format!(
                "SELECT {} FROM memories m WHERE m.fingerprint = ?1",
                MEMORY_COLUMNS
            );
            let row = conn
                .query_row(
                    &sql,
                    params![fingerprint.as_bytes().as_slice()],
                    read_memory_row,
                )
                .optional()?;
            row.map(memory_from_row).transpose()
        })
        .await
    }

    async fn search_memories(&self, query: &MemoryQuery) -> Result<Vec<MemoryRecord>> {
        let query = query.clone();

        self.blocking(move |conn| {
            let tags = serde_json::to_string(&query.tags)?;
            let sql = format!(
                "SELECT {} FROM memories m
                 WHERE NOT EXISTS (SELECT 1 FROM revocations r WHERE r.fingerprint = m.fingerprint)
                   AND (m.expires_at IS NULL OR m.expires_at > ?1)
                   AND (?2 = '' OR instr(lower(m.statement), ?2) > 0)
                   AND (?3 = '[]' OR EXISTS (
                        SELECT 1 FROM json_each(m.tags) t
                        WHERE t.value IN (SELECT value FROM json_each(?3))))
                 ORDER BY m.created_at DESC, m.fingerprint ASC
                 LIMIT ?4",
                MEMORY_COLUMNS
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![query.now, query.text, tags, query.top_k as i64],
                    read_memory_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter().map(memory_from_row).collect()
        })
        .await
    }

    async fn record_action(&self, action: &ActionRecord) -> Result<()> {
        let action = action.clone();

        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO actions (fingerprint, action, receipt_id, recorded_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    action.fingerprint.as_bytes().as_slice(),
                    action.action.as_str(),
                    action.receipt_id.as_bytes().as_slice(),
                    action.recorded_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn actions_for(&self, fingerprint: &Fingerprint) -> Result<Vec<ActionRecord>> {
        let fingerprint = *fingerprint;

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT action, receipt_id, recorded_at FROM actions
                 WHERE fingerprint = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map(params![fingerprint.as_bytes().as_slice()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(action, receipt_id, recorded_at)| {
                    Ok(ActionRecord {
                        fingerprint,
                        action: Action::parse(&action).ok_or_else(|| {
                            StoreError::InvalidData(format!("unknown action: {}", action))
                        })?,
                        receipt_id: Blake3Hash(to_array(receipt_id, "receipt_id")?),
                        recorded_at,
                    })
                })
                .collect()
        })
        .await
    }
}
