//! Store trait: the abstract interface for memreceipt persistence.
//!
//! This trait allows the service to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use memreceipt_core::{Fingerprint, KeyId, RevocationRecord};

use crate::error::Result;
use crate::records::{ActionRecord, MemoryQuery, MemoryRecord, StoredKey};

/// Result of inserting a revocation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// The record was inserted; the caller won.
    Inserted,
    /// A record for this fingerprint already exists (first writer wins).
    AlreadyExists(RevocationRecord),
}

/// The Store trait: async interface for memreceipt persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Keys are never deleted**: rotation retires the old record and wipes
///   its sealed seed in the same transaction that inserts the new one.
/// - **Compare-and-insert revocations**: at most one record per fingerprint;
///   the loser of a race gets the winner's record back.
/// - **Search suppression**: revoked and expired memory items never appear in
///   search results.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Key Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a new key version.
    ///
    /// Fails with `Conflict` if the key id or version already exists.
    async fn insert_key(&self, key: &StoredKey) -> Result<()>;

    /// Atomically retire `retiring` at `retired_at` and insert `next`.
    ///
    /// Fails with `Conflict` if `retiring` is not currently active.
    async fn rotate_key(&self, retiring: &KeyId, retired_at: i64, next: &StoredKey) -> Result<()>;

    /// Retire a key without activating a replacement.
    ///
    /// A no-op if the key is already retired.
    async fn retire_key(&self, key_id: &KeyId, retired_at: i64) -> Result<()>;

    /// All key versions, oldest first.
    async fn list_keys(&self) -> Result<Vec<StoredKey>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Revocation Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a revocation record unless one exists for the fingerprint.
    async fn insert_revocation(&self, record: &RevocationRecord) -> Result<InsertResult>;

    /// Get the revocation record for a fingerprint.
    async fn get_revocation(&self, fingerprint: &Fingerprint) -> Result<Option<RevocationRecord>>;

    /// All revocation records, oldest first.
    async fn list_revocations(&self) -> Result<Vec<RevocationRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Memory Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a memory item.
    ///
    /// Returns `false` if an item with the same fingerprint already exists
    /// (the existing item is kept unchanged).
    async fn put_memory(&self, record: &MemoryRecord) -> Result<bool>;

    /// Get a memory item by fingerprint, including revoked or expired ones.
    async fn get_memory(&self, fingerprint: &Fingerprint) -> Result<Option<MemoryRecord>>;

    /// Search memory items, newest first, at most `query.top_k` results.
    async fn search_memories(&self, query: &MemoryQuery) -> Result<Vec<MemoryRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Audit Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Record that a receipt was issued for an action on a fingerprint.
    async fn record_action(&self, action: &ActionRecord) -> Result<()>;

    /// All recorded actions for a fingerprint, oldest first.
    async fn actions_for(&self, fingerprint: &Fingerprint) -> Result<Vec<ActionRecord>>;
}
