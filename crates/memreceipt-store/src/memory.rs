//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use memreceipt_core::{Fingerprint, KeyId, RevocationRecord};

use crate::error::{Result, StoreError};
use crate::records::{ActionRecord, MemoryQuery, MemoryRecord, StoredKey};
use crate::traits::{InsertResult, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; every
/// compare-and-insert runs under a single write guard.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Key versions in insertion (version) order.
    keys: Vec<StoredKey>,

    /// Revocations indexed by fingerprint.
    revocations: HashMap<Fingerprint, RevocationRecord>,

    /// Memory items indexed by fingerprint.
    memories: HashMap<Fingerprint, MemoryRecord>,

    /// Audit log in append order.
    actions: Vec<ActionRecord>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Task(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Task(format!("lock poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    fn check_new_key(&self, key: &StoredKey) -> Result<()> {
        if self
            .keys
            .iter()
            .any(|k| k.record.key_id == key.record.key_id || k.version == key.version)
        {
            return Err(StoreError::Conflict(format!(
                "key {} (version {}) already exists",
                key.record.key_id, key.version
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_key(&self, key: &StoredKey) -> Result<()> {
        let mut inner = self.write()?;
        inner.check_new_key(key)?;
        inner.keys.push(key.clone());
        Ok(())
    }

    async fn rotate_key(&self, retiring: &KeyId, retired_at: i64, next: &StoredKey) -> Result<()> {
        let mut inner = self.write()?;
        inner.check_new_key(next)?;

        let current = inner
            .keys
            .iter_mut()
            .find(|k| &k.record.key_id == retiring && !k.record.is_retired())
            .ok_or_else(|| StoreError::Conflict(format!("key {} is not active", retiring)))?;

        current.record.retired_at = Some(retired_at);
        current.sealed_seed = None;
        inner.keys.push(next.clone());
        Ok(())
    }

    async fn retire_key(&self, key_id: &KeyId, retired_at: i64) -> Result<()> {
        let mut inner = self.write()?;
        let key = inner
            .keys
            .iter_mut()
            .find(|k| &k.record.key_id == key_id)
            .ok_or_else(|| StoreError::NotFound(format!("key {}", key_id)))?;

        if !key.record.is_retired() {
            key.record.retired_at = Some(retired_at);
            key.sealed_seed = None;
        }
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<StoredKey>> {
        let inner = self.read()?;
        let mut keys = inner.keys.clone();
        keys.sort_by_key(|k| k.version);
        Ok(keys)
    }

    async fn insert_revocation(&self, record: &RevocationRecord) -> Result<InsertResult> {
        let mut inner = self.write()?;

        if let Some(existing) = inner.revocations.get(&record.fingerprint) {
            return Ok(InsertResult::AlreadyExists(existing.clone()));
        }

        inner
            .revocations
            .insert(record.fingerprint, record.clone());
        Ok(InsertResult::Inserted)
    }

    async fn get_revocation(&self, fingerprint: &Fingerprint) -> Result<Option<RevocationRecord>> {
        let inner = self.read()?;
        Ok(inner.revocations.get(fingerprint).cloned())
    }

    async fn list_revocations(&self) -> Result<Vec<RevocationRecord>> {
        let inner = self.read()?;
        let mut records: Vec<_> = inner.revocations.values().cloned().collect();
        records.sort_by(|a, b| {
            a.revoked_at
                .cmp(&b.revoked_at)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        Ok(records)
    }

    async fn put_memory(&self, record: &MemoryRecord) -> Result<bool> {
        let mut inner = self.write()?;
        if inner.memories.contains_key(&record.fingerprint) {
            return Ok(false);
        }
        inner.memories.insert(record.fingerprint, record.clone());
        Ok(true)
    }

    async fn get_memory(&self, fingerprint: &Fingerprint) -> Result<Option<MemoryRecord>> {
        let inner = self.read()?;
        Ok(inner.memories.get(fingerprint).cloned())
    }

    async fn search_memories(&self, query: &MemoryQuery) -> Result<Vec<MemoryRecord>> {
        let inner = self.read()?;

        let mut hits: Vec<MemoryRecord> = inner
            .memories
            .values()
            .filter(|m| !inner.revocations.contains_key(&m.fingerprint))
            .filter(|m| !m.is_expired(query.now))
            .filter(|m| m.matches(query))
            .cloned()
            .collect();

        hits.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        hits.truncate(query.top_k);
        Ok(hits)
    }

    async fn record_action(&self, action: &ActionRecord) -> Result<()> {
        let mut inner = self.write()?;
        inner.actions.push(action.clone());
        Ok(())
    }

    async fn actions_for(&self, fingerprint: &Fingerprint) -> Result<Vec<ActionRecord>> {
        let inner = self.read()?;
        Ok(inner
            .actions
            .iter()
            .filter(|a| &a.fingerprint == fingerprint)
            .cloned()
            .collect())
    }
}
