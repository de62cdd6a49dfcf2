//! The key manager: the issuer's signing keys.
//!
//! Exactly one key is active. The active key lives behind a tokio `RwLock`
//! holding an `Arc`, so issuance takes a cheap snapshot under the read side
//! and rotation swaps in a new key under the write side. Because issuance
//! reads the timestamp while holding the read guard, and rotation reads the
//! retirement time only after acquiring the write guard, every receipt
//! signed by a retired key carries `timestamp <= retired_at`.
//!
//! If the active key's sealed seed cannot be opened, or opens to a seed that
//! does not match the published public key, the manager is *halted*: signing
//! fails, verification and the key document keep working, and a successful
//! [`KeyManager::rotate`] restores issuance.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use memreceipt_core::{Ed25519Signature, KeyDocument, KeyId, KeyRecord, Keypair};
use memreceipt_store::{Store, StoredKey};
use memreceipt_verify::{TrustSource, VerifyError};

use crate::clock::IssuanceClock;
use crate::error::{Result, ServiceError};
use crate::seal::KeySealer;

/// The active signing key: its public record and private material.
pub struct ActiveKey {
    pub record: KeyRecord,
    keypair: Keypair,
}

impl ActiveKey {
    pub fn key_id(&self) -> &KeyId {
        &self.record.key_id
    }

    pub(crate) fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

impl std::fmt::Debug for ActiveKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveKey")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

enum ActiveSlot {
    Ready(Arc<ActiveKey>),
    Halted(String),
}

/// Settings the key manager needs from the service configuration.
#[derive(Debug, Clone)]
pub struct KeyManagerConfig {
    pub issuer: String,
    pub key_id_prefix: String,
    /// Seed of the first key when the store is empty.
    pub initial_seed: Option<[u8; 32]>,
}

/// Owns the issuer's keypairs and the published key document.
pub struct KeyManager<S: Store + ?Sized> {
    store: Arc<S>,
    sealer: KeySealer,
    config: KeyManagerConfig,
    clock: Arc<IssuanceClock>,
    active: RwLock<ActiveSlot>,
    /// Serializes rotations.
    rotation: Mutex<()>,
}

impl<S: Store + ?Sized> KeyManager<S> {
    /// Load keys from the store, creating the first key if there is none.
    ///
    /// Unretired keys other than the newest are retired at the creation
    /// time of the key that followed them.
    pub async fn open(
        store: Arc<S>,
        sealer: KeySealer,
        config: KeyManagerConfig,
        clock: Arc<IssuanceClock>,
    ) -> Result<Self> {
        let mut keys = store.list_keys().await?;

        for pair in keys.windows(2) {
            let (older, newer) = (&pair[0], &pair[1]);
            if !older.record.is_retired() {
                tracing::warn!(
                    key_id = %older.record.key_id,
                    "retiring stale unretired key"
                );
                store
                    .retire_key(&older.record.key_id, newer.record.created_at)
                    .await?;
            }
        }
        if keys.len() > 1 {
            keys = store.list_keys().await?;
        }

        let floor = keys
            .iter()
            .map(|k| k.record.retired_at.unwrap_or(k.record.created_at))
            .max()
            .unwrap_or(0);
        clock.advance_to(floor);

        let manager = Self {
            store,
            sealer,
            config,
            clock,
            active: RwLock::new(ActiveSlot::Halted("not loaded".into())),
            rotation: Mutex::new(()),
        };

        let slot = match keys.last() {
            None => {
                let seed = manager.config.initial_seed;
                let record = manager.create_key(1, seed, None).await?;
                tracing::info!(key_id = %record.record.key_id, "created initial signing key");
                ActiveSlot::Ready(Arc::new(record))
            }
            Some(newest) if newest.record.is_retired() => {
                let record = manager.create_key(newest.version + 1, None, None).await?;
                tracing::info!(key_id = %record.record.key_id, "all keys retired, created new signing key");
                ActiveSlot::Ready(Arc::new(record))
            }
            Some(newest) => match manager.unseal(newest) {
                Ok(active) => {
                    tracing::info!(key_id = %active.record.key_id, "loaded active signing key");
                    ActiveSlot::Ready(Arc::new(active))
                }
                Err(e) => {
                    tracing::warn!(
                        key_id = %newest.record.key_id,
                        error = %e,
                        "active key material unusable, issuance halted"
                    );
                    ActiveSlot::Halted(e.to_string())
                }
            },
        };

        *manager.active.write().await = slot;
        Ok(manager)
    }

    /// Open the private material of a stored key and check it against the
    /// published public key.
    fn unseal(&self, key: &StoredKey) -> Result<ActiveKey> {
        let sealed = key.sealed_seed.as_deref().ok_or_else(|| {
            ServiceError::KeyMaterialCorrupted(format!(
                "no private material for active key {}",
                key.record.key_id
            ))
        })?;
        let seed = self.sealer.open(&key.record.key_id, sealed)?;
        let keypair = Keypair::from_seed(&seed);
        if keypair.public_key() != key.record.public_key {
            return Err(ServiceError::KeyMaterialCorrupted(format!(
                "seed of {} does not derive its published public key",
                key.record.key_id
            )));
        }
        Ok(ActiveKey {
            record: key.record.clone(),
            keypair,
        })
    }

    /// Generate, seal and persist a key version.
    ///
    /// With `retiring`, the given key is retired in the same store
    /// transaction.
    async fn create_key(
        &self,
        version: u64,
        seed: Option<[u8; 32]>,
        retiring: Option<&KeyId>,
    ) -> Result<ActiveKey> {
        let keypair = match seed {
            Some(seed) => Keypair::from_seed(&seed),
            None => Keypair::generate(),
        };
        let key_id = KeyId::versioned(&self.config.key_id_prefix, version)?;
        let now = self.clock.now();
        let record = KeyRecord::new(key_id.clone(), keypair.public_key(), now);

        let stored = StoredKey {
            record: record.clone(),
            version,
            sealed_seed: Some(self.sealer.seal(&key_id, &keypair.seed())?),
        };

        match retiring {
            Some(old) => self.store.rotate_key(old, now, &stored).await?,
            None => self.store.insert_key(&stored).await?,
        }

        Ok(ActiveKey { record, keypair })
    }

    /// The active key's public record.
    pub async fn current_key(&self) -> Result<KeyRecord> {
        match &*self.active.read().await {
            ActiveSlot::Ready(key) => Ok(key.record.clone()),
            ActiveSlot::Halted(reason) => Err(ServiceError::IssuanceHalted(reason.clone())),
        }
    }

    /// Whether issuance is halted by unusable key material.
    pub async fn is_halted(&self) -> bool {
        matches!(&*self.active.read().await, ActiveSlot::Halted(_))
    }

    /// Run `f` with the active key and an issuance timestamp taken under the
    /// same read guard.
    pub(crate) async fn with_active<T>(&self, f: impl FnOnce(&ActiveKey, i64) -> T) -> Result<T> {
        let guard = self.active.read().await;
        match &*guard {
            ActiveSlot::Ready(key) => {
                let timestamp = self.clock.now();
                Ok(f(key, timestamp))
            }
            ActiveSlot::Halted(reason) => Err(ServiceError::IssuanceHalted(reason.clone())),
        }
    }

    /// Retire the active key and activate a freshly generated one.
    ///
    /// Rotations are serialized. Issuance waits for the swap; it never sees
    /// a half-rotated state.
    pub async fn rotate(&self) -> Result<KeyRecord> {
        let _serial = self.rotation.lock().await;
        let mut slot = self.active.write().await;

        let keys = self.store.list_keys().await?;
        let version = keys.iter().map(|k| k.version).max().unwrap_or(0) + 1;
        let retiring = keys
            .iter()
            .rev()
            .find(|k| !k.record.is_retired())
            .map(|k| k.record.key_id.clone());

        let next = self.create_key(version, None, retiring.as_ref()).await?;
        let record = next.record.clone();

        tracing::info!(
            retired = ?retiring.as_ref().map(KeyId::as_str),
            key_id = %record.key_id,
            "rotated signing key"
        );

        *slot = ActiveSlot::Ready(Arc::new(next));
        Ok(record)
    }

    /// All keys ever issued, newest first.
    ///
    /// Ordered by key version, which stays correct when several rotations
    /// share a `created_at`.
    pub async fn public_key_document(&self) -> Result<KeyDocument> {
        let mut keys = self.store.list_keys().await?;
        keys.sort_by(|a, b| b.version.cmp(&a.version));
        let records = keys.into_iter().map(|k| k.record).collect();
        Ok(KeyDocument::from_newest_first(
            self.config.issuer.clone(),
            records,
        ))
    }

    /// Sign a payload with a specific key version.
    ///
    /// Only the active key signs. A retired key fails with `KeyRetired`, an
    /// id that was never issued with `UnknownKey`.
    pub async fn sign(&self, key_id: &KeyId, payload: &[u8]) -> Result<Ed25519Signature> {
        {
            let guard = self.active.read().await;
            if let ActiveSlot::Ready(key) = &*guard {
                if key.key_id() == key_id {
                    return Ok(key.keypair.sign(payload));
                }
            }
        }

        let keys = self.store.list_keys().await?;
        match keys.iter().find(|k| &k.record.key_id == key_id) {
            None => Err(ServiceError::UnknownKey(key_id.clone())),
            Some(k) if k.record.is_retired() => Err(ServiceError::KeyRetired(key_id.clone())),
            Some(_) => Err(ServiceError::IssuanceHalted(format!(
                "private material for {} is unavailable",
                key_id
            ))),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.config.issuer
    }
}

#[async_trait]
impl<S: Store + ?Sized> TrustSource for KeyManager<S> {
    async fn key_document(&self) -> memreceipt_verify::Result<KeyDocument> {
        self.public_key_document()
            .await
            .map_err(|e| VerifyError::TrustSourceUnavailable(e.to_string()))
    }
}
