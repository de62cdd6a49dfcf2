//! The revocation ledger.
//!
//! Revocation is an append-only set keyed by fingerprint. The first
//! revocation of a fingerprint wins; every later or concurrent request gets
//! the winner's receipt back, byte for byte.

use std::sync::Arc;

use async_trait::async_trait;

use memreceipt_core::{Action, Fingerprint, Receipt, RevocationRecord};
use memreceipt_store::{InsertResult, Store};
use memreceipt_verify::{RevocationView, VerifyError};

use crate::error::Result;
use crate::issuer::ReceiptIssuer;

/// Outcome of a revoke request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revocation {
    /// The one revoke receipt for the fingerprint.
    pub receipt: Receipt,
    /// Whether this request created the revocation.
    pub newly_revoked: bool,
}

/// Tracks revoked fingerprints and their revoke receipts.
pub struct RevocationLedger<S: Store + ?Sized> {
    store: Arc<S>,
    issuer: ReceiptIssuer<S>,
}

impl<S: Store + ?Sized> RevocationLedger<S> {
    pub fn new(store: Arc<S>, issuer: ReceiptIssuer<S>) -> Self {
        Self { store, issuer }
    }

    /// Revoke a fingerprint, or return its existing revoke receipt.
    pub async fn revoke(&self, fingerprint: &Fingerprint) -> Result<Receipt> {
        Ok(self.revoke_tracked(fingerprint).await?.receipt)
    }

    /// Like [`revoke`](Self::revoke), also reporting whether this call won.
    pub async fn revoke_tracked(&self, fingerprint: &Fingerprint) -> Result<Revocation> {
        if let Some(existing) = self.store.get_revocation(fingerprint).await? {
            tracing::debug!(%fingerprint, "already revoked");
            return Ok(Revocation {
                receipt: existing.receipt,
                newly_revoked: false,
            });
        }

        let receipt = self.issuer.sign_receipt(*fingerprint, Action::Revoke).await?;
        let record = RevocationRecord::new(receipt.clone(), receipt.timestamp);

        match self.store.insert_revocation(&record).await? {
            InsertResult::Inserted => {
                tracing::info!(%fingerprint, key_id = %receipt.key_id, "revoked fingerprint");
                Ok(Revocation {
                    receipt,
                    newly_revoked: true,
                })
            }
            InsertResult::AlreadyExists(winner) => {
                tracing::debug!(%fingerprint, "lost revocation race, returning winner");
                Ok(Revocation {
                    receipt: winner.receipt,
                    newly_revoked: false,
                })
            }
        }
    }

    pub async fn is_revoked(&self, fingerprint: &Fingerprint) -> Result<bool> {
        Ok(self.store.get_revocation(fingerprint).await?.is_some())
    }

    pub async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<RevocationRecord>> {
        Ok(self.store.get_revocation(fingerprint).await?)
    }

    /// All revocations, oldest first.
    pub async fn list(&self) -> Result<Vec<RevocationRecord>> {
        Ok(self.store.list_revocations().await?)
    }
}

#[async_trait]
impl<S: Store + ?Sized> RevocationView for RevocationLedger<S> {
    async fn lookup(&self, fingerprint: &Fingerprint) -> memreceipt_verify::Result<Option<RevocationRecord>> {
        RevocationLedger::lookup(self, fingerprint)
            .await
            .map_err(|e| VerifyError::TrustSourceUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::IssuanceClock;
    use crate::keys::{KeyManager, KeyManagerConfig};
    use crate::seal::KeySealer;
    use memreceipt_store::MemoryStore;

    async fn ledger() -> Arc<RevocationLedger<MemoryStore>> {
        let store = Arc::new(MemoryStore::new());
        let keys = Arc::new(
            KeyManager::open(
                store.clone(),
                KeySealer::new(&[5; 32]),
                KeyManagerConfig {
                    issuer: "did:web:localhost".into(),
                    key_id_prefix: "key".into(),
                    initial_seed: None,
                },
                Arc::new(IssuanceClock::new()),
            )
            .await
            .unwrap(),
        );
        Arc::new(RevocationLedger::new(store, ReceiptIssuer::new(keys)))
    }

    #[tokio::test]
    async fn test_revoke_idempotent() {
        let ledger = ledger().await;
        let fp = Fingerprint::from_bytes([1; 32]);

        let first = ledger.revoke_tracked(&fp).await.unwrap();
        let second = ledger.revoke_tracked(&fp).await.unwrap();

        assert!(first.newly_revoked);
        assert!(!second.newly_revoked);
        assert_eq!(first.receipt.to_cbor(), second.receipt.to_cbor());
        assert_eq!(first.receipt.action, Action::Revoke);
        assert!(ledger.is_revoked(&fp).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_revokes_converge() {
        let ledger = ledger().await;
        let fp = Fingerprint::from_bytes([2; 32]);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move { ledger.revoke_tracked(&fp).await.unwrap() }));
        }

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        assert_eq!(outcomes.iter().filter(|o| o.newly_revoked).count(), 1);
        let receipt = &outcomes[0].receipt;
        assert!(outcomes.iter().all(|o| &o.receipt == receipt));
        assert_eq!(ledger.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unrevoked_lookup() {
        let ledger = ledger().await;
        let fp = Fingerprint::from_bytes([3; 32]);
        assert!(!ledger.is_revoked(&fp).await.unwrap());
        assert!(ledger.lookup(&fp).await.unwrap().is_none());
    }
}
