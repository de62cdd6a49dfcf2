//! The receipt builder.
//!
//! Owns no state: a receipt is a function of the fingerprint, the action,
//! the active key and the issuance clock.

use std::sync::Arc;

use memreceipt_core::{Action, Fingerprint, Receipt, ReceiptFields};
use memreceipt_store::Store;

use crate::error::{Result, ServiceError};
use crate::keys::KeyManager;

/// Builds and signs receipts with the active key.
pub struct ReceiptIssuer<S: Store + ?Sized> {
    keys: Arc<KeyManager<S>>,
}

impl<S: Store + ?Sized> Clone for ReceiptIssuer<S> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
        }
    }
}

impl<S: Store + ?Sized> ReceiptIssuer<S> {
    pub fn new(keys: Arc<KeyManager<S>>) -> Self {
        Self { keys }
    }

    /// Issue a write or search receipt.
    ///
    /// Revoke receipts are only produced by the revocation ledger; asking
    /// for one here is an `InvalidOperation`.
    pub async fn issue(&self, fingerprint: Fingerprint, action: Action) -> Result<Receipt> {
        if action == Action::Revoke {
            return Err(ServiceError::InvalidOperation(
                "revoke receipts are issued by the revocation ledger".into(),
            ));
        }
        self.sign_receipt(fingerprint, action).await
    }

    /// Snapshot the active key and timestamp together, then sign.
    pub(crate) async fn sign_receipt(&self, fingerprint: Fingerprint, action: Action) -> Result<Receipt> {
        let receipt = self
            .keys
            .with_active(|key, timestamp| {
                ReceiptFields {
                    fingerprint,
                    action,
                    timestamp,
                    key_id: key.key_id().clone(),
                }
                .sign_with(key.keypair())
            })
            .await?;

        tracing::info!(
            fingerprint = %receipt.fingerprint,
            action = %receipt.action,
            key_id = %receipt.key_id,
            timestamp = receipt.timestamp,
            "issued receipt"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::IssuanceClock;
    use crate::keys::KeyManagerConfig;
    use crate::seal::KeySealer;
    use memreceipt_core::check_signature;
    use memreceipt_store::MemoryStore;

    async fn issuer() -> (ReceiptIssuer<MemoryStore>, Arc<KeyManager<MemoryStore>>) {
        let keys = Arc::new(
            KeyManager::open(
                Arc::new(MemoryStore::new()),
                KeySealer::new(&[3; 32]),
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
        (ReceiptIssuer::new(keys.clone()), keys)
    }

    #[tokio::test]
    async fn test_issue_signs_with_active_key() {
        let (issuer, keys) = issuer().await;
        let fp = Fingerprint::from_bytes([1; 32]);
        let receipt = issuer.issue(fp, Action::Write).await.unwrap();

        assert_eq!(receipt.fingerprint, fp);
        assert_eq!(receipt.key_id, keys.current_key().await.unwrap().key_id);
        let doc = keys.public_key_document().await.unwrap();
        assert!(check_signature(&receipt, &doc).is_valid());
    }

    #[tokio::test]
    async fn test_direct_revoke_rejected() {
        let (issuer, _) = issuer().await;
        assert!(matches!(
            issuer
                .issue(Fingerprint::from_bytes([1; 32]), Action::Revoke)
                .await,
            Err(ServiceError::InvalidOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_timestamps_never_decrease() {
        let (issuer, _) = issuer().await;
        let mut last = 0;
        for i in 0..20u8 {
            let receipt = issuer
                .issue(Fingerprint::from_bytes([i; 32]), Action::Search)
                .await
                .unwrap();
            assert!(receipt.timestamp >= last);
            last = receipt.timestamp;
        }
    }

    #[tokio::test]
    async fn test_issuance_during_rotation_stays_in_window() {
        let (issuer, keys) = issuer().await;

        let mut handles = Vec::new();
        for i in 0..32u8 {
            let issuer = issuer.clone();
            handles.push(tokio::spawn(async move {
                issuer
                    .issue(Fingerprint::from_bytes([i; 32]), Action::Write)
                    .await
                    .unwrap()
            }));
        }
        keys.rotate().await.unwrap();

        let doc = keys.public_key_document().await.unwrap();
        for handle in handles {
            let receipt = handle.await.unwrap();
            assert!(check_signature(&receipt, &doc).is_valid());
        }
    }
}
