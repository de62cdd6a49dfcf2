//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use memreceipt::verify::BundledKeys;
use memreceipt::{KeySealer, MemoryItem, MemoryService, ServiceConfig, WriteOutcome};
use memreceipt_core::{Action, Fingerprint, KeyId, Keypair, Receipt, ReceiptFields};
use memreceipt_store::MemoryStore;

/// Seed of the fixture's first signing key.
pub const FIXTURE_SEED: [u8; 32] = [0x5e; 32];

/// Master key sealing the fixture's key material.
pub const FIXTURE_MASTER_KEY: [u8; 32] = [0x3c; 32];

/// A memory service over an in-memory store, with a known first key.
pub struct TestFixture {
    pub service: MemoryService<MemoryStore>,
}

impl TestFixture {
    /// Open a fixture whose first key derives from [`FIXTURE_SEED`].
    pub async fn new() -> Self {
        Self::with_config(ServiceConfig {
            dev_seed: Some(hex::encode(FIXTURE_SEED)),
            ..Default::default()
        })
        .await
    }

    /// Open a fixture with a custom configuration.
    pub async fn with_config(config: ServiceConfig) -> Self {
        let service = MemoryService::open_with_sealer(
            Arc::new(MemoryStore::new()),
            config,
            KeySealer::new(&FIXTURE_MASTER_KEY),
        )
        .await
        .expect("fixture service opens");
        Self { service }
    }

    /// The keypair behind `key-1` when opened with [`TestFixture::new`].
    pub fn first_keypair(&self) -> Keypair {
        Keypair::from_seed(&FIXTURE_SEED)
    }

    /// Write a plain statement.
    pub async fn write(&self, text: &str) -> WriteOutcome {
        self.write_item(&MemoryItem::new(text)).await
    }

    pub async fn write_item(&self, item: &MemoryItem) -> WriteOutcome {
        self.service.write(item).await.expect("fixture write succeeds")
    }

    /// The current key document as an offline trust bundle.
    pub async fn bundled_keys(&self) -> BundledKeys {
        BundledKeys::new(
            self.service
                .key_document()
                .await
                .expect("key document available"),
        )
    }

    /// Sign a receipt with the first key, bypassing the issuer's clock.
    ///
    /// For receipts the service would never produce, such as timestamps
    /// outside a key's validity window.
    pub fn forge(&self, fingerprint: Fingerprint, action: Action, timestamp: i64) -> Receipt {
        ReceiptFields {
            fingerprint,
            action,
            timestamp,
            key_id: KeyId::new("key-1").expect("valid key id"),
        }
        .sign_with(&self.first_keypair())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_key_is_seeded() {
        let fixture = TestFixture::new().await;
        let key = fixture.service.current_key().await.unwrap();
        assert_eq!(key.public_key, fixture.first_keypair().public_key());
    }

    #[tokio::test]
    async fn test_forged_receipt_verifies_in_window() {
        let fixture = TestFixture::new().await;
        let created = fixture.service.current_key().await.unwrap().created_at;
        let receipt = fixture.forge(Fingerprint::from_bytes([1; 32]), Action::Write, created);
        assert!(fixture.service.verify(&receipt).await.unwrap().signature_valid);
    }

    #[tokio::test]
    async fn test_forged_after_retirement_rejected() {
        let fixture = TestFixture::new().await;
        fixture.service.rotate_key().await.unwrap();
        let doc = fixture.service.key_document().await.unwrap();
        let retired_at = doc.keys[1].retired_at.unwrap();

        let late = fixture.forge(Fingerprint::from_bytes([1; 32]), Action::Write, retired_at + 1);
        let result = fixture.service.verify(&late).await.unwrap();
        assert!(!result.signature_valid);
        assert_eq!(result.reason.as_deref(), Some("timestamp outside key validity window"));
    }
}
