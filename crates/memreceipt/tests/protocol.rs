//! End-to-end receipt protocol tests against the memory service.

use std::sync::Arc;

use memreceipt::core::{check_signature, Fingerprinter};
use memreceipt::store::{MemoryStore, SqliteStore};
use memreceipt::verify::BundledKeys;
use memreceipt::{
    Action, KeyId, KeySealer, MemoryItem, MemoryService, Receipt, SearchRequest, ServiceConfig,
    ServiceError,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn memory_service() -> MemoryService<MemoryStore> {
    init_tracing();
    MemoryService::open_with_sealer(
        Arc::new(MemoryStore::new()),
        ServiceConfig::default(),
        KeySealer::new(&[0x11; 32]),
    )
    .await
    .unwrap()
}

fn sqlite_config(master: u8) -> ServiceConfig {
    ServiceConfig {
        master_key: Some(hex::encode([master; 32])),
        ..Default::default()
    }
}

async fn sqlite_service(path: &std::path::Path, master: u8) -> MemoryService<SqliteStore> {
    init_tracing();
    MemoryService::open(Arc::new(SqliteStore::open(path).unwrap()), sqlite_config(master))
        .await
        .unwrap()
}

#[tokio::test]
async fn scenario_write_verify_revoke() {
    let svc = memory_service().await;

    let item = MemoryItem::new("user logged in from device X");
    let written = svc.write(&item).await.unwrap();
    let fp1 = written.fingerprint;
    let r1 = written.receipt;
    assert_eq!(fp1, svc.fingerprint(&item).unwrap());
    assert_eq!(r1.key_id, KeyId::new("key-1").unwrap());

    let before = svc.verify(&r1).await.unwrap();
    assert!(before.signature_valid);
    assert!(!before.revoked);
    assert!(before.revocation_checked);

    let r2 = svc.revoke(&fp1).await.unwrap().receipt;
    assert_eq!(r2.action, Action::Revoke);
    assert_eq!(r2.fingerprint, fp1);

    let after = svc.verify(&r1).await.unwrap();
    assert!(after.signature_valid);
    assert!(after.revoked);

    let revoke_result = svc.verify(&r2).await.unwrap();
    assert!(revoke_result.signature_valid);
    assert_eq!(revoke_result.action, Action::Revoke);
    assert!(!revoke_result.revoked);
}

#[tokio::test]
async fn fingerprints_are_deterministic_and_distinct() {
    let svc = memory_service().await;
    let a = MemoryItem::new("likes tea").with_tag("drink");

    assert_eq!(svc.fingerprint(&a).unwrap(), svc.fingerprint(&a).unwrap());
    assert_ne!(
        svc.fingerprint(&a).unwrap(),
        svc.fingerprint(&MemoryItem::new("likes coffee").with_tag("drink")).unwrap()
    );
    assert_ne!(
        svc.fingerprint(&a).unwrap(),
        svc.fingerprint(&a.clone().with_tag("morning")).unwrap()
    );
    assert_ne!(
        svc.fingerprint(&a).unwrap(),
        svc.fingerprint(&a.clone().with_attribute("source", "chat")).unwrap()
    );
}

#[tokio::test]
async fn keyed_fingerprints_differ_from_plain() {
    init_tracing();
    let keyed = MemoryService::open_with_sealer(
        Arc::new(MemoryStore::new()),
        ServiceConfig {
            fingerprint_key: Some(hex::encode([0x42; 32])),
            ..Default::default()
        },
        KeySealer::new(&[0x11; 32]),
    )
    .await
    .unwrap();
    let plain = memory_service().await;

    let item = MemoryItem::new("low entropy");
    assert_ne!(keyed.fingerprint(&item).unwrap(), plain.fingerprint(&item).unwrap());
    assert_eq!(
        keyed.fingerprint(&item).unwrap(),
        Fingerprinter::keyed([0x42; 32])
            .fingerprint(&memreceipt::core::FactInput::new("low entropy"))
            .unwrap()
    );
}

#[tokio::test]
async fn issued_receipts_verify_offline() {
    let svc = memory_service().await;
    let written = svc.write(&MemoryItem::new("offline check")).await.unwrap();
    let doc = svc.key_document().await.unwrap();

    let json = serde_json::to_string(&doc).unwrap();
    let bundle = BundledKeys::from_json(&json).unwrap();
    let result = memreceipt::verify::Verifier::new(Arc::new(bundle))
        .verify(&written.receipt)
        .await
        .unwrap();

    assert!(result.signature_valid);
    assert!(!result.revocation_checked);
}

#[tokio::test]
async fn revoke_is_idempotent_byte_for_byte() {
    let svc = memory_service().await;
    let fp = svc.write(&MemoryItem::new("forget me")).await.unwrap().fingerprint;

    let first = svc.revoke(&fp).await.unwrap();
    let second = svc.revoke(&fp).await.unwrap();

    assert!(first.newly_revoked);
    assert!(!second.newly_revoked);
    assert_eq!(first.receipt.to_cbor(), second.receipt.to_cbor());
    assert_eq!(
        serde_json::to_string(&first.receipt).unwrap(),
        serde_json::to_string(&second.receipt).unwrap()
    );

    let record = svc.revocation(&fp).await.unwrap().unwrap();
    assert_eq!(record.receipt, first.receipt);
    assert_eq!(record.revoked_at, first.receipt.timestamp);
}

#[tokio::test]
async fn concurrent_revokes_converge() {
    let svc = Arc::new(memory_service().await);
    let fp = svc.write(&MemoryItem::new("contended")).await.unwrap().fingerprint;

    let mut handles = Vec::new();
    for _ in 0..24 {
        let svc = svc.clone();
        handles.push(tokio::spawn(async move { svc.revoke(&fp).await.unwrap() }));
    }
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    assert_eq!(outcomes.iter().filter(|o| o.newly_revoked).count(), 1);
    assert!(outcomes.iter().all(|o| o.receipt == outcomes[0].receipt));

    let revokes = svc
        .history(&fp)
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.action == Action::Revoke)
        .count();
    assert_eq!(revokes, 1);
}

#[tokio::test]
async fn search_receipts_are_revoked_with_their_fact() {
    let svc = memory_service().await;
    let fp = svc
        .write(&MemoryItem::new("works at the harbor").with_tag("job"))
        .await
        .unwrap()
        .fingerprint;

    let hits = svc
        .search(&SearchRequest {
            q: "HARBOR".into(),
            tags: Some(vec!["Job".into()]),
            top_k: 3,
        })
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    let search_receipt = hits[0].receipt.clone();

    svc.revoke(&fp).await.unwrap();
    let result = svc.verify(&search_receipt).await.unwrap();
    assert!(result.signature_valid);
    assert!(result.revoked);
    assert_eq!(result.action, Action::Search);
}

#[tokio::test]
async fn rotation_keeps_old_receipts_valid() {
    let svc = memory_service().await;
    let r1 = svc.write(&MemoryItem::new("before rotation")).await.unwrap().receipt;

    let k2 = svc.rotate_key().await.unwrap();
    assert_eq!(k2.key_id, KeyId::new("key-2").unwrap());
    let r2 = svc.write(&MemoryItem::new("after rotation")).await.unwrap().receipt;
    assert_eq!(r2.key_id, k2.key_id);

    assert!(svc.verify(&r1).await.unwrap().signature_valid);
    assert!(svc.verify(&r2).await.unwrap().signature_valid);

    let doc = svc.key_document().await.unwrap();
    assert_eq!(doc.keys.len(), 2);
    assert_eq!(doc.keys[0].key_id, k2.key_id);
    let k1 = &doc.keys[1];
    assert!(k1.is_retired());
    assert!(r1.timestamp <= k1.retired_at.unwrap());

    assert!(matches!(
        svc.keys().sign(&r1.key_id, b"payload").await,
        Err(ServiceError::KeyRetired(_))
    ));
}

#[tokio::test]
async fn rotation_under_load_never_tears() {
    let svc = Arc::new(memory_service().await);

    let mut handles = Vec::new();
    for i in 0..40 {
        let task_svc = svc.clone();
        handles.push(tokio::spawn(async move {
            task_svc.write(&MemoryItem::new(format!("fact number {}", i)))
                .await
                .unwrap()
                .receipt
        }));
        if i % 10 == 0 {
            svc.rotate_key().await.unwrap();
        }
    }

    let doc = svc.key_document().await.unwrap();
    for handle in handles {
        let receipt = handle.await.unwrap();
        assert!(check_signature(&receipt, &doc).is_valid());
    }
}

fn tampered(receipt: &Receipt) -> Vec<Receipt> {
    let mut out = Vec::new();
    for bit in 0..256 {
        let mut r = receipt.clone();
        r.fingerprint.0[bit / 8] ^= 1 << (bit % 8);
        out.push(r);
    }
    for bit in 0..64 {
        let mut r = receipt.clone();
        r.timestamp ^= 1i64 << bit;
        out.push(r);
    }
    for action in [Action::Write, Action::Search, Action::Revoke] {
        if action != receipt.action {
            let mut r = receipt.clone();
            r.action = action;
            out.push(r);
        }
    }
    for key_id in ["key-2", "kez-1", "key-10"] {
        let mut r = receipt.clone();
        r.key_id = KeyId::new(key_id).unwrap();
        out.push(r);
    }
    out
}

#[tokio::test]
async fn tampering_invalidates_signature() {
    let svc = memory_service().await;
    let receipt = svc.write(&MemoryItem::new("tamper target")).await.unwrap().receipt;
    assert!(svc.verify(&receipt).await.unwrap().signature_valid);

    for bad in tampered(&receipt) {
        let result = svc.verify(&bad).await.unwrap();
        assert!(!result.signature_valid, "tampered receipt verified: {:?}", bad);
        assert!(result.reason.is_some());
    }
}

#[tokio::test]
async fn sqlite_reopen_keeps_rotation_history() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memreceipt.db");

    let (r1, r2, fp) = {
        let svc = sqlite_service(&path, 7).await;
        let w = svc.write(&MemoryItem::new("persisted fact")).await.unwrap();
        svc.rotate_key().await.unwrap();
        let r2 = svc.write(&MemoryItem::new("second fact")).await.unwrap().receipt;
        svc.revoke(&w.fingerprint).await.unwrap();
        (w.receipt, r2, w.fingerprint)
    };

    let svc = sqlite_service(&path, 7).await;
    assert!(!svc.is_halted().await);
    assert_eq!(svc.current_key().await.unwrap().key_id, KeyId::new("key-2").unwrap());

    let doc = svc.key_document().await.unwrap();
    assert_eq!(doc.keys.len(), 2);
    assert!(doc.keys[1].is_retired());

    let v1 = svc.verify(&r1).await.unwrap();
    assert!(v1.signature_valid);
    assert!(v1.revoked);
    assert!(svc.verify(&r2).await.unwrap().signature_valid);

    let r3 = svc.write(&MemoryItem::new("third fact")).await.unwrap().receipt;
    assert!(r3.timestamp >= r2.timestamp);
    assert!(svc.revocation(&fp).await.unwrap().is_some());
}

#[tokio::test]
async fn corrupted_key_material_halts_issuance_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memreceipt.db");

    let receipt = {
        let svc = sqlite_service(&path, 1).await;
        svc.write(&MemoryItem::new("written before restart"))
            .await
            .unwrap()
            .receipt
    };

    // Reopen under a different master key: the active seed no longer opens.
    let svc = sqlite_service(&path, 2).await;
    assert!(svc.is_halted().await);
    assert!(matches!(
        svc.write(&MemoryItem::new("blocked")).await,
        Err(ServiceError::IssuanceHalted(_))
    ));
    assert!(matches!(
        svc.current_key().await,
        Err(ServiceError::IssuanceHalted(_))
    ));

    let result = svc.verify(&receipt).await.unwrap();
    assert!(result.signature_valid);
    assert_eq!(svc.key_document().await.unwrap().keys.len(), 1);

    let fresh = svc.rotate_key().await.unwrap();
    assert!(!svc.is_halted().await);
    let after = svc.write(&MemoryItem::new("resumed")).await.unwrap().receipt;
    assert_eq!(after.key_id, fresh.key_id);
    assert!(svc.verify(&receipt).await.unwrap().signature_valid);
}
