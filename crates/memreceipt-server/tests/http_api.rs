//! The HTTP surface, exercised over a real socket.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use memreceipt::store::MemoryStore;
use memreceipt::verify::{HttpTrustSource, RevocationView, TrustSource, Verifier};
use memreceipt::{KeySealer, MemoryService, ServiceConfig, VerificationResult, WriteOutcome};
use memreceipt_server::api::{RevokeResponse, SearchResponse};

async fn spawn_server() -> (String, Arc<MemoryService<MemoryStore>>) {
    let service = Arc::new(
        MemoryService::open_with_sealer(
            Arc::new(MemoryStore::new()),
            ServiceConfig::default(),
            KeySealer::new(&[0x21; 32]),
        )
        .await
        .unwrap(),
    );
    let app = memreceipt_server::router(service.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), service)
}

async fn write(client: &reqwest::Client, base: &str, text: &str) -> WriteOutcome {
    client
        .post(format!("{}/mem/write", base))
        .json(&json!({ "text": text, "tags": ["device"] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_and_key_document() {
    let (base, _) = spawn_server().await;
    let client = reqwest::Client::new();

    let health: serde_json::Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["ok"], true);
    assert_eq!(health["issuance_halted"], false);

    let source = HttpTrustSource::new(&base, Duration::from_secs(2)).unwrap();
    let doc = source.key_document().await.unwrap();
    assert_eq!(doc.issuer, "did:web:localhost");
    assert_eq!(doc.keys.len(), 1);
}

#[tokio::test]
async fn write_search_revoke_verify_over_http() {
    let (base, _) = spawn_server().await;
    let client = reqwest::Client::new();

    let written = write(&client, &base, "user logged in from device X").await;

    let search: SearchResponse = client
        .post(format!("{}/mem/search", base))
        .json(&json!({ "q": "device x" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(search.results.len(), 1);
    assert_eq!(search.results[0].fingerprint, written.fingerprint);

    // Online verification against the published endpoints.
    let source = Arc::new(HttpTrustSource::new(&base, Duration::from_secs(2)).unwrap());
    let verifier = Verifier::new(source.clone()).with_revocations(source.clone());
    let before = verifier.verify(&written.receipt).await.unwrap();
    assert!(before.signature_valid);
    assert!(!before.revoked);
    assert!(!source.is_revoked(&written.fingerprint).await.unwrap());

    let revoked: RevokeResponse = client
        .post(format!("{}/mem/revoke", base))
        .json(&json!({ "fingerprint": written.fingerprint }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(revoked.newly_revoked);

    let after = verifier.verify(&written.receipt).await.unwrap();
    assert!(after.signature_valid);
    assert!(after.revoked);

    let record = source.lookup(&written.fingerprint).await.unwrap().unwrap();
    assert_eq!(record.receipt, revoked.receipt);

    let via_endpoint: VerificationResult = client
        .post(format!("{}/verify", base))
        .json(&json!({ "receipt": written.receipt }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(via_endpoint.signature_valid);
    assert!(via_endpoint.revoked);
}

#[tokio::test]
async fn verify_with_supplied_keys() {
    let (base, service) = spawn_server().await;
    let client = reqwest::Client::new();
    let written = write(&client, &base, "offline receipt").await;
    let doc = service.key_document().await.unwrap();

    let result: VerificationResult = client
        .post(format!("{}/verify", base))
        .json(&json!({ "receipt": written.receipt, "keys": doc.keys }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(result.signature_valid);
}

#[tokio::test]
async fn error_statuses() {
    let (base, _) = spawn_server().await;
    let client = reqwest::Client::new();

    let empty = client
        .post(format!("{}/mem/write", base))
        .json(&json!({ "text": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), reqwest::StatusCode::BAD_REQUEST);

    let unknown = client
        .post(format!("{}/mem/revoke", base))
        .json(&json!({ "fingerprint": "ab".repeat(32) }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), reqwest::StatusCode::NOT_FOUND);

    let not_revoked = client
        .get(format!("{}/revocations/{}", base, "cd".repeat(32)))
        .send()
        .await
        .unwrap();
    assert_eq!(not_revoked.status(), reqwest::StatusCode::NOT_FOUND);

    let malformed = client
        .post(format!("{}/verify", base))
        .json(&json!({ "receipt": { "fingerprint": "00", "extra": 1 } }))
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), reqwest::StatusCode::BAD_REQUEST);

    let receipt = write(&client, &base, "remote check").await.receipt;
    let raw_url = client
        .post(format!("{}/verify", base))
        .json(&json!({ "receipt": receipt, "issuer": "http://127.0.0.1:1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(raw_url.status(), reqwest::StatusCode::BAD_REQUEST);

    let unreachable = client
        .post(format!("{}/verify", base))
        .json(&json!({ "receipt": receipt, "issuer": "did:web:127.0.0.1%3A1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(unreachable.status(), reqwest::StatusCode::BAD_GATEWAY);
}
