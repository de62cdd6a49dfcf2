//! # memreceipt
//!
//! Signed, content-derived receipts for memory operations.
//!
//! ## Overview
//!
//! A memory item is reduced to a canonical fact and then to a
//! [`Fingerprint`]. Every write, search and revoke is answered with a
//! five-field [`Receipt`] signed by the issuer's active key. Receipts carry
//! the fingerprint, never the content, and anyone holding the issuer's key
//! document can check them offline.
//!
//! ## Key Concepts
//!
//! - **Receipt**: `{fingerprint, action, timestamp, key_id, signature}`. Immutable.
//! - **Key document**: every key the issuer ever used, newest first, with retirement times.
//! - **Revocation**: terminal and idempotent. The first revoke receipt for a
//!   fingerprint is the only one.
//! - **Halted issuance**: when the active key's material is unusable, signing
//!   stops but verification continues.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use memreceipt::{MemoryItem, MemoryService, SearchRequest, ServiceConfig};
//! use memreceipt::store::SqliteStore;
//!
//! async fn example() {
//!     let store = Arc::new(SqliteStore::open("memreceipt.db").unwrap());
//!     let service = MemoryService::open(store, ServiceConfig::default()).await.unwrap();
//!
//!     let written = service
//!         .write(&MemoryItem::new("User prefers dark mode").with_tag("ui"))
//!         .await
//!         .unwrap();
//!
//!     let hits = service.search(&SearchRequest::new("dark mode")).await.unwrap();
//!     assert_eq!(hits[0].fingerprint, written.fingerprint);
//!
//!     let revocation = service.revoke(&written.fingerprint).await.unwrap();
//!     let result = service.verify(&written.receipt).await.unwrap();
//!     assert!(result.signature_valid && result.revoked);
//!     let _ = revocation.receipt;
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `memreceipt::core` - primitives (receipts, fingerprints, key documents)
//! - `memreceipt::store` - storage abstraction, in-memory and SQLite
//! - `memreceipt::verify` - trust sources and the verifier

pub mod clock;
pub mod config;
pub mod error;
pub mod issuer;
pub mod keys;
pub mod ledger;
pub mod resolver;
pub mod seal;
pub mod service;

pub use memreceipt_core as core;
pub use memreceipt_store as store;
pub use memreceipt_verify as verify;

pub use clock::IssuanceClock;
pub use config::ServiceConfig;
pub use error::{Result, ServiceError};
pub use issuer::ReceiptIssuer;
pub use keys::{ActiveKey, KeyManager, KeyManagerConfig};
pub use ledger::{Revocation, RevocationLedger};
pub use resolver::{DefaultResolver, FactResolver, MemoryItem};
pub use seal::KeySealer;
pub use service::{SearchHit, SearchRequest, WriteOutcome, MemoryService, DEFAULT_TOP_K, SNIPPET_CHARS};

pub use memreceipt_core::{
    Action, Fingerprint, KeyDocument, KeyId, KeyRecord, Receipt, RevocationRecord,
    VerificationResult,
};
