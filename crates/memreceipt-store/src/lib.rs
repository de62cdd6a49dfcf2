//! # memreceipt store
//!
//! Storage abstraction for memreceipt. Provides a trait-based interface for
//! key, revocation, memory-item and audit persistence with SQLite and
//! in-memory implementations.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`InsertResult`] - Result of a compare-and-insert revocation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use memreceipt_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     let store = SqliteStore::open("memreceipt.db").unwrap();
//!     let keys = store.list_keys().await.unwrap();
//!     println!("{} key versions", keys.len());
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **First writer wins**: a fingerprint has at most one revocation record
//! - **Retire, never delete**: rotated keys keep their public half forever
//! - **Suppression in search**: revoked and expired items never match

pub mod error;
pub mod memory;
pub mod migration;
pub mod records;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use records::{
    clamp_top_k, ActionRecord, Consent, MemoryQuery, MemoryRecord, Scope, StoredKey, MAX_TOP_K,
};
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, Store};

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
