//! # memreceipt testkit
//!
//! Testing utilities for memreceipt.
//!
//! ## Overview
//!
//! - **Golden vectors**: fixed facts and keys with their canonical encodings
//! - **Generators**: proptest strategies for facts and receipts
//! - **Fixtures**: a ready memory service over an in-memory store
//!
//! ## Golden Vectors
//!
//! ```rust
//! use memreceipt_testkit::vectors::{all_vectors, receipt_from_vector};
//!
//! for vector in all_vectors() {
//!     let receipt = receipt_from_vector(&vector);
//!     println!("{}: {}", vector.name, receipt.compute_id());
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use memreceipt_testkit::generators::{receipt_from_params, ReceiptParams};
//!
//! proptest! {
//!     #[test]
//!     fn receipts_roundtrip(params: ReceiptParams) {
//!         let r = receipt_from_params(&params);
//!         prop_assert_eq!(memreceipt_core::Receipt::from_cbor(&r.to_cbor()).unwrap(), r);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use memreceipt_testkit::TestFixture;
//!
//! async fn example() {
//!     let fixture = TestFixture::new().await;
//!     let written = fixture.write("user prefers dark mode").await;
//!     assert!(fixture.service.verify(&written.receipt).await.unwrap().signature_valid);
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{TestFixture, FIXTURE_MASTER_KEY, FIXTURE_SEED};
pub use generators::{receipt_from_params, ReceiptParams};
pub use vectors::{all_vectors, receipt_from_vector, verify_all_vectors, GoldenVector};
