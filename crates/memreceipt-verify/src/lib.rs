//! # memreceipt verify
//!
//! Receipt verification, offline or online.
//!
//! ## Overview
//!
//! A [`Verifier`] checks a receipt against a [`TrustSource`] (where the
//! issuer's key document comes from) and, optionally, a [`RevocationView`]
//! (where revocation standing comes from).
//!
//! ## Trust Sources
//!
//! - [`BundledKeys`] - a key document held locally (offline)
//! - [`HttpTrustSource`] - the issuer's well-known document over HTTP, with a timeout
//! - [`FallbackTrust`] - online first, offline when the issuer is unreachable
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use memreceipt_verify::{HttpTrustSource, Verifier, DEFAULT_TIMEOUT};
//!
//! async fn example(receipt_json: &str) {
//!     let source = Arc::new(HttpTrustSource::new("did:web:example.org", DEFAULT_TIMEOUT).unwrap());
//!     let verifier = Verifier::new(source.clone()).with_revocations(source);
//!     let result = verifier.verify_json(receipt_json).await.unwrap();
//!     println!("valid={} revoked={}", result.signature_valid, result.revoked);
//! }
//! ```

pub mod error;
pub mod http;
pub mod trust;
pub mod verifier;

pub use error::{Result, VerifyError};
pub use http::{
    did_web_base_url, issuer_base_url, HttpTrustSource, DEFAULT_TIMEOUT, KEY_DOCUMENT_PATH,
    REVOCATIONS_PATH,
};
pub use trust::{BundledKeys, FallbackTrust, RevocationList, RevocationView, TrustSource};
pub use verifier::{parse_receipt_json, Verifier};
