//! # memreceipt core
//!
//! Pure primitives for memreceipt: fact fingerprints, signed receipts, key
//! records and the signature policy check.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`Fingerprint`] - Content-derived identifier of a memory fact
//! - [`Receipt`] - The five-field signed attestation
//! - [`KeyDocument`] - The published set of issuer keys, newest first
//! - [`VerificationResult`] - Signature validity and standing, reported separately
//!
//! ## Canonicalization
//!
//! Facts and receipt fields are encoded using deterministic CBOR. See the
//! [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod fact;
pub mod key;
pub mod receipt;
pub mod types;
pub mod validation;

pub use canonical::{canonical_fields_bytes, canonical_receipt_bytes, signed_message};
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{CoreError, Result};
pub use fact::{CanonicalFact, FactInput, Fingerprinter};
pub use key::{KeyDocument, KeyId, KeyRecord};
pub use receipt::{Action, Receipt, ReceiptFields, RevocationRecord, RECEIPT_FORMAT};
pub use types::Fingerprint;
pub use validation::{check_signature, validate_receipt, SignatureCheck, VerificationResult};
