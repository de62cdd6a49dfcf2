//! Error types for memreceipt core.

use thiserror::Error;

use crate::key::KeyId;

/// Core errors that can occur while canonicalizing facts or handling receipts.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The fact could not be canonicalized (missing or malformed fields).
    #[error("invalid fact: {0}")]
    InvalidFact(String),

    /// A receipt or signing request names a key that was never issued.
    #[error("unknown key: {0}")]
    UnknownKey(KeyId),

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("invalid public key")]
    InvalidPublicKey,

    /// The signature is good but the key was not active at the receipt's
    /// timestamp.
    #[error("timestamp {timestamp} outside validity window of {key_id}")]
    OutsideKeyWindow { key_id: KeyId, timestamp: i64 },

    #[error("invalid key id: {0}")]
    InvalidKeyId(String),

    #[error("malformed receipt: {0}")]
    MalformedReceipt(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
