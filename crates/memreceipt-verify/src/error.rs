//! Error types for the verify module.

use thiserror::Error;

/// Errors that can occur during verification.
///
/// A receipt that is merely invalid or revoked is not an error; it is
/// reported in the [`VerificationResult`](memreceipt_core::VerificationResult).
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The key document or revocation status could not be obtained.
    /// Recoverable: the caller may retry or fall back to offline material.
    #[error("trust source unavailable: {0}")]
    TrustSourceUnavailable(String),

    /// The receipt could not be parsed.
    #[error("malformed receipt: {0}")]
    MalformedReceipt(String),

    /// The issuer identifier cannot be turned into a discovery URL.
    #[error("invalid issuer: {0}")]
    InvalidIssuer(String),

    /// Bundled key material could not be parsed.
    #[error("invalid key document: {0}")]
    InvalidKeyDocument(String),
}

impl From<memreceipt_core::CoreError> for VerifyError {
    fn from(e: memreceipt_core::CoreError) -> Self {
        Self::MalformedReceipt(e.to_string())
    }
}

/// Result type for verify operations.
pub type Result<T> = std::result::Result<T, VerifyError>;
