//! Error types for the memreceipt service.

use memreceipt_core::{CoreError, Fingerprint, KeyId};
use memreceipt_store::StoreError;
use memreceipt_verify::VerifyError;
use thiserror::Error;

/// Errors that can occur during service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Canonicalization or encoding error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Verification could not run.
    #[error("verify error: {0}")]
    Verify(#[from] VerifyError),

    /// Signing was requested with a key that was never issued.
    #[error("unknown key: {0}")]
    UnknownKey(KeyId),

    /// Signing was requested with a retired key.
    #[error("key retired: {0}")]
    KeyRetired(KeyId),

    /// The active signing key is unusable; issuance is stopped until a
    /// successful rotation. Verification keeps working.
    #[error("issuance halted: {0}")]
    IssuanceHalted(String),

    /// Sealed key material failed to open or does not match its record.
    #[error("key material corrupted: {0}")]
    KeyMaterialCorrupted(String),

    /// No memory item with this fingerprint.
    #[error("memory not found: {0}")]
    MemoryNotFound(Fingerprint),

    /// Invalid operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl ServiceError {
    /// Whether the caller supplied bad input (as opposed to a service fault).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Core(CoreError::InvalidFact(_))
                | Self::Core(CoreError::MalformedReceipt(_))
                | Self::Core(CoreError::DecodingError(_))
                | Self::Verify(VerifyError::MalformedReceipt(_))
                | Self::Verify(VerifyError::InvalidKeyDocument(_))
                | Self::InvalidOperation(_)
        )
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
