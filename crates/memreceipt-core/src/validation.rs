//! Receipt validation: signature verification and key policy.
//!
//! Validation is pure: it needs the receipt and the published key document,
//! nothing else. Revocation standing is layered on top by the verifier.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::key::{KeyDocument, KeyId, KeyRecord};
use crate::receipt::{Action, Receipt};

/// Outcome of checking a receipt's signature against a key document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid,
    /// The document has no record for the receipt's key id.
    UnknownKey,
    /// The published key bytes are not a usable Ed25519 key.
    InvalidPublicKey,
    Mismatch,
    /// Signature is correct but the timestamp is before the key was created
    /// or after it was retired.
    OutsideKeyWindow,
}

impl SignatureCheck {
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }

    /// Human-readable reason for a failed check.
    pub fn reason(self) -> Option<&'static str> {
        match self {
            Self::Valid => None,
            Self::UnknownKey => Some("unknown key"),
            Self::InvalidPublicKey => Some("invalid public key"),
            Self::Mismatch => Some("signature mismatch"),
            Self::OutsideKeyWindow => Some("timestamp outside key validity window"),
        }
    }
}

/// Verify a receipt against a single key record.
///
/// Checks, in order:
/// 1. The record belongs to the receipt's key id
/// 2. Ed25519 signature over fields 1-4 (strict)
/// 3. The key's validity window admits the receipt timestamp
pub fn validate_receipt(receipt: &Receipt, record: &KeyRecord) -> Result<(), CoreError> {
    if record.key_id != receipt.key_id {
        return Err(CoreError::UnknownKey(receipt.key_id.clone()));
    }

    record
        .public_key
        .verify(&receipt.signed_message(), &receipt.signature)?;

    if !record.covers(receipt.timestamp) {
        return Err(CoreError::OutsideKeyWindow {
            key_id: receipt.key_id.clone(),
            timestamp: receipt.timestamp,
        });
    }

    Ok(())
}

/// Look up the receipt's key in the document and validate against it.
pub fn check_signature(receipt: &Receipt, document: &KeyDocument) -> SignatureCheck {
    let Some(record) = document.find(&receipt.key_id) else {
        return SignatureCheck::UnknownKey;
    };

    match validate_receipt(receipt, record) {
        Ok(()) => SignatureCheck::Valid,
        Err(CoreError::InvalidPublicKey) => SignatureCheck::InvalidPublicKey,
        Err(CoreError::SignatureMismatch) => SignatureCheck::Mismatch,
        Err(CoreError::UnknownKey(_)) => SignatureCheck::UnknownKey,
        Err(CoreError::OutsideKeyWindow { .. }) => SignatureCheck::OutsideKeyWindow,
        Err(_) => SignatureCheck::Mismatch,
    }
}

/// Structured verification outcome.
///
/// Signature integrity and current standing are separate facts and are
/// reported separately. `revocation_checked` is false when no revocation
/// view was consulted (offline verification, or a signature that failed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub signature_valid: bool,
    pub revoked: bool,
    pub revocation_checked: bool,
    pub key_id: KeyId,
    pub action: Action,
    pub reason: Option<String>,
}

impl VerificationResult {
    /// Result for a receipt whose signature check has run but whose standing
    /// has not been looked up.
    pub fn from_check(receipt: &Receipt, check: SignatureCheck) -> Self {
        Self {
            signature_valid: check.is_valid(),
            revoked: false,
            revocation_checked: false,
            key_id: receipt.key_id.clone(),
            action: receipt.action,
            reason: check.reason().map(str::to_string),
        }
    }

    /// Record the outcome of a revocation lookup.
    pub fn with_revocation(mut self, revoked: bool) -> Self {
        self.revocation_checked = true;
        self.revoked = revoked;
        if revoked && self.reason.is_none() {
            self.reason = Some("fingerprint revoked".into());
        }
        self
    }

    /// Valid signature and not known to be revoked.
    pub fn is_good_standing(&self) -> bool {
        self.signature_valid && !self.revoked
    }
}
