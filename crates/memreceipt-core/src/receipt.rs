//! Receipt: the five-field signed attestation.
//!
//! A receipt says that an action was taken on a fingerprint, at a time, with
//! a given key version. It is immutable once issued. Its standing (revoked or
//! not) lives outside the receipt, in the revocation ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canonical::{canonical_receipt_bytes, decode_receipt, signed_message, RECEIPT_ID_DOMAIN};
use crate::crypto::{Blake3Hash, Ed25519Signature, Keypair};
use crate::error::Result;
use crate::key::KeyId;
use crate::types::Fingerprint;

/// Wire format identifier of receipts produced by this crate.
pub const RECEIPT_FORMAT: &str = "memreceipt/receipt/v1";

/// The action a receipt attests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Write,
    Search,
    Revoke,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Search => "search",
            Self::Revoke => "revoke",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "write" => Some(Self::Write),
            "search" => Some(Self::Search),
            "revoke" => Some(Self::Revoke),
            _ => None,
        }
    }

    /// Whether a receipt with this action is subject to revocation checks.
    pub fn is_revocable(self) -> bool {
        matches!(self, Self::Write | Self::Search)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields 1-4 of a receipt: everything the signature covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptFields {
    pub fingerprint: Fingerprint,
    pub action: Action,
    /// Unix milliseconds, UTC.
    pub timestamp: i64,
    pub key_id: KeyId,
}

impl ReceiptFields {
    /// The exact bytes an issuer signs.
    pub fn signing_message(&self) -> Vec<u8> {
        signed_message(self)
    }

    /// Attach a signature produced elsewhere.
    pub fn into_receipt(self, signature: Ed25519Signature) -> Receipt {
        Receipt {
            fingerprint: self.fingerprint,
            action: self.action,
            timestamp: self.timestamp,
            key_id: self.key_id,
            signature,
        }
    }

    /// Sign with a keypair and attach the signature.
    pub fn sign_with(self, keypair: &Keypair) -> Receipt {
        let signature = keypair.sign(&self.signing_message());
        self.into_receipt(signature)
    }
}

/// A signed receipt.
///
/// The JSON form has exactly these five fields; anything else is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Receipt {
    pub fingerprint: Fingerprint,
    pub action: Action,
    pub timestamp: i64,
    pub key_id: KeyId,
    pub signature: Ed25519Signature,
}

impl Receipt {
    /// Fields 1-4.
    pub fn fields(&self) -> ReceiptFields {
        ReceiptFields {
            fingerprint: self.fingerprint,
            action: self.action,
            timestamp: self.timestamp,
            key_id: self.key_id.clone(),
        }
    }

    /// The message the signature is expected to cover.
    pub fn signed_message(&self) -> Vec<u8> {
        signed_message(&self.fields())
    }

    /// Canonical CBOR encoding of all five fields.
    pub fn to_cbor(&self) -> Vec<u8> {
        canonical_receipt_bytes(self)
    }

    /// Strictly decode a receipt from its canonical CBOR encoding.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        decode_receipt(bytes)
    }

    /// Content address of this receipt, used to reference it in audit logs.
    pub fn compute_id(&self) -> Blake3Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(RECEIPT_ID_DOMAIN);
        hasher.update(&self.to_cbor());
        Blake3Hash(*hasher.finalize().as_bytes())
    }
}

/// The permanent record of a fingerprint's revocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationRecord {
    pub fingerprint: Fingerprint,
    /// The revoke receipt; `receipt.action` is always [`Action::Revoke`].
    pub receipt: Receipt,
    /// Unix milliseconds.
    pub revoked_at: i64,
}

impl RevocationRecord {
    pub fn new(receipt: Receipt, revoked_at: i64) -> Self {
        Self {
            fingerprint: receipt.fingerprint,
            receipt,
            revoked_at,
        }
    }
}
