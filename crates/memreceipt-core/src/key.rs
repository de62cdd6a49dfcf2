//! Key records and the published verification document.
//!
//! A [`KeyRecord`] is the public half of one signing key version. The set of
//! all records, newest first, forms the [`KeyDocument`] served at the
//! well-known discovery path. Keys are retired on rotation, never deleted.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::Ed25519PublicKey;
use crate::error::CoreError;
use crate::receipt::RECEIPT_FORMAT;

/// Maximum length of a key identifier in bytes.
pub const MAX_KEY_ID_LEN: usize = 64;

/// Identifier of a signing key version (e.g. `key-3`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyId(String);

impl KeyId {
    /// Create a key id, validating its character set and length.
    ///
    /// Allowed: ASCII alphanumerics and `.`, `_`, `:`, `-`; 1 to 64 bytes.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_KEY_ID_LEN {
            return Err(CoreError::InvalidKeyId(format!(
                "length must be 1..={}, got {}",
                MAX_KEY_ID_LEN,
                id.len()
            )));
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-')))
        {
            return Err(CoreError::InvalidKeyId(format!("invalid character {:?}", c)));
        }
        Ok(Self(id))
    }

    /// Build the id for a key version: `{prefix}-{version}`.
    pub fn versioned(prefix: &str, version: u64) -> Result<Self, CoreError> {
        Self::new(format!("{}-{}", prefix, version))
    }

    /// The numeric version suffix of a `{prefix}-{version}` id.
    pub fn version(&self) -> Option<u64> {
        let (_, suffix) = self.0.rsplit_once('-')?;
        suffix.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self.0)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for KeyId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<KeyId> for String {
    fn from(id: KeyId) -> Self {
        id.0
    }
}

/// The public record of one signing key version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub key_id: KeyId,
    pub public_key: Ed25519PublicKey,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Unix milliseconds; `None` while the key is active.
    pub retired_at: Option<i64>,
}

impl KeyRecord {
    /// Create a record for a freshly generated, active key.
    pub fn new(key_id: KeyId, public_key: Ed25519PublicKey, created_at: i64) -> Self {
        Self {
            key_id,
            public_key,
            created_at,
            retired_at: None,
        }
    }

    pub fn is_retired(&self) -> bool {
        self.retired_at.is_some()
    }

    /// Return a copy marked as retired at `at`.
    pub fn retired(&self, at: i64) -> Self {
        Self {
            retired_at: Some(at),
            ..self.clone()
        }
    }

    /// Whether a receipt stamped `timestamp` falls inside this key's
    /// signing window.
    pub fn covers(&self, timestamp: i64) -> bool {
        if timestamp < self.created_at {
            return false;
        }
        match self.retired_at {
            Some(retired_at) => timestamp <= retired_at,
            None => true,
        }
    }
}

/// The well-known verification document: every key ever issued, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDocument {
    /// Issuer identifier (e.g. `did:web:example.org`).
    pub issuer: String,
    /// Receipt wire format these keys sign.
    pub format: String,
    pub keys: Vec<KeyRecord>,
}

impl KeyDocument {
    /// Build a document, ordering keys newest first.
    ///
    /// Keys created in the same millisecond are ordered by version suffix,
    /// so `key-11` lists above `key-9`.
    pub fn new(issuer: impl Into<String>, mut keys: Vec<KeyRecord>) -> Self {
        keys.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.key_id.version().cmp(&a.key_id.version()))
                .then_with(|| b.key_id.cmp(&a.key_id))
        });
        Self::from_newest_first(issuer, keys)
    }

    /// Build a document from keys already ordered newest first.
    pub fn from_newest_first(issuer: impl Into<String>, keys: Vec<KeyRecord>) -> Self {
        Self {
            issuer: issuer.into(),
            format: RECEIPT_FORMAT.to_string(),
            keys,
        }
    }

    /// A document trusting a single, never-retired public key.
    ///
    /// Used for offline verification with a bundled key.
    pub fn single(issuer: impl Into<String>, key_id: KeyId, public_key: Ed25519PublicKey) -> Self {
        Self::new(issuer, vec![KeyRecord::new(key_id, public_key, 0)])
    }

    /// Find the record for a key id.
    pub fn find(&self, key_id: &KeyId) -> Option<&KeyRecord> {
        self.keys.iter().find(|k| &k.key_id == key_id)
    }

    /// The active (unretired) key, if any.
    pub fn active(&self) -> Option<&KeyRecord> {
        self.keys.iter().find(|k| !k.is_retired())
    }
}
