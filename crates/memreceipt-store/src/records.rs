//! Records persisted by the store.
//!
//! These are backend-owned shapes. Only [`StoredKey`] and the revocation
//! record take part in the receipt protocol; memory items and the action log
//! exist for search and audit.

use serde::{Deserialize, Serialize};

use memreceipt_core::{Action, Blake3Hash, Fingerprint, KeyRecord};

/// Maximum number of results a search may return.
pub const MAX_TOP_K: usize = 20;

/// Clamp a requested result count to `1..=MAX_TOP_K`.
pub fn clamp_top_k(top_k: usize) -> usize {
    top_k.clamp(1, MAX_TOP_K)
}

/// One signing key version as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredKey {
    pub record: KeyRecord,
    /// Monotonic version number; the key id is derived from it.
    pub version: u64,
    /// Sealed private seed. `None` once the key is retired.
    pub sealed_seed: Option<Vec<u8>>,
}

/// Visibility of a memory item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Private,
    Team,
    Public,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Team => "team",
            Self::Public => "public",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Self::Private),
            "team" => Some(Self::Team),
            "public" => Some(Self::Public),
            _ => None,
        }
    }
}

/// How the user agreed to the item being remembered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consent {
    #[default]
    Explicit,
    Inferred,
    None,
}

impl Consent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Inferred => "inferred",
            Self::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "explicit" => Some(Self::Explicit),
            "inferred" => Some(Self::Inferred),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// A stored memory item, keyed by its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub fingerprint: Fingerprint,
    pub statement: String,
    pub tags: Vec<String>,
    pub scope: Scope,
    pub consent: Consent,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Unix milliseconds; `None` never expires.
    pub expires_at: Option<i64>,
}

impl MemoryRecord {
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    /// Whether this item matches a query (ignoring revocation and expiry).
    pub fn matches(&self, query: &MemoryQuery) -> bool {
        let text_ok = self.statement.to_lowercase().contains(&query.text);
        let tags_ok = query.tags.is_empty() || query.tags.iter().any(|t| self.tags.contains(t));
        text_ok && tags_ok
    }
}

/// A search over stored memory items.
///
/// Revoked and expired items never match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryQuery {
    /// Lowercased substring to look for in the statement. Empty matches all.
    pub text: String,
    /// Lowercased tags; an item matches if it carries any of them.
    pub tags: Vec<String>,
    /// Already clamped to `1..=MAX_TOP_K`.
    pub top_k: usize,
    /// Reference time for expiry.
    pub now: i64,
}

impl MemoryQuery {
    pub fn new(text: &str, tags: &[String], top_k: usize, now: i64) -> Self {
        Self {
            text: text.trim().to_lowercase(),
            tags: tags
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            top_k: clamp_top_k(top_k),
            now,
        }
    }
}

/// Audit entry: a receipt was issued for an action on a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub fingerprint: Fingerprint,
    pub action: Action,
    pub receipt_id: Blake3Hash,
    /// Unix milliseconds.
    pub recorded_at: i64,
}
