//! Fact canonicalization and fingerprinting.
//!
//! A memory item is never attested directly. The caller's item is resolved
//! to a [`FactInput`], normalized into a [`CanonicalFact`], encoded as
//! canonical CBOR and hashed. Only the resulting [`Fingerprint`] leaves this
//! module; the canonical bytes are dropped before returning.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_fact_bytes, FACT_DOMAIN};
use crate::error::{CoreError, Result};
use crate::types::Fingerprint;

/// Maximum statement length after normalization, in bytes.
pub const MAX_STATEMENT_LEN: usize = 4096;

/// Caller-supplied fact fields before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactInput {
    pub statement: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl FactInput {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A fact in canonical form (`memreceipt/fact/v1`).
///
/// Two inputs that differ only in whitespace, tag order, tag case or
/// duplicate tags canonicalize to the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalFact {
    pub statement: String,
    /// Lowercased, deduplicated, sorted.
    pub tags: Vec<String>,
    pub attributes: BTreeMap<String, String>,
}

impl CanonicalFact {
    /// Normalize a fact input.
    ///
    /// Fails with [`CoreError::InvalidFact`] when the statement is empty or
    /// too long, a tag or attribute key is empty, or two attribute keys
    /// collide after normalization.
    pub fn canonicalize(input: &FactInput) -> Result<Self> {
        let statement = collapse_whitespace(&input.statement);
        if statement.is_empty() {
            return Err(CoreError::InvalidFact("statement is required".into()));
        }
        if statement.len() > MAX_STATEMENT_LEN {
            return Err(CoreError::InvalidFact(format!(
                "statement exceeds {} bytes",
                MAX_STATEMENT_LEN
            )));
        }

        let mut tags = Vec::with_capacity(input.tags.len());
        for tag in &input.tags {
            let tag = collapse_whitespace(tag).to_lowercase();
            if tag.is_empty() {
                return Err(CoreError::InvalidFact("empty tag".into()));
            }
            tags.push(tag);
        }
        tags.sort();
        tags.dedup();

        let mut attributes = BTreeMap::new();
        for (key, value) in &input.attributes {
            let key = key.trim().to_lowercase();
            if key.is_empty() {
                return Err(CoreError::InvalidFact("empty attribute key".into()));
            }
            if attributes
                .insert(key.clone(), collapse_whitespace(value))
                .is_some()
            {
                return Err(CoreError::InvalidFact(format!(
                    "duplicate attribute key: {}",
                    key
                )));
            }
        }

        Ok(Self {
            statement,
            tags,
            attributes,
        })
    }

    /// The canonical CBOR encoding of this fact.
    pub fn to_bytes(&self) -> Vec<u8> {
        canonical_fact_bytes(self)
    }
}

/// Trim and collapse internal whitespace runs to a single space.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Derives fingerprints from facts.
///
/// With a key configured, the digest is a Blake3 keyed hash, so low-entropy
/// facts cannot be recovered by hashing guesses without the key.
#[derive(Clone, Default)]
pub struct Fingerprinter {
    key: Option<[u8; 32]>,
}

impl Fingerprinter {
    /// Unkeyed fingerprinter.
    pub fn new() -> Self {
        Self { key: None }
    }

    /// Keyed fingerprinter.
    pub fn keyed(key: [u8; 32]) -> Self {
        Self { key: Some(key) }
    }

    pub fn is_keyed(&self) -> bool {
        self.key.is_some()
    }

    /// Canonicalize and fingerprint a fact input.
    pub fn fingerprint(&self, input: &FactInput) -> Result<Fingerprint> {
        let fact = CanonicalFact::canonicalize(input)?;
        Ok(self.fingerprint_canonical(&fact))
    }

    /// Fingerprint an already canonical fact.
    pub fn fingerprint_canonical(&self, fact: &CanonicalFact) -> Fingerprint {
        let bytes = fact.to_bytes();
        let mut hasher = match &self.key {
            Some(key) => blake3::Hasher::new_keyed(key),
            None => blake3::Hasher::new(),
        };
        hasher.update(FACT_DOMAIN);
        hasher.update(&bytes);
        Fingerprint::from_bytes(*hasher.finalize().as_bytes())
    }
}

impl std::fmt::Debug for Fingerprinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fingerprinter")
            .field("keyed", &self.is_keyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_whitespace_and_tag_order_ignored() {
        let a = FactInput::new("user logged in from device X")
            .with_tag("auth")
            .with_tag("Device");
        let b = FactInput::new("  user   logged in\tfrom device X \n")
            .with_tag(" device ")
            .with_tag("AUTH")
            .with_tag("auth");

        let fp = Fingerprinter::new();
        assert_eq!(fp.fingerprint(&a).unwrap(), fp.fingerprint(&b).unwrap());
    }

    #[test]
    fn test_statement_case_is_significant() {
        let fp = Fingerprinter::new();
        let a = fp.fingerprint(&FactInput::new("Device X")).unwrap();
        let b = fp.fingerprint(&FactInput::new("device x")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_each_field_contributes() {
        let fp = Fingerprinter::new();
        let base = FactInput::new("fact");
        let with_tag = base.clone().with_tag("t");
        let with_attr = base.clone().with_attribute("source", "t");

        let fps = [
            fp.fingerprint(&base).unwrap(),
            fp.fingerprint(&with_tag).unwrap(),
            fp.fingerprint(&with_attr).unwrap(),
        ];
        assert_ne!(fps[0], fps[1]);
        assert_ne!(fps[0], fps[2]);
        assert_ne!(fps[1], fps[2]);
    }

    #[test]
    fn test_invalid_facts() {
        let fp = Fingerprinter::new();
        assert!(matches!(
            fp.fingerprint(&FactInput::new("   ")),
            Err(CoreError::InvalidFact(_))
        ));
        assert!(matches!(
            fp.fingerprint(&FactInput::new("ok").with_tag(" ")),
            Err(CoreError::InvalidFact(_))
        ));
        assert!(matches!(
            fp.fingerprint(&FactInput::new("x".repeat(MAX_STATEMENT_LEN + 1))),
            Err(CoreError::InvalidFact(_))
        ));
        let colliding = FactInput::new("ok")
            .with_attribute("Source", "a")
            .with_attribute("source", "b");
        assert!(matches!(
            fp.fingerprint(&colliding),
            Err(CoreError::InvalidFact(_))
        ));
    }

    #[test]
    fn test_keyed_differs_from_unkeyed() {
        let input = FactInput::new("user logged in from device X");
        let plain = Fingerprinter::new().fingerprint(&input).unwrap();
        let keyed = Fingerprinter::keyed([7; 32]).fingerprint(&input).unwrap();
        let other = Fingerprinter::keyed([8; 32]).fingerprint(&input).unwrap();
        assert_ne!(plain, keyed);
        assert_ne!(keyed, other);
    }

    #[test]
    fn test_debug_hides_key() {
        let s = format!("{:?}", Fingerprinter::keyed([0xaa; 32]));
        assert!(!s.contains("aa"));
        assert!(s.contains("keyed: true"));
    }

    proptest! {
        #[test]
        fn prop_fingerprint_deterministic(statement in "[a-z]{1,12}( [a-z]{1,12}){0,6}") {
            let fp = Fingerprinter::new();
            let input = FactInput::new(statement.clone());
            prop_assert_eq!(fp.fingerprint(&input).unwrap(), fp.fingerprint(&input).unwrap());
        }

        #[test]
        fn prop_distinct_statements_distinct_fingerprints(
            a in "[a-z]{1,16}",
            b in "[a-z]{1,16}",
        ) {
            prop_assume!(a != b);
            let fp = Fingerprinter::new();
            prop_assert_ne!(
                fp.fingerprint(&FactInput::new(a)).unwrap(),
                fp.fingerprint(&FactInput::new(b)).unwrap()
            );
        }
    }
}
