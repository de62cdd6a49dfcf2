//! Mapping caller memory items to canonical fact input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use memreceipt_core::FactInput;
use memreceipt_store::{Consent, Scope};

use crate::error::Result;

/// A memory item as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub consent: Consent,
    /// Overrides the configured default time-to-live.
    #[serde(default)]
    pub ttl_days: Option<u32>,
}

impl MemoryItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tags: Vec::new(),
            attributes: BTreeMap::new(),
            scope: Scope::default(),
            consent: Consent::default(),
            ttl_days: None,
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

    pub fn with_ttl_days(mut self, days: u32) -> Self {
        self.ttl_days = Some(days);
        self
    }
}

/// Decides which parts of a memory item make up its fact.
///
/// Scope, consent and expiry are never part of the fact: the same statement
/// written with a different scope has the same fingerprint.
pub trait FactResolver: Send + Sync {
    fn resolve(&self, item: &MemoryItem) -> Result<FactInput>;
}

/// Text becomes the statement; tags and attributes carry over.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResolver;

impl FactResolver for DefaultResolver {
    fn resolve(&self, item: &MemoryItem) -> Result<FactInput> {
        Ok(FactInput {
            statement: item.text.clone(),
            tags: item.tags.clone(),
            attributes: item.attributes.clone(),
        })
    }
}
