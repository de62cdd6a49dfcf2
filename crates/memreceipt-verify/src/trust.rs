//! Trust sources and revocation views.
//!
//! A verifier needs two things beyond the receipt: the issuer's key document
//! and, optionally, a way to ask whether a fingerprint has been revoked.
//! Both are behind traits so the same verifier runs offline (bundled keys),
//! online (HTTP) or inside the issuing service.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use memreceipt_core::{Ed25519PublicKey, Fingerprint, KeyDocument, KeyId, KeyRecord, RevocationRecord};

use crate::error::{Result, VerifyError};

/// Source of the issuer's published key document.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait TrustSource: Send + Sync {
    /// Return the current key document.
    ///
    /// Fails with `TrustSourceUnavailable` when it cannot be obtained.
    async fn key_document(&self) -> Result<KeyDocument>;
}

/// Read access to revocation standing.
#[async_trait]
pub trait RevocationView: Send + Sync {
    /// The revocation record for a fingerprint, if any.
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<RevocationRecord>>;

    /// Whether the fingerprint has been revoked.
    async fn is_revoked(&self, fingerprint: &Fingerprint) -> Result<bool> {
        Ok(self.lookup(fingerprint).await?.is_some())
    }
}

#[async_trait]
impl<T: TrustSource + ?Sized> TrustSource for Arc<T> {
    async fn key_document(&self) -> Result<KeyDocument> {
        (**self).key_document().await
    }
}

#[async_trait]
impl<T: RevocationView + ?Sized> RevocationView for Arc<T> {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<RevocationRecord>> {
        (**self).lookup(fingerprint).await
    }
}

/// Offline trust material: a key document held locally.
#[derive(Debug, Clone)]
pub struct BundledKeys {
    document: KeyDocument,
}

/// Accepted JSON shapes for bundled keys.
#[derive(Deserialize)]
#[serde(untagged)]
enum BundledJson {
    Document(KeyDocument),
    Records(Vec<KeyRecord>),
}

impl BundledKeys {
    pub fn new(document: KeyDocument) -> Self {
        Self { document }
    }

    /// Trust a single public key under a key id.
    pub fn single(issuer: impl Into<String>, key_id: KeyId, public_key: Ed25519PublicKey) -> Self {
        Self::new(KeyDocument::single(issuer, key_id, public_key))
    }

    /// Parse either a full key document or a bare array of key records.
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: BundledJson = serde_json::from_str(json)
            .map_err(|e| VerifyError::InvalidKeyDocument(e.to_string()))?;
        Ok(match parsed {
            BundledJson::Document(document) => Self::new(document),
            BundledJson::Records(records) => Self::new(KeyDocument::new("", records)),
        })
    }

    pub fn document(&self) -> &KeyDocument {
        &self.document
    }
}

#[async_trait]
impl TrustSource for BundledKeys {
    async fn key_document(&self) -> Result<KeyDocument> {
        Ok(self.document.clone())
    }
}

/// A primary trust source with offline fallback.
///
/// Only `TrustSourceUnavailable` triggers the fallback; other errors pass
/// through unchanged.
pub struct FallbackTrust {
    primary: Arc<dyn TrustSource>,
    fallback: Arc<dyn TrustSource>,
}

impl FallbackTrust {
    pub fn new(primary: Arc<dyn TrustSource>, fallback: Arc<dyn TrustSource>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl TrustSource for FallbackTrust {
    async fn key_document(&self) -> Result<KeyDocument> {
        match self.primary.key_document().await {
            Err(VerifyError::TrustSourceUnavailable(reason)) => {
                tracing::warn!(%reason, "primary trust source unavailable, using fallback keys");
                self.fallback.key_document().await
            }
            other => other,
        }
    }
}

/// A fixed set of revocation records, e.g. a downloaded snapshot.
#[derive(Debug, Clone, Default)]
pub struct RevocationList {
    records: HashMap<Fingerprint, RevocationRecord>,
}

impl RevocationList {
    pub fn new(records: impl IntoIterator<Item = RevocationRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|r| (r.fingerprint, r))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RevocationView for RevocationList {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<RevocationRecord>> {
        Ok(self.records.get(fingerprint).cloned())
    }
}
