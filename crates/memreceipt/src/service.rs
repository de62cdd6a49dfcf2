//! The memory service: write, search, revoke and verify, each answered with
//! a receipt.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use memreceipt_core::{
    Action, CanonicalFact, Fingerprint, Fingerprinter, KeyDocument, KeyRecord, Receipt,
    RevocationRecord, VerificationResult,
};
use memreceipt_store::{ActionRecord, MemoryQuery, MemoryRecord, Scope, Store};
use memreceipt_verify::{BundledKeys, Verifier};

use crate::clock::{now_millis, IssuanceClock};
use crate::config::{days_to_millis, ServiceConfig};
use crate::error::{Result, ServiceError};
use crate::issuer::ReceiptIssuer;
use crate::keys::{KeyManager, KeyManagerConfig};
use crate::ledger::{Revocation, RevocationLedger};
use crate::resolver::{DefaultResolver, FactResolver, MemoryItem};
use crate::seal::KeySealer;

/// Length of search result snippets, in characters.
pub const SNIPPET_CHARS: usize = 240;

/// Default number of search results.
pub const DEFAULT_TOP_K: usize = 5;

/// A search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Case-insensitive substring of the statement.
    pub q: String,
    /// Match items carrying any of these tags.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl SearchRequest {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            tags: None,
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Result of a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub fingerprint: Fingerprint,
    pub receipt: Receipt,
    /// False when the same fact was already stored.
    pub created: bool,
}

/// One search result with its search receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub fingerprint: Fingerprint,
    pub snippet: String,
    pub tags: Vec<String>,
    pub scope: Scope,
    pub created_at: i64,
    pub expires_at: Option<i64>,
    pub receipt: Receipt,
}

impl SearchHit {
    fn new(record: MemoryRecord, receipt: Receipt) -> Self {
        Self {
            fingerprint: record.fingerprint,
            snippet: record.statement.chars().take(SNIPPET_CHARS).collect(),
            tags: record.tags,
            scope: record.scope,
            created_at: record.created_at,
            expires_at: record.expires_at,
            receipt,
        }
    }
}

/// The memory service over a store backend.
pub struct MemoryService<S: Store + 'static> {
    store: Arc<S>,
    config: ServiceConfig,
    fingerprinter: Fingerprinter,
    resolver: Arc<dyn FactResolver>,
    keys: Arc<KeyManager<S>>,
    issuer: ReceiptIssuer<S>,
    ledger: Arc<RevocationLedger<S>>,
}

impl<S: Store + 'static> MemoryService<S> {
    /// Open the service, sealing key material with the configured master key.
    ///
    /// Without a master key, seeds are sealed with a per-process key and the
    /// active key cannot be reopened after a restart. Config validation only
    /// allows that for deployments without a `database`.
    pub async fn open(store: Arc<S>, config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        let sealer = match config.master_key()? {
            Some(key) => KeySealer::new(&key),
            None => {
                tracing::warn!("no master key configured, key material will not survive restart");
                KeySealer::ephemeral()
            }
        };
        Self::open_with_sealer(store, config, sealer).await
    }

    pub async fn open_with_sealer(store: Arc<S>, config: ServiceConfig, sealer: KeySealer) -> Result<Self> {
        config.validate()?;
        let fingerprinter = match config.fingerprint_key()? {
            Some(key) => Fingerprinter::keyed(key),
            None => Fingerprinter::new(),
        };
        let keys = Arc::new(
            KeyManager::open(
                store.clone(),
                sealer,
                KeyManagerConfig {
                    issuer: config.issuer.clone(),
                    key_id_prefix: config.key_id_prefix.clone(),
                    initial_seed: config.dev_seed()?,
                },
                Arc::new(IssuanceClock::new()),
            )
            .await?,
        );
        let issuer = ReceiptIssuer::new(keys.clone());
        let ledger = Arc::new(RevocationLedger::new(store.clone(), issuer.clone()));

        tracing::info!(issuer = %config.issuer, "memory service ready");

        Ok(Self {
            store,
            config,
            fingerprinter,
            resolver: Arc::new(DefaultResolver),
            keys,
            issuer,
            ledger,
        })
    }

    /// Replace the fact resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn FactResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Resolve and canonicalize an item.
    fn canonical_fact(&self, item: &MemoryItem) -> Result<CanonicalFact> {
        let input = self.resolver.resolve(item)?;
        Ok(CanonicalFact::canonicalize(&input)?)
    }

    /// The fingerprint an item would be written under.
    pub fn fingerprint(&self, item: &MemoryItem) -> Result<Fingerprint> {
        let fact = self.canonical_fact(item)?;
        Ok(self.fingerprinter.fingerprint_canonical(&fact))
    }

    /// Store a memory item and issue its write receipt.
    ///
    /// Writing a fact that is already stored issues a fresh receipt and
    /// leaves the stored item unchanged. A revoked fingerprint cannot be
    /// written again.
    pub async fn write(&self, item: &MemoryItem) -> Result<WriteOutcome> {
        let fact = self.canonical_fact(item)?;
        let fingerprint = self.fingerprinter.fingerprint_canonical(&fact);

        if self.ledger.is_revoked(&fingerprint).await? {
            return Err(ServiceError::InvalidOperation(format!(
                "fingerprint {} is revoked",
                fingerprint
            )));
        }

        let receipt = self.issuer.issue(fingerprint, Action::Write).await?;

        let ttl = item
            .ttl_days
            .map(days_to_millis)
            .or_else(|| self.config.default_ttl_millis());
        let record = MemoryRecord {
            fingerprint,
            statement: fact.statement,
            tags: fact.tags,
            scope: item.scope,
            consent: item.consent,
            created_at: receipt.timestamp,
            expires_at: ttl.map(|ms| receipt.timestamp.saturating_add(ms)),
        };
        let created = self.store.put_memory(&record).await?;
        self.record(&receipt).await?;

        Ok(WriteOutcome {
            fingerprint,
            receipt,
            created,
        })
    }

    /// Search stored items. Every hit carries its own search receipt.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let tags = request.tags.as_deref().unwrap_or_default();
        let query = MemoryQuery::new(&request.q, tags, request.top_k, now_millis());
        let records = self.store.search_memories(&query).await?;

        tracing::debug!(query = %query.text, hits = records.len(), "searched memories");

        let mut hits = Vec::with_capacity(records.len());
        for record in records {
            let receipt = self.issuer.issue(record.fingerprint, Action::Search).await?;
            self.record(&receipt).await?;
            hits.push(SearchHit::new(record, receipt));
        }
        Ok(hits)
    }

    /// Revoke a stored item by fingerprint.
    ///
    /// Idempotent: repeated calls return the same revoke receipt. Fails with
    /// `MemoryNotFound` for a fingerprint that was never written.
    pub async fn revoke(&self, fingerprint: &Fingerprint) -> Result<Revocation> {
        if self.store.get_memory(fingerprint).await?.is_none()
            && !self.ledger.is_revoked(fingerprint).await?
        {
            return Err(ServiceError::MemoryNotFound(*fingerprint));
        }

        let revocation = self.ledger.revoke_tracked(fingerprint).await?;
        if revocation.newly_revoked {
            self.record(&revocation.receipt).await?;
        }
        Ok(revocation)
    }

    /// Verify a receipt against this issuer's keys and revocations.
    pub async fn verify(&self, receipt: &Receipt) -> Result<VerificationResult> {
        Ok(self.verifier().verify(receipt).await?)
    }

    /// Verify a receipt against a supplied key document.
    ///
    /// Revocation standing is only reported when the document names this
    /// issuer; the local ledger says nothing about other issuers.
    pub async fn verify_with(&self, receipt: &Receipt, keys: BundledKeys) -> Result<VerificationResult> {
        let same_issuer = keys.document().issuer == self.config.issuer;
        let mut verifier = Verifier::new(Arc::new(keys));
        if same_issuer {
            verifier = verifier.with_revocations(self.ledger.clone());
        }
        Ok(verifier.verify(receipt).await?)
    }

    /// A verifier backed by this issuer's keys and revocation ledger.
    pub fn verifier(&self) -> Verifier {
        Verifier::new(self.keys.clone()).with_revocations(self.ledger.clone())
    }

    pub async fn rotate_key(&self) -> Result<KeyRecord> {
        self.keys.rotate().await
    }

    pub async fn current_key(&self) -> Result<KeyRecord> {
        self.keys.current_key().await
    }

    pub async fn key_document(&self) -> Result<KeyDocument> {
        self.keys.public_key_document().await
    }

    pub async fn revocation(&self, fingerprint: &Fingerprint) -> Result<Option<RevocationRecord>> {
        self.ledger.lookup(fingerprint).await
    }

    /// The audit trail of a fingerprint, oldest first.
    pub async fn history(&self, fingerprint: &Fingerprint) -> Result<Vec<ActionRecord>> {
        Ok(self.store.actions_for(fingerprint).await?)
    }

    pub async fn is_halted(&self) -> bool {
        self.keys.is_halted().await
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn keys(&self) -> &Arc<KeyManager<S>> {
        &self.keys
    }

    pub fn ledger(&self) -> &Arc<RevocationLedger<S>> {
        &self.ledger
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    async fn record(&self, receipt: &Receipt) -> Result<()> {
        self.store
            .record_action(&ActionRecord {
                fingerprint: receipt.fingerprint,
                action: receipt.action,
                receipt_id: receipt.compute_id(),
                recorded_at: receipt.timestamp,
            })
            .await?;
        Ok(())
    }
}
