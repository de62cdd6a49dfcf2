//! Service configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//! Secrets are 32-byte values written as 64 hex characters.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// Issuer identifier of a local development deployment.
pub const DEFAULT_ISSUER: &str = "did:web:localhost";

/// Configuration for the memreceipt service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Issuer identifier published in the key document.
    pub issuer: String,

    /// Key ids are `{key_id_prefix}-{version}`.
    pub key_id_prefix: String,

    /// SQLite database path. In-memory when unset.
    pub database: Option<PathBuf>,

    /// Hex master key sealing private seeds at rest. Required with a
    /// `database`; an in-memory deployment falls back to a random key for
    /// the lifetime of the process.
    pub master_key: Option<String>,

    /// Hex key for keyed fingerprints. Plain Blake3 when unset.
    pub fingerprint_key: Option<String>,

    /// Hex seed of the first signing key, for reproducible development
    /// setups. Only used when the store holds no keys.
    pub dev_seed: Option<String>,

    /// Default time-to-live of written memory items, in days.
    pub default_ttl_days: Option<u32>,

    /// Timeout for remote key document and revocation fetches.
    pub trust_timeout_ms: u64,

    /// HTTP listen address.
    pub bind: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            issuer: DEFAULT_ISSUER.to_string(),
            key_id_prefix: "key".to_string(),
            database: None,
            master_key: None,
            fingerprint_key: None,
            dev_seed: None,
            default_ttl_days: None,
            trust_timeout_ms: 3_000,
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| ServiceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Check that every field parses and that persisted keys can be
    /// unsealed by the next process.
    pub fn validate(&self) -> Result<()> {
        if self.issuer.trim().is_empty() {
            return Err(ServiceError::Config("issuer must not be empty".into()));
        }
        memreceipt_core::KeyId::versioned(&self.key_id_prefix, 1)
            .map_err(|e| ServiceError::Config(format!("key_id_prefix: {}", e)))?;
        if self.trust_timeout_ms == 0 {
            return Err(ServiceError::Config("trust_timeout_ms must be positive".into()));
        }
        if self.master_key()?.is_none() {
            if let Some(path) = &self.database {
                return Err(ServiceError::Config(format!(
                    "database {} requires a master_key to seal signing keys",
                    path.display()
                )));
            }
        }
        self.fingerprint_key()?;
        self.dev_seed()?;
        Ok(())
    }

    pub fn master_key(&self) -> Result<Option<[u8; 32]>> {
        parse_secret("master_key", self.master_key.as_deref())
    }

    pub fn fingerprint_key(&self) -> Result<Option<[u8; 32]>> {
        parse_secret("fingerprint_key", self.fingerprint_key.as_deref())
    }

    pub fn dev_seed(&self) -> Result<Option<[u8; 32]>> {
        parse_secret("dev_seed", self.dev_seed.as_deref())
    }

    pub fn trust_timeout(&self) -> Duration {
        Duration::from_millis(self.trust_timeout_ms)
    }

    /// Default expiry offset in milliseconds, if configured.
    pub fn default_ttl_millis(&self) -> Option<i64> {
        self.default_ttl_days.map(days_to_millis)
    }
}

/// Convert a whole number of days to milliseconds.
pub fn days_to_millis(days: u32) -> i64 {
    i64::from(days) * 24 * 60 * 60 * 1000
}

fn parse_secret(name: &str, value: Option<&str>) -> Result<Option<[u8; 32]>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let bytes = hex::decode(value.trim())
        .map_err(|e| ServiceError::Config(format!("{}: {}", name, e)))?;
    let len = bytes.len();
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ServiceError::Config(format!("{}: expected 32 bytes, got {}", name, len)))?;
    Ok(Some(arr))
}
