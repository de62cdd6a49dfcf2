//! Golden test vectors.
//!
//! Fixed facts, seeds and timestamps. The canonical fact encodings are
//! pinned byte for byte; the derived receipt values are reported so they
//! can be compared across builds.

use memreceipt_core::{
    canonical::canonical_fact_bytes, Action, CanonicalFact, FactInput, Fingerprinter, KeyDocument,
    KeyId, KeyRecord, Keypair, Receipt, ReceiptFields, check_signature,
};

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Seed for deterministic key generation.
    pub seed: [u8; 32],
    pub statement: &'static str,
    pub tags: &'static [&'static str],
    pub attributes: &'static [(&'static str, &'static str)],
    pub action: Action,
    pub timestamp: i64,
    pub key_id: &'static str,
    /// Expected canonical fact encoding (hex).
    pub expected_fact_bytes: &'static str,
}

impl GoldenVector {
    pub fn fact(&self) -> FactInput {
        FactInput {
            statement: self.statement.to_string(),
            tags: self.tags.iter().map(|t| t.to_string()).collect(),
            attributes: self
                .attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn keypair(&self) -> Keypair {
        Keypair::from_seed(&self.seed)
    }

    pub fn key_document(&self) -> KeyDocument {
        KeyDocument::new(
            "did:web:localhost",
            vec![KeyRecord::new(
                KeyId::new(self.key_id).expect("vector key id is valid"),
                self.keypair().public_key(),
                0,
            )],
        )
    }
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "minimal write",
            seed: [0x42; 32],
            statement: "hello world",
            tags: &["a"],
            attributes: &[],
            action: Action::Write,
            timestamp: 1_736_870_400_000,
            key_id: "key-1",
            expected_fact_bytes: "a36474616773816161656174747273a0\
                                  6973746174656d656e746b68656c6c6f20776f726c64",
        },
        GoldenVector {
            name: "login fact with attribute",
            seed: [0x42; 32],
            statement: "  User logged in   from device X ",
            tags: &["login", "AUTH", "auth"],
            attributes: &[("Source", "app")],
            action: Action::Search,
            timestamp: 1_736_870_401_000,
            key_id: "key-1",
            expected_fact_bytes: "a36474616773826461757468656c6f67696e656174747273a1\
                                  66736f75726365636170706973746174656d656e74781c\
                                  55736572206c6f6767656420696e2066726f6d206465766963652058",
        },
        GoldenVector {
            name: "revoke at epoch",
            seed: [0x00; 32],
            statement: "hello world",
            tags: &["a"],
            attributes: &[],
            action: Action::Revoke,
            timestamp: 0,
            key_id: "key-7",
            expected_fact_bytes: "a36474616773816161656174747273a0\
                                  6973746174656d656e746b68656c6c6f20776f726c64",
        },
    ]
}

/// Build the receipt a vector describes.
pub fn receipt_from_vector(vector: &GoldenVector) -> Receipt {
    let fingerprint = Fingerprinter::new()
        .fingerprint(&vector.fact())
        .expect("vector fact canonicalizes");
    ReceiptFields {
        fingerprint,
        action: vector.action,
        timestamp: vector.timestamp,
        key_id: KeyId::new(vector.key_id).expect("vector key id is valid"),
    }
    .sign_with(&vector.keypair())
}

/// Check every vector: pinned fact bytes match and the receipt verifies.
///
/// Returns `(name, ok, receipt_id_hex)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let fact_ok = CanonicalFact::canonicalize(&v.fact())
                .map(|f| hex::encode(canonical_fact_bytes(&f)) == v.expected_fact_bytes)
                .unwrap_or(false);
            let receipt = receipt_from_vector(v);
            let sig_ok = check_signature(&receipt, &v.key_document()).is_valid();
            (v.name.to_string(), fact_ok && sig_ok, receipt.compute_id().to_hex())
        })
        .collect()
}
