//! The verifier: signature, key policy and revocation standing.

use std::sync::Arc;

use memreceipt_core::{check_signature, Receipt, VerificationResult};

use crate::error::{Result, VerifyError};
use crate::trust::{RevocationView, TrustSource};

/// Verifies receipts against a trust source and an optional revocation view.
///
/// Verification is read-only. An invalid or revoked receipt is a normal
/// result; only malformed input or an unavailable trust source is an error.
#[derive(Clone)]
pub struct Verifier {
    trust: Arc<dyn TrustSource>,
    revocations: Option<Arc<dyn RevocationView>>,
}

impl Verifier {
    /// Create a verifier without revocation checks.
    pub fn new(trust: Arc<dyn TrustSource>) -> Self {
        Self {
            trust,
            revocations: None,
        }
    }

    /// Also consult a revocation view for write and search receipts.
    pub fn with_revocations(mut self, revocations: Arc<dyn RevocationView>) -> Self {
        self.revocations = Some(revocations);
        self
    }

    /// Verify a receipt.
    ///
    /// 1. Look up `key_id` in the key document
    /// 2. Check the Ed25519 signature over fields 1-4
    /// 3. Check the key's validity window admits the timestamp
    /// 4. For a valid write/search receipt, look up revocation standing
    pub async fn verify(&self, receipt: &Receipt) -> Result<VerificationResult> {
        let document = self.trust.key_document().await?;
        let check = check_signature(receipt, &document);
        let mut result = VerificationResult::from_check(receipt, check);

        if check.is_valid() && receipt.action.is_revocable() {
            if let Some(view) = &self.revocations {
                let revoked = view.is_revoked(&receipt.fingerprint).await?;
                result = result.with_revocation(revoked);
            }
        }

        tracing::debug!(
            key_id = %receipt.key_id,
            action = %receipt.action,
            signature_valid = result.signature_valid,
            revoked = result.revoked,
            "verified receipt"
        );
        Ok(result)
    }

    /// Parse a receipt from its JSON wire form and verify it.
    pub async fn verify_json(&self, json: &str) -> Result<VerificationResult> {
        let receipt = parse_receipt_json(json)?;
        self.verify(&receipt).await
    }

    /// Decode a receipt from canonical CBOR and verify it.
    pub async fn verify_cbor(&self, bytes: &[u8]) -> Result<VerificationResult> {
        let receipt = Receipt::from_cbor(bytes)?;
        self.verify(&receipt).await
    }
}

/// Parse the JSON wire form of a receipt. Unknown fields are rejected.
pub fn parse_receipt_json(json: &str) -> Result<Receipt> {
    serde_json::from_str(json).map_err(|e| VerifyError::MalformedReceipt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::{BundledKeys, RevocationList};
    use memreceipt_core::{
        Action, Fingerprint, KeyDocument, KeyId, KeyRecord, Keypair, ReceiptFields,
        RevocationRecord,
    };

    fn keypair() -> Keypair {
        Keypair::from_seed(&[9; 32])
    }

    fn issue(action: Action, fp: u8) -> Receipt {
        ReceiptFields {
            fingerprint: Fingerprint::from_bytes([fp; 32]),
            action,
            timestamp: 1_000,
            key_id: KeyId::new("key-1").unwrap(),
        }
        .sign_with(&keypair())
    }

    fn trust() -> Arc<dyn TrustSource> {
        Arc::new(BundledKeys::new(KeyDocument::new(
            "did:web:localhost",
            vec![KeyRecord::new(
                KeyId::new("key-1").unwrap(),
                keypair().public_key(),
                0,
            )],
        )))
    }

    fn revoked(fp: u8) -> Arc<dyn RevocationView> {
        Arc::new(RevocationList::new([RevocationRecord::new(
            issue(Action::Revoke, fp),
            2_000,
        )]))
    }

    #[tokio::test]
    async fn test_offline_valid_reports_unchecked() {
        let result = Verifier::new(trust())
            .verify(&issue(Action::Write, 1))
            .await
            .unwrap();
        assert!(result.signature_valid);
        assert!(!result.revoked);
        assert!(!result.revocation_checked);
        assert_eq!(result.reason, None);
    }

    #[tokio::test]
    async fn test_revoked_but_valid() {
        let verifier = Verifier::new(trust()).with_revocations(revoked(1));

        let result = verifier.verify(&issue(Action::Search, 1)).await.unwrap();
        assert!(result.signature_valid);
        assert!(result.revoked);
        assert!(result.revocation_checked);

        let other = verifier.verify(&issue(Action::Write, 2)).await.unwrap();
        assert!(other.signature_valid);
        assert!(!other.revoked);
    }

    #[tokio::test]
    async fn test_revoke_receipt_skips_revocation_check() {
        let verifier = Verifier::new(trust()).with_revocations(revoked(1));
        let result = verifier.verify(&issue(Action::Revoke, 1)).await.unwrap();
        assert!(result.signature_valid);
        assert!(!result.revocation_checked);
        assert_eq!(result.action, Action::Revoke);
    }

    #[tokio::test]
    async fn test_invalid_is_a_result_not_an_error() {
        let verifier = Verifier::new(trust()).with_revocations(revoked(1));
        let mut tampered = issue(Action::Write, 1);
        tampered.signature.0[10] ^= 0x40;

        let result = verifier.verify(&tampered).await.unwrap();
        assert!(!result.signature_valid);
        assert!(!result.revocation_checked);
        assert_eq!(result.reason.as_deref(), Some("signature mismatch"));
    }

    #[tokio::test]
    async fn test_unknown_key_reason() {
        let mut receipt = issue(Action::Write, 1);
        receipt.key_id = KeyId::new("key-7").unwrap();
        let result = Verifier::new(trust()).verify(&receipt).await.unwrap();
        assert!(!result.signature_valid);
        assert_eq!(result.reason.as_deref(), Some("unknown key"));
    }

    #[tokio::test]
    async fn test_json_entrypoint() {
        let verifier = Verifier::new(trust());
        let json = serde_json::to_string(&issue(Action::Write, 1)).unwrap();
        assert!(verifier.verify_json(&json).await.unwrap().signature_valid);

        assert!(matches!(
            verifier.verify_json("{\"fingerprint\": 1}").await,
            Err(VerifyError::MalformedReceipt(_))
        ));
    }

    #[tokio::test]
    async fn test_cbor_entrypoint() {
        let verifier = Verifier::new(trust());
        let bytes = issue(Action::Search, 3).to_cbor();
        assert!(verifier.verify_cbor(&bytes).await.unwrap().signature_valid);
        assert!(matches!(
            verifier.verify_cbor(&bytes[..bytes.len() - 1]).await,
            Err(VerifyError::MalformedReceipt(_))
        ));
    }
}
