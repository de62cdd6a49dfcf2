//! Online trust: the issuer's published key document and revocation
//! endpoint, fetched over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use memreceipt_core::{Fingerprint, KeyDocument, RevocationRecord, RECEIPT_FORMAT};

use crate::error::{Result, VerifyError};
use crate::trust::{RevocationView, TrustSource};

/// Well-known discovery path of the key document.
pub const KEY_DOCUMENT_PATH: &str = "/.well-known/memreceipt-keys.json";

/// Path prefix of the per-fingerprint revocation endpoint.
pub const REVOCATIONS_PATH: &str = "/revocations";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Turn an issuer identifier into a base URL.
///
/// `did:web:example.org` becomes `https://example.org`; colons after the
/// host become path separators and `%3A` in the host decodes to a port
/// separator. Plain `http://` and `https://` URLs pass through without a
/// trailing slash.
pub fn issuer_base_url(issuer: &str) -> Result<String> {
    if issuer.starts_with("http://") || issuer.starts_with("https://") {
        return Ok(issuer.trim_end_matches('/').to_string());
    }
    did_web_base_url(issuer)
}

/// Resolve a `did:web` identifier only; raw URLs are rejected.
pub fn did_web_base_url(issuer: &str) -> Result<String> {
    let rest = issuer
        .strip_prefix("did:web:")
        .ok_or_else(|| VerifyError::InvalidIssuer(issuer.to_string()))?;

    let mut parts = rest.split(':');
    let host = parts
        .next()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| VerifyError::InvalidIssuer(issuer.to_string()))?
        .replace("%3A", ":")
        .replace("%3a", ":");

    let mut url = format!("https://{}", host);
    for segment in parts {
        if segment.is_empty() {
            return Err(VerifyError::InvalidIssuer(issuer.to_string()));
        }
        url.push('/');
        url.push_str(segment);
    }
    Ok(url)
}

/// Trust source backed by the issuer's HTTP endpoints.
///
/// Every request is bounded by the configured timeout. Any transport error,
/// timeout, non-success status or undecodable body is reported as
/// `TrustSourceUnavailable`.
#[derive(Debug, Clone)]
pub struct HttpTrustSource {
    base_url: String,
    http: reqwest::Client,
}

impl HttpTrustSource {
    /// Create a source for a base URL or `did:web` issuer.
    pub fn new(issuer: &str, timeout: Duration) -> Result<Self> {
        Self::with_base_url(issuer_base_url(issuer)?, timeout)
    }

    /// Create a source for a `did:web` issuer, always resolved to https.
    ///
    /// Use this when the issuer comes from an untrusted caller.
    pub fn did_web(issuer: &str, timeout: Duration) -> Result<Self> {
        Self::with_base_url(did_web_base_url(issuer)?, timeout)
    }

    fn with_base_url(base_url: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| VerifyError::TrustSourceUnavailable(format!("build http client: {}", e)))?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn key_document_url(&self) -> String {
        format!("{}{}", self.base_url, KEY_DOCUMENT_PATH)
    }

    fn revocation_url(&self, fingerprint: &Fingerprint) -> String {
        format!("{}{}/{}", self.base_url, REVOCATIONS_PATH, fingerprint.to_hex())
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.http
            .get(url)
            .send()
            .await
            .map_err(|e| VerifyError::TrustSourceUnavailable(format!("GET {}: {}", url, e)))
    }
}

#[async_trait]
impl TrustSource for HttpTrustSource {
    async fn key_document(&self) -> Result<KeyDocument> {
        let url = self.key_document_url();
        tracing::debug!(%url, "fetching key document");

        let resp = self.get(&url).await?;
        if !resp.status().is_success() {
            return Err(VerifyError::TrustSourceUnavailable(format!(
                "GET {} returned {}",
                url,
                resp.status()
            )));
        }

        let document = resp
            .json::<KeyDocument>()
            .await
            .map_err(|e| VerifyError::TrustSourceUnavailable(format!("key document: {}", e)))?;
        if document.format != RECEIPT_FORMAT {
            return Err(VerifyError::TrustSourceUnavailable(format!(
                "key document format {:?}, expected {:?}",
                document.format, RECEIPT_FORMAT
            )));
        }
        Ok(document)
    }
}

#[async_trait]
impl RevocationView for HttpTrustSource {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<RevocationRecord>> {
        let url = self.revocation_url(fingerprint);
        tracing::debug!(%url, "checking revocation");

        let resp = self.get(&url).await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let record = resp.json::<RevocationRecord>().await.map_err(|e| {
                    VerifyError::TrustSourceUnavailable(format!("revocation record: {}", e))
                })?;
                if &record.fingerprint != fingerprint {
                    return Err(VerifyError::TrustSourceUnavailable(format!(
                        "revocation record for {} returned for {}",
                        record.fingerprint, fingerprint
                    )));
                }
                Ok(Some(record))
            }
            status => Err(VerifyError::TrustSourceUnavailable(format!(
                "GET {} returned {}",
                url, status
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memreceipt_core::{Ed25519PublicKey, KeyId};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer every request on an ephemeral port with `body` as JSON.
    async fn serve_json(body: String) -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        (format!("http://{}", addr), handle)
    }

    #[test]
    fn test_did_web_resolution() {
        assert_eq!(
            issuer_base_url("did:web:example.org").unwrap(),
            "https://example.org"
        );
        assert_eq!(
            issuer_base_url("did:web:localhost%3A8443:issuers:alpha").unwrap(),
            "https://localhost:8443/issuers/alpha"
        );
        assert_eq!(
            issuer_base_url("http://127.0.0.1:8080/").unwrap(),
            "http://127.0.0.1:8080"
        );
        assert!(issuer_base_url("did:key:z6Mk").is_err());
        assert!(issuer_base_url("did:web:").is_err());
        assert!(issuer_base_url("did:web:example.org::x").is_err());
    }

    #[test]
    fn test_did_web_only() {
        assert_eq!(
            did_web_base_url("did:web:example.org:issuers:alpha").unwrap(),
            "https://example.org/issuers/alpha"
        );
        assert!(matches!(
            did_web_base_url("http://10.0.0.1:8080"),
            Err(VerifyError::InvalidIssuer(_))
        ));
        assert!(HttpTrustSource::did_web("https://example.org", DEFAULT_TIMEOUT).is_err());
        assert_eq!(
            HttpTrustSource::did_web("did:web:example.org", DEFAULT_TIMEOUT)
                .unwrap()
                .base_url(),
            "https://example.org"
        );
    }

    #[test]
    fn test_urls() {
        let source = HttpTrustSource::new("did:web:example.org", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(
            source.key_document_url(),
            "https://example.org/.well-known/memreceipt-keys.json"
        );
        let fp = Fingerprint::from_bytes([0xab; 32]);
        assert_eq!(
            source.revocation_url(&fp),
            format!("https://example.org/revocations/{}", "ab".repeat(32))
        );
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable() {
        // Accept connections but never answer.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hold = tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                held.push(socket);
            }
        });

        let source =
            HttpTrustSource::new(&format!("http://{}", addr), Duration::from_millis(200)).unwrap();
        let result = source.key_document().await;
        assert!(matches!(result, Err(VerifyError::TrustSourceUnavailable(_))));

        hold.abort();
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = HttpTrustSource::new(&format!("http://{}", addr), DEFAULT_TIMEOUT).unwrap();
        let result = source.is_revoked(&Fingerprint::from_bytes([1; 32])).await;
        assert!(matches!(result, Err(VerifyError::TrustSourceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_key_document_format_checked() {
        let mut document = KeyDocument::single(
            "did:web:localhost",
            KeyId::new("key-1").unwrap(),
            Ed25519PublicKey::from_bytes([7; 32]),
        );

        let (base, hold) = serve_json(serde_json::to_string(&document).unwrap()).await;
        let fetched = HttpTrustSource::new(&base, DEFAULT_TIMEOUT)
            .unwrap()
            .key_document()
            .await
            .unwrap();
        assert_eq!(fetched, document);
        hold.abort();

        document.format = "memreceipt/v2".into();
        let (base, hold) = serve_json(serde_json::to_string(&document).unwrap()).await;
        let result = HttpTrustSource::new(&base, DEFAULT_TIMEOUT)
            .unwrap()
            .key_document()
            .await;
        assert!(matches!(result, Err(VerifyError::TrustSourceUnavailable(_))));
        hold.abort();
    }
}
