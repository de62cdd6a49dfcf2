//! HTTP handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use memreceipt::clock::now_millis;
use memreceipt::store::Store;
use memreceipt::verify::{
    BundledKeys, HttpTrustSource, Verifier, VerifyError, KEY_DOCUMENT_PATH, REVOCATIONS_PATH,
};
use memreceipt::{
    Fingerprint, KeyDocument, MemoryItem, MemoryService, Receipt, RevocationRecord, SearchHit,
    SearchRequest, ServiceError, VerificationResult, WriteOutcome,
};

type Shared<S> = Arc<MemoryService<S>>;

/// Build the router over a service.
pub fn router<S: Store + 'static>(service: Arc<MemoryService<S>>) -> Router {
    Router::new()
        .route("/health", get(health::<S>))
        .route(KEY_DOCUMENT_PATH, get(key_document::<S>))
        .route("/mem/write", post(write::<S>))
        .route("/mem/search", post(search::<S>))
        .route("/mem/revoke", post(revoke::<S>))
        .route("/verify", post(verify::<S>))
        .route(&format!("{}/:fingerprint", REVOCATIONS_PATH), get(revocation::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

// =============================================================================
// Errors
// =============================================================================

/// A service error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl From<VerifyError> for ApiError {
    fn from(e: VerifyError) -> Self {
        Self(ServiceError::Verify(e))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            ServiceError::Verify(VerifyError::InvalidIssuer(_)) => StatusCode::BAD_REQUEST,
            ServiceError::MemoryNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Verify(VerifyError::TrustSourceUnavailable(_)) => StatusCode::BAD_GATEWAY,
            ServiceError::IssuanceHalted(_) | ServiceError::KeyMaterialCorrupted(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self.0, %status, "request failed");
        }
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// =============================================================================
// Bodies
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub time: i64,
    pub issuer: String,
    pub issuance_halted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RevokeRequest {
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RevokeResponse {
    pub revoked: Fingerprint,
    pub receipt: Receipt,
    pub newly_revoked: bool,
}

/// Body of `POST /verify`.
///
/// With `keys`, the receipt is checked against that document (or bare key
/// list). With `issuer` naming another `did:web` issuer, its published
/// document and revocation endpoint are consulted; raw URLs are rejected.
/// Otherwise this issuer's own keys and
/// ledger are used.
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub receipt: serde_json::Value,
    #[serde(default)]
    pub keys: Option<serde_json::Value>,
    #[serde(default)]
    pub issuer: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /health
async fn health<S: Store + 'static>(State(svc): State<Shared<S>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        time: now_millis(),
        issuer: svc.config().issuer.clone(),
        issuance_halted: svc.is_halted().await,
    })
}

/// GET /.well-known/memreceipt-keys.json
async fn key_document<S: Store + 'static>(
    State(svc): State<Shared<S>>,
) -> Result<Json<KeyDocument>, ApiError> {
    Ok(Json(svc.key_document().await?))
}

/// POST /mem/write
async fn write<S: Store + 'static>(
    State(svc): State<Shared<S>>,
    Json(item): Json<MemoryItem>,
) -> Result<Json<WriteOutcome>, ApiError> {
    Ok(Json(svc.write(&item).await?))
}

/// POST /mem/search
async fn search<S: Store + 'static>(
    State(svc): State<Shared<S>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let results = svc.search(&request).await?;
    Ok(Json(SearchResponse { results }))
}

/// POST /mem/revoke
async fn revoke<S: Store + 'static>(
    State(svc): State<Shared<S>>,
    Json(request): Json<RevokeRequest>,
) -> Result<Json<RevokeResponse>, ApiError> {
    let revocation = svc.revoke(&request.fingerprint).await?;
    Ok(Json(RevokeResponse {
        revoked: request.fingerprint,
        receipt: revocation.receipt,
        newly_revoked: revocation.newly_revoked,
    }))
}

/// POST /verify
async fn verify<S: Store + 'static>(
    State(svc): State<Shared<S>>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerificationResult>, ApiError> {
    let receipt: Receipt = serde_json::from_value(request.receipt)
        .map_err(|e| VerifyError::MalformedReceipt(e.to_string()))?;

    if let Some(keys) = request.keys {
        let bundle = BundledKeys::from_json(&keys.to_string())?;
        return Ok(Json(svc.verify_with(&receipt, bundle).await?));
    }

    match request.issuer {
        Some(issuer) if issuer != svc.config().issuer => {
            // Callers choose the issuer, so only did:web (https) is followed.
            let remote = Arc::new(HttpTrustSource::did_web(
                &issuer,
                svc.config().trust_timeout(),
            )?);
            let verifier = Verifier::new(remote.clone()).with_revocations(remote);
            Ok(Json(verifier.verify(&receipt).await?))
        }
        _ => Ok(Json(svc.verify(&receipt).await?)),
    }
}

/// GET /revocations/:fingerprint
async fn revocation<S: Store + 'static>(
    State(svc): State<Shared<S>>,
    Path(fingerprint): Path<String>,
) -> Result<Response, ApiError> {
    let fingerprint = Fingerprint::from_hex(&fingerprint).map_err(|e| {
        ServiceError::InvalidOperation(format!("invalid fingerprint: {}", e))
    })?;
    let record: Option<RevocationRecord> = svc.revocation(&fingerprint).await?;
    Ok(match record {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("{} is not revoked", fingerprint),
            }),
        )
            .into_response(),
    })
}
