//! HTTP surface of the memreceipt service.
//!
//! - `GET  /health`
//! - `GET  /.well-known/memreceipt-keys.json` - the key document
//! - `POST /mem/write`, `/mem/search`, `/mem/revoke`
//! - `POST /verify`
//! - `GET  /revocations/:fingerprint` - 404 when not revoked

pub mod api;

pub use api::{router, ApiError};
