//! Principal extraction.
//!
//! Authentication happens upstream; this layer only reads the principal the
//! gateway asserted in `X-Principal-Id` and the request provenance, and
//! injects a `Session` for handlers.

use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::models::{Provenance, Session};

pub const PRINCIPAL_HEADER: &str = "X-Principal-Id";

/// Reject requests without a valid principal, otherwise inject `Session`.
pub async fn require_principal(mut req: Request<axum::body::Body>, next: Next) -> Response {
    match session_from_headers(req.headers()) {
        Ok(session) => {
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

pub fn session_from_headers(headers: &HeaderMap) -> Result<Session, ApiError> {
    let principal_id = headers
        .get(PRINCIPAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or(ApiError::Unauthorized)?;

    let ip_address = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let user_agent = headers
        .get("User-Agent")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    Ok(Session::new(principal_id).with_provenance(Provenance {
        ip_address,
        user_agent,
    }))
}
