//! Access logging middleware.
//!
//! Logs every API request with principal, method, path and response status.
//! Runs innermost, after the principal layer has injected `Session`.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::models::Session;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let principal_id = req
        .extensions()
        .get::<Session>()
        .map(|s| s.principal_id.to_string())
        .unwrap_or_else(|| "anonymous".into());

    let response = next.run(req).await;

    let status = response.status().as_u16();
    if response.status().is_server_error() {
        tracing::warn!(%principal_id, %method, %path, status, "API request failed");
    } else {
        tracing::info!(%principal_id, %method, %path, status, "API request");
    }
    response
}
