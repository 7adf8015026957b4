//! Archive endpoints.
//!
//! - `DELETE /api/patients/:id`: soft-delete, optional `{"reason"}` body
//! - `DELETE /api/patients/:id/permanent`: irreversible purge
//! - `GET /api/patients/:id/audit`: audit trail, newest first
//! - `GET /api/deleted-patients`: restorable backups
//! - `POST /api/deleted-patients/:id/restore`: restore from a backup

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use super::patients::parse_id;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::{AuditLogEntry, DeletedPatientBackup, Patient, Session};

#[derive(Debug, Default, Deserialize)]
pub struct DeleteRequest {
    pub reason: Option<String>,
}

/// `DELETE /api/patients/:id`
pub async fn soft_delete(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(patient_id): Path<String>,
    body: Bytes,
) -> Result<Json<DeletedPatientBackup>, ApiError> {
    let id = parse_id(&patient_id, "patient")?;
    let request: DeleteRequest = if body.is_empty() {
        DeleteRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("Invalid body: {e}")))?
    };
    let reason = request.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
    Ok(Json(ctx.archive.soft_delete_patient(&session, id, reason)?))
}

/// `DELETE /api/patients/:id/permanent`
pub async fn purge(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(patient_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&patient_id, "patient")?;
    ctx.archive.permanently_delete_patient(&session, id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/patients/:id/audit`
pub async fn audit_trail(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(patient_id): Path<String>,
) -> Result<Json<Vec<AuditLogEntry>>, ApiError> {
    let id = parse_id(&patient_id, "patient")?;
    Ok(Json(ctx.archive.get_patient_audit_trail(&session, id)?))
}

/// `GET /api/deleted-patients`
pub async fn deleted(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<DeletedPatientBackup>>, ApiError> {
    Ok(Json(ctx.archive.get_deleted_patients(&session)?))
}

/// `POST /api/deleted-patients/:id/restore`
pub async fn restore(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(backup_id): Path<String>,
) -> Result<Json<Patient>, ApiError> {
    let id = parse_id(&backup_id, "backup")?;
    Ok(Json(ctx.archive.restore_patient(&session, id)?))
}
