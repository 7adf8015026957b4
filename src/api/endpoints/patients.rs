//! Patient endpoints: search, registration, lookups and dashboard reads.
//!
//! - `GET /api/patients`: filtered, paginated search
//! - `POST /api/patients`: register
//! - `GET /api/patients/statistics`: dashboard counters
//! - `GET /api/patients/upcoming`: patients with appointments soon
//! - `GET /api/patients/:id`: single live patient
//! - `PATCH /api/patients/:id`: partial update

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::{
    AgeRange, DateRange, NewPatient, Patient, PatientSearchFilters, PatientStatistics, PatientUpdate,
    PreferredContactMethod, SearchResult, Session, SortField, SortOrder, UpcomingPatient,
};

const DEFAULT_UPCOMING_DAYS: u32 = 7;

pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("Invalid {what} ID: {e}")))
}

/// Flat query-string form of `PatientSearchFilters`.
#[derive(Debug, Default, Deserialize)]
pub struct PatientListQuery {
    pub search: Option<String>,
    pub gender: Option<String>,
    pub contact_method: Option<PreferredContactMethod>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    pub created_from: Option<NaiveDate>,
    pub created_to: Option<NaiveDate>,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortOrder>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl From<PatientListQuery> for PatientSearchFilters {
    fn from(q: PatientListQuery) -> Self {
        let age_range = (q.min_age.is_some() || q.max_age.is_some()).then_some(AgeRange {
            min: q.min_age,
            max: q.max_age,
        });
        let date_range = (q.created_from.is_some() || q.created_to.is_some()).then_some(DateRange {
            start: q.created_from,
            end: q.created_to,
        });
        Self {
            search_term: q.search,
            gender: q.gender,
            preferred_contact_method: q.contact_method,
            age_range,
            date_range,
            sort_by: q.sort_by,
            sort_order: q.sort_order,
            limit: q.limit,
            offset: q.offset,
        }
    }
}

/// `GET /api/patients`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Query(query): Query<PatientListQuery>,
) -> Result<Json<SearchResult>, ApiError> {
    let filters = PatientSearchFilters::from(query);
    Ok(Json(ctx.search.search_patients(&session, &filters)?))
}

/// `POST /api/patients`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Json(input): Json<NewPatient>,
) -> Result<(StatusCode, Json<Patient>), ApiError> {
    let patient = ctx.registry.create_patient(&session, input)?;
    Ok((StatusCode::CREATED, Json(patient)))
}

/// `GET /api/patients/statistics`
pub async fn statistics(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
) -> Result<Json<PatientStatistics>, ApiError> {
    Ok(Json(ctx.search.get_patient_statistics(&session)?))
}

#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    pub days: Option<u32>,
}

/// `GET /api/patients/upcoming?days=N`
pub async fn upcoming(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Query(query): Query<UpcomingQuery>,
) -> Result<Json<Vec<UpcomingPatient>>, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_UPCOMING_DAYS);
    Ok(Json(
        ctx.search.get_patients_with_upcoming_appointments(&session, days)?,
    ))
}

/// `GET /api/patients/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(patient_id): Path<String>,
) -> Result<Json<Patient>, ApiError> {
    let id = parse_id(&patient_id, "patient")?;
    ctx.search
        .get_patient_by_id(&session, id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Patient not found".into()))
}

/// `PATCH /api/patients/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<Session>,
    Path(patient_id): Path<String>,
    Json(update): Json<PatientUpdate>,
) -> Result<Json<Patient>, ApiError> {
    let id = parse_id(&patient_id, "patient")?;
    Ok(Json(ctx.registry.update_patient(&session, id, update)?))
}
