//! Patient search and the dashboard read models built on it.
//!
//! Every query is scoped to the session principal and excludes soft-deleted
//! patients. Callers that need a fixed clock use the `_at` variants.

mod criteria;
mod overview;

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{DatabaseError, Filter, Query, RecordStore, Table};
use crate::models::{from_row, Patient, PatientRecord, PatientSearchFilters, SearchResult, Session};

pub use criteria::{build_search_query, is_uuid};

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Patient search failed: {0}")]
    Query(#[from] DatabaseError),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

pub struct PatientSearch {
    store: Arc<dyn RecordStore>,
}

impl PatientSearch {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn search_patients(
        &self,
        session: &Session,
        filters: &PatientSearchFilters,
    ) -> Result<SearchResult, SearchError> {
        self.search_patients_at(session, filters, Utc::now().date_naive())
    }

    /// Search with ages computed relative to `today`.
    pub fn search_patients_at(
        &self,
        session: &Session,
        filters: &PatientSearchFilters,
        today: NaiveDate,
    ) -> Result<SearchResult, SearchError> {
        let query = build_search_query(session, filters, today)?;
        let selection = self.store.select(&query)?;

        let total_count = selection.count.unwrap_or(0);
        let has_more = filters
            .page_offset()
            .saturating_add(filters.page_limit())
            < total_count;
        let patients = selection
            .rows
            .into_iter()
            .map(|row| from_row::<PatientRecord>(row).map(Patient::from))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            returned = patients.len(),
            total_count,
            has_more,
            "Patient search completed"
        );
        Ok(SearchResult {
            patients,
            total_count,
            has_more,
        })
    }

    /// A live patient owned by the principal, or `None`.
    pub fn get_patient_by_id(&self, session: &Session, patient_id: Uuid) -> Result<Option<Patient>, SearchError> {
        let query = Query::table(Table::Patients)
            .filter(Filter::eq("id", patient_id.to_string()))
            .filter(Filter::eq("user_id", session.owner()))
            .filter(Filter::NullOrFalse("is_deleted"))
            .range(0, 1);
        let row = self.store.select(&query)?.rows.into_iter().next();
        Ok(row
            .map(from_row::<PatientRecord>)
            .transpose()?
            .map(Patient::from))
    }
}
