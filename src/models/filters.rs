use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::{PreferredContactMethod, SortField, SortOrder};
use super::patient::Patient;

pub const DEFAULT_PAGE_LIMIT: u64 = 50;

/// Inclusive age bounds in whole years.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

/// Inclusive calendar-day bounds on `created_at`, interpreted in UTC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientSearchFilters {
    pub search_term: Option<String>,
    pub gender: Option<String>,
    pub preferred_contact_method: Option<PreferredContactMethod>,
    pub age_range: Option<AgeRange>,
    pub date_range: Option<DateRange>,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortOrder>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl PatientSearchFilters {
    pub fn page_limit(&self) -> u64 {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT)
    }

    pub fn page_offset(&self) -> u64 {
        self.offset.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub patients: Vec<Patient>,
    pub total_count: u64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientStatistics {
    pub total_patients: u64,
    pub new_this_month: u64,
    pub upcoming_appointments: u64,
}
