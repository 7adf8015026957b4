use std::sync::LazyLock;

use chrono::{Months, NaiveDate};
use regex::Regex;
use serde_json::json;
use uuid::Uuid;

use super::SearchError;
use crate::db::{Filter, Query, Table};
use crate::models::{AgeRange, DateRange, PatientSearchFilters, Session, SortOrder};

/// Columns a free-text term is matched against.
const TEXT_COLUMNS: [&str; 3] = ["name", "contact_phone", "contact_email"];

static UUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[1-5][0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$").unwrap()
});

/// Hyphenated UUID, versions 1 to 5, RFC 4122 variant.
pub fn is_uuid(term: &str) -> bool {
    UUID_PATTERN.is_match(term)
}

/// Translate search filters into a counted, windowed patient query.
pub fn build_search_query(
    session: &Session,
    filters: &PatientSearchFilters,
    today: NaiveDate,
) -> Result<Query, SearchError> {
    let limit = filters.page_limit();
    if limit == 0 {
        return Err(SearchError::InvalidFilter("limit must be at least 1".into()));
    }
    let offset = filters.page_offset();
    for (name, value) in [("limit", limit), ("offset", offset)] {
        if i64::try_from(value).is_err() {
            return Err(SearchError::InvalidFilter(format!("{name} {value} is too large")));
        }
    }

    let mut query = Query::table(Table::Patients)
        .filter(Filter::eq("user_id", session.owner()))
        .filter(Filter::NullOrFalse("is_deleted"));

    if let Some(term) = filters.search_term.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        query = query.filter(term_filter(term));
    }
    if let Some(gender) = filters.gender.as_deref().filter(|g| !g.trim().is_empty()) {
        query = query.filter(Filter::eq("gender", gender));
    }
    if let Some(method) = filters.preferred_contact_method {
        query = query.filter(Filter::eq("preferred_contact_method", method.as_str()));
    }
    if let Some(range) = filters.age_range {
        query = query.filters(age_filters(range, today)?);
    }
    if let Some(range) = filters.date_range {
        query = query.filters(created_filters(range)?);
    }

    let sort_by = filters.sort_by.unwrap_or_default();
    let ascending = filters.sort_order.unwrap_or_default() == SortOrder::Asc;

    Ok(query
        .order_by(sort_by.column(), ascending)
        .range(offset, limit)
        .with_count())
}

fn term_filter(term: &str) -> Filter {
    match Uuid::parse_str(term) {
        Ok(id) if is_uuid(term) => Filter::eq("id", id.to_string()),
        _ => Filter::ContainsAny(TEXT_COLUMNS.to_vec(), term.to_string()),
    }
}

fn years_before(today: NaiveDate, years: u32) -> Result<NaiveDate, SearchError> {
    years
        .checked_mul(12)
        .and_then(|months| today.checked_sub_months(Months::new(months)))
        .ok_or_else(|| SearchError::InvalidFilter(format!("age {years} is out of range")))
}

/// Birth-date bounds for an inclusive age range on `today`.
///
/// `max` keeps birth dates on or after the day `max + 1` years ago, so the
/// whole final year of age `max` is covered at day granularity. `min` keeps
/// birth dates on or before the day `min` years ago.
fn age_filters(range: AgeRange, today: NaiveDate) -> Result<Vec<Filter>, SearchError> {
    if let (Some(min), Some(max)) = (range.min, range.max) {
        if min > max {
            return Err(SearchError::InvalidFilter(format!(
                "minimum age {min} exceeds maximum age {max}"
            )));
        }
    }

    let mut out = Vec::new();
    if let Some(max) = range.max {
        let earliest = years_before(today, max.saturating_add(1))?;
        out.push(Filter::Gte("date_of_birth", json!(earliest.to_string())));
    }
    if let Some(min) = range.min {
        let latest = years_before(today, min)?;
        out.push(Filter::Lte("date_of_birth", json!(latest.to_string())));
    }
    Ok(out)
}

fn created_filters(range: DateRange) -> Result<Vec<Filter>, SearchError> {
    if let (Some(start), Some(end)) = (range.start, range.end) {
        if start > end {
            return Err(SearchError::InvalidFilter(format!(
                "date range starts after it ends ({start} > {end})"
            )));
        }
    }

    let mut out = Vec::new();
    if let Some(start) = range.start {
        out.push(Filter::Gte("created_at", json!(format!("{start}T00:00:00.000000Z"))));
    }
    if let Some(end) = range.end {
        out.push(Filter::Lte("created_at", json!(format!("{end}T23:59:59.999999Z"))));
    }
    Ok(out)
}
