//! The record store boundary.
//!
//! Engines never talk to SQL directly: they hold an `Arc<dyn RecordStore>`
//! handed to them at construction, which keeps them testable against
//! fault-injecting doubles.

use serde_json::Value;

use super::query::{Filter, Query, Row, Selection};
use super::schema::Table;
use super::DatabaseError;

/// Server-side procedures a backend may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Procedure {
    /// Backup insert, patient update, dependent cascade and DELETE audit
    /// entry in one transaction. Returns the backup row.
    SoftDeletePatient,
}

impl Procedure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SoftDeletePatient => "soft_delete_patient",
        }
    }
}

/// Filtered CRUD over the clinic tables.
pub trait RecordStore: Send + Sync {
    /// Rows matching the query, plus the total match count when `query.count` is set.
    fn select(&self, query: &Query) -> Result<Selection, DatabaseError>;

    /// Insert one row and return it as stored.
    fn insert(&self, table: Table, row: Row) -> Result<Row, DatabaseError>;

    /// Apply `patch` to every row matching `filters`. Returns the affected count.
    fn update(&self, table: Table, filters: &[Filter], patch: Row) -> Result<usize, DatabaseError>;

    /// Remove every row matching `filters`. Returns the affected count.
    fn delete(&self, table: Table, filters: &[Filter]) -> Result<usize, DatabaseError>;

    /// Whether `call_procedure` can run the given procedure.
    fn supports_procedure(&self, procedure: Procedure) -> bool;

    fn call_procedure(&self, procedure: Procedure, args: Row) -> Result<Value, DatabaseError>;

    /// Number of rows matching `filters`.
    fn count(&self, table: Table, filters: &[Filter]) -> Result<u64, DatabaseError> {
        let query = Query::table(table)
            .filters(filters.iter().cloned())
            .range(0, 0)
            .with_count();
        Ok(self.select(&query)?.count.unwrap_or(0))
    }
}
