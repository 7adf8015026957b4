//! Fault-injecting `RecordStore` for exercising partial-failure paths.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde_json::Value;

use super::query::{Filter, Query, Row, Selection};
use super::schema::Table;
use super::sqlite_store::SqliteRecordStore;
use super::store::{Procedure, RecordStore};
use super::DatabaseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Select,
    Insert,
    Update,
    Delete,
}

/// Delegates to a real SQLite store, failing the operations it was told to fail.
pub struct FaultyRecordStore {
    inner: SqliteRecordStore,
    faults: Mutex<HashSet<(StoreOp, Table)>>,
    procedure_enabled: bool,
    procedure_fails: AtomicBool,
}

impl FaultyRecordStore {
    pub fn new(inner: SqliteRecordStore) -> Self {
        Self {
            inner,
            faults: Mutex::new(HashSet::new()),
            procedure_enabled: false,
            procedure_fails: AtomicBool::new(false),
        }
    }

    pub fn in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(SqliteRecordStore::open_in_memory()?))
    }

    /// Advertise and forward the atomic soft-delete procedure.
    pub fn with_procedure(mut self) -> Self {
        self.procedure_enabled = true;
        self
    }

    pub fn fail(&self, op: StoreOp, table: Table) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert((op, table));
        }
    }

    pub fn fail_procedure(&self) {
        self.procedure_fails.store(true, Ordering::SeqCst);
    }

    /// Clear every injected fault.
    pub fn heal(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clear();
        }
        self.procedure_fails.store(false, Ordering::SeqCst);
    }

    fn check(&self, op: StoreOp, table: Table) -> Result<(), DatabaseError> {
        let failing = self
            .faults
            .lock()
            .map(|faults| faults.contains(&(op, table)))
            .unwrap_or(false);
        if failing {
            Err(injected(&format!("{op:?} on {table}")))
        } else {
            Ok(())
        }
    }
}

fn injected(what: &str) -> DatabaseError {
    DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_IOERR),
        Some(format!("injected fault: {what}")),
    ))
}

impl RecordStore for FaultyRecordStore {
    fn select(&self, query: &Query) -> Result<Selection, DatabaseError> {
        self.check(StoreOp::Select, query.table)?;
        self.inner.select(query)
    }

    fn insert(&self, table: Table, row: Row) -> Result<Row, DatabaseError> {
        self.check(StoreOp::Insert, table)?;
        self.inner.insert(table, row)
    }

    fn update(&self, table: Table, filters: &[Filter], patch: Row) -> Result<usize, DatabaseError> {
        self.check(StoreOp::Update, table)?;
        self.inner.update(table, filters, patch)
    }

    fn delete(&self, table: Table, filters: &[Filter]) -> Result<usize, DatabaseError> {
        self.check(StoreOp::Delete, table)?;
        self.inner.delete(table, filters)
    }

    fn supports_procedure(&self, procedure: Procedure) -> bool {
        self.procedure_enabled && self.inner.supports_procedure(procedure)
    }

    fn call_procedure(&self, procedure: Procedure, args: Row) -> Result<Value, DatabaseError> {
        if !self.procedure_enabled {
            return Err(DatabaseError::ProcedureUnavailable(procedure.as_str()));
        }
        if self.procedure_fails.load(Ordering::SeqCst) {
            return Err(injected(procedure.as_str()));
        }
        self.inner.call_procedure(procedure, args)
    }
}
