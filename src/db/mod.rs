pub mod mock;
pub mod query;
pub mod schema;
pub mod sqlite;
pub mod sqlite_store;
pub mod store;

pub use query::*;
pub use schema::*;
pub use sqlite::*;
pub use sqlite_store::SqliteRecordStore;
pub use store::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown column {column} on table {table}")]
    UnknownColumn { table: &'static str, column: String },

    #[error("Invalid value for {table}.{column}: {reason}")]
    InvalidValue {
        table: &'static str,
        column: &'static str,
        reason: String,
    },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Refusing unfiltered {0} on {1}")]
    UnfilteredMutation(&'static str, &'static str),

    #[error("Stored procedure not available: {0}")]
    ProcedureUnavailable(&'static str),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Internal lock error")]
    LockPoisoned,
}
