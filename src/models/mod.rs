pub mod appointment;
pub mod audit;
pub mod backup;
pub mod enums;
pub mod filters;
pub mod patient;
pub mod session;

pub use appointment::{Appointment, UpcomingPatient};
pub use audit::AuditLogEntry;
pub use backup::DeletedPatientBackup;
pub use enums::*;
pub use filters::*;
pub use patient::*;
pub use session::{Provenance, Session};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;

use crate::db::{DatabaseError, Row};

/// Decode a store row into a typed model.
pub fn from_row<T: DeserializeOwned>(row: Row) -> Result<T, DatabaseError> {
    Ok(serde_json::from_value(serde_json::Value::Object(row))?)
}

/// Fixed-width UTC timestamp, so stored values order correctly as text.
pub fn db_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
