//! Patient archive: soft-delete, restore, permanent delete and the audit trail.
//!
//! A soft-delete snapshots the patient into `deleted_patients_backup`, marks
//! the patient and every dependent clinical row deleted, and appends a DELETE
//! audit entry. A restore reverses the flags, consumes the backup exactly once
//! and appends a RESTORE entry.

mod audit_trail;
mod cascade;
mod purge;
mod restore;
mod soft_delete;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::db::{DatabaseError, Filter, Procedure, Query, RecordStore, Row, Table};
use crate::models::Session;

pub use audit_trail::{changed_fields, record_audit_entry, AuditDraft};
pub use purge::{DocumentStorage, LocalDocumentStorage, NoopDocumentStorage};

// ═══════════════════════════════════════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════════════════════════════════════

/// Which half of the archive lifecycle a cascade belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeOperation {
    Delete,
    Restore,
}

impl fmt::Display for CascadeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Delete => "delete",
            Self::Restore => "restore",
        })
    }
}

/// One dependent table that did not reach the expected state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeFailure {
    pub table: Table,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStage {
    Patient,
    Backup,
    Audit,
}

impl fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Patient => "patient",
            Self::Backup => "backup",
            Self::Audit => "audit",
        })
    }
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Patient {0} is already deleted")]
    AlreadyDeleted(Uuid),

    #[error("Backup {0} can no longer be restored")]
    RestoreNotAllowed(Uuid),

    #[error("Failed to delete patient: {0}")]
    DeletionFailed(#[source] DatabaseError),

    #[error("Restore failed at {stage} stage: {source}")]
    RestoreFailed {
        stage: RestoreStage,
        source: DatabaseError,
    },

    #[error(
        "Incomplete {operation} cascade for patient {patient_id}: {}",
        describe_failures(.failures)
    )]
    PartialCascadeFailure {
        patient_id: Uuid,
        operation: CascadeOperation,
        failures: Vec<CascadeFailure>,
    },

    #[error("Failed to fetch audit trail: {0}")]
    AuditFetch(#[source] DatabaseError),

    #[error("Failed to write audit entry: {0}")]
    AuditWrite(#[source] DatabaseError),

    #[error("Permanent delete failed: {0}")]
    PurgeFailed(#[source] DatabaseError),

    #[error("Database error: {0}")]
    Store(#[from] DatabaseError),
}

fn describe_failures(failures: &[CascadeFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.table, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

// ═══════════════════════════════════════════════════════════════════════════
// Cascade mode
// ═══════════════════════════════════════════════════════════════════════════

/// How the soft-delete writes reach the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CascadeMode {
    /// One atomic server-side procedure call.
    Procedure,
    /// Sequential writes with best-effort compensation.
    Compensating,
    /// `Procedure` when the store offers it, else `Compensating`.
    #[default]
    Auto,
}

impl FromStr for CascadeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "procedure" => Ok(Self::Procedure),
            "compensating" => Ok(Self::Compensating),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown cascade mode: {other}")),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Service
// ═══════════════════════════════════════════════════════════════════════════

pub struct PatientArchive {
    store: Arc<dyn RecordStore>,
    mode: CascadeMode,
    documents: Arc<dyn DocumentStorage>,
}

impl PatientArchive {
    /// Build the archive service. `Auto` is resolved here, once.
    pub fn new(store: Arc<dyn RecordStore>, mode: CascadeMode) -> Self {
        let mode = match mode {
            CascadeMode::Auto if store.supports_procedure(Procedure::SoftDeletePatient) => {
                CascadeMode::Procedure
            }
            CascadeMode::Auto => CascadeMode::Compensating,
            explicit => explicit,
        };
        tracing::debug!(?mode, "Patient archive configured");
        Self {
            store,
            mode,
            documents: Arc::new(NoopDocumentStorage),
        }
    }

    pub fn with_document_storage(mut self, documents: Arc<dyn DocumentStorage>) -> Self {
        self.documents = documents;
        self
    }

    /// The resolved cascade mode; never `Auto`.
    pub fn mode(&self) -> CascadeMode {
        self.mode
    }

    /// Patient row owned by the session principal, in any deletion state.
    fn fetch_patient_row(&self, session: &Session, patient_id: Uuid) -> Result<Row, ArchiveError> {
        let query = Query::table(Table::Patients)
            .filter(Filter::eq("id", patient_id.to_string()))
            .filter(Filter::eq("user_id", session.owner()))
            .range(0, 1);
        self.store
            .select(&query)?
            .rows
            .into_iter()
            .next()
            .ok_or(ArchiveError::NotFound {
                entity: "Patient",
                id: patient_id,
            })
    }
}
