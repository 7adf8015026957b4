use std::io;
use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use super::{ArchiveError, PatientArchive};
use crate::db::{Filter, Query, Table, DEPENDENT_TABLES};
use crate::models::Session;

/// Where uploaded patient documents live.
pub trait DocumentStorage: Send + Sync {
    /// Remove the stored objects. Paths that no longer exist are not an error.
    fn remove(&self, paths: &[String]) -> io::Result<()>;
}

/// Storage that holds nothing, for deployments without document uploads.
pub struct NoopDocumentStorage;

impl DocumentStorage for NoopDocumentStorage {
    fn remove(&self, _paths: &[String]) -> io::Result<()> {
        Ok(())
    }
}

/// Documents stored as files under one root directory.
pub struct LocalDocumentStorage {
    root: PathBuf,
}

impl LocalDocumentStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a stored relative path, refusing anything that escapes the root.
    fn resolve(&self, stored: &str) -> io::Result<PathBuf> {
        let relative = Path::new(stored);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("document path outside storage root: {stored}"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl DocumentStorage for LocalDocumentStorage {
    fn remove(&self, paths: &[String]) -> io::Result<()> {
        let mut first_error = None;
        for stored in paths {
            let result = self.resolve(stored).and_then(|path| match std::fs::remove_file(&path) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            });
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl PatientArchive {
    /// Irreversibly remove the patient, its dependents, backups, appointments
    /// and stored documents. Audit entries are kept.
    pub fn permanently_delete_patient(&self, session: &Session, patient_id: Uuid) -> Result<(), ArchiveError> {
        self.fetch_patient_row(session, patient_id)?;

        let scope = [
            Filter::eq("patient_id", patient_id.to_string()),
            Filter::eq("user_id", session.owner()),
        ];

        let documents = self
            .store
            .select(&Query::table(Table::PatientDocuments).filters(scope.iter().cloned()))
            .map_err(ArchiveError::PurgeFailed)?;
        let paths: Vec<String> = documents
            .rows
            .iter()
            .filter_map(|row| row.get("file_path").and_then(|v| v.as_str()).map(str::to_string))
            .collect();
        if let Err(e) = self.documents.remove(&paths) {
            tracing::warn!(patient_id = %patient_id, error = %e, "Document cleanup failed, continuing purge");
        }

        let mut removed = 0;
        for table in DEPENDENT_TABLES.into_iter().chain([Table::Appointments]) {
            removed += self.store.delete(table, &scope).map_err(ArchiveError::PurgeFailed)?;
        }
        self.store
            .delete(
                Table::DeletedPatientsBackup,
                &[
                    Filter::eq("original_patient_id", patient_id.to_string()),
                    Filter::eq("user_id", session.owner()),
                ],
            )
            .map_err(ArchiveError::PurgeFailed)?;
        self.store
            .delete(
                Table::Patients,
                &[
                    Filter::eq("id", patient_id.to_string()),
                    Filter::eq("user_id", session.owner()),
                ],
            )
            .map_err(ArchiveError::PurgeFailed)?;

        tracing::info!(
            patient_id = %patient_id,
            dependent_rows = removed,
            documents = paths.len(),
            "Patient permanently deleted"
        );
        Ok(())
    }
}
