use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use super::audit_trail::AuditDraft;
use super::cascade::cascade_dependents;
use super::{ArchiveError, CascadeOperation, PatientArchive, RestoreStage};
use crate::db::{Filter, Query, Row, Table};
use crate::models::{db_timestamp, from_row, AuditOperation, DeletedPatientBackup, Patient, PatientRecord, Session};

fn restored_patch() -> Row {
    let mut patch = Row::new();
    patch.insert("is_deleted".into(), json!(false));
    patch.insert("deleted_at".into(), Value::Null);
    patch.insert("deleted_by".into(), Value::Null);
    patch.insert("updated_at".into(), json!(db_timestamp(Utc::now())));
    patch
}

impl PatientArchive {
    /// Reverse a soft-delete. The backup is consumed and cannot be restored again.
    ///
    /// A cascade failure leaves the backup restorable, so the call can be retried.
    pub fn restore_patient(&self, session: &Session, backup_id: Uuid) -> Result<Patient, ArchiveError> {
        let backup = self.fetch_backup(session, backup_id)?;
        if !backup.can_restore {
            return Err(ArchiveError::RestoreNotAllowed(backup_id));
        }
        let patient_id = backup.original_patient_id;
        let owner_scope = [
            Filter::eq("id", patient_id.to_string()),
            Filter::eq("user_id", session.owner()),
        ];
        let patch = restored_patch();

        let updated = self
            .store
            .update(Table::Patients, &owner_scope, patch.clone())
            .map_err(|source| ArchiveError::RestoreFailed {
                stage: RestoreStage::Patient,
                source,
            })?;
        if updated == 0 {
            return Err(ArchiveError::NotFound {
                entity: "Patient",
                id: patient_id,
            });
        }

        cascade_dependents(
            self.store.as_ref(),
            session,
            patient_id,
            CascadeOperation::Restore,
            &patch,
        )?;

        let consumed = self
            .store
            .update(
                Table::DeletedPatientsBackup,
                &[
                    Filter::eq("id", backup_id.to_string()),
                    Filter::eq("user_id", session.owner()),
                    Filter::eq("can_restore", true),
                ],
                Row::from_iter([("can_restore".to_string(), json!(false))]),
            )
            .map_err(|source| ArchiveError::RestoreFailed {
                stage: RestoreStage::Backup,
                source,
            })?;
        if consumed == 0 {
            tracing::warn!(backup_id = %backup_id, "Backup consumed by a concurrent restore");
            return Err(ArchiveError::RestoreNotAllowed(backup_id));
        }

        self.write_audit(
            session,
            AuditDraft {
                patient_id,
                table: Table::Patients,
                operation: AuditOperation::Restore,
                old_data: Some(json!({
                    "is_deleted": true,
                    "deleted_at": db_timestamp(backup.deleted_at),
                    "deleted_by": backup.deleted_by.to_string(),
                })),
                new_data: Some(json!({
                    "is_deleted": false,
                    "deleted_at": null,
                    "deleted_by": null,
                    "restored_from_backup": backup_id.to_string(),
                })),
            },
        )
        .map_err(|source| ArchiveError::RestoreFailed {
            stage: RestoreStage::Audit,
            source,
        })?;

        tracing::info!(patient_id = %patient_id, backup_id = %backup_id, "Patient restored");

        let row = self.fetch_patient_row(session, patient_id)?;
        let record: PatientRecord = from_row(row)?;
        Ok(record.into())
    }

    /// Restorable backups owned by the principal, most recent deletion first.
    pub fn get_deleted_patients(&self, session: &Session) -> Result<Vec<DeletedPatientBackup>, ArchiveError> {
        let query = Query::table(Table::DeletedPatientsBackup)
            .filter(Filter::eq("user_id", session.owner()))
            .filter(Filter::eq("can_restore", true))
            .order_by("deleted_at", false);
        let rows = self.store.select(&query)?.rows;
        Ok(rows
            .into_iter()
            .map(from_row::<DeletedPatientBackup>)
            .collect::<Result<_, _>>()?)
    }

    fn fetch_backup(&self, session: &Session, backup_id: Uuid) -> Result<DeletedPatientBackup, ArchiveError> {
        let query = Query::table(Table::DeletedPatientsBackup)
            .filter(Filter::eq("id", backup_id.to_string()))
            .filter(Filter::eq("user_id", session.owner()))
            .range(0, 1);
        let row = self
            .store
            .select(&query)?
            .rows
            .into_iter()
            .next()
            .ok_or(ArchiveError::NotFound {
                entity: "Backup",
                id: backup_id,
            })?;
        Ok(from_row(row)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::archive::fixtures::{dependents_in_state, memory_store, seed_dependents, seed_patient};
    use crate::archive::CascadeMode;
    use crate::db::mock::{FaultyRecordStore, StoreOp};
    use crate::db::{RecordStore, DEPENDENT_TABLES};

    fn deleted_fixture(
        store: Arc<dyn RecordStore>,
        mode: CascadeMode,
    ) -> (PatientArchive, Session, Uuid, DeletedPatientBackup) {
        let archive = PatientArchive::new(store.clone(), mode);
        let session = Session::new(Uuid::new_v4());
        let patient = seed_patient(store.as_ref(), session.principal_id, "Ada");
        seed_dependents(store.as_ref(), session.principal_id, patient);
        let backup = archive.soft_delete_patient(&session, patient, None).unwrap();
        (archive, session, patient, backup)
    }

    #[test]
    fn restore_reverses_cascade_and_consumes_backup() {
        let store = memory_store();
        let (archive, session, patient, backup) = deleted_fixture(store.clone(), CascadeMode::Auto);

        let restored = archive.restore_patient(&session, backup.id).unwrap();
        assert_eq!(restored.id, patient);

        let record: PatientRecord = from_row(archive.fetch_patient_row(&session, patient).unwrap()).unwrap();
        assert!(!record.deletion.is_deleted());
        assert!(record.deletion.is_consistent());
        for table in DEPENDENT_TABLES {
            assert!(dependents_in_state(store.as_ref(), patient, table, true).is_empty());
            let live = dependents_in_state(store.as_ref(), patient, table, false);
            assert_eq!(live.len(), 1);
            assert_eq!(live[0]["deleted_at"], Value::Null);
            assert_eq!(live[0]["deleted_by"], Value::Null);
        }

        assert!(archive.get_deleted_patients(&session).unwrap().is_empty());
        let trail = archive.get_patient_audit_trail(&session, patient).unwrap();
        assert_eq!(trail[0].operation, AuditOperation::Restore);
        assert_eq!(
            trail[0].new_data.as_ref().unwrap()["restored_from_backup"],
            json!(backup.id.to_string())
        );
        assert_eq!(trail[1].operation, AuditOperation::Delete);
    }

    #[test]
    fn second_restore_is_not_allowed() {
        let (archive, session, _, backup) = deleted_fixture(memory_store(), CascadeMode::Compensating);
        archive.restore_patient(&session, backup.id).unwrap();
        assert!(matches!(
            archive.restore_patient(&session, backup.id),
            Err(ArchiveError::RestoreNotAllowed(id)) if id == backup.id
        ));
    }

    #[test]
    fn unknown_backup_is_not_found() {
        let archive = PatientArchive::new(memory_store(), CascadeMode::Auto);
        let session = Session::new(Uuid::new_v4());
        assert!(matches!(
            archive.restore_patient(&session, Uuid::new_v4()),
            Err(ArchiveError::NotFound { entity: "Backup", .. })
        ));
    }

    #[test]
    fn other_principal_cannot_restore() {
        let (archive, _, _, backup) = deleted_fixture(memory_store(), CascadeMode::Auto);
        let intruder = Session::new(Uuid::new_v4());
        assert!(matches!(
            archive.restore_patient(&intruder, backup.id),
            Err(ArchiveError::NotFound { .. })
        ));
        assert!(archive.get_deleted_patients(&intruder).unwrap().is_empty());
    }

    #[test]
    fn cascade_failure_keeps_backup_restorable() {
        let store = Arc::new(FaultyRecordStore::in_memory().unwrap());
        let (archive, session, patient, backup) = deleted_fixture(store.clone(), CascadeMode::Compensating);

        store.fail(StoreOp::Update, Table::Allergies);
        let err = archive.restore_patient(&session, backup.id).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::PartialCascadeFailure { operation: CascadeOperation::Restore, .. }
        ));
        assert_eq!(archive.get_deleted_patients(&session).unwrap().len(), 1);

        store.heal();
        archive.restore_patient(&session, backup.id).unwrap();
        for table in DEPENDENT_TABLES {
            assert!(dependents_in_state(store.as_ref(), patient, table, true).is_empty());
        }
    }

    #[test]
    fn audit_failure_reports_audit_stage() {
        let store = Arc::new(FaultyRecordStore::in_memory().unwrap());
        let (archive, session, _, backup) = deleted_fixture(store.clone(), CascadeMode::Compensating);

        store.fail(StoreOp::Insert, Table::PatientAuditLog);
        assert!(matches!(
            archive.restore_patient(&session, backup.id),
            Err(ArchiveError::RestoreFailed { stage: RestoreStage::Audit, .. })
        ));
    }

    #[test]
    fn deleted_listing_is_newest_first() {
        let store = memory_store();
        let archive = PatientArchive::new(store.clone(), CascadeMode::Auto);
        let session = Session::new(Uuid::new_v4());
        let first = seed_patient(store.as_ref(), session.principal_id, "Ada");
        let second = seed_patient(store.as_ref(), session.principal_id, "Bea");
        archive.soft_delete_patient(&session, first, None).unwrap();
        archive.soft_delete_patient(&session, second, None).unwrap();

        let listing = archive.get_deleted_patients(&session).unwrap();
        let ids: Vec<_> = listing.iter().map(|b| b.original_patient_id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_edits() {
        let store = memory_store();
        let (archive, session, patient, backup) = deleted_fixture(store.clone(), CascadeMode::Auto);
        archive.restore_patient(&session, backup.id).unwrap();

        store
            .update(
                Table::Patients,
                &[Filter::eq("id", patient.to_string())],
                Row::from_iter([("name".to_string(), json!("Ada Byron"))]),
            )
            .unwrap();

        let stored = store
            .select(&Query::table(Table::DeletedPatientsBackup).filter(Filter::eq("id", backup.id.to_string())))
            .unwrap();
        let reread: DeletedPatientBackup = from_row(stored.rows[0].clone()).unwrap();
        assert_eq!(reread.patient_data, backup.patient_data);
        assert_eq!(reread.snapshot().unwrap().name, "Ada");
        assert!(!reread.can_restore);
    }
}
