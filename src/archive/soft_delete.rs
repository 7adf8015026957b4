use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use super::audit_trail::{audit_row, AuditDraft};
use super::cascade::cascade_dependents;
use super::{ArchiveError, CascadeMode, CascadeOperation, PatientArchive};
use crate::db::{DatabaseError, Filter, Procedure, Row, Table};
use crate::models::{db_timestamp, from_row, AuditOperation, DeletedPatientBackup, PatientRecord, Session};

/// Deleted triple plus `updated_at`, shared by the patient and its dependents.
fn deleted_patch(session: &Session, at: DateTime<Utc>) -> Row {
    let ts = db_timestamp(at);
    let mut patch = Row::new();
    patch.insert("is_deleted".into(), json!(true));
    patch.insert("deleted_at".into(), json!(ts));
    patch.insert("deleted_by".into(), json!(session.owner()));
    patch.insert("updated_at".into(), json!(ts));
    patch
}

fn backup_row(
    session: &Session,
    patient_id: Uuid,
    snapshot: &Row,
    reason: Option<&str>,
    at: DateTime<Utc>,
) -> Row {
    let mut row = Row::new();
    row.insert("id".into(), json!(Uuid::new_v4().to_string()));
    row.insert("original_patient_id".into(), json!(patient_id.to_string()));
    row.insert("user_id".into(), json!(session.owner()));
    row.insert("patient_data".into(), Value::Object(snapshot.clone()));
    row.insert("deletion_reason".into(), json!(reason));
    row.insert("deleted_by".into(), json!(session.owner()));
    row.insert("deleted_at".into(), json!(db_timestamp(at)));
    row.insert("can_restore".into(), json!(true));
    row
}

/// Every row a soft-delete writes, prepared up front so the procedure and
/// the compensating path store identical data.
struct SoftDeletePlan {
    patient_id: Uuid,
    backup: Row,
    patch: Row,
    audit: Row,
}

impl PatientArchive {
    /// Archive the patient and every dependent record, returning the backup.
    pub fn soft_delete_patient(
        &self,
        session: &Session,
        patient_id: Uuid,
        reason: Option<&str>,
    ) -> Result<DeletedPatientBackup, ArchiveError> {
        let snapshot = self.fetch_patient_row(session, patient_id)?;
        let record: PatientRecord = from_row(snapshot.clone())?;
        if record.deletion.is_deleted() {
            return Err(ArchiveError::AlreadyDeleted(patient_id));
        }

        let now = Utc::now();
        let patch = deleted_patch(session, now);
        let audit = audit_row(
            session,
            &AuditDraft {
                patient_id,
                table: Table::Patients,
                operation: AuditOperation::Delete,
                old_data: Some(Value::Object(snapshot.clone())),
                new_data: Some(Value::Object(patch.clone())),
            },
            now,
        );
        let plan = SoftDeletePlan {
            patient_id,
            backup: backup_row(session, patient_id, &snapshot, reason, now),
            patch,
            audit,
        };

        let backup = match self.mode {
            CascadeMode::Procedure => self.soft_delete_atomic(session, plan)?,
            CascadeMode::Compensating | CascadeMode::Auto => {
                self.soft_delete_compensating(session, plan)?
            }
        };

        tracing::info!(
            patient_id = %patient_id,
            backup_id = %backup.id,
            mode = ?self.mode,
            "Patient soft-deleted"
        );
        Ok(backup)
    }

    fn soft_delete_atomic(
        &self,
        session: &Session,
        plan: SoftDeletePlan,
    ) -> Result<DeletedPatientBackup, ArchiveError> {
        let mut args = Row::new();
        args.insert("patient_id".into(), json!(plan.patient_id.to_string()));
        args.insert("user_id".into(), json!(session.owner()));
        args.insert("backup".into(), Value::Object(plan.backup));
        args.insert("patient_patch".into(), Value::Object(plan.patch));
        args.insert("audit_entry".into(), Value::Object(plan.audit));

        let stored = self
            .store
            .call_procedure(Procedure::SoftDeletePatient, args)
            .map_err(|e| {
                tracing::error!(patient_id = %plan.patient_id, error = %e, "Soft-delete procedure failed");
                ArchiveError::DeletionFailed(e)
            })?;

        serde_json::from_value(stored)
            .map_err(|e| ArchiveError::DeletionFailed(DatabaseError::Json(e)))
    }

    fn soft_delete_compensating(
        &self,
        session: &Session,
        plan: SoftDeletePlan,
    ) -> Result<DeletedPatientBackup, ArchiveError> {
        let patient_id = plan.patient_id;
        let backup_id = plan.backup.get("id").cloned().unwrap_or(Value::Null);

        let stored_backup = self
            .store
            .insert(Table::DeletedPatientsBackup, plan.backup)
            .map_err(ArchiveError::DeletionFailed)?;

        let patient_scope = [
            Filter::eq("id", patient_id.to_string()),
            Filter::eq("user_id", session.owner()),
            Filter::NullOrFalse("is_deleted"),
        ];
        let outcome = self.store.update(Table::Patients, &patient_scope, plan.patch.clone());
        match outcome {
            Ok(0) => {
                // Lost a race with another soft-delete.
                self.discard_backup(session, &backup_id);
                return Err(ArchiveError::AlreadyDeleted(patient_id));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(patient_id = %patient_id, error = %e, "Patient update failed, removing backup");
                self.discard_backup(session, &backup_id);
                return Err(ArchiveError::DeletionFailed(e));
            }
        }

        let cascade = cascade_dependents(
            self.store.as_ref(),
            session,
            patient_id,
            CascadeOperation::Delete,
            &plan.patch,
        );

        // The patient is deleted from here on, so the DELETE entry is written
        // even when the cascade came back incomplete.
        self.store
            .insert(Table::PatientAuditLog, plan.audit)
            .map_err(ArchiveError::AuditWrite)?;

        cascade?;
        Ok(from_row(stored_backup)?)
    }

    fn discard_backup(&self, session: &Session, backup_id: &Value) {
        let scope = [
            Filter::Eq("id", backup_id.clone()),
            Filter::eq("user_id", session.owner()),
        ];
        if let Err(e) = self.store.delete(Table::DeletedPatientsBackup, &scope) {
            tracing::warn!(backup_id = %backup_id, error = %e, "Failed to remove orphaned backup");
        }
    }
}
