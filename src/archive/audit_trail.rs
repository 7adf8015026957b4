use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{ArchiveError, PatientArchive};
use crate::db::{DatabaseError, Filter, Query, RecordStore, Row, Table};
use crate::models::{db_timestamp, from_row, AuditLogEntry, AuditOperation, Session};

/// An audit entry before identity, provenance and timestamp are attached.
#[derive(Debug, Clone)]
pub struct AuditDraft {
    pub patient_id: Uuid,
    pub table: Table,
    pub operation: AuditOperation,
    pub old_data: Option<Value>,
    pub new_data: Option<Value>,
}

/// Sorted top-level keys whose values differ between the two states.
/// A key present on one side only counts as changed.
pub fn changed_fields(old: Option<&Value>, new: Option<&Value>) -> Vec<String> {
    let empty = serde_json::Map::new();
    let old = old.and_then(Value::as_object).unwrap_or(&empty);
    let new = new.and_then(Value::as_object).unwrap_or(&empty);

    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    keys.into_iter()
        .filter(|k| old.get(*k) != new.get(*k))
        .cloned()
        .collect()
}

/// The stored form of an audit entry.
pub(super) fn audit_row(session: &Session, draft: &AuditDraft, at: DateTime<Utc>) -> Row {
    let changed = changed_fields(draft.old_data.as_ref(), draft.new_data.as_ref());
    let mut row = Row::new();
    row.insert("id".into(), json!(Uuid::new_v4().to_string()));
    row.insert("user_id".into(), json!(session.owner()));
    row.insert("patient_id".into(), json!(draft.patient_id.to_string()));
    row.insert("table_name".into(), json!(draft.table.as_str()));
    row.insert("operation".into(), json!(draft.operation.as_str()));
    row.insert("old_data".into(), draft.old_data.clone().unwrap_or(Value::Null));
    row.insert("new_data".into(), draft.new_data.clone().unwrap_or(Value::Null));
    row.insert("changed_fields".into(), json!(changed));
    row.insert("ip_address".into(), json!(session.provenance.ip_address));
    row.insert("user_agent".into(), json!(session.provenance.user_agent));
    row.insert("created_at".into(), json!(db_timestamp(at)));
    row
}

/// Append one entry to the patient audit log.
pub fn record_audit_entry(
    store: &dyn RecordStore,
    session: &Session,
    draft: AuditDraft,
) -> Result<AuditLogEntry, DatabaseError> {
    let stored = store.insert(Table::PatientAuditLog, audit_row(session, &draft, Utc::now()))?;
    tracing::info!(
        patient_id = %draft.patient_id,
        table = %draft.table,
        operation = %draft.operation,
        "Audit entry recorded"
    );
    from_row(stored)
}

impl PatientArchive {
    /// Audit entries for the patient, newest first.
    pub fn get_patient_audit_trail(
        &self,
        session: &Session,
        patient_id: Uuid,
    ) -> Result<Vec<AuditLogEntry>, ArchiveError> {
        let query = Query::table(Table::PatientAuditLog)
            .filter(Filter::eq("patient_id", patient_id.to_string()))
            .filter(Filter::eq("user_id", session.owner()))
            .order_by("created_at", false);
        let selection = self.store.select(&query).map_err(ArchiveError::AuditFetch)?;
        selection
            .rows
            .into_iter()
            .map(|row| from_row(row).map_err(ArchiveError::AuditFetch))
            .collect()
    }

    pub(super) fn write_audit(
        &self,
        session: &Session,
        draft: AuditDraft,
    ) -> Result<AuditLogEntry, DatabaseError> {
        record_audit_entry(self.store.as_ref(), session, draft)
    }
}
