use uuid::Uuid;

use super::{ArchiveError, CascadeFailure, CascadeOperation};
use crate::db::{Filter, Query, RecordStore, Row, Table, DEPENDENT_TABLES};
use crate::models::Session;

/// Apply `patch` to every dependent table of the patient.
///
/// Every table is attempted even after an earlier one fails. Afterwards each
/// table that accepted the write is re-read, and any row still in the old
/// state counts as a failure for that table.
pub(super) fn cascade_dependents(
    store: &dyn RecordStore,
    session: &Session,
    patient_id: Uuid,
    operation: CascadeOperation,
    patch: &Row,
) -> Result<(), ArchiveError> {
    let scope = owner_scope(session, patient_id);
    let mut failures = Vec::new();

    for table in DEPENDENT_TABLES {
        match store.update(table, &scope, patch.clone()) {
            Ok(updated) => {
                tracing::debug!(table = %table, updated, %operation, "Cascade step applied");
            }
            Err(e) => {
                tracing::error!(table = %table, %operation, error = %e, "Cascade step failed");
                failures.push(CascadeFailure {
                    table,
                    reason: e.to_string(),
                });
            }
        }
    }

    for table in DEPENDENT_TABLES {
        if failures.iter().any(|f| f.table == table) {
            continue;
        }
        if let Err(failure) = verify_table(store, &scope, table, operation) {
            tracing::error!(table = %table, %operation, reason = %failure.reason, "Cascade verification failed");
            failures.push(failure);
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ArchiveError::PartialCascadeFailure {
            patient_id,
            operation,
            failures,
        })
    }
}

fn owner_scope(session: &Session, patient_id: Uuid) -> Vec<Filter> {
    vec![
        Filter::eq("patient_id", patient_id.to_string()),
        Filter::eq("user_id", session.owner()),
    ]
}

/// Rows left behind in the pre-cascade state.
fn verify_table(
    store: &dyn RecordStore,
    scope: &[Filter],
    table: Table,
    operation: CascadeOperation,
) -> Result<(), CascadeFailure> {
    let stale = match operation {
        CascadeOperation::Delete => Filter::NullOrFalse("is_deleted"),
        CascadeOperation::Restore => Filter::eq("is_deleted", true),
    };
    let query = Query::table(table)
        .filters(scope.iter().cloned())
        .filter(stale)
        .range(0, 0)
        .with_count();

    match store.select(&query) {
        Ok(selection) => match selection.count.unwrap_or(0) {
            0 => Ok(()),
            n => Err(CascadeFailure {
                table,
                reason: format!("{n} row(s) not updated"),
            }),
        },
        Err(e) => Err(CascadeFailure {
            table,
            reason: format!("verification read failed: {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::archive::fixtures::{dependents_in_state, seed_dependents, seed_patient};
    use crate::db::mock::{FaultyRecordStore, StoreOp};

    fn deleted_patch(session: &Session) -> Row {
        json!({
            "is_deleted": true,
            "deleted_at": "2024-06-15T10:00:00.000000Z",
            "deleted_by": session.owner(),
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[test]
    fn all_tables_updated_when_healthy() {
        let store = Arc::new(FaultyRecordStore::in_memory().unwrap());
        let session = Session::new(Uuid::new_v4());
        let patient = seed_patient(store.as_ref(), session.principal_id, "Ada");
        seed_dependents(store.as_ref(), session.principal_id, patient);

        cascade_dependents(
            store.as_ref(),
            &session,
            patient,
            CascadeOperation::Delete,
            &deleted_patch(&session),
        )
        .unwrap();

        for table in DEPENDENT_TABLES {
            assert_eq!(dependents_in_state(store.as_ref(), patient, table, true).len(), 1);
        }
    }

    #[test]
    fn failing_table_is_reported_and_others_still_run() {
        let store = Arc::new(FaultyRecordStore::in_memory().unwrap());
        let session = Session::new(Uuid::new_v4());
        let patient = seed_patient(store.as_ref(), session.principal_id, "Ada");
        seed_dependents(store.as_ref(), session.principal_id, patient);
        store.fail(StoreOp::Update, Table::Medications);

        let err = cascade_dependents(
            store.as_ref(),
            &session,
            patient,
            CascadeOperation::Delete,
            &deleted_patch(&session),
        )
        .unwrap_err();

        match err {
            ArchiveError::PartialCascadeFailure {
                patient_id,
                operation,
                failures,
            } => {
                assert_eq!(patient_id, patient);
                assert_eq!(operation, CascadeOperation::Delete);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].table, Table::Medications);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        store.heal();
        for table in DEPENDENT_TABLES {
            let deleted = dependents_in_state(store.as_ref(), patient, table, true).len();
            let expected = if table == Table::Medications { 0 } else { 1 };
            assert_eq!(deleted, expected, "{table}");
        }
    }

    #[test]
    fn failed_verification_read_counts_as_failure() {
        let store = Arc::new(FaultyRecordStore::in_memory().unwrap());
        let session = Session::new(Uuid::new_v4());
        let patient = seed_patient(store.as_ref(), session.principal_id, "Ada");
        store.fail(StoreOp::Select, Table::Allergies);

        let err = cascade_dependents(
            store.as_ref(),
            &session,
            patient,
            CascadeOperation::Delete,
            &deleted_patch(&session),
        )
        .unwrap_err();
        assert!(err.to_string().contains("allergies (verification read failed"));
    }

    #[test]
    fn other_principals_rows_are_untouched() {
        let store = Arc::new(FaultyRecordStore::in_memory().unwrap());
        let owner = Session::new(Uuid::new_v4());
        let intruder = Session::new(Uuid::new_v4());
        let patient = seed_patient(store.as_ref(), owner.principal_id, "Ada");
        seed_dependents(store.as_ref(), owner.principal_id, patient);

        cascade_dependents(
            store.as_ref(),
            &intruder,
            patient,
            CascadeOperation::Delete,
            &deleted_patch(&intruder),
        )
        .unwrap();

        for table in DEPENDENT_TABLES {
            assert!(dependents_in_state(store.as_ref(), patient, table, true).is_empty());
        }
    }
}
