//! Patient registry: registration and edits, each leaving an audit entry.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::archive::{record_audit_entry, AuditDraft};
use crate::db::{DatabaseError, Filter, Query, RecordStore, Row, Table};
use crate::models::{db_timestamp, from_row, AuditOperation, NewPatient, Patient, PatientRecord, PatientUpdate, Session};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Patient not found: {0}")]
    NotFound(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Store(#[from] DatabaseError),
}

pub struct PatientRegistry {
    store: Arc<dyn RecordStore>,
}

impl PatientRegistry {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn create_patient(&self, session: &Session, input: NewPatient) -> Result<Patient, RegistryError> {
        let name = validated_name(&input.name)?;
        check_birth_date(input.date_of_birth)?;

        let id = Uuid::new_v4();
        let now = db_timestamp(Utc::now());
        let mut row = Row::new();
        row.insert("id".into(), json!(id.to_string()));
        row.insert("user_id".into(), json!(session.owner()));
        row.insert("name".into(), json!(name));
        row.insert("date_of_birth".into(), json!(input.date_of_birth.map(|d| d.to_string())));
        row.insert("gender".into(), json!(input.gender));
        row.insert("contact_phone".into(), json!(input.phone));
        row.insert("contact_email".into(), json!(input.email));
        row.insert("address".into(), json!(input.address));
        row.insert("emergency_contact".into(), json!(input.emergency_contact));
        row.insert("notes".into(), json!(input.notes));
        row.insert("preferred_contact_method".into(), json!(input.preferred_contact_method.as_str()));
        row.insert("created_at".into(), json!(now));
        row.insert("updated_at".into(), json!(now));
        row.insert("is_deleted".into(), json!(false));

        let stored = self.store.insert(Table::Patients, row)?;
        record_audit_entry(
            self.store.as_ref(),
            session,
            AuditDraft {
                patient_id: id,
                table: Table::Patients,
                operation: AuditOperation::Insert,
                old_data: None,
                new_data: Some(Value::Object(stored.clone())),
            },
        )?;

        tracing::info!(patient_id = %id, "Patient registered");
        let record: PatientRecord = from_row(stored)?;
        Ok(record.into())
    }

    /// Apply the fields present in `update` to a live patient.
    pub fn update_patient(
        &self,
        session: &Session,
        patient_id: Uuid,
        update: PatientUpdate,
    ) -> Result<Patient, RegistryError> {
        let before = self
            .fetch_live_row(session, patient_id)?
            .ok_or(RegistryError::NotFound(patient_id))?;

        let patch = update_patch(update)?;
        if patch.is_empty() {
            let record: PatientRecord = from_row(before)?;
            return Ok(record.into());
        }
        let mut patch = patch;
        patch.insert("updated_at".into(), json!(db_timestamp(Utc::now())));

        let scope = [
            Filter::eq("id", patient_id.to_string()),
            Filter::eq("user_id", session.owner()),
            Filter::NullOrFalse("is_deleted"),
        ];
        if self.store.update(Table::Patients, &scope, patch)? == 0 {
            return Err(RegistryError::NotFound(patient_id));
        }

        let after = self
            .fetch_live_row(session, patient_id)?
            .ok_or(RegistryError::NotFound(patient_id))?;
        let entry = record_audit_entry(
            self.store.as_ref(),
            session,
            AuditDraft {
                patient_id,
                table: Table::Patients,
                operation: AuditOperation::Update,
                old_data: Some(Value::Object(before)),
                new_data: Some(Value::Object(after.clone())),
            },
        )?;

        tracing::info!(
            patient_id = %patient_id,
            fields = entry.changed_fields.len(),
            "Patient updated"
        );
        let record: PatientRecord = from_row(after)?;
        Ok(record.into())
    }

    fn fetch_live_row(&self, session: &Session, patient_id: Uuid) -> Result<Option<Row>, DatabaseError> {
        let query = Query::table(Table::Patients)
            .filter(Filter::eq("id", patient_id.to_string()))
            .filter(Filter::eq("user_id", session.owner()))
            .filter(Filter::NullOrFalse("is_deleted"))
            .range(0, 1);
        Ok(self.store.select(&query)?.rows.into_iter().next())
    }
}

fn validated_name(name: &str) -> Result<&str, RegistryError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RegistryError::Validation("Patient name is required".into()));
    }
    Ok(trimmed)
}

fn check_birth_date(dob: Option<chrono::NaiveDate>) -> Result<(), RegistryError> {
    match dob {
        Some(d) if d > Utc::now().date_naive() => Err(RegistryError::Validation(
            "Date of birth cannot be in the future".into(),
        )),
        _ => Ok(()),
    }
}

fn update_patch(update: PatientUpdate) -> Result<Row, RegistryError> {
    check_birth_date(update.date_of_birth)?;

    let mut patch = Row::new();
    if let Some(name) = update.name {
        patch.insert("name".into(), json!(validated_name(&name)?));
    }
    let optional = [
        ("date_of_birth", update.date_of_birth.map(|d| d.to_string())),
        ("gender", update.gender),
        ("contact_phone", update.phone),
        ("contact_email", update.email),
        ("address", update.address),
        ("emergency_contact", update.emergency_contact),
        ("notes", update.notes),
        (
            "preferred_contact_method",
            update.preferred_contact_method.map(|m| m.as_str().to_string()),
        ),
    ];
    for (column, value) in optional {
        if let Some(value) = value {
            patch.insert(column.into(), json!(value));
        }
    }
    Ok(patch)
}
