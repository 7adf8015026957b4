//! Table catalogue for the record store.
//!
//! Every table the core touches is listed here together with its columns and
//! their storage kind. The SQLite store only emits identifiers found in this
//! catalogue, so filter/patch column names can never reach SQL unchecked.

use serde::{Deserialize, Serialize};

/// How a column's value is represented in JSON rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// TEXT, including UUIDs, dates and RFC 3339 timestamps.
    Text,
    /// INTEGER 0/1 in SQLite, `true`/`false` in rows.
    Bool,
    /// TEXT holding serialized JSON, decoded into a JSON value in rows.
    Json,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn text(name: &'static str) -> Column {
    Column { name, kind: ColumnKind::Text }
}

const fn boolean(name: &'static str) -> Column {
    Column { name, kind: ColumnKind::Bool }
}

const fn json(name: &'static str) -> Column {
    Column { name, kind: ColumnKind::Json }
}

macro_rules! clinical_table {
    ($($col:expr),+ $(,)?) => {
        &[
            text("id"),
            text("user_id"),
            text("patient_id"),
            $($col,)+
            text("created_at"),
            text("updated_at"),
            boolean("is_deleted"),
            text("deleted_at"),
            text("deleted_by"),
        ]
    };
}

const PATIENT_COLUMNS: &[Column] = &[
    text("id"),
    text("user_id"),
    text("name"),
    text("date_of_birth"),
    text("gender"),
    text("contact_phone"),
    text("contact_email"),
    text("address"),
    text("emergency_contact"),
    text("notes"),
    text("preferred_contact_method"),
    text("created_at"),
    text("updated_at"),
    boolean("is_deleted"),
    text("deleted_at"),
    text("deleted_by"),
];

const MEDICAL_HISTORY_COLUMNS: &[Column] = clinical_table!(
    text("condition"),
    text("diagnosis_date"),
    text("treatment"),
    text("notes"),
);

const MEDICATION_COLUMNS: &[Column] = clinical_table!(
    text("name"),
    text("dosage"),
    text("frequency"),
    text("start_date"),
    text("end_date"),
);

const ALLERGY_COLUMNS: &[Column] = clinical_table!(
    text("allergen"),
    text("reaction"),
    text("severity"),
);

const INSURANCE_COLUMNS: &[Column] = clinical_table!(
    text("provider"),
    text("policy_number"),
    text("coverage_details"),
);

const DOCUMENT_COLUMNS: &[Column] = clinical_table!(
    text("file_name"),
    text("file_path"),
    text("file_type"),
);

const BACKUP_COLUMNS: &[Column] = &[
    text("id"),
    text("original_patient_id"),
    text("user_id"),
    json("patient_data"),
    text("deletion_reason"),
    text("deleted_by"),
    text("deleted_at"),
    boolean("can_restore"),
];

const AUDIT_COLUMNS: &[Column] = &[
    text("id"),
    text("user_id"),
    text("patient_id"),
    text("table_name"),
    text("operation"),
    json("old_data"),
    json("new_data"),
    json("changed_fields"),
    text("ip_address"),
    text("user_agent"),
    text("created_at"),
];

const APPOINTMENT_COLUMNS: &[Column] = &[
    text("id"),
    text("user_id"),
    text("patient_id"),
    text("appointment_date"),
    text("status"),
    text("notes"),
    text("created_at"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Patients,
    MedicalHistory,
    Medications,
    Allergies,
    InsuranceBilling,
    PatientDocuments,
    DeletedPatientsBackup,
    PatientAuditLog,
    Appointments,
}

/// Tables whose rows reference a patient and carry their own soft-delete triple.
pub const DEPENDENT_TABLES: [Table; 5] = [
    Table::MedicalHistory,
    Table::Medications,
    Table::Allergies,
    Table::InsuranceBilling,
    Table::PatientDocuments,
];

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patients => "patients",
            Self::MedicalHistory => "medical_history",
            Self::Medications => "medications",
            Self::Allergies => "allergies",
            Self::InsuranceBilling => "insurance_billing",
            Self::PatientDocuments => "patient_documents",
            Self::DeletedPatientsBackup => "deleted_patients_backup",
            Self::PatientAuditLog => "patient_audit_log",
            Self::Appointments => "appointments",
        }
    }

    pub fn columns(&self) -> &'static [Column] {
        match self {
            Self::Patients => PATIENT_COLUMNS,
            Self::MedicalHistory => MEDICAL_HISTORY_COLUMNS,
            Self::Medications => MEDICATION_COLUMNS,
            Self::Allergies => ALLERGY_COLUMNS,
            Self::InsuranceBilling => INSURANCE_COLUMNS,
            Self::PatientDocuments => DOCUMENT_COLUMNS,
            Self::DeletedPatientsBackup => BACKUP_COLUMNS,
            Self::PatientAuditLog => AUDIT_COLUMNS,
            Self::Appointments => APPOINTMENT_COLUMNS,
        }
    }

    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns().iter().find(|c| c.name == name)
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
