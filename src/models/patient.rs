use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::PreferredContactMethod;

/// The `{is_deleted, deleted_at, deleted_by}` group carried by patients and
/// every dependent clinical record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteState {
    pub is_deleted: Option<bool>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl SoftDeleteState {
    /// NULL counts as not deleted.
    pub fn is_deleted(&self) -> bool {
        self.is_deleted.unwrap_or(false)
    }

    /// Deleted exactly when both deletion fields are set.
    pub fn is_consistent(&self) -> bool {
        let has_metadata = self.deleted_at.is_some() && self.deleted_by.is_some();
        let has_none = self.deleted_at.is_none() && self.deleted_by.is_none();
        if self.is_deleted() {
            has_metadata
        } else {
            has_none
        }
    }
}

/// Patient row as stored in the `patients` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub preferred_contact_method: PreferredContactMethod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub deletion: SoftDeleteState,
}

/// Client-facing patient shape returned by search and lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub notes: Option<String>,
    pub preferred_contact_method: PreferredContactMethod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PatientRecord> for Patient {
    fn from(record: PatientRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            date_of_birth: record.date_of_birth,
            gender: record.gender,
            phone: record.contact_phone,
            email: record.contact_email,
            address: record.address,
            emergency_contact: record.emergency_contact,
            notes: record.notes,
            preferred_contact_method: record.preferred_contact_method,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Input for registering a patient.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPatient {
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub preferred_contact_method: PreferredContactMethod,
}

/// Partial update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientUpdate {
    pub name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub notes: Option<String>,
    pub preferred_contact_method: Option<PreferredContactMethod>,
}
