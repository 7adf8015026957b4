use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AppointmentStatus;
use super::patient::Patient;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A patient together with their earliest upcoming appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingPatient {
    #[serde(flatten)]
    pub patient: Patient,
    pub next_appointment: DateTime<Utc>,
}
