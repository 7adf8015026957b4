use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use uuid::Uuid;

use super::{PatientSearch, SearchError};
use crate::db::{Filter, Query, Table};
use crate::models::{
    db_timestamp, from_row, Appointment, AppointmentStatus, Patient, PatientRecord, PatientStatistics, Session,
    UpcomingPatient,
};

/// Window used by the dashboard appointment count.
const STATISTICS_WINDOW_DAYS: i64 = 7;

fn appointment_window(session: &Session, now: DateTime<Utc>, days: i64) -> Vec<Filter> {
    vec![
        Filter::eq("user_id", session.owner()),
        Filter::Neq("status", AppointmentStatus::Cancelled.as_str().into()),
        Filter::Gte("appointment_date", db_timestamp(now).into()),
        Filter::Lte("appointment_date", db_timestamp(now + Duration::days(days)).into()),
    ]
}

impl PatientSearch {
    pub fn get_patients_with_upcoming_appointments(
        &self,
        session: &Session,
        days: u32,
    ) -> Result<Vec<UpcomingPatient>, SearchError> {
        self.get_patients_with_upcoming_appointments_at(session, days, Utc::now())
    }

    /// Live patients with a non-cancelled appointment in `[now, now + days]`,
    /// soonest first.
    pub fn get_patients_with_upcoming_appointments_at(
        &self,
        session: &Session,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<UpcomingPatient>, SearchError> {
        let appointments = self
            .store
            .select(
                &Query::table(Table::Appointments)
                    .filters(appointment_window(session, now, i64::from(days)))
                    .order_by("appointment_date", true),
            )?
            .rows;

        let mut order: Vec<(Uuid, DateTime<Utc>)> = Vec::new();
        for row in appointments {
            let appointment: Appointment = from_row(row)?;
            if !order.iter().any(|(id, _)| *id == appointment.patient_id) {
                order.push((appointment.patient_id, appointment.appointment_date));
            }
        }
        if order.is_empty() {
            return Ok(Vec::new());
        }

        let ids = order.iter().map(|(id, _)| id.to_string().into()).collect();
        let rows = self
            .store
            .select(
                &Query::table(Table::Patients)
                    .filter(Filter::In("id", ids))
                    .filter(Filter::eq("user_id", session.owner()))
                    .filter(Filter::NullOrFalse("is_deleted")),
            )?
            .rows;
        let mut patients: HashMap<Uuid, Patient> = HashMap::with_capacity(rows.len());
        for row in rows {
            let record: PatientRecord = from_row(row)?;
            patients.insert(record.id, record.into());
        }

        Ok(order
            .into_iter()
            .filter_map(|(id, next_appointment)| {
                patients.remove(&id).map(|patient| UpcomingPatient {
                    patient,
                    next_appointment,
                })
            })
            .collect())
    }

    pub fn get_patient_statistics(&self, session: &Session) -> Result<PatientStatistics, SearchError> {
        self.get_patient_statistics_at(session, Utc::now())
    }

    pub fn get_patient_statistics_at(
        &self,
        session: &Session,
        now: DateTime<Utc>,
    ) -> Result<PatientStatistics, SearchError> {
        let live = [
            Filter::eq("user_id", session.owner()),
            Filter::NullOrFalse("is_deleted"),
        ];
        let total_patients = self.store.count(Table::Patients, &live)?;

        let month_start = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| d.and_utc())
            .ok_or_else(|| SearchError::InvalidFilter(format!("no month start for {now}")))?;
        let mut created_this_month = live.to_vec();
        created_this_month.push(Filter::Gte("created_at", db_timestamp(month_start).into()));
        let new_this_month = self.store.count(Table::Patients, &created_this_month)?;

        let upcoming_appointments = self.store.count(
            Table::Appointments,
            &appointment_window(session, now, STATISTICS_WINDOW_DAYS),
        )?;

        Ok(PatientStatistics {
            total_patients,
            new_this_month,
            upcoming_appointments,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::archive::fixtures::{memory_store, patient_row, seed_patient};
    use crate::archive::{CascadeMode, PatientArchive};
    use crate::db::{RecordStore, Row};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap()
    }

    fn book(store: &dyn RecordStore, session: &Session, patient: Uuid, at: DateTime<Utc>, status: &str) {
        let row: Row = json!({
            "id": Uuid::new_v4().to_string(),
            "user_id": session.owner(),
            "patient_id": patient.to_string(),
            "appointment_date": db_timestamp(at),
            "status": status,
            "created_at": db_timestamp(now()),
        })
        .as_object()
        .unwrap()
        .clone();
        store.insert(Table::Appointments, row).unwrap();
    }

    #[test]
    fn upcoming_orders_by_earliest_appointment() {
        let store = memory_store();
        let search = PatientSearch::new(store.clone());
        let session = Session::new(Uuid::new_v4());
        let ada = seed_patient(store.as_ref(), session.principal_id, "Ada");
        let bea = seed_patient(store.as_ref(), session.principal_id, "Bea");
        let cleo = seed_patient(store.as_ref(), session.principal_id, "Cleo");

        book(store.as_ref(), &session, ada, now() + Duration::days(3), "scheduled");
        book(store.as_ref(), &session, ada, now() + Duration::hours(2), "confirmed");
        book(store.as_ref(), &session, bea, now() + Duration::days(1), "scheduled");
        book(store.as_ref(), &session, cleo, now() + Duration::days(2), "cancelled");
        book(store.as_ref(), &session, cleo, now() + Duration::days(30), "scheduled");
        book(store.as_ref(), &session, cleo, now() - Duration::days(1), "scheduled");

        let upcoming = search
            .get_patients_with_upcoming_appointments_at(&session, 7, now())
            .unwrap();
        let ids: Vec<_> = upcoming.iter().map(|u| u.patient.id).collect();
        assert_eq!(ids, vec![ada, bea]);
        assert_eq!(upcoming[0].next_appointment, now() + Duration::hours(2));
    }

    #[test]
    fn upcoming_skips_deleted_patients() {
        let store = memory_store();
        let search = PatientSearch::new(store.clone());
        let archive = PatientArchive::new(store.clone(), CascadeMode::Auto);
        let session = Session::new(Uuid::new_v4());
        let ada = seed_patient(store.as_ref(), session.principal_id, "Ada");
        book(store.as_ref(), &session, ada, now() + Duration::days(1), "scheduled");
        archive.soft_delete_patient(&session, ada, None).unwrap();

        assert!(search
            .get_patients_with_upcoming_appointments_at(&session, 7, now())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn statistics_count_live_patients_and_week_ahead() {
        let store = memory_store();
        let search = PatientSearch::new(store.clone());
        let archive = PatientArchive::new(store.clone(), CascadeMode::Auto);
        let session = Session::new(Uuid::new_v4());

        let last_month = Utc.with_ymd_and_hms(2024, 5, 31, 23, 0, 0).unwrap();
        let this_month = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let old = store
            .insert(Table::Patients, patient_row(session.principal_id, "Old", "1980-01-01", last_month))
            .unwrap();
        store
            .insert(Table::Patients, patient_row(session.principal_id, "New", "1980-01-01", this_month))
            .unwrap();
        let gone = store
            .insert(Table::Patients, patient_row(session.principal_id, "Gone", "1980-01-01", this_month))
            .unwrap();
        archive
            .soft_delete_patient(&session, gone["id"].as_str().unwrap().parse().unwrap(), None)
            .unwrap();

        let old_id: Uuid = old["id"].as_str().unwrap().parse().unwrap();
        book(store.as_ref(), &session, old_id, now() + Duration::days(6), "scheduled");
        book(store.as_ref(), &session, old_id, now() + Duration::days(8), "scheduled");
        book(store.as_ref(), &session, old_id, now() + Duration::days(1), "cancelled");

        let stats = search.get_patient_statistics_at(&session, now()).unwrap();
        assert_eq!(
            stats,
            PatientStatistics {
                total_patients: 2,
                new_this_month: 1,
                upcoming_appointments: 1,
            }
        );

        let other = Session::new(Uuid::new_v4());
        let empty = search.get_patient_statistics_at(&other, now()).unwrap();
        assert_eq!(empty.total_patients, 0);
    }
}
