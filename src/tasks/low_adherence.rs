//! Low-adherence alert detector.
//!
//! Daily sweep over patients with active prescriptions. A patient whose
//! trailing 7-day rate falls under the threshold gets one low_adherence
//! alert, deduped per (patient, doctor) through the conditional insert
//! with a 24-hour cooldown. Patients with nothing scheduled are skipped
//! rather than flagged at rate 0.

use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;

use crate::alerts::{insert_low_adherence_if_absent, NewAlert};
use crate::config::{
    LOW_ADHERENCE_COOLDOWN_HOURS, LOW_ADHERENCE_LOOKBACK_DAYS, LOW_ADHERENCE_THRESHOLD,
};
use crate::error::EngineError;
use crate::models::enums::AlertType;
use crate::prescriptions::{list_active_overlapping, patients_with_active_prescriptions};
use crate::report::adherence_summary;

/// Scan all patients and raise low-adherence alerts. Returns the number
/// of alerts created.
pub fn run_low_adherence_tick(
    conn: &Connection,
    now: NaiveDateTime,
) -> Result<u32, EngineError> {
    let today = now.date();
    let from = today - Duration::days(LOW_ADHERENCE_LOOKBACK_DAYS - 1);
    let cooldown_start = now - Duration::hours(LOW_ADHERENCE_COOLDOWN_HOURS);
    let mut created = 0u32;

    for patient_id in patients_with_active_prescriptions(conn)? {
        let summary = adherence_summary(conn, &patient_id, from, today)?;
        if summary.scheduled_doses == 0 {
            tracing::debug!(patient_id = %patient_id,
                "No doses scheduled in window; skipping adherence check");
            continue;
        }
        if summary.rate >= LOW_ADHERENCE_THRESHOLD {
            continue;
        }

        // Reference the patient's first active prescription so the alert
        // routes to a doctor.
        let prescriptions = list_active_overlapping(conn, &patient_id, from, today)?;
        let Some(rx) = prescriptions.first() else {
            continue;
        };

        let percent = (summary.rate * 100.0).round() as u32;
        let alert = NewAlert {
            prescription_id: Some(rx.prescription.id),
            patient_id,
            doctor_id: Some(rx.prescription.doctor_id),
            alert_type: AlertType::LowAdherence,
            message: format!(
                "Adherence over the last {LOW_ADHERENCE_LOOKBACK_DAYS} days is {percent}% ({} of {} doses taken)",
                summary.taken_doses, summary.scheduled_doses,
            ),
        };
        if let Some(alert) = insert_low_adherence_if_absent(conn, &alert, now, cooldown_start)? {
            tracing::info!(
                alert_id = %alert.id,
                patient_id = %patient_id,
                rate = summary.rate,
                "Low-adherence alert created"
            );
            created += 1;
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adherence_log::{insert_log, NewAdherenceLog};
    use crate::alerts::list_unresolved_for_patient;
    use crate::db::open_memory_database;
    use crate::models::enums::IntakeStatus;
    use crate::prescriptions::create_prescription;
    use crate::testutil::{dt, new_item, new_prescription};
    use uuid::Uuid;

    // 2/day × 5 days = 10 scheduled doses in any window covering the item
    fn seed(conn: &mut Connection) -> (Uuid, Uuid) {
        let created = create_prescription(
            conn,
            &new_prescription(
                "2024-01-01",
                None,
                vec![new_item("Metformin", "500mg", &["08:00", "20:00"], 5)],
            ),
        )
        .unwrap();
        (created.prescription.patient_id, created.prescription.id)
    }

    fn take_doses(conn: &Connection, patient_id: Uuid, rx_id: Uuid, count: usize) {
        let slots = [
            "2024-01-01 08:00", "2024-01-01 20:00", "2024-01-02 08:00",
            "2024-01-02 20:00", "2024-01-03 08:00", "2024-01-03 20:00",
            "2024-01-04 08:00",
        ];
        for at in &slots[..count] {
            insert_log(
                conn,
                &NewAdherenceLog {
                    prescription_id: rx_id,
                    prescription_item_id: None,
                    patient_id,
                    taken_at: dt(at),
                    status: IntakeStatus::Taken,
                    amount: None,
                    notes: None,
                },
            )
            .unwrap();
        }
    }

    #[test]
    fn rate_at_threshold_raises_nothing() {
        let mut conn = open_memory_database().unwrap();
        let (patient_id, rx_id) = seed(&mut conn);
        take_doses(&conn, patient_id, rx_id, 7); // 7/10 = 0.70

        assert_eq!(run_low_adherence_tick(&conn, dt("2024-01-07 03:00")).unwrap(), 0);
        assert!(list_unresolved_for_patient(&conn, &patient_id).unwrap().is_empty());
    }

    #[test]
    fn low_rate_raises_one_alert() {
        let mut conn = open_memory_database().unwrap();
        let (patient_id, rx_id) = seed(&mut conn);
        take_doses(&conn, patient_id, rx_id, 2); // 2/10 = 0.20

        assert_eq!(run_low_adherence_tick(&conn, dt("2024-01-07 03:00")).unwrap(), 1);

        let alerts = list_unresolved_for_patient(&conn, &patient_id).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::LowAdherence);
        assert!(alerts[0].message.contains("20%"));
        assert!(alerts[0].message.contains("2 of 10"));
    }

    #[test]
    fn rerun_within_cooldown_is_suppressed() {
        let mut conn = open_memory_database().unwrap();
        let (patient_id, rx_id) = seed(&mut conn);
        take_doses(&conn, patient_id, rx_id, 2);

        assert_eq!(run_low_adherence_tick(&conn, dt("2024-01-07 03:00")).unwrap(), 1);
        assert_eq!(run_low_adherence_tick(&conn, dt("2024-01-07 15:00")).unwrap(), 0);
        assert_eq!(list_unresolved_for_patient(&conn, &patient_id).unwrap().len(), 1);
    }

    #[test]
    fn patient_with_nothing_scheduled_is_skipped() {
        let mut conn = open_memory_database().unwrap();
        let created = create_prescription(
            &mut conn,
            &new_prescription(
                "2024-06-01", // starts long after the check window
                None,
                vec![new_item("Metformin", "500mg", &["08:00"], 5)],
            ),
        )
        .unwrap();
        let patient_id = created.prescription.patient_id;

        assert_eq!(run_low_adherence_tick(&conn, dt("2024-01-07 03:00")).unwrap(), 0);
        assert!(list_unresolved_for_patient(&conn, &patient_id).unwrap().is_empty());
    }

    #[test]
    fn each_low_patient_gets_own_alert() {
        let mut conn = open_memory_database().unwrap();
        let (first_patient, first_rx) = seed(&mut conn);
        let (second_patient, _) = seed(&mut conn);
        take_doses(&conn, first_patient, first_rx, 4); // 0.40, still low

        assert_eq!(run_low_adherence_tick(&conn, dt("2024-01-07 03:00")).unwrap(), 2);
        assert_eq!(list_unresolved_for_patient(&conn, &first_patient).unwrap().len(), 1);
        assert_eq!(list_unresolved_for_patient(&conn, &second_patient).unwrap().len(), 1);
    }
}
