//! Schedule builder — per-day view composing expander and resolver.
//!
//! No caching across calls: confirmations can race with queries, so every
//! call reflects repository state as of invocation time.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adherence_log::{fetch_logs_filtered, LogFilter};
use crate::config::UPCOMING_HORIZON_MINUTES;
use crate::error::EngineError;
use crate::models::enums::DoseStatus;
use crate::prescriptions::list_active_for_patient;

use super::expander::expand_item;
use super::resolver::resolve_statuses;

/// One row of a patient's daily schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub instance_key: String,
    pub prescription_id: Uuid,
    pub prescription_item_id: Uuid,
    pub medication: String,
    pub dosage: String,
    pub scheduled_at: NaiveDateTime,
    pub status: DoseStatus,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSummary {
    pub total: u32,
    pub taken: u32,
    pub missed: u32,
    pub skipped: u32,
    pub pending: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub entries: Vec<ScheduleEntry>,
    pub summary: ScheduleSummary,
}

/// Build a patient's schedule for one day across all items of all active
/// prescriptions covering that day.
pub fn get_schedule(
    conn: &Connection,
    patient_id: &Uuid,
    date: NaiveDate,
) -> Result<DaySchedule, EngineError> {
    let prescriptions = list_active_for_patient(conn, patient_id, date)?;

    // Item metadata for entry display, keyed by item id
    let mut item_meta: HashMap<Uuid, (Uuid, String, String, Option<String>)> = HashMap::new();
    let mut instances = Vec::new();
    for rx in &prescriptions {
        for item in &rx.items {
            item_meta.insert(
                item.id,
                (
                    rx.prescription.id,
                    item.medication_name.clone(),
                    item.dosage.clone(),
                    item.instructions.clone(),
                ),
            );
            instances.extend(expand_item(item, &rx.prescription, date, date));
        }
    }
    let known_items: HashSet<Uuid> = item_meta.keys().copied().collect();

    let logs = fetch_logs_filtered(
        conn,
        &LogFilter {
            patient_id: Some(*patient_id),
            from: Some(date.and_hms_opt(0, 0, 0).unwrap_or_default()),
            to: Some(date.and_hms_opt(23, 59, 59).unwrap_or_default()),
            ..Default::default()
        },
    )?;

    let resolved = resolve_statuses(instances, &logs, &known_items);

    let mut entries: Vec<ScheduleEntry> = resolved
        .into_iter()
        .filter_map(|dose| {
            let (prescription_id, medication, dosage, instructions) =
                item_meta.get(&dose.instance.prescription_item_id)?.clone();
            Some(ScheduleEntry {
                instance_key: dose.instance.key(),
                prescription_id,
                prescription_item_id: dose.instance.prescription_item_id,
                medication,
                dosage,
                scheduled_at: dose.instance.scheduled_at,
                status: dose.status,
                instructions,
            })
        })
        .collect();
    entries.sort_by(|a, b| {
        a.scheduled_at
            .cmp(&b.scheduled_at)
            .then_with(|| a.instance_key.cmp(&b.instance_key))
    });

    let summary = summarize(&entries);

    Ok(DaySchedule {
        date,
        entries,
        summary,
    })
}

/// Pending doses in the next 30 minutes of the patient's day.
pub fn list_upcoming(
    conn: &Connection,
    patient_id: &Uuid,
    now: NaiveDateTime,
) -> Result<Vec<ScheduleEntry>, EngineError> {
    let horizon = now + Duration::minutes(UPCOMING_HORIZON_MINUTES);
    let schedule = get_schedule(conn, patient_id, now.date())?;
    Ok(schedule
        .entries
        .into_iter()
        .filter(|e| {
            e.status == DoseStatus::Pending && e.scheduled_at > now && e.scheduled_at <= horizon
        })
        .collect())
}

fn summarize(entries: &[ScheduleEntry]) -> ScheduleSummary {
    let mut summary = ScheduleSummary {
        total: entries.len() as u32,
        ..Default::default()
    };
    for entry in entries {
        match entry.status {
            DoseStatus::Taken => summary.taken += 1,
            DoseStatus::Missed => summary.missed += 1,
            DoseStatus::Skipped => summary.skipped += 1,
            DoseStatus::Pending => summary.pending += 1,
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adherence_log::{insert_log, NewAdherenceLog};
    use crate::db::open_memory_database;
    use crate::models::enums::IntakeStatus;
    use crate::prescriptions::create_prescription;
    use crate::testutil::{dt, new_item, new_prescription};

    fn seed_two_dose_prescription(
        conn: &mut Connection,
    ) -> (Uuid, Uuid, Uuid) {
        let created = create_prescription(
            conn,
            &new_prescription(
                "2024-01-01",
                None,
                vec![new_item("Metformin", "500mg", &["08:00", "20:00"], 14)],
            ),
        )
        .unwrap();
        (
            created.prescription.patient_id,
            created.prescription.id,
            created.items[0].id,
        )
    }

    #[test]
    fn schedule_orders_by_time_with_summary() {
        let mut conn = open_memory_database().unwrap();
        let (patient_id, rx_id, item_id) = seed_two_dose_prescription(&mut conn);

        insert_log(
            &conn,
            &NewAdherenceLog {
                prescription_id: rx_id,
                prescription_item_id: Some(item_id),
                patient_id,
                taken_at: dt("2024-01-01 08:10"),
                status: IntakeStatus::Taken,
                amount: None,
                notes: None,
            },
        )
        .unwrap();

        let schedule = get_schedule(&conn, &patient_id, "2024-01-01".parse().unwrap()).unwrap();
        assert_eq!(schedule.entries.len(), 2);
        assert_eq!(schedule.entries[0].scheduled_at, dt("2024-01-01 08:00"));
        assert_eq!(schedule.entries[0].status, DoseStatus::Taken);
        assert_eq!(schedule.entries[1].status, DoseStatus::Pending);
        assert_eq!(schedule.entries[0].medication, "Metformin");
        assert_eq!(
            schedule.summary,
            ScheduleSummary {
                total: 2,
                taken: 1,
                missed: 0,
                skipped: 0,
                pending: 1,
            }
        );
    }

    #[test]
    fn schedule_is_idempotent_without_writes() {
        let mut conn = open_memory_database().unwrap();
        let (patient_id, _, _) = seed_two_dose_prescription(&mut conn);
        let date = "2024-01-03".parse().unwrap();

        let first = get_schedule(&conn, &patient_id, date).unwrap();
        let second = get_schedule(&conn, &patient_id, date).unwrap();
        assert_eq!(first.summary, second.summary);
        let keys =
            |s: &DaySchedule| s.entries.iter().map(|e| e.instance_key.clone()).collect::<Vec<_>>();
        assert_eq!(keys(&first), keys(&second));
    }

    #[test]
    fn schedule_spans_multiple_prescriptions() {
        let mut conn = open_memory_database().unwrap();
        let created = create_prescription(
            &mut conn,
            &new_prescription(
                "2024-01-01",
                None,
                vec![new_item("Metformin", "500mg", &["08:00"], 14)],
            ),
        )
        .unwrap();
        let patient_id = created.prescription.patient_id;

        let mut second = new_prescription(
            "2024-01-01",
            None,
            vec![new_item("Lisinopril", "10mg", &["09:00"], 14)],
        );
        second.patient_id = patient_id;
        create_prescription(&mut conn, &second).unwrap();

        let schedule = get_schedule(&conn, &patient_id, "2024-01-02".parse().unwrap()).unwrap();
        assert_eq!(schedule.entries.len(), 2);
        assert_eq!(schedule.entries[0].medication, "Metformin");
        assert_eq!(schedule.entries[1].medication, "Lisinopril");
    }

    #[test]
    fn day_outside_duration_is_empty() {
        let mut conn = open_memory_database().unwrap();
        let (patient_id, _, _) = seed_two_dose_prescription(&mut conn);

        // duration_days = 14, so day 20 has no instances
        let schedule = get_schedule(&conn, &patient_id, "2024-01-20".parse().unwrap()).unwrap();
        assert!(schedule.entries.is_empty());
        assert_eq!(schedule.summary.total, 0);
    }

    #[test]
    fn upcoming_returns_only_pending_in_horizon() {
        let mut conn = open_memory_database().unwrap();
        let (patient_id, rx_id, item_id) = seed_two_dose_prescription(&mut conn);

        // 19:40 → the 20:00 dose is inside the 30-minute horizon
        let upcoming = list_upcoming(&conn, &patient_id, dt("2024-01-01 19:40")).unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].scheduled_at, dt("2024-01-01 20:00"));

        // Already-taken dose is not upcoming
        insert_log(
            &conn,
            &NewAdherenceLog {
                prescription_id: rx_id,
                prescription_item_id: Some(item_id),
                patient_id,
                taken_at: dt("2024-01-01 19:55"),
                status: IntakeStatus::Taken,
                amount: None,
                notes: None,
            },
        )
        .unwrap();
        let after = list_upcoming(&conn, &patient_id, dt("2024-01-01 19:40")).unwrap();
        assert!(after.is_empty());

        // Too early: 08:00 dose is more than 30 minutes out
        let early = list_upcoming(&conn, &patient_id, dt("2024-01-01 07:00")).unwrap();
        assert!(early.is_empty());
    }
}
