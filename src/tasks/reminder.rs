//! Reminder scheduler ticks.
//!
//! Two cadences over the same expanded day: a due tick fires at the
//! scheduled minute (missed_dose alerts), an upcoming tick looks 30
//! minutes ahead (other alerts). Both dedup through the conditional
//! insert, so re-running a tick within the cooldown creates nothing.

use chrono::{Duration, NaiveDateTime, Timelike};
use rusqlite::Connection;

use crate::alerts::{insert_reminder_if_absent, NewAlert};
use crate::config::{REMINDER_COOLDOWN_MINUTES, UPCOMING_HORIZON_MINUTES};
use crate::error::EngineError;
use crate::models::enums::AlertType;
use crate::prescriptions::list_active_covering;
use crate::schedule::expand_item;

/// Create missed_dose reminders for doses scheduled at the current minute.
/// Returns the number of alerts created.
pub fn run_due_tick(conn: &Connection, now: NaiveDateTime) -> Result<u32, EngineError> {
    let minute = truncate_to_minute(now);
    run_tick(conn, now, AlertType::MissedDose, |scheduled_at| {
        scheduled_at == minute
    })
}

/// Create upcoming-dose reminders for doses in the next 30 minutes.
pub fn run_upcoming_tick(conn: &Connection, now: NaiveDateTime) -> Result<u32, EngineError> {
    let horizon = now + Duration::minutes(UPCOMING_HORIZON_MINUTES);
    run_tick(conn, now, AlertType::Other, |scheduled_at| {
        scheduled_at > now && scheduled_at <= horizon
    })
}

fn run_tick(
    conn: &Connection,
    now: NaiveDateTime,
    alert_type: AlertType,
    mut in_window: impl FnMut(NaiveDateTime) -> bool,
) -> Result<u32, EngineError> {
    let today = now.date();
    let cooldown_start = now - Duration::minutes(REMINDER_COOLDOWN_MINUTES);
    let mut created = 0u32;

    for rx in list_active_covering(conn, today)? {
        for item in &rx.items {
            for instance in expand_item(item, &rx.prescription, today, today) {
                if !in_window(instance.scheduled_at) {
                    continue;
                }
                let alert = NewAlert {
                    prescription_id: Some(rx.prescription.id),
                    patient_id: rx.prescription.patient_id,
                    doctor_id: Some(rx.prescription.doctor_id),
                    alert_type,
                    message: format!(
                        "Time to take {} {} at {}",
                        item.medication_name,
                        item.dosage,
                        instance.time_of_day.format("%H:%M"),
                    ),
                };
                if let Some(alert) =
                    insert_reminder_if_absent(conn, &alert, now, cooldown_start)?
                {
                    tracing::debug!(
                        alert_id = %alert.id,
                        patient_id = %alert.patient_id,
                        alert_type = alert_type.as_str(),
                        "Reminder created"
                    );
                    created += 1;
                }
            }
        }
    }
    Ok(created)
}

fn truncate_to_minute(at: NaiveDateTime) -> NaiveDateTime {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}
