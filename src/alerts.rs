//! Alert store — reminders and warnings with cooldown-windowed dedup.
//!
//! Creation goes through conditional inserts (`INSERT ... WHERE NOT EXISTS`)
//! so a repeated timer tick cannot duplicate an alert even when two ticks
//! race: the dedup predicate and the insert are one statement. Resolution is
//! a conditional update, so `resolved` only ever moves false → true.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::error::EngineError;
use crate::models::alert::Alert;
use crate::models::enums::AlertType;

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Input for creating an alert.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub prescription_id: Option<Uuid>,
    pub patient_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub alert_type: AlertType,
    pub message: String,
}

/// Create a reminder alert unless an unresolved alert with the same
/// (prescription, patient, type) was created at or after `cooldown_start`.
/// Returns the alert if created, `None` if suppressed.
pub fn insert_reminder_if_absent(
    conn: &Connection,
    alert: &NewAlert,
    created_at: NaiveDateTime,
    cooldown_start: NaiveDateTime,
) -> Result<Option<Alert>, EngineError> {
    let alert_id = Uuid::new_v4();
    let changed = conn
        .execute(
            "INSERT INTO alerts (id, prescription_id, patient_id, doctor_id,
                                 alert_type, message, resolved, created_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, 0, ?7
             WHERE NOT EXISTS (
                 SELECT 1 FROM alerts
                 WHERE patient_id = ?3 AND alert_type = ?5 AND resolved = 0
                   AND created_at >= ?8
                   AND (prescription_id = ?2 OR (prescription_id IS NULL AND ?2 IS NULL))
             )",
            params![
                alert_id.to_string(),
                alert.prescription_id.map(|id| id.to_string()),
                alert.patient_id.to_string(),
                alert.doctor_id.map(|id| id.to_string()),
                alert.alert_type.as_str(),
                alert.message,
                created_at.format(DATETIME_FMT).to_string(),
                cooldown_start.format(DATETIME_FMT).to_string(),
            ],
        )
        .map_err(DatabaseError::from)?;

    if changed == 0 {
        return Ok(None);
    }
    Ok(Some(built(alert_id, alert, created_at)))
}

/// Create a low-adherence alert unless an unresolved one for the same
/// (patient, doctor) pair was created at or after `cooldown_start`. The
/// referenced prescription is informational and excluded from the dedup key.
pub fn insert_low_adherence_if_absent(
    conn: &Connection,
    alert: &NewAlert,
    created_at: NaiveDateTime,
    cooldown_start: NaiveDateTime,
) -> Result<Option<Alert>, EngineError> {
    let alert_id = Uuid::new_v4();
    let changed = conn
        .execute(
            "INSERT INTO alerts (id, prescription_id, patient_id, doctor_id,
                                 alert_type, message, resolved, created_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, 0, ?7
             WHERE NOT EXISTS (
                 SELECT 1 FROM alerts
                 WHERE patient_id = ?3 AND alert_type = ?5 AND resolved = 0
                   AND created_at >= ?8
                   AND (doctor_id = ?4 OR (doctor_id IS NULL AND ?4 IS NULL))
             )",
            params![
                alert_id.to_string(),
                alert.prescription_id.map(|id| id.to_string()),
                alert.patient_id.to_string(),
                alert.doctor_id.map(|id| id.to_string()),
                alert.alert_type.as_str(),
                alert.message,
                created_at.format(DATETIME_FMT).to_string(),
                cooldown_start.format(DATETIME_FMT).to_string(),
            ],
        )
        .map_err(DatabaseError::from)?;

    if changed == 0 {
        return Ok(None);
    }
    Ok(Some(built(alert_id, alert, created_at)))
}

/// Unconditional insert — manual doctor warnings bypass dedup windows.
pub fn create_manual_warning(
    conn: &Connection,
    alert: &NewAlert,
    created_at: NaiveDateTime,
) -> Result<Alert, EngineError> {
    let alert_id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO alerts (id, prescription_id, patient_id, doctor_id,
                             alert_type, message, resolved, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
        params![
            alert_id.to_string(),
            alert.prescription_id.map(|id| id.to_string()),
            alert.patient_id.to_string(),
            alert.doctor_id.map(|id| id.to_string()),
            alert.alert_type.as_str(),
            alert.message,
            created_at.format(DATETIME_FMT).to_string(),
        ],
    )
    .map_err(DatabaseError::from)?;
    Ok(built(alert_id, alert, created_at))
}

/// Find the newest unresolved alert for (patient, type), optionally narrowed
/// to a prescription and a creation cutoff.
pub fn find_unresolved_alert(
    conn: &Connection,
    patient_id: &Uuid,
    alert_type: AlertType,
    prescription_id: Option<&Uuid>,
    created_after: Option<NaiveDateTime>,
) -> Result<Option<Alert>, EngineError> {
    let mut sql = String::from(
        "SELECT id, prescription_id, patient_id, doctor_id, alert_type, message,
                resolved, created_at
         FROM alerts
         WHERE patient_id = ?1 AND alert_type = ?2 AND resolved = 0",
    );
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![
        Box::new(patient_id.to_string()),
        Box::new(alert_type.as_str()),
    ];
    let mut param_idx = 3u32;

    if let Some(rx_id) = prescription_id {
        sql.push_str(&format!(" AND prescription_id = ?{param_idx}"));
        params_vec.push(Box::new(rx_id.to_string()));
        param_idx += 1;
    }
    if let Some(cutoff) = created_after {
        sql.push_str(&format!(" AND created_at >= ?{param_idx}"));
        params_vec.push(Box::new(cutoff.format(DATETIME_FMT).to_string()));
    }
    sql.push_str(" ORDER BY created_at DESC LIMIT 1");

    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let alert = conn
        .query_row(&sql, params_refs.as_slice(), map_alert_row)
        .optional()
        .map_err(DatabaseError::from)?;
    Ok(alert)
}

/// Unresolved alerts for a patient, newest first.
pub fn list_unresolved_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Alert>, EngineError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, prescription_id, patient_id, doctor_id, alert_type, message,
                    resolved, created_at
             FROM alerts WHERE patient_id = ?1 AND resolved = 0
             ORDER BY created_at DESC, id ASC",
        )
        .map_err(DatabaseError::from)?;
    let alerts = stmt
        .query_map(params![patient_id.to_string()], map_alert_row)
        .map_err(DatabaseError::from)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(DatabaseError::from)?;
    Ok(alerts)
}

/// Resolve one alert. Conditional on `resolved = 0`, so re-resolving is a
/// no-op; returns whether this call flipped it.
pub fn resolve_alert(conn: &Connection, alert_id: &Uuid) -> Result<bool, EngineError> {
    let changed = conn
        .execute(
            "UPDATE alerts SET resolved = 1 WHERE id = ?1 AND resolved = 0",
            params![alert_id.to_string()],
        )
        .map_err(DatabaseError::from)?;
    Ok(changed > 0)
}

/// Bulk-resolve unresolved missed-dose alerts for a prescription. Invoked
/// when a taken log arrives for that prescription.
pub fn resolve_missed_dose_alerts(
    conn: &Connection,
    prescription_id: &Uuid,
) -> Result<u32, EngineError> {
    let changed = conn
        .execute(
            "UPDATE alerts SET resolved = 1
             WHERE prescription_id = ?1 AND alert_type = ?2 AND resolved = 0",
            params![
                prescription_id.to_string(),
                AlertType::MissedDose.as_str()
            ],
        )
        .map_err(DatabaseError::from)?;
    Ok(changed as u32)
}

fn built(alert_id: Uuid, alert: &NewAlert, created_at: NaiveDateTime) -> Alert {
    Alert {
        id: alert_id,
        prescription_id: alert.prescription_id,
        patient_id: alert.patient_id,
        doctor_id: alert.doctor_id,
        alert_type: alert.alert_type,
        message: alert.message.clone(),
        resolved: false,
        created_at,
    }
}

fn map_alert_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Alert> {
    Ok(Alert {
        id: row
            .get::<_, String>(0)?
            .parse()
            .unwrap_or_else(|_| Uuid::nil()),
        prescription_id: row
            .get::<_, Option<String>>(1)?
            .and_then(|s| s.parse().ok()),
        patient_id: row
            .get::<_, String>(2)?
            .parse()
            .unwrap_or_else(|_| Uuid::nil()),
        doctor_id: row
            .get::<_, Option<String>>(3)?
            .and_then(|s| s.parse().ok()),
        alert_type: row.get::<_, String>(4)?.parse().unwrap_or(AlertType::Other),
        message: row.get(5)?,
        resolved: row.get::<_, i32>(6)? != 0,
        created_at: NaiveDateTime::parse_from_str(&row.get::<_, String>(7)?, DATETIME_FMT)
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::testutil::dt;
    use chrono::Duration;

    fn reminder(patient_id: Uuid, prescription_id: Uuid) -> NewAlert {
        NewAlert {
            prescription_id: Some(prescription_id),
            patient_id,
            doctor_id: None,
            alert_type: AlertType::MissedDose,
            message: "Time to take Metformin 500mg at 08:00".into(),
        }
    }

    #[test]
    fn conditional_insert_suppresses_within_cooldown() {
        let conn = open_memory_database().unwrap();
        let patient_id = Uuid::new_v4();
        let rx_id = Uuid::new_v4();
        let now = dt("2024-01-01 08:00");
        let cooldown = now - Duration::minutes(60);

        let first = insert_reminder_if_absent(&conn, &reminder(patient_id, rx_id), now, cooldown)
            .unwrap();
        assert!(first.is_some());

        // Same tick re-run: suppressed
        let second = insert_reminder_if_absent(&conn, &reminder(patient_id, rx_id), now, cooldown)
            .unwrap();
        assert!(second.is_none());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM alerts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn conditional_insert_allows_after_cooldown() {
        let conn = open_memory_database().unwrap();
        let patient_id = Uuid::new_v4();
        let rx_id = Uuid::new_v4();

        let first_now = dt("2024-01-01 08:00");
        insert_reminder_if_absent(
            &conn,
            &reminder(patient_id, rx_id),
            first_now,
            first_now - Duration::minutes(60),
        )
        .unwrap()
        .unwrap();

        // 90 minutes later the earlier alert is outside the window
        let later = dt("2024-01-01 09:30");
        let created = insert_reminder_if_absent(
            &conn,
            &reminder(patient_id, rx_id),
            later,
            later - Duration::minutes(60),
        )
        .unwrap();
        assert!(created.is_some());
    }

    #[test]
    fn resolved_alert_does_not_block_insert() {
        let conn = open_memory_database().unwrap();
        let patient_id = Uuid::new_v4();
        let rx_id = Uuid::new_v4();
        let now = dt("2024-01-01 08:00");
        let cooldown = now - Duration::minutes(60);

        let first = insert_reminder_if_absent(&conn, &reminder(patient_id, rx_id), now, cooldown)
            .unwrap()
            .unwrap();
        assert!(resolve_alert(&conn, &first.id).unwrap());

        // Dedup only considers unresolved alerts
        let second = insert_reminder_if_absent(&conn, &reminder(patient_id, rx_id), now, cooldown)
            .unwrap();
        assert!(second.is_some());
    }

    #[test]
    fn different_prescription_not_deduped() {
        let conn = open_memory_database().unwrap();
        let patient_id = Uuid::new_v4();
        let now = dt("2024-01-01 08:00");
        let cooldown = now - Duration::minutes(60);

        insert_reminder_if_absent(&conn, &reminder(patient_id, Uuid::new_v4()), now, cooldown)
            .unwrap()
            .unwrap();
        let other = insert_reminder_if_absent(
            &conn,
            &reminder(patient_id, Uuid::new_v4()),
            now,
            cooldown,
        )
        .unwrap();
        assert!(other.is_some());
    }

    #[test]
    fn resolve_is_monotonic_and_idempotent() {
        let conn = open_memory_database().unwrap();
        let patient_id = Uuid::new_v4();
        let created = create_manual_warning(
            &conn,
            &NewAlert {
                prescription_id: None,
                patient_id,
                doctor_id: Some(Uuid::new_v4()),
                alert_type: AlertType::Other,
                message: "Check blood pressure before next dose".into(),
            },
            dt("2024-01-01 10:00"),
        )
        .unwrap();

        assert!(resolve_alert(&conn, &created.id).unwrap());
        // Second resolve is a no-op
        assert!(!resolve_alert(&conn, &created.id).unwrap());

        let resolved: i32 = conn
            .query_row(
                "SELECT resolved FROM alerts WHERE id = ?1",
                params![created.id.to_string()],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(resolved, 1);
        assert!(list_unresolved_for_patient(&conn, &patient_id)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn bulk_resolve_missed_dose_only() {
        let conn = open_memory_database().unwrap();
        let patient_id = Uuid::new_v4();
        let rx_id = Uuid::new_v4();
        let now = dt("2024-01-01 08:00");

        insert_reminder_if_absent(
            &conn,
            &reminder(patient_id, rx_id),
            now,
            now - Duration::minutes(60),
        )
        .unwrap()
        .unwrap();
        create_manual_warning(
            &conn,
            &NewAlert {
                prescription_id: Some(rx_id),
                patient_id,
                doctor_id: None,
                alert_type: AlertType::Other,
                message: "Take with food".into(),
            },
            now,
        )
        .unwrap();

        let resolved = resolve_missed_dose_alerts(&conn, &rx_id).unwrap();
        assert_eq!(resolved, 1);

        let remaining = list_unresolved_for_patient(&conn, &patient_id).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].alert_type, AlertType::Other);
    }

    #[test]
    fn low_adherence_dedup_ignores_prescription() {
        let conn = open_memory_database().unwrap();
        let patient_id = Uuid::new_v4();
        let doctor_id = Uuid::new_v4();
        let now = dt("2024-01-01 06:00");
        let cooldown = now - Duration::hours(24);

        let alert = |rx: Uuid| NewAlert {
            prescription_id: Some(rx),
            patient_id,
            doctor_id: Some(doctor_id),
            alert_type: AlertType::LowAdherence,
            message: "Adherence over the last 7 days is 20%".into(),
        };

        assert!(
            insert_low_adherence_if_absent(&conn, &alert(Uuid::new_v4()), now, cooldown)
                .unwrap()
                .is_some()
        );
        // Different referenced prescription, same (patient, doctor): suppressed
        assert!(
            insert_low_adherence_if_absent(&conn, &alert(Uuid::new_v4()), now, cooldown)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn find_unresolved_respects_cutoff() {
        let conn = open_memory_database().unwrap();
        let patient_id = Uuid::new_v4();
        let rx_id = Uuid::new_v4();
        let created_at = dt("2024-01-01 08:00");
        insert_reminder_if_absent(
            &conn,
            &reminder(patient_id, rx_id),
            created_at,
            created_at - Duration::minutes(60),
        )
        .unwrap()
        .unwrap();

        let found = find_unresolved_alert(
            &conn,
            &patient_id,
            AlertType::MissedDose,
            Some(&rx_id),
            Some(dt("2024-01-01 07:30")),
        )
        .unwrap();
        assert!(found.is_some());

        let too_late = find_unresolved_alert(
            &conn,
            &patient_id,
            AlertType::MissedDose,
            Some(&rx_id),
            Some(dt("2024-01-01 08:30")),
        )
        .unwrap();
        assert!(too_late.is_none());
    }
}
