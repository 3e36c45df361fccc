//! Prescription repository — atomic create/replace, active listings.
//!
//! A prescription owns 1..n items (composition: deleting the prescription
//! deletes its items). Items are immutable except whole-set replace.
//! `times_of_day` is validated on write; malformed entries that slipped in
//! from older data still degrade gracefully at expansion time.

use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::enums::PrescriptionStatus;
use crate::models::prescription::{
    NewPrescription, NewPrescriptionItem, Prescription, PrescriptionItem, PrescriptionWithItems,
};

/// Upper bound on item duration accepted on write.
pub const MAX_DURATION_DAYS: u32 = 3650;

// ═══════════════════════════════════════════
// Validation
// ═══════════════════════════════════════════

/// Validate one item input. `times_of_day` must be 24-hour "HH:MM" and the
/// entry count must match `frequency_per_day`.
pub fn validate_item(item: &NewPrescriptionItem) -> Result<(), EngineError> {
    if item.frequency_per_day == 0 {
        return Err(EngineError::Validation(
            "frequency_per_day must be at least 1".into(),
        ));
    }
    if item.duration_days > MAX_DURATION_DAYS {
        return Err(EngineError::Validation(format!(
            "duration_days {} exceeds maximum {MAX_DURATION_DAYS}",
            item.duration_days
        )));
    }
    if item.times_of_day.is_empty() {
        return Err(EngineError::Validation("times_of_day is empty".into()));
    }
    if item.times_of_day.len() != item.frequency_per_day as usize {
        return Err(EngineError::Validation(format!(
            "frequency_per_day is {} but {} times_of_day given",
            item.frequency_per_day,
            item.times_of_day.len()
        )));
    }
    for t in &item.times_of_day {
        if NaiveTime::parse_from_str(t, "%H:%M").is_err() {
            return Err(EngineError::Validation(format!(
                "invalid time of day '{t}' (expected HH:MM)"
            )));
        }
    }
    Ok(())
}

fn validate_prescription(input: &NewPrescription) -> Result<(), EngineError> {
    if input.items.is_empty() {
        return Err(EngineError::Validation(
            "a prescription requires at least one item".into(),
        ));
    }
    if let Some(end) = input.end_date {
        if end < input.start_date {
            return Err(EngineError::Validation(format!(
                "end_date {end} precedes start_date {}",
                input.start_date
            )));
        }
    }
    for item in &input.items {
        validate_item(item)?;
    }
    Ok(())
}

// ═══════════════════════════════════════════
// Repository functions
// ═══════════════════════════════════════════

/// Create a prescription and its items in one transaction.
pub fn create_prescription(
    conn: &mut Connection,
    input: &NewPrescription,
) -> Result<PrescriptionWithItems, EngineError> {
    validate_prescription(input)?;

    let prescription_id = Uuid::new_v4();
    let tx = conn.transaction().map_err(crate::db::DatabaseError::from)?;

    tx.execute(
        "INSERT INTO prescriptions (id, patient_id, doctor_id, status, start_date, end_date, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            prescription_id.to_string(),
            input.patient_id.to_string(),
            input.doctor_id.to_string(),
            PrescriptionStatus::Active.as_str(),
            input.start_date.to_string(),
            input.end_date.map(|d| d.to_string()),
            input.notes,
        ],
    )
    .map_err(crate::db::DatabaseError::from)?;

    let mut items = Vec::with_capacity(input.items.len());
    for item in &input.items {
        items.push(insert_item(&tx, &prescription_id, item)?);
    }

    tx.commit().map_err(crate::db::DatabaseError::from)?;

    Ok(PrescriptionWithItems {
        prescription: Prescription {
            id: prescription_id,
            patient_id: input.patient_id,
            doctor_id: input.doctor_id,
            status: PrescriptionStatus::Active,
            start_date: input.start_date,
            end_date: input.end_date,
            notes: input.notes.clone(),
        },
        items,
    })
}

fn insert_item(
    conn: &Connection,
    prescription_id: &Uuid,
    item: &NewPrescriptionItem,
) -> Result<PrescriptionItem, EngineError> {
    let item_id = Uuid::new_v4();
    let times_json =
        serde_json::to_string(&item.times_of_day).unwrap_or_else(|_| "[]".to_string());

    conn.execute(
        "INSERT INTO prescription_items (id, prescription_id, medication_id, medication_name,
         dosage, frequency_per_day, times_of_day, duration_days, route, instructions)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            item_id.to_string(),
            prescription_id.to_string(),
            item.medication_id.to_string(),
            item.medication_name,
            item.dosage,
            item.frequency_per_day,
            times_json,
            item.duration_days,
            item.route,
            item.instructions,
        ],
    )
    .map_err(crate::db::DatabaseError::from)?;

    Ok(PrescriptionItem {
        id: item_id,
        prescription_id: *prescription_id,
        medication_id: item.medication_id,
        medication_name: item.medication_name.clone(),
        dosage: item.dosage.clone(),
        frequency_per_day: item.frequency_per_day,
        times_of_day: item.times_of_day.clone(),
        duration_days: item.duration_days,
        route: item.route.clone(),
        instructions: item.instructions.clone(),
    })
}

/// Replace a prescription's item set wholesale, in one transaction.
pub fn replace_items(
    conn: &mut Connection,
    prescription_id: &Uuid,
    items: &[NewPrescriptionItem],
) -> Result<Vec<PrescriptionItem>, EngineError> {
    if items.is_empty() {
        return Err(EngineError::Validation(
            "a prescription requires at least one item".into(),
        ));
    }
    for item in items {
        validate_item(item)?;
    }
    if fetch_prescription(conn, prescription_id)?.is_none() {
        return Err(EngineError::not_found("prescription", prescription_id));
    }

    let tx = conn.transaction().map_err(crate::db::DatabaseError::from)?;
    tx.execute(
        "DELETE FROM prescription_items WHERE prescription_id = ?1",
        params![prescription_id.to_string()],
    )
    .map_err(crate::db::DatabaseError::from)?;

    let mut created = Vec::with_capacity(items.len());
    for item in items {
        created.push(insert_item(&tx, prescription_id, item)?);
    }
    tx.commit().map_err(crate::db::DatabaseError::from)?;
    Ok(created)
}

/// Move a prescription to a new status. The lifecycle is one-way:
/// active → completed/cancelled, never back.
pub fn update_status(
    conn: &Connection,
    prescription_id: &Uuid,
    status: PrescriptionStatus,
) -> Result<(), EngineError> {
    if status == PrescriptionStatus::Active {
        return Err(EngineError::Validation(
            "a prescription cannot be moved back to active".into(),
        ));
    }
    let changed = conn
        .execute(
            "UPDATE prescriptions SET status = ?1 WHERE id = ?2 AND status = 'active'",
            params![status.as_str(), prescription_id.to_string()],
        )
        .map_err(crate::db::DatabaseError::from)?;
    if changed == 0 {
        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM prescriptions WHERE id = ?1",
                params![prescription_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(crate::db::DatabaseError::from)?;
        return match current {
            None => Err(EngineError::not_found("prescription", prescription_id)),
            Some(current) => Err(EngineError::Conflict(format!(
                "prescription {prescription_id} is {current} and cannot change status"
            ))),
        };
    }
    Ok(())
}

/// Fetch a single prescription with its items.
pub fn fetch_prescription(
    conn: &Connection,
    prescription_id: &Uuid,
) -> Result<Option<PrescriptionWithItems>, EngineError> {
    let result = conn.query_row(
        "SELECT id, patient_id, doctor_id, status, start_date, end_date, notes
         FROM prescriptions WHERE id = ?1",
        params![prescription_id.to_string()],
        map_prescription_row,
    );

    match result {
        Ok(prescription) => {
            let items = fetch_items_for(conn, prescription_id)?;
            Ok(Some(PrescriptionWithItems {
                prescription,
                items,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(crate::db::DatabaseError::from(e).into()),
    }
}

/// Fetch a single prescription item.
pub fn fetch_item(
    conn: &Connection,
    item_id: &Uuid,
) -> Result<Option<PrescriptionItem>, EngineError> {
    let result = conn.query_row(
        "SELECT id, prescription_id, medication_id, medication_name, dosage,
                frequency_per_day, times_of_day, duration_days, route, instructions
         FROM prescription_items WHERE id = ?1",
        params![item_id.to_string()],
        map_item_row,
    );
    match result {
        Ok(item) => Ok(Some(item)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(crate::db::DatabaseError::from(e).into()),
    }
}

/// Active prescriptions for one patient whose date range covers `date`.
pub fn list_active_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
    date: NaiveDate,
) -> Result<Vec<PrescriptionWithItems>, EngineError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, patient_id, doctor_id, status, start_date, end_date, notes
             FROM prescriptions
             WHERE patient_id = ?1 AND status = 'active'
               AND start_date <= ?2 AND (end_date IS NULL OR end_date >= ?2)
             ORDER BY start_date ASC, id ASC",
        )
        .map_err(crate::db::DatabaseError::from)?;
    let prescriptions = stmt
        .query_map(
            params![patient_id.to_string(), date.to_string()],
            map_prescription_row,
        )
        .map_err(crate::db::DatabaseError::from)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(crate::db::DatabaseError::from)?;

    attach_items(conn, prescriptions)
}

/// Active prescriptions (all patients) covering `date` — used by the
/// reminder ticks.
pub fn list_active_covering(
    conn: &Connection,
    date: NaiveDate,
) -> Result<Vec<PrescriptionWithItems>, EngineError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, patient_id, doctor_id, status, start_date, end_date, notes
             FROM prescriptions
             WHERE status = 'active'
               AND start_date <= ?1 AND (end_date IS NULL OR end_date >= ?1)
             ORDER BY patient_id ASC, start_date ASC, id ASC",
        )
        .map_err(crate::db::DatabaseError::from)?;
    let prescriptions = stmt
        .query_map(params![date.to_string()], map_prescription_row)
        .map_err(crate::db::DatabaseError::from)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(crate::db::DatabaseError::from)?;

    attach_items(conn, prescriptions)
}

/// Active prescriptions for a patient whose date range overlaps
/// [from, to] — the aggregator's in-scope set.
pub fn list_active_overlapping(
    conn: &Connection,
    patient_id: &Uuid,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<PrescriptionWithItems>, EngineError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, patient_id, doctor_id, status, start_date, end_date, notes
             FROM prescriptions
             WHERE patient_id = ?1 AND status = 'active'
               AND start_date <= ?2 AND (end_date IS NULL OR end_date >= ?3)
             ORDER BY start_date ASC, id ASC",
        )
        .map_err(crate::db::DatabaseError::from)?;
    let prescriptions = stmt
        .query_map(
            params![patient_id.to_string(), to.to_string(), from.to_string()],
            map_prescription_row,
        )
        .map_err(crate::db::DatabaseError::from)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(crate::db::DatabaseError::from)?;

    attach_items(conn, prescriptions)
}

/// Distinct patients holding at least one active prescription.
pub fn patients_with_active_prescriptions(conn: &Connection) -> Result<Vec<Uuid>, EngineError> {
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT patient_id FROM prescriptions
             WHERE status = 'active' ORDER BY patient_id ASC",
        )
        .map_err(crate::db::DatabaseError::from)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(row
                .get::<_, String>(0)?
                .parse()
                .unwrap_or_else(|_| Uuid::nil()))
        })
        .map_err(crate::db::DatabaseError::from)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(crate::db::DatabaseError::from)?;
    Ok(rows)
}

// ═══════════════════════════════════════════
// Row mapping
// ═══════════════════════════════════════════

fn map_prescription_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Prescription> {
    Ok(Prescription {
        id: row
            .get::<_, String>(0)?
            .parse()
            .unwrap_or_else(|_| Uuid::nil()),
        patient_id: row
            .get::<_, String>(1)?
            .parse()
            .unwrap_or_else(|_| Uuid::nil()),
        doctor_id: row
            .get::<_, String>(2)?
            .parse()
            .unwrap_or_else(|_| Uuid::nil()),
        status: row
            .get::<_, String>(3)?
            .parse()
            .unwrap_or(PrescriptionStatus::Cancelled),
        start_date: NaiveDate::parse_from_str(&row.get::<_, String>(4)?, "%Y-%m-%d")
            .unwrap_or_default(),
        end_date: row
            .get::<_, Option<String>>(5)?
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        notes: row.get(6)?,
    })
}

fn map_item_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PrescriptionItem> {
    let times_json: String = row.get(6)?;
    Ok(PrescriptionItem {
        id: row
            .get::<_, String>(0)?
            .parse()
            .unwrap_or_else(|_| Uuid::nil()),
        prescription_id: row
            .get::<_, String>(1)?
            .parse()
            .unwrap_or_else(|_| Uuid::nil()),
        medication_id: row
            .get::<_, String>(2)?
            .parse()
            .unwrap_or_else(|_| Uuid::nil()),
        medication_name: row.get(3)?,
        dosage: row.get(4)?,
        frequency_per_day: row.get(5)?,
        times_of_day: serde_json::from_str(&times_json).unwrap_or_default(),
        duration_days: row.get(7)?,
        route: row.get(8)?,
        instructions: row.get(9)?,
    })
}

fn fetch_items_for(
    conn: &Connection,
    prescription_id: &Uuid,
) -> Result<Vec<PrescriptionItem>, EngineError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, prescription_id, medication_id, medication_name, dosage,
                    frequency_per_day, times_of_day, duration_days, route, instructions
             FROM prescription_items WHERE prescription_id = ?1
             ORDER BY medication_name ASC, id ASC",
        )
        .map_err(crate::db::DatabaseError::from)?;
    let items = stmt
        .query_map(params![prescription_id.to_string()], map_item_row)
        .map_err(crate::db::DatabaseError::from)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(crate::db::DatabaseError::from)?;
    Ok(items)
}

fn attach_items(
    conn: &Connection,
    prescriptions: Vec<Prescription>,
) -> Result<Vec<PrescriptionWithItems>, EngineError> {
    let mut out = Vec::with_capacity(prescriptions.len());
    for prescription in prescriptions {
        let items = fetch_items_for(conn, &prescription.id)?;
        out.push(PrescriptionWithItems {
            prescription,
            items,
        });
    }
    Ok(out)
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
