//! Intake confirmation — the patient/doctor-facing write path.
//!
//! Appends an adherence log after checking the prescription is known,
//! active and owns the item. A taken log bulk-resolves the prescription's
//! outstanding missed-dose alerts.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use uuid::Uuid;

use crate::adherence_log::{insert_log, NewAdherenceLog};
use crate::alerts::resolve_missed_dose_alerts;
use crate::error::EngineError;
use crate::models::adherence::AdherenceLog;
use crate::models::enums::{IntakeStatus, PrescriptionStatus};
use crate::prescriptions::{fetch_item, fetch_prescription};

/// Intake confirmation request. The engine trusts `patient_id` — role
/// checks live in the calling layer.
#[derive(Debug, Clone)]
pub struct IntakeRequest {
    pub patient_id: Uuid,
    pub prescription_id: Uuid,
    pub prescription_item_id: Uuid,
    pub status: IntakeStatus,
    pub amount: Option<String>,
    pub notes: Option<String>,
}

pub fn confirm_intake(
    conn: &Connection,
    request: &IntakeRequest,
    taken_at: NaiveDateTime,
) -> Result<AdherenceLog, EngineError> {
    let rx = fetch_prescription(conn, &request.prescription_id)?
        .ok_or_else(|| EngineError::not_found("prescription", request.prescription_id))?;

    if rx.prescription.status != PrescriptionStatus::Active {
        return Err(EngineError::Conflict(format!(
            "prescription {} is {}, adherence can only be logged against active prescriptions",
            request.prescription_id,
            rx.prescription.status.as_str()
        )));
    }
    if rx.prescription.patient_id != request.patient_id {
        return Err(EngineError::Conflict(format!(
            "prescription {} does not belong to patient {}",
            request.prescription_id, request.patient_id
        )));
    }

    let item = fetch_item(conn, &request.prescription_item_id)?
        .ok_or_else(|| EngineError::not_found("prescription item", request.prescription_item_id))?;
    if item.prescription_id != request.prescription_id {
        return Err(EngineError::not_found(
            "prescription item",
            request.prescription_item_id,
        ));
    }

    let log = insert_log(
        conn,
        &NewAdherenceLog {
            prescription_id: request.prescription_id,
            prescription_item_id: Some(request.prescription_item_id),
            patient_id: request.patient_id,
            taken_at,
            status: request.status,
            amount: request.amount.clone(),
            notes: request.notes.clone(),
        },
    )?;

    if request.status == IntakeStatus::Taken {
        let resolved = resolve_missed_dose_alerts(conn, &request.prescription_id)?;
        if resolved > 0 {
            tracing::debug!(
                prescription_id = %request.prescription_id,
                resolved,
                "Taken log resolved outstanding missed-dose alerts"
            );
        }
    }

    Ok(log)
}
