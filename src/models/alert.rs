use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AlertType;

/// A reminder or warning surfaced to a patient/doctor.
///
/// State machine: created (unresolved) → resolved, terminal. The only
/// permitted mutation is flipping `resolved` false → true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub prescription_id: Option<Uuid>,
    pub patient_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub alert_type: AlertType,
    pub message: String,
    pub resolved: bool,
    pub created_at: NaiveDateTime,
}
