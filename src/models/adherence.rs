use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::IntakeStatus;

/// One patient-reported intake event. Append-only: the engine never updates
/// or deletes a log, and a log is tied to a dose instance only by inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdherenceLog {
    pub id: Uuid,
    pub prescription_id: Uuid,
    pub prescription_item_id: Option<Uuid>,
    pub patient_id: Uuid,
    pub taken_at: NaiveDateTime,
    pub status: IntakeStatus,
    pub amount: Option<String>,
    pub notes: Option<String>,
}
