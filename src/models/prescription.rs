use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::PrescriptionStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub status: PrescriptionStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl Prescription {
    /// Whether the prescription's date range covers the given date.
    /// An open-ended prescription (no end_date) covers everything from start.
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.start_date && self.end_date.map_or(true, |end| date <= end)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionItem {
    pub id: Uuid,
    pub prescription_id: Uuid,
    pub medication_id: Uuid,
    pub medication_name: String,
    pub dosage: String,
    pub frequency_per_day: u32,
    pub times_of_day: Vec<String>,
    pub duration_days: u32,
    pub route: Option<String>,
    pub instructions: Option<String>,
}

/// A prescription together with its owned items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionWithItems {
    pub prescription: Prescription,
    pub items: Vec<PrescriptionItem>,
}

/// Input for creating a prescription (items are created atomically with it).
#[derive(Debug, Clone, Deserialize)]
pub struct NewPrescription {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub items: Vec<NewPrescriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPrescriptionItem {
    pub medication_id: Uuid,
    pub medication_name: String,
    pub dosage: String,
    pub frequency_per_day: u32,
    pub times_of_day: Vec<String>,
    pub duration_days: u32,
    pub route: Option<String>,
    pub instructions: Option<String>,
}
