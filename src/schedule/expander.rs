//! Dose instance expander — pure derivation of scheduled doses.
//!
//! Dose instances are never persisted. They are the cross-product of an
//! item's active date range and its times of day, bounded to a query
//! window, derived on every read. Identical inputs always yield identical
//! output; the deterministic composite key `{item}:{date}:{HH:MM}` is what
//! reminder dedup hangs off.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::enums::PrescriptionStatus;
use crate::models::prescription::{Prescription, PrescriptionItem};

/// One scheduled occurrence of taking a medication. Virtual: identified by
/// its composite key, never by a stored id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoseInstance {
    pub prescription_item_id: Uuid,
    pub date: NaiveDate,
    pub time_of_day: NaiveTime,
    pub scheduled_at: NaiveDateTime,
}

impl DoseInstance {
    /// Deterministic composite key, stable across derivations.
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.prescription_item_id,
            self.date,
            self.time_of_day.format("%H:%M")
        )
    }
}

/// Parse an item's times of day, dropping malformed entries with a warning.
/// Result is sorted ascending and deduplicated — expansion order depends
/// on it.
pub fn parse_dose_times(item_id: &Uuid, times_of_day: &[String]) -> Vec<NaiveTime> {
    let mut times: Vec<NaiveTime> = times_of_day
        .iter()
        .filter_map(|raw| match NaiveTime::parse_from_str(raw, "%H:%M") {
            Ok(t) => Some(t),
            Err(_) => {
                tracing::warn!(item_id = %item_id, time = %raw, "Skipping malformed time of day");
                None
            }
        })
        .collect();
    times.sort();
    times.dedup();
    times
}

/// Expand one prescription item into dose instances inside `[from, to]`.
///
/// The effective range is the intersection of the prescription's date
/// range, the item's `duration_days` bound and the query window. A
/// non-active prescription yields nothing. The sequence is lazy, finite,
/// restartable (`Clone`) and ascending by `scheduled_at`.
pub fn expand_item(
    item: &PrescriptionItem,
    prescription: &Prescription,
    from: NaiveDate,
    to: NaiveDate,
) -> impl Iterator<Item = DoseInstance> + Clone {
    let times = parse_dose_times(&item.id, &item.times_of_day);
    let item_id = item.id;

    let range = effective_range(item, prescription, from, to);
    let (start, days) = match range {
        Some((start, end)) => (start, (end - start).num_days() + 1),
        None => (from, 0),
    };

    (0..days).flat_map(move |offset| {
        let date = start + Duration::days(offset);
        times.clone().into_iter().map(move |time_of_day| DoseInstance {
            prescription_item_id: item_id,
            date,
            time_of_day,
            scheduled_at: date.and_time(time_of_day),
        })
    })
}

/// Expand an item over its entire active range (no query window).
pub fn expand_item_full(
    item: &PrescriptionItem,
    prescription: &Prescription,
) -> impl Iterator<Item = DoseInstance> + Clone {
    let item_end =
        prescription.start_date + Duration::days(i64::from(item.duration_days.max(1)) - 1);
    let far_end = prescription.end_date.unwrap_or(item_end);
    expand_item(item, prescription, prescription.start_date, far_end)
}

fn effective_range(
    item: &PrescriptionItem,
    prescription: &Prescription,
    from: NaiveDate,
    to: NaiveDate,
) -> Option<(NaiveDate, NaiveDate)> {
    if prescription.status != PrescriptionStatus::Active {
        return None;
    }

    let start = prescription.start_date.max(from);

    // duration_days counts scheduled days; zero means nothing is scheduled
    if item.duration_days == 0 {
        return None;
    }

    let mut end = to;
    if let Some(rx_end) = prescription.end_date {
        end = end.min(rx_end);
    }
    let item_end = prescription.start_date + Duration::days(i64::from(item.duration_days) - 1);
    end = end.min(item_end);

    if start > end {
        return None;
    }
    Some((start, end))
}
