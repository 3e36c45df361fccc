//! Adherence resolver — tolerance-window matching of logs to instances.
//!
//! The resolver reports only observed state. An instance with no matching
//! log stays pending, even after its time has passed; `missed` arises
//! solely from an explicit log.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::MATCH_TOLERANCE_MINUTES;
use crate::models::adherence::AdherenceLog;
use crate::models::enums::DoseStatus;

use super::expander::DoseInstance;

/// A dose instance with its resolved status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedDose {
    pub instance: DoseInstance,
    pub status: DoseStatus,
    pub matched_log_id: Option<Uuid>,
}

/// Resolve per-instance statuses from a day's logs.
///
/// A log matches an instance when the item ids are equal and the reported
/// time is within ±30 minutes of the scheduled time. Each log is consumed
/// by at most one instance: candidate pairs are assigned closest-first
/// (ties broken by earlier taken_at, then log id, then earlier scheduled
/// time, for determinism), so a single 08:15 log cannot mark both an 08:00
/// and an 08:30 dose taken. Logs whose item id is absent or not in
/// `known_items` are excluded with a warning.
pub fn resolve_statuses(
    instances: impl IntoIterator<Item = DoseInstance>,
    logs: &[AdherenceLog],
    known_items: &HashSet<Uuid>,
) -> Vec<ResolvedDose> {
    let usable: Vec<&AdherenceLog> = logs
        .iter()
        .filter(|log| match log.prescription_item_id {
            Some(item_id) if known_items.contains(&item_id) => true,
            Some(item_id) => {
                tracing::warn!(log_id = %log.id, item_id = %item_id,
                    "Adherence log references unknown prescription item; excluded");
                false
            }
            None => {
                tracing::debug!(log_id = %log.id,
                    "Adherence log has no prescription item; not matchable");
                false
            }
        })
        .collect();

    let instances: Vec<DoseInstance> = instances.into_iter().collect();

    let mut candidates: Vec<(i64, &AdherenceLog, usize)> = Vec::new();
    for (idx, instance) in instances.iter().enumerate() {
        for log in usable
            .iter()
            .filter(|log| log.prescription_item_id == Some(instance.prescription_item_id))
        {
            let distance = (log.taken_at - instance.scheduled_at).num_minutes().abs();
            if distance <= MATCH_TOLERANCE_MINUTES {
                candidates.push((distance, log, idx));
            }
        }
    }
    candidates.sort_by_key(|(distance, log, idx)| {
        (*distance, log.taken_at, log.id, instances[*idx].scheduled_at)
    });

    let mut matched: Vec<Option<&AdherenceLog>> = vec![None; instances.len()];
    let mut consumed: HashSet<Uuid> = HashSet::new();
    for (_, log, idx) in candidates {
        if matched[idx].is_some() || consumed.contains(&log.id) {
            continue;
        }
        matched[idx] = Some(log);
        consumed.insert(log.id);
    }

    instances
        .into_iter()
        .zip(matched)
        .map(|(instance, log)| match log {
            Some(log) => ResolvedDose {
                instance,
                status: DoseStatus::from(log.status),
                matched_log_id: Some(log.id),
            },
            None => ResolvedDose {
                instance,
                status: DoseStatus::Pending,
                matched_log_id: None,
            },
        })
        .collect()
}
