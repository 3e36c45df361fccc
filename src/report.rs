//! Adherence rate aggregator — summaries and trend buckets.
//!
//! `scheduled_doses` is the cheap dashboard proxy
//! Σ(frequency_per_day × duration_days) over in-scope items, deliberately
//! not a day-by-day expansion.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adherence_log::{count_logs_filtered, fetch_logs_filtered, LogFilter};
use crate::db::DatabaseError;
use crate::error::EngineError;
use crate::models::adherence::AdherenceLog;
use crate::models::enums::{IntakeStatus, TrendGroup};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdherenceSummary {
    pub scheduled_doses: u32,
    pub taken_doses: u32,
    pub rate: f64,
}

/// One bucket of the trend chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub bucket: String,
    pub taken: u32,
    pub missed: u32,
    pub skipped: u32,
    pub total: u32,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdherenceReport {
    pub summary: AdherenceSummary,
    pub logs: Vec<AdherenceLog>,
    pub trends: Vec<TrendPoint>,
}

/// Taken/scheduled ratio for one patient over a date range.
/// Rate is always within [0, 1] and 0 when nothing is scheduled.
pub fn adherence_summary(
    conn: &Connection,
    patient_id: &Uuid,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<AdherenceSummary, EngineError> {
    let scheduled_doses: u32 = conn
        .query_row(
            "SELECT COALESCE(SUM(i.frequency_per_day * i.duration_days), 0)
             FROM prescription_items i
             JOIN prescriptions p ON i.prescription_id = p.id
             WHERE p.patient_id = ?1 AND p.status = 'active'
               AND p.start_date <= ?2 AND (p.end_date IS NULL OR p.end_date >= ?3)",
            params![patient_id.to_string(), to.to_string(), from.to_string()],
            |row| row.get(0),
        )
        .map_err(DatabaseError::from)?;

    let taken_doses = count_logs_filtered(
        conn,
        &LogFilter {
            patient_id: Some(*patient_id),
            status: Some(IntakeStatus::Taken),
            from: from.and_hms_opt(0, 0, 0),
            to: to.and_hms_opt(23, 59, 59),
            ..Default::default()
        },
    )?;

    let rate = if scheduled_doses == 0 {
        0.0
    } else {
        (f64::from(taken_doses) / f64::from(scheduled_doses)).min(1.0)
    };

    Ok(AdherenceSummary {
        scheduled_doses,
        taken_doses,
        rate,
    })
}

/// Bucket a patient's logs by day, ISO week or month for trend charts.
/// Bucket rate = taken/total within the bucket, rounded to 2 decimals.
pub fn adherence_trends(
    conn: &Connection,
    patient_id: &Uuid,
    from: NaiveDate,
    to: NaiveDate,
    group_by: TrendGroup,
) -> Result<Vec<TrendPoint>, EngineError> {
    let logs = fetch_logs_filtered(
        conn,
        &LogFilter {
            patient_id: Some(*patient_id),
            from: from.and_hms_opt(0, 0, 0),
            to: to.and_hms_opt(23, 59, 59),
            ..Default::default()
        },
    )?;
    Ok(bucket_trends(&logs, group_by))
}

fn bucket_trends(logs: &[AdherenceLog], group_by: TrendGroup) -> Vec<TrendPoint> {
    let mut buckets: BTreeMap<String, (u32, u32, u32, u32)> = BTreeMap::new();
    for log in logs {
        let key = bucket_key(log.taken_at.date(), group_by);
        let counts = buckets.entry(key).or_default();
        counts.3 += 1;
        match log.status {
            IntakeStatus::Taken => counts.0 += 1,
            IntakeStatus::Missed => counts.1 += 1,
            IntakeStatus::Skipped => counts.2 += 1,
        }
    }

    buckets
        .into_iter()
        .map(|(bucket, (taken, missed, skipped, total))| TrendPoint {
            bucket,
            taken,
            missed,
            skipped,
            total,
            rate: if total == 0 {
                0.0
            } else {
                round2(f64::from(taken) / f64::from(total))
            },
        })
        .collect()
}

/// Combined report: summary, raw logs, trend buckets.
pub fn adherence_report(
    conn: &Connection,
    patient_id: &Uuid,
    from: NaiveDate,
    to: NaiveDate,
    group_by: TrendGroup,
) -> Result<AdherenceReport, EngineError> {
    let summary = adherence_summary(conn, patient_id, from, to)?;
    // One fetch feeds both the raw log listing and the trend buckets
    let logs = fetch_logs_filtered(
        conn,
        &LogFilter {
            patient_id: Some(*patient_id),
            from: from.and_hms_opt(0, 0, 0),
            to: to.and_hms_opt(23, 59, 59),
            ..Default::default()
        },
    )?;
    let trends = bucket_trends(&logs, group_by);
    Ok(AdherenceReport {
        summary,
        logs,
        trends,
    })
}

fn bucket_key(date: NaiveDate, group_by: TrendGroup) -> String {
    match group_by {
        TrendGroup::Day => date.format("%Y-%m-%d").to_string(),
        TrendGroup::Week => {
            let iso = date.iso_week();
            format!("{}-W{:02}", iso.year(), iso.week())
        }
        TrendGroup::Month => date.format("%Y-%m").to_string(),
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
