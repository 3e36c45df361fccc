//! Adherence log store — append-only intake events.
//!
//! Logs never carry a foreign key to a dose instance; the resolver
//! associates them by tolerance-window inference. The engine only ever
//! appends and reads here.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::error::EngineError;
use crate::models::adherence::AdherenceLog;
use crate::models::enums::IntakeStatus;

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Input for appending a log entry.
#[derive(Debug, Clone)]
pub struct NewAdherenceLog {
    pub prescription_id: Uuid,
    pub prescription_item_id: Option<Uuid>,
    pub patient_id: Uuid,
    pub taken_at: NaiveDateTime,
    pub status: IntakeStatus,
    pub amount: Option<String>,
    pub notes: Option<String>,
}

/// Filter for list/count queries. All fields optional and AND-combined.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub patient_id: Option<Uuid>,
    pub prescription_id: Option<Uuid>,
    pub prescription_item_id: Option<Uuid>,
    pub status: Option<IntakeStatus>,
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
}

/// Append one intake event. Returns the stored log.
pub fn insert_log(conn: &Connection, entry: &NewAdherenceLog) -> Result<AdherenceLog, EngineError> {
    let log_id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO adherence_logs (id, prescription_id, prescription_item_id, patient_id,
         taken_at, status, amount, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            log_id.to_string(),
            entry.prescription_id.to_string(),
            entry.prescription_item_id.map(|id| id.to_string()),
            entry.patient_id.to_string(),
            entry.taken_at.format(DATETIME_FMT).to_string(),
            entry.status.as_str(),
            entry.amount,
            entry.notes,
        ],
    )
    .map_err(DatabaseError::from)?;

    Ok(AdherenceLog {
        id: log_id,
        prescription_id: entry.prescription_id,
        prescription_item_id: entry.prescription_item_id,
        patient_id: entry.patient_id,
        taken_at: entry.taken_at,
        status: entry.status,
        amount: entry.amount.clone(),
        notes: entry.notes.clone(),
    })
}

/// Fetch logs matching the filter, ascending by taken_at.
pub fn fetch_logs_filtered(
    conn: &Connection,
    filter: &LogFilter,
) -> Result<Vec<AdherenceLog>, EngineError> {
    let (where_sql, params_vec) = build_where(filter);
    let sql = format!(
        "SELECT id, prescription_id, prescription_item_id, patient_id,
                taken_at, status, amount, notes
         FROM adherence_logs WHERE 1=1{where_sql}
         ORDER BY taken_at ASC, id ASC"
    );
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(&sql).map_err(DatabaseError::from)?;
    let logs = stmt
        .query_map(params_refs.as_slice(), map_log_row)
        .map_err(DatabaseError::from)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(DatabaseError::from)?;
    Ok(logs)
}

/// Count logs matching the filter.
pub fn count_logs_filtered(conn: &Connection, filter: &LogFilter) -> Result<u32, EngineError> {
    let (where_sql, params_vec) = build_where(filter);
    let sql = format!("SELECT COUNT(*) FROM adherence_logs WHERE 1=1{where_sql}");
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();

    let count = conn
        .query_row(&sql, params_refs.as_slice(), |row| row.get::<_, u32>(0))
        .map_err(DatabaseError::from)?;
    Ok(count)
}

fn build_where(filter: &LogFilter) -> (String, Vec<Box<dyn rusqlite::types::ToSql>>) {
    let mut sql = String::new();
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut param_idx = 1u32;

    if let Some(patient_id) = filter.patient_id {
        sql.push_str(&format!(" AND patient_id = ?{param_idx}"));
        params_vec.push(Box::new(patient_id.to_string()));
        param_idx += 1;
    }
    if let Some(prescription_id) = filter.prescription_id {
        sql.push_str(&format!(" AND prescription_id = ?{param_idx}"));
        params_vec.push(Box::new(prescription_id.to_string()));
        param_idx += 1;
    }
    if let Some(item_id) = filter.prescription_item_id {
        sql.push_str(&format!(" AND prescription_item_id = ?{param_idx}"));
        params_vec.push(Box::new(item_id.to_string()));
        param_idx += 1;
    }
    if let Some(status) = filter.status {
        sql.push_str(&format!(" AND status = ?{param_idx}"));
        params_vec.push(Box::new(status.as_str()));
        param_idx += 1;
    }
    if let Some(from) = filter.from {
        sql.push_str(&format!(" AND taken_at >= ?{param_idx}"));
        params_vec.push(Box::new(from.format(DATETIME_FMT).to_string()));
        param_idx += 1;
    }
    if let Some(to) = filter.to {
        sql.push_str(&format!(" AND taken_at <= ?{param_idx}"));
        params_vec.push(Box::new(to.format(DATETIME_FMT).to_string()));
        // param_idx incremented but not used after this
    }

    (sql, params_vec)
}

fn map_log_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AdherenceLog> {
    Ok(AdherenceLog {
        id: row
            .get::<_, String>(0)?
            .parse()
            .unwrap_or_else(|_| Uuid::nil()),
        prescription_id: row
            .get::<_, String>(1)?
            .parse()
            .unwrap_or_else(|_| Uuid::nil()),
        prescription_item_id: row
            .get::<_, Option<String>>(2)?
            .and_then(|s| s.parse().ok()),
        patient_id: row
            .get::<_, String>(3)?
            .parse()
            .unwrap_or_else(|_| Uuid::nil()),
        taken_at: NaiveDateTime::parse_from_str(&row.get::<_, String>(4)?, DATETIME_FMT)
            .unwrap_or_default(),
        status: row.get::<_, String>(5)?.parse().unwrap_or(IntakeStatus::Missed),
        amount: row.get(6)?,
        notes: row.get(7)?,
    })
}
