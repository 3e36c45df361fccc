use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Adhera";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the application data directory
/// ~/Adhera/ on all platforms (single server-local clock assumed)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Adhera")
}

/// Path of the engine database file
pub fn database_path() -> PathBuf {
    app_data_dir().join("adhera.db")
}

/// Default tracing filter when RUST_LOG is unset
pub fn default_log_filter() -> &'static str {
    "info,adhera=debug"
}

// ═══════════════════════════════════════════
// Engine constants
// ═══════════════════════════════════════════

/// Tolerance when matching an intake log to a scheduled dose instance (±).
pub const MATCH_TOLERANCE_MINUTES: i64 = 30;

/// Horizon for "upcoming dose" reminders and `list_upcoming`.
pub const UPCOMING_HORIZON_MINUTES: i64 = 30;

/// Minimum gap before another reminder for the same
/// (prescription, patient, type) may be created.
pub const REMINDER_COOLDOWN_MINUTES: i64 = 60;

/// Trailing window for the low-adherence rate.
pub const LOW_ADHERENCE_LOOKBACK_DAYS: i64 = 7;

/// Strict threshold: alert only when rate < 0.70.
pub const LOW_ADHERENCE_THRESHOLD: f64 = 0.70;

/// Minimum gap before another low-adherence alert for the same
/// (patient, doctor) pair may be created.
pub const LOW_ADHERENCE_COOLDOWN_HOURS: i64 = 24;

/// Cadence of the due-now reminder tick.
pub const DUE_TICK_SECS: u64 = 60;

/// Cadence of the upcoming-dose reminder tick.
pub const UPCOMING_TICK_SECS: u64 = 30 * 60;

/// Cadence of the low-adherence detector tick.
pub const LOW_ADHERENCE_TICK_SECS: u64 = 24 * 60 * 60;
