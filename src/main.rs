//! Adhera daemon entry point.
//!
//! Opens (and migrates) the database, then runs the three periodic tasks
//! until interrupted. Each task opens its own connection; every write is
//! idempotent via its dedup key, so ticks need no cross-thread coordination.

use std::thread;
use std::time::Duration;

use chrono::Local;
use tracing_subscriber::EnvFilter;

use adhera::config;
use adhera::db::open_database;
use adhera::tasks::spawn_periodic;
use adhera::tasks::low_adherence::run_low_adherence_tick;
use adhera::tasks::reminder::{run_due_tick, run_upcoming_tick};
use adhera::EngineError;

fn main() -> Result<(), EngineError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    let data_dir = config::app_data_dir();
    std::fs::create_dir_all(&data_dir).map_err(|e| {
        EngineError::Validation(format!("cannot create data directory {data_dir:?}: {e}"))
    })?;

    let db_path = config::database_path();
    // Opening once up front runs migrations before any task thread starts.
    let _bootstrap = open_database(&db_path)?;
    tracing::info!(
        version = config::APP_VERSION,
        path = %db_path.display(),
        "{} engine started",
        config::APP_NAME
    );

    let due_path = db_path.clone();
    let due = spawn_periodic("due-reminders", config::DUE_TICK_SECS, move || {
        let conn = open_database(&due_path)?;
        run_due_tick(&conn, Local::now().naive_local())
    });

    let upcoming_path = db_path.clone();
    let upcoming = spawn_periodic(
        "upcoming-reminders",
        config::UPCOMING_TICK_SECS,
        move || {
            let conn = open_database(&upcoming_path)?;
            run_upcoming_tick(&conn, Local::now().naive_local())
        },
    );

    let adherence_path = db_path.clone();
    let adherence = spawn_periodic(
        "low-adherence",
        config::LOW_ADHERENCE_TICK_SECS,
        move || {
            let conn = open_database(&adherence_path)?;
            run_low_adherence_tick(&conn, Local::now().naive_local())
        },
    );

    // Handles join their threads on drop; park the main thread until killed.
    let _handles = (due, upcoming, adherence);
    loop {
        thread::sleep(Duration::from_secs(3600));
    }
}
