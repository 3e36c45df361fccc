//! Periodic task runner on plain threads.
//!
//! Each task runs on its own thread with a sleep-first loop. Sleep happens
//! in short slices so a shutdown request is observed within a few seconds
//! rather than a full interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::EngineError;

const SLEEP_GRANULARITY_SECS: u64 = 5;

/// Handle to a running periodic task. Dropping the handle requests
/// shutdown and joins the thread.
pub struct TaskHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Background task thread panicked");
            }
        }
    }
}

/// Spawn a named periodic task. `tick` returns how many alerts (or other
/// units of work) it produced; failures are logged and the loop continues.
pub fn spawn_periodic<F>(name: &'static str, interval_secs: u64, mut tick: F) -> TaskHandle
where
    F: FnMut() -> Result<u32, EngineError> + Send + 'static,
{
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);

    let handle = thread::Builder::new()
        .name(format!("adhera-{name}"))
        .spawn(move || {
            tracing::info!(task = name, interval_secs, "Background task started");
            loop {
                if sleep_interruptible(&flag, interval_secs) {
                    break;
                }
                match tick() {
                    Ok(0) => tracing::debug!(task = name, "Tick complete, nothing to do"),
                    Ok(produced) => {
                        tracing::info!(task = name, produced, "Tick complete")
                    }
                    Err(e) => tracing::error!(task = name, error = %e, "Tick failed"),
                }
            }
            tracing::info!(task = name, "Background task stopped");
        })
        .unwrap_or_else(|e| panic!("failed to spawn background task {name}: {e}"));

    TaskHandle {
        shutdown,
        handle: Some(handle),
    }
}

/// Sleep for `secs` in granularity slices. Returns true if shutdown was
/// requested during the wait.
fn sleep_interruptible(flag: &AtomicBool, secs: u64) -> bool {
    let mut remaining = secs;
    while remaining > 0 {
        if flag.load(Ordering::SeqCst) {
            return true;
        }
        let slice = remaining.min(SLEEP_GRANULARITY_SECS);
        thread::sleep(Duration::from_secs(slice));
        remaining -= slice;
    }
    flag.load(Ordering::SeqCst)
}
