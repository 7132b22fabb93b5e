//! Background escalation sweep.
//!
//! Spawns a thread that runs the missed-action sweep over all active patients
//! every `sweep_interval`. The sweep is idempotent, so a run that overlaps a
//! manual `POST /api/cron/escalation-sweep` only absorbs or skips.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core_state::{CoreError, CoreState};
use crate::escalation::SweepCounts;

/// Sleep granularity for shutdown responsiveness.
const SLEEP_GRANULARITY: Duration = Duration::from_millis(250);

/// Handle for the background sweep thread. Dropping it stops and joins the thread.
pub struct SweepSchedulerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl SweepSchedulerHandle {
    /// Request shutdown. A sweep already running completes first.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for SweepSchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// Start the sweep thread. Returns `None` when the interval is zero (disabled).
pub fn start_sweep_scheduler(state: Arc<CoreState>) -> Option<SweepSchedulerHandle> {
    let interval = state.config.sweep_interval;
    if interval.is_zero() {
        tracing::info!("Background escalation sweep disabled");
        return None;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();

    let handle = std::thread::spawn(move || {
        tracing::info!("Background escalation sweep started (every {}s)", interval.as_secs());
        scheduler_loop(&state, interval, &flag);
    });

    Some(SweepSchedulerHandle {
        shutdown,
        handle: Some(handle),
    })
}

fn scheduler_loop(state: &CoreState, interval: Duration, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::Relaxed) {
        let mut slept = Duration::ZERO;
        while slept < interval {
            if shutdown.load(Ordering::Relaxed) {
                tracing::info!("Background escalation sweep shutting down");
                return;
            }
            let step = SLEEP_GRANULARITY.min(interval - slept);
            std::thread::sleep(step);
            slept += step;
        }

        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        if let Err(e) = run_sweep_once(state) {
            tracing::error!(error = %e, "Background escalation sweep failed");
        }
    }
    tracing::info!("Background escalation sweep shutting down");
}

/// One sweep at the current patient-local time.
pub fn run_sweep_once(state: &CoreState) -> Result<SweepCounts, CoreError> {
    let conn = state.open_db()?;
    Ok(state.engine(&conn).sweep(state.local_now())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;

    fn state(dir: &tempfile::TempDir, interval: Duration) -> Arc<CoreState> {
        let state = CoreState::new(ServiceConfig {
            db_path: dir.path().join("sidiya.db"),
            sweep_interval: interval,
            ..ServiceConfig::default()
        });
        state.initialize().unwrap();
        Arc::new(state)
    }

    #[test]
    fn zero_interval_disables_scheduler() {
        let dir = tempfile::tempdir().unwrap();
        assert!(start_sweep_scheduler(state(&dir, Duration::ZERO)).is_none());
    }

    #[test]
    fn drop_stops_thread_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let handle = start_sweep_scheduler(state(&dir, Duration::from_secs(3600))).unwrap();
        let started = std::time::Instant::now();
        drop(handle);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn run_once_over_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        let counts = run_sweep_once(&state(&dir, Duration::ZERO)).unwrap();
        assert_eq!(counts.checked, 0);
        assert_eq!(counts.opened, 0);
    }

    #[test]
    fn run_once_checks_active_patients() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, Duration::ZERO);
        let conn = state.open_db().unwrap();
        let enrolled = state.local_now().date() - chrono::Duration::days(3);
        crate::db::repository::test_support::make_patient(&conn, "+919800000001", enrolled);

        let counts = run_sweep_once(&state).unwrap();
        assert_eq!(counts.checked, 1);
        assert_eq!(counts.failed, 0);
    }
}
