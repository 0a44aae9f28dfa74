//! Batch progress tracking.
//!
//! One owned handle per runner, polled by a route handler while the
//! background loop updates it after every outcome. The snapshot carries
//! an ETA extrapolated from the mean per-job duration so far.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

#[derive(Debug, Default)]
struct BatchState {
    is_running: bool,
    total_jobs: usize,
    completed_jobs: usize,
    failed_jobs: usize,
    started_at: Option<DateTime<Utc>>,
    started_instant: Option<Instant>,
}

/// Serializable snapshot for polling.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatusSnapshot {
    pub is_running: bool,
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_secs: Option<u64>,
    pub progress_percent: u8,
}

/// Shared batch progress state. Cloning shares the same state.
#[derive(Clone, Default)]
pub struct BatchStatusHandle {
    state: Arc<Mutex<BatchState>>,
}

impl BatchStatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Poisoning only happens if a panicking thread held the lock; the
    /// counters are still usable, so recover the guard.
    fn lock(&self) -> std::sync::MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claims the runner for a new batch. Returns false while a batch is
    /// still active — only one batch runs at a time.
    pub fn try_start(&self) -> bool {
        let mut state = self.lock();
        if state.is_running {
            return false;
        }
        *state = BatchState {
            is_running: true,
            total_jobs: 0,
            completed_jobs: 0,
            failed_jobs: 0,
            started_at: Some(Utc::now()),
            started_instant: Some(Instant::now()),
        };
        true
    }

    /// Fixes the job count once reservation decided what is in the batch.
    pub fn set_total(&self, total: usize) {
        let mut state = self.lock();
        state.total_jobs = total;
    }

    pub fn record_success(&self) {
        let mut state = self.lock();
        state.completed_jobs += 1;
        settle_if_done(&mut state);
    }

    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.failed_jobs += 1;
        settle_if_done(&mut state);
    }

    /// Marks the batch inactive regardless of counters (abandoned batch,
    /// reservation failure).
    pub fn finish(&self) {
        let mut state = self.lock();
        state.is_running = false;
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_running
    }

    pub fn snapshot(&self) -> BatchStatusSnapshot {
        let state = self.lock();
        let processed = state.completed_jobs + state.failed_jobs;

        let progress_percent = if state.total_jobs == 0 {
            0
        } else {
            ((processed * 100) / state.total_jobs).min(100) as u8
        };

        let (estimated_end_time, remaining_secs) = match (state.started_instant, state.is_running)
        {
            (Some(started), true) if processed > 0 && processed < state.total_jobs => {
                let elapsed = started.elapsed();
                let per_job = elapsed / processed as u32;
                let remaining = per_job * (state.total_jobs - processed) as u32;
                let secs = remaining.as_secs();
                let end = Utc::now() + ChronoDuration::seconds(secs as i64);
                (Some(end), Some(secs))
            }
            _ => (None, None),
        };

        BatchStatusSnapshot {
            is_running: state.is_running,
            total_jobs: state.total_jobs,
            completed_jobs: state.completed_jobs,
            failed_jobs: state.failed_jobs,
            started_at: state.started_at,
            estimated_end_time,
            remaining_secs,
            progress_percent,
        }
    }
}

/// A batch is inactive once every job has an outcome.
fn settle_if_done(state: &mut BatchState) {
    if state.total_jobs > 0 && state.completed_jobs + state.failed_jobs >= state.total_jobs {
        state.is_running = false;
    }
}
