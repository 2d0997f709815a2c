//! Per-job progress reporting.
//!
//! [`ProgressReporter`] wraps the caller's sink and enforces the reporting
//! contract: values are strictly increasing, `100` is only emitted by
//! [`ProgressReporter::complete`], and nothing is emitted after completion
//! or failure.

use parking_lot::Mutex;
use std::sync::Arc;

/// Admission checkpoint reported when a job starts running.
pub const ADMITTED: u8 = 10;
/// Terminal value reported on success.
pub const COMPLETE: u8 = 100;

/// Callback receiving a progress percentage (0..=100).
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

#[derive(Debug, Default)]
struct ProgressState {
    last: u8,
    finished: bool,
}

/// Monotonic progress reporter for one job.
pub struct ProgressReporter {
    sink: Option<ProgressFn>,
    state: Mutex<ProgressState>,
}

impl ProgressReporter {
    /// Create a reporter forwarding to the given callback.
    pub fn new(sink: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self::from_fn(Some(Arc::new(sink)))
    }

    /// Create a reporter from an optional shared callback.
    pub fn from_fn(sink: Option<ProgressFn>) -> Self {
        Self {
            sink,
            state: Mutex::new(ProgressState::default()),
        }
    }

    /// Create a reporter that discards all reports.
    pub fn noop() -> Self {
        Self::from_fn(None)
    }

    /// Report intermediate progress. Values are capped at 99 and ignored
    /// unless they exceed the last reported value.
    pub fn report(&self, pct: u8) {
        self.emit(pct.min(COMPLETE - 1));
    }

    /// Report successful completion (100).
    pub fn complete(&self) {
        self.emit(COMPLETE);
    }

    /// Mark the job failed. Later reports are dropped.
    pub fn fail(&self) {
        self.state.lock().finished = true;
    }

    /// Last value emitted (0 if none).
    pub fn last(&self) -> u8 {
        self.state.lock().last
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    fn emit(&self, pct: u8) {
        {
            let mut state = self.state.lock();
            if state.finished || pct <= state.last {
                return;
            }
            state.last = pct;
            if pct == COMPLETE {
                state.finished = true;
            }
        }
        if let Some(ref sink) = self.sink {
            sink(pct);
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ProgressReporter")
            .field("last", &state.last)
            .field("finished", &state.finished)
            .finish_non_exhaustive()
    }
}
