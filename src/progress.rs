//! Progress reporting for dispatcher runs

use crate::proxy::models::{RunSummary, ValidationOutcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Observer of validation progress. Never feeds back into the dispatcher.
pub trait ProgressSink: Send + Sync {
    /// Called once per completed candidate, in completion order
    fn update(&self, completed: usize, total: usize, outcome: &ValidationOutcome);

    /// Called once after the barrier and the final flush
    fn finish(&self, _summary: &RunSummary) {}
}

/// Sink that discards every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&self, _completed: usize, _total: usize, _outcome: &ValidationOutcome) {}
}

/// Sink that reports through `tracing`: every update at debug level and
/// every tenth of the run at info level.
#[derive(Debug, Default)]
pub struct LogProgress {
    last_decile: AtomicUsize,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for LogProgress {
    fn update(&self, completed: usize, total: usize, outcome: &ValidationOutcome) {
        debug!(
            completed,
            total,
            candidate = %outcome.candidate,
            success = outcome.success,
            "checked proxy"
        );

        if total == 0 {
            return;
        }
        let decile = completed * 10 / total;
        if self.last_decile.fetch_max(decile, Ordering::Relaxed) < decile {
            info!(
                "Checking proxies: {}% ({}/{})",
                completed * 100 / total,
                completed,
                total
            );
        }
    }

    fn finish(&self, summary: &RunSummary) {
        info!(
            "Checked {} proxies: {} working, {} failed",
            summary.total, summary.working, summary.failed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::proxy::models::{Candidate, ProxyType};

    #[test]
    fn test_log_progress_tracks_deciles() {
        let progress = LogProgress::new();
        let outcome = ValidationOutcome::failed(
            Candidate::new("1.2.3.4", 80, ProxyType::Http),
            ProbeError::Timeout,
        );

        for completed in 1..=20 {
            progress.update(completed, 20, &outcome);
        }
        assert_eq!(progress.last_decile.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_log_progress_ignores_empty_run() {
        let progress = LogProgress::new();
        let outcome = ValidationOutcome::failed(
            Candidate::new("1.2.3.4", 80, ProxyType::Http),
            ProbeError::Timeout,
        );
        progress.update(0, 0, &outcome);
        assert_eq!(progress.last_decile.load(Ordering::Relaxed), 0);
    }
}
