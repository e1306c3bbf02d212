//! Progress reporting side-channel.
//!
//! Workers report once per finished chunk. Reports are informational and
//! never affect the search.

use log::debug;
use namechain_core::NonceRange;

use crate::LOG_TARGET;

/// One chunk scanned without a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Worker that scanned the chunk.
    pub worker: usize,
    /// The chunk.
    pub range: NonceRange,
    /// Hashes computed for this chunk.
    pub hashes: u64,
    /// Hashes computed by this worker during the current search.
    pub worker_total: u64,
}

/// Receiver of progress reports. Called from worker threads.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: &Progress);
}

impl<F> ProgressSink for F
where
    F: Fn(&Progress) + Send + Sync,
{
    fn on_progress(&self, progress: &Progress) {
        self(progress)
    }
}

/// Logs each report at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_progress(&self, progress: &Progress) {
        debug!(
            target: LOG_TARGET,
            "worker {} scanned {} ({} hashes, {} this search)",
            progress.worker,
            progress.range,
            progress.hashes,
            progress.worker_total
        );
    }
}

/// Discards reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _progress: &Progress) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_closure_sink() {
        let seen = AtomicU64::new(0);
        let sink = |p: &Progress| {
            seen.fetch_add(p.hashes, Ordering::Relaxed);
        };
        let report = Progress {
            worker: 1,
            range: NonceRange::new(1, 11),
            hashes: 10,
            worker_total: 10,
        };
        sink.on_progress(&report);
        sink.on_progress(&report);
        assert_eq!(seen.load(Ordering::Relaxed), 20);

        LogProgress.on_progress(&report);
        NoProgress.on_progress(&report);
    }
}
