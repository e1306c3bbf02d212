//! Mining worker implementation
//!
//! Each worker pulls nonce chunks from the allocator and scans them with a
//! [`Searcher`] until it finds a block, the search is cancelled or the range
//! feed closes.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{select, Receiver, Sender};
use log::{debug, info, warn};
use namechain_core::{Block, Digest, NonceRange, SearchOutcome, Searcher};

use crate::cancel::CancelToken;
use crate::progress::{Progress, ProgressSink};
use crate::LOG_TARGET;

/// Message from a worker to the coordinator.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    /// A block meeting the difficulty.
    Found {
        worker: usize,
        block: Block,
        digest: Digest,
    },
    /// The worker panicked. Always followed by `Exited`.
    Faulted { worker: usize, message: String },
    /// Last message a worker sends, with every hash it computed.
    Exited { worker: usize, hashes: u64 },
}

/// Counts a worker as live from creation until its thread drops it.
#[derive(Debug)]
pub(crate) struct LiveGuard {
    live: Arc<AtomicUsize>,
}

impl LiveGuard {
    pub(crate) fn new(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        LiveGuard {
            live: Arc::clone(live),
        }
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct Worker {
    pub(crate) id: usize,
    pub(crate) searcher: Searcher,
    pub(crate) ranges: Receiver<NonceRange>,
    pub(crate) done: Receiver<()>,
    pub(crate) events: Sender<WorkerEvent>,
    pub(crate) cancel: CancelToken,
    pub(crate) progress: Arc<dyn ProgressSink>,
    pub(crate) hashes: u64,
    pub(crate) _live: LiveGuard,
}

impl Worker {
    /// Thread entry point.
    ///
    /// Panics in the search are caught and reported as `Faulted`; `Exited`
    /// is sent on every path and carries the hashes of completed chunks.
    pub(crate) fn run(mut self) {
        let id = self.id;

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.scan())) {
            let message = panic_message(payload.as_ref());
            warn!(target: LOG_TARGET, "worker {} faulted: {}", id, message);
            let _ = self.events.send(WorkerEvent::Faulted {
                worker: id,
                message,
            });
        }

        let hashes = self.hashes;
        debug!(target: LOG_TARGET, "worker {} exiting after {} hashes", id, hashes);
        let _ = self.events.send(WorkerEvent::Exited { worker: id, hashes });
    }

    fn scan(&mut self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            // `None` once the feed is closed or shutdown has been signalled.
            let next = select! {
                recv(self.ranges) -> msg => msg.ok(),
                recv(self.done) -> _ => None,
            };
            let Some(range) = next else {
                break;
            };

            let cancel = &self.cancel;
            let outcome = self.searcher.search(range, || cancel.is_cancelled());
            let chunk_hashes = outcome.hashes();
            self.hashes += chunk_hashes;

            match outcome {
                SearchOutcome::Found { block, digest, .. } => {
                    info!(
                        target: LOG_TARGET,
                        "worker {} found nonce {} in {}: {}",
                        self.id,
                        block.nonce,
                        range,
                        digest
                    );
                    let _ = self.events.send(WorkerEvent::Found {
                        worker: self.id,
                        block,
                        digest,
                    });
                    break;
                }
                SearchOutcome::Exhausted { .. } => {
                    self.progress.on_progress(&Progress {
                        worker: self.id,
                        range,
                        hashes: chunk_hashes,
                        worker_total: self.hashes,
                    });
                }
                SearchOutcome::Interrupted { .. } => break,
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use namechain_core::Difficulty;
    use std::sync::atomic::AtomicU64;

    struct Harness {
        ranges: Sender<NonceRange>,
        done: Sender<()>,
        events: Receiver<WorkerEvent>,
        cancel: CancelToken,
        live: Arc<AtomicUsize>,
    }

    fn worker(difficulty: u32, progress: Arc<dyn ProgressSink>) -> (Worker, Harness) {
        let (ranges_tx, ranges_rx) = bounded(4);
        let (done_tx, done_rx) = bounded(0);
        let (events_tx, events_rx) = bounded(4);
        let cancel = CancelToken::new();
        let live = Arc::new(AtomicUsize::new(0));
        let template = Block::template(Digest::of(b"genesis"), "Dominik").unwrap();

        let worker = Worker {
            id: 7,
            searcher: Searcher::new(&template, Difficulty::new(difficulty).unwrap()),
            ranges: ranges_rx,
            done: done_rx,
            events: events_tx,
            cancel: cancel.clone(),
            progress,
            hashes: 0,
            _live: LiveGuard::new(&live),
        };
        let harness = Harness {
            ranges: ranges_tx,
            done: done_tx,
            events: events_rx,
            cancel,
            live,
        };
        (worker, harness)
    }

    #[test]
    fn test_worker_reports_found_then_exited() {
        let (worker, harness) = worker(1, Arc::new(crate::NoProgress));
        harness.ranges.send(NonceRange::new(1, 11)).unwrap();
        harness.ranges.send(NonceRange::new(11, 21)).unwrap();
        assert_eq!(harness.live.load(Ordering::SeqCst), 1);

        worker.run();

        match harness.events.recv().unwrap() {
            WorkerEvent::Found { worker, block, digest } => {
                assert_eq!(worker, 7);
                assert_eq!(block.nonce, "19");
                assert_eq!(digest, block.digest());
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(
            harness.events.recv().unwrap(),
            WorkerEvent::Exited { worker: 7, hashes: 19 }
        ));
        assert_eq!(harness.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_worker_reports_progress_per_chunk() {
        let reports = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&reports);
        let sink = move |p: &Progress| {
            assert_eq!(p.hashes, 10);
            counter.fetch_add(1, Ordering::Relaxed);
        };
        let (worker, harness) = worker(64, Arc::new(sink));
        harness.ranges.send(NonceRange::new(1, 11)).unwrap();
        harness.ranges.send(NonceRange::new(11, 21)).unwrap();
        drop(harness.ranges);

        worker.run();

        assert_eq!(reports.load(Ordering::Relaxed), 2);
        assert!(matches!(
            harness.events.recv().unwrap(),
            WorkerEvent::Exited { hashes: 20, .. }
        ));
    }

    #[test]
    fn test_worker_stops_on_done() {
        let (worker, harness) = worker(64, Arc::new(crate::NoProgress));
        drop(harness.done);

        worker.run();

        assert!(matches!(
            harness.events.recv().unwrap(),
            WorkerEvent::Exited { hashes: 0, .. }
        ));
        drop(harness.ranges);
    }

    #[test]
    fn test_worker_stops_on_cancel() {
        let (worker, harness) = worker(64, Arc::new(crate::NoProgress));
        harness.cancel.cancel();
        harness.ranges.send(NonceRange::new(1, 1_000_000)).unwrap();

        worker.run();

        assert!(matches!(
            harness.events.recv().unwrap(),
            WorkerEvent::Exited { hashes: 0, .. }
        ));
        drop(harness.done);
    }

    #[test]
    fn test_worker_panic_is_reported() {
        let sink = |_: &Progress| panic!("sink exploded");
        let (worker, harness) = worker(64, Arc::new(sink));
        harness.ranges.send(NonceRange::new(1, 3)).unwrap();

        worker.run();

        match harness.events.recv().unwrap() {
            WorkerEvent::Faulted { worker, message } => {
                assert_eq!(worker, 7);
                assert_eq!(message, "sink exploded");
            }
            other => panic!("unexpected event {:?}", other),
        }
        // The chunk was fully hashed before the sink panicked.
        assert!(matches!(
            harness.events.recv().unwrap(),
            WorkerEvent::Exited { worker: 7, hashes: 2 }
        ));
        assert_eq!(harness.live.load(Ordering::SeqCst), 0);
    }
}
