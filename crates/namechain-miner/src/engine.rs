//! The mining coordinator.
//!
//! ```text
//!                 ┌────────────┐  bounded range channel
//!                 │ allocator  │──────────────┬──────────────┐
//!                 └────────────┘              ▼              ▼
//!                       ▲               ┌──────────┐   ┌──────────┐
//!                       │ done          │ worker 0 │…  │ worker N │
//!                       │               └──────────┘   └──────────┘
//!                 ┌────────────┐              │ events       │
//!                 │   Miner    │◀─────────────┴──────────────┘
//!                 └────────────┘
//! ```
//!
//! The first `Found` event wins. The coordinator then sets the cancel flag,
//! closes the done channel and joins every thread before returning.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use namechain_core::{format_hashes, Block, ConfigError, Difficulty, Digest, NonceRange, Searcher};

use crate::allocator::{run_allocator, NonceAllocator, FIRST_NONCE};
use crate::cancel::CancelToken;
use crate::config::MinerConfig;
use crate::progress::{LogProgress, ProgressSink};
use crate::stats::MiningStats;
use crate::worker::{LiveGuard, Worker, WorkerEvent};
use crate::{MiningError, LOG_TARGET};

/// Chunks queued per worker between the allocator and the pool.
pub const RANGE_QUEUE_DEPTH: usize = 2;

/// How long shutdown waits for workers to exit before detaching them.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// How often the coordinator checks an external [`CancelToken`].
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Result of successful mining
#[derive(Debug, Clone, PartialEq)]
pub struct MinedBlock {
    /// The finalized block
    pub block: Block,
    /// Its digest
    pub digest: Digest,
    /// Worker that found it
    pub worker: usize,
    /// Hashes computed by the whole pool during the search
    pub hashes: u64,
    /// Time taken to find the block
    pub elapsed: Duration,
}

impl MinedBlock {
    /// Get hashrate in H/s
    pub fn hashrate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.hashes as f64 / secs
        } else {
            0.0
        }
    }
}

/// Multi-threaded proof-of-work miner.
///
/// A `Miner` can be reused for any number of searches; every search starts
/// and fully tears down its own worker pool.
pub struct Miner {
    config: MinerConfig,
    progress: Arc<dyn ProgressSink>,
    live_workers: Arc<AtomicUsize>,
    stats: Mutex<MiningStats>,
    first_nonce: u128,
}

impl Miner {
    /// Create a miner, rejecting an unusable configuration up front.
    pub fn new(config: MinerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            progress: Arc::new(LogProgress),
            live_workers: Arc::new(AtomicUsize::new(0)),
            stats: Mutex::new(MiningStats::new()),
            first_nonce: FIRST_NONCE,
        })
    }

    /// Replace the progress sink (defaults to [`LogProgress`]).
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// Worker threads currently alive. Zero whenever no search is running.
    pub fn active_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }

    /// Snapshot of cumulative statistics.
    pub fn stats(&self) -> MiningStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Search for a nonce that gives `template` a digest meeting `difficulty`.
    ///
    /// Blocks until a block is found. Workers race over disjoint chunks, so
    /// the returned nonce is whichever match was reported first, not
    /// necessarily the smallest satisfying nonce. At infeasible difficulties
    /// this does not return in practical time.
    pub fn mine(&self, template: &Block, difficulty: Difficulty) -> Result<MinedBlock, MiningError> {
        self.mine_until(template, difficulty, &CancelToken::new())
    }

    /// Like [`mine`](Self::mine), but gives up with [`MiningError::Cancelled`]
    /// once `stop` is cancelled.
    pub fn mine_until(
        &self,
        template: &Block,
        difficulty: Difficulty,
        stop: &CancelToken,
    ) -> Result<MinedBlock, MiningError> {
        template.check_fields()?;

        let started = Instant::now();
        info!(
            target: LOG_TARGET,
            "mining {:?} on {} with {} workers, difficulty {} (~{} hashes)",
            template.name,
            template.previous,
            self.config.workers,
            difficulty,
            format_hashes(difficulty.expected_hashes())
        );

        let mut pool = Pool::start(self, template, difficulty)?;
        let outcome = pool.wait_for_result(stop);
        pool.shutdown();
        let hashes = pool.hashes;
        let elapsed = started.elapsed();

        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            Ok((worker, block, digest)) => {
                let mined = MinedBlock {
                    block,
                    digest,
                    worker,
                    hashes,
                    elapsed,
                };
                info!(
                    target: LOG_TARGET,
                    "block mined by worker {}: {} ({} hashes in {:.2?})",
                    worker,
                    mined.digest,
                    hashes,
                    elapsed
                );
                stats.record_block(&mined);
                Ok(mined)
            }
            Err(err) => {
                info!(target: LOG_TARGET, "mining stopped without a block: {}", err);
                stats.record_abandoned(hashes, elapsed);
                Err(err)
            }
        }
    }
}

/// Threads and channels of one search.
struct Pool {
    workers: Vec<Option<JoinHandle<()>>>,
    allocator: Option<JoinHandle<()>>,
    events: Receiver<WorkerEvent>,
    done: Option<Sender<()>>,
    cancel: CancelToken,
    exited: usize,
    faulted: usize,
    /// Sum of the hashes reported by exited workers.
    hashes: u64,
}

impl Pool {
    fn start(miner: &Miner, template: &Block, difficulty: Difficulty) -> Result<Self, MiningError> {
        let count = miner.config.workers;
        let (ranges_tx, ranges_rx) = bounded::<NonceRange>(count * RANGE_QUEUE_DEPTH);
        // Room for Found/Faulted plus Exited from every worker.
        let (events_tx, events_rx) = bounded(count * 2);
        let (done_tx, done_rx) = bounded::<()>(0);

        let mut pool = Pool {
            workers: Vec::with_capacity(count),
            allocator: None,
            events: events_rx,
            done: Some(done_tx),
            cancel: CancelToken::new(),
            exited: 0,
            faulted: 0,
            hashes: 0,
        };

        let searcher = Searcher::new(template, difficulty);
        for id in 0..count {
            let worker = Worker {
                id,
                searcher: searcher.clone(),
                ranges: ranges_rx.clone(),
                done: done_rx.clone(),
                events: events_tx.clone(),
                cancel: pool.cancel.clone(),
                progress: Arc::clone(&miner.progress),
                hashes: 0,
                _live: LiveGuard::new(&miner.live_workers),
            };
            // On failure `pool` is dropped, which stops what was started.
            let handle = thread::Builder::new()
                .name(format!("namechain-worker-{}", id))
                .spawn(move || worker.run())
                .map_err(MiningError::Spawn)?;
            pool.workers.push(Some(handle));
        }

        let allocator = NonceAllocator::new(miner.first_nonce, miner.config.chunk_size);
        let handle = thread::Builder::new()
            .name("namechain-allocator".to_string())
            .spawn(move || run_allocator(allocator, ranges_tx, done_rx))
            .map_err(MiningError::Spawn)?;
        pool.allocator = Some(handle);

        Ok(pool)
    }

    /// Block until a worker finds a block, every worker has exited, or `stop` fires.
    fn wait_for_result(&mut self, stop: &CancelToken) -> Result<(usize, Block, Digest), MiningError> {
        loop {
            if stop.is_cancelled() {
                return Err(MiningError::Cancelled);
            }

            match self.events.recv_timeout(STOP_POLL_INTERVAL) {
                Ok(WorkerEvent::Found {
                    worker,
                    block,
                    digest,
                }) => return Ok((worker, block, digest)),
                Ok(event) => {
                    self.observe(event);
                    if self.exited == self.workers.len() {
                        return Err(MiningError::PoolExhausted {
                            faulted: self.faulted,
                        });
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(MiningError::PoolExhausted {
                        faulted: self.faulted,
                    });
                }
            }
        }
    }

    fn observe(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Found { worker, block, .. } => {
                debug!(target: LOG_TARGET, "worker {} also found nonce {}, discarded", worker, block.nonce);
            }
            WorkerEvent::Faulted { worker, message } => {
                warn!(target: LOG_TARGET, "worker {} faulted: {}", worker, message);
                self.faulted += 1;
            }
            WorkerEvent::Exited { worker, hashes } => {
                self.exited += 1;
                self.hashes += hashes;
                if let Some(handle) = self.workers.get_mut(worker).and_then(Option::take) {
                    if handle.join().is_err() {
                        warn!(target: LOG_TARGET, "worker {} thread panicked", worker);
                    }
                }
            }
        }
    }

    /// Stop every thread, waiting up to [`SHUTDOWN_GRACE`] for workers.
    fn shutdown(&mut self) {
        self.cancel.cancel();
        drop(self.done.take());

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while self.exited < self.workers.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(event) => self.observe(event),
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        target: LOG_TARGET,
                        "{} workers still running after {:?}, detaching",
                        self.workers.len() - self.exited,
                        SHUTDOWN_GRACE
                    );
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // Senders are gone once a worker thread ends, so joining here is bounded.
        for (worker, slot) in self.workers.iter_mut().enumerate() {
            if let Some(handle) = slot.take() {
                if handle.is_finished() {
                    let _ = handle.join();
                } else {
                    debug!(target: LOG_TARGET, "detaching worker {}", worker);
                }
            }
        }

        if let Some(handle) = self.allocator.take() {
            if handle.join().is_err() {
                warn!(target: LOG_TARGET, "allocator thread panicked");
            }
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        if self.done.is_some() || self.allocator.is_some() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    fn template() -> Block {
        Block::template(Digest::of(b"genesis"), "Dominik").unwrap()
    }

    fn miner(workers: usize, chunk_size: u64) -> Miner {
        Miner::new(MinerConfig::with_workers(workers).chunk_size(chunk_size))
            .unwrap()
            .with_progress(Arc::new(crate::NoProgress))
    }

    fn assert_mined(mined: &MinedBlock, template: &Block, difficulty: Difficulty) {
        assert_eq!(mined.block.previous, template.previous);
        assert_eq!(mined.block.name, template.name);
        assert_eq!(mined.digest, mined.block.digest());
        assert!(mined.block.meets(difficulty));
        let zeros = "0".repeat(difficulty.target_bits() as usize);
        assert!(mined.digest.to_hex().starts_with(&zeros), "digest {}", mined.digest);
    }

    #[test]
    fn test_zero_difficulty_takes_a_chunk_start() {
        let miner = miner(4, 1_000);
        let template = template();
        let mined = miner.mine(&template, Difficulty::ZERO).unwrap();

        let nonce: u128 = mined.block.nonce.parse().unwrap();
        assert_eq!((nonce - FIRST_NONCE) % 1_000, 0);
        assert_mined(&mined, &template, Difficulty::ZERO);
        assert_eq!(miner.active_workers(), 0);
    }

    #[test]
    fn test_example_scenario() {
        let miner = miner(4, 10_000);
        let template = template();
        let difficulty = Difficulty::new(1).unwrap();

        let mined = miner.mine(&template, difficulty).unwrap();

        assert_eq!(mined.block.name, "Dominik");
        assert_eq!(mined.block.previous, Digest::of(b"genesis"));
        assert!(mined.digest.to_hex().starts_with('0'));
        assert!(mined.hashes >= 1);
    }

    #[test]
    fn test_pool_sizes_all_succeed_without_leaks() {
        let template = template();
        let difficulty = Difficulty::new(3).unwrap();

        for workers in [1, 4, 16] {
            let miner = miner(workers, 1_000);
            let mined = miner.mine(&template, difficulty).unwrap();
            assert_mined(&mined, &template, difficulty);
            assert!(mined.worker < workers);
            assert_eq!(miner.active_workers(), 0, "{} workers", workers);
        }
    }

    #[test]
    fn test_repeated_mining_chains_blocks() {
        let miner = miner(4, 5_000);
        let difficulty = Difficulty::new(2).unwrap();
        let mut tip = Block::new(Digest::of(b"genesis"), "Dominik", "lol");

        for _ in 0..5 {
            let template = Block::next_after(&tip, "Dominik").unwrap();
            let mined = miner.mine(&template, difficulty).unwrap();
            assert_mined(&mined, &template, difficulty);
            assert_eq!(miner.active_workers(), 0);
            tip = mined.block;
        }

        let stats = miner.stats();
        assert_eq!(stats.blocks_found, 5);
        assert!(stats.total_hashes >= 5);
        assert_eq!(stats.last_block, Some(tip));
    }

    #[test]
    fn test_single_worker_is_deterministic() {
        // sha256("<genesis> Dominik 62") = 00746d79..., the first two-zero nonce.
        let chunks = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&chunks);
        let miner = miner(1, 10).with_progress(Arc::new(move |_: &crate::Progress| {
            counter.fetch_add(1, Ordering::Relaxed);
        }));

        let mined = miner.mine(&template(), Difficulty::new(2).unwrap()).unwrap();

        assert_eq!(mined.block.nonce, "62");
        assert_eq!(mined.hashes, 62);
        assert_eq!(chunks.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn test_external_cancel() {
        let miner = miner(4, 1_000);
        let stop = CancelToken::new();
        let trigger = stop.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });

        let result = miner.mine_until(&template(), Difficulty::new(64).unwrap(), &stop);
        canceller.join().unwrap();

        assert!(matches!(result, Err(MiningError::Cancelled)));
        assert_eq!(miner.active_workers(), 0);
        assert_eq!(miner.stats().searches_abandoned, 1);
    }

    #[test]
    fn test_already_cancelled() {
        let miner = miner(2, 1_000);
        let stop = CancelToken::new();
        stop.cancel();

        let result = miner.mine_until(&template(), Difficulty::ZERO, &stop);
        assert!(matches!(result, Err(MiningError::Cancelled)));
        assert_eq!(miner.active_workers(), 0);
    }

    #[test]
    fn test_faulted_pool_is_reported() {
        let miner = miner(3, 10).with_progress(Arc::new(|_: &crate::Progress| {
            panic!("progress sink failure");
        }));

        let result = miner.mine(&template(), Difficulty::new(64).unwrap());

        assert!(matches!(result, Err(MiningError::PoolExhausted { faulted: 3 })));
        assert_eq!(miner.active_workers(), 0);
    }

    #[test]
    fn test_nonce_space_exhaustion_is_reported() {
        let mut miner = miner(2, 10);
        miner.first_nonce = u128::MAX - 100;

        let result = miner.mine(&template(), Difficulty::new(64).unwrap());

        assert!(matches!(result, Err(MiningError::PoolExhausted { faulted: 0 })));
        assert_eq!(miner.active_workers(), 0);
        // Every candidate below u128::MAX was hashed exactly once across the pool.
        assert_eq!(miner.stats().total_hashes, 100);
    }

    #[test]
    fn test_nonces_past_u64() {
        let mut miner = miner(2, 1_000);
        miner.first_nonce = u64::MAX as u128;

        let mined = miner.mine(&template(), Difficulty::new(1).unwrap()).unwrap();
        let nonce: u128 = mined.block.nonce.parse().unwrap();
        assert!(nonce >= u64::MAX as u128);
        assert_eq!(mined.digest, mined.block.digest());
    }

    #[test]
    fn test_invalid_template() {
        let miner = miner(2, 1_000);
        let template = Block::new(Digest::of(b"genesis"), "two words", "");

        let result = miner.mine(&template, Difficulty::ZERO);
        assert!(matches!(result, Err(MiningError::InvalidTemplate(_))));
        assert_eq!(miner.active_workers(), 0);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            Miner::new(MinerConfig::with_workers(0)),
            Err(ConfigError::NoWorkers)
        ));
        assert!(matches!(
            Miner::new(MinerConfig::default().chunk_size(0)),
            Err(ConfigError::ZeroChunkSize)
        ));
    }

    #[test]
    fn test_mined_block_hashrate() {
        let block = Block::new(Digest::ZERO, "a", "1");
        let mined = MinedBlock {
            digest: block.digest(),
            block,
            worker: 0,
            hashes: 500,
            elapsed: Duration::from_millis(250),
        };
        assert_eq!(mined.hashrate(), 2_000.0);
    }
}
