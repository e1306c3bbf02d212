//! Multi-threaded NameChain miner.
//!
//! This crate provides:
//! - A nonce range allocator feeding disjoint chunks to workers
//! - A fixed-size pool of worker threads scanning those chunks
//! - A coordinator that returns the first block found and stops the rest
//! - Pluggable progress reporting and cumulative statistics
//!
//! ```no_run
//! use namechain_core::{Block, Difficulty, Digest};
//! use namechain_miner::{Miner, MinerConfig};
//!
//! let template = Block::template(Digest::of(b"genesis"), "Dominik")?;
//! let miner = Miner::new(MinerConfig::with_workers(4))?;
//! let mined = miner.mine(&template, Difficulty::new(4)?)?;
//! println!("{}", mined.block);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod allocator;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod progress;
pub mod stats;
mod worker;

pub use allocator::{NonceAllocator, FIRST_NONCE};
pub use cancel::CancelToken;
pub use config::{MinerConfig, DEFAULT_CHUNK_SIZE, DEFAULT_WORKERS};
pub use engine::{MinedBlock, Miner, RANGE_QUEUE_DEPTH, SHUTDOWN_GRACE};
pub use progress::{LogProgress, NoProgress, Progress, ProgressSink};
pub use stats::{format_hash_rate, MiningStats};

use namechain_core::{BlockError, ConfigError};
use thiserror::Error;

pub(crate) const LOG_TARGET: &str = "namechain::miner";

/// Mining errors
#[derive(Debug, Error)]
pub enum MiningError {
    /// Invalid miner configuration
    #[error("invalid miner configuration: {0}")]
    Config(#[from] ConfigError),

    /// Template cannot be serialized unambiguously
    #[error("invalid block template: {0}")]
    InvalidTemplate(#[from] BlockError),

    /// Mining was cancelled by the caller
    #[error("mining cancelled")]
    Cancelled,

    /// Every worker exited without a block
    #[error("all workers exited without finding a block ({faulted} faulted)")]
    PoolExhausted { faulted: usize },

    /// A mining thread could not be started
    #[error("failed to spawn mining thread: {0}")]
    Spawn(#[source] std::io::Error),
}
