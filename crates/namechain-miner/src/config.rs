//! Miner configuration.

use namechain_core::ConfigError;
use serde::{Deserialize, Serialize};

/// Worker count used when none is given.
pub const DEFAULT_WORKERS: usize = 10;

/// Nonces handed to a worker per allocation.
pub const DEFAULT_CHUNK_SIZE: u64 = 10_000_000;

/// Mining configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Number of worker threads
    pub workers: usize,
    /// Nonces per chunk handed out by the allocator
    pub chunk_size: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl MinerConfig {
    /// Create config for single-threaded mining
    pub fn single_thread() -> Self {
        Self {
            workers: 1,
            ..Default::default()
        }
    }

    /// Create config with specific worker count
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }

    /// Replace the chunk size
    pub fn chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        Ok(())
    }
}
