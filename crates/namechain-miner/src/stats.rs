//! Cumulative mining statistics.

use std::time::Duration;

use namechain_core::{Block, Digest};
use serde::{Deserialize, Serialize};

use crate::engine::MinedBlock;

/// Mining statistics across every search run by one [`Miner`](crate::Miner).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MiningStats {
    /// Total hashes computed.
    pub total_hashes: u64,
    /// Hash rate over all searches (hashes per second).
    pub hash_rate: f64,
    /// Searches that produced a block.
    pub blocks_found: u64,
    /// Searches that ended without a block (cancelled or failed).
    pub searches_abandoned: u64,
    /// Time spent searching in milliseconds.
    pub elapsed_ms: f64,
    /// Most recently mined block.
    pub last_block: Option<Block>,
    /// Digest of the most recently mined block.
    pub last_digest: Option<Digest>,
}

impl MiningStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for a successful search.
    pub fn record_block(&mut self, mined: &MinedBlock) {
        self.add_work(mined.hashes, mined.elapsed);
        self.blocks_found += 1;
        self.last_block = Some(mined.block.clone());
        self.last_digest = Some(mined.digest);
    }

    /// Account for a search that ended without a block.
    pub fn record_abandoned(&mut self, hashes: u64, elapsed: Duration) {
        self.add_work(hashes, elapsed);
        self.searches_abandoned += 1;
    }

    fn add_work(&mut self, hashes: u64, elapsed: Duration) {
        self.total_hashes += hashes;
        self.elapsed_ms += elapsed.as_secs_f64() * 1000.0;
        self.update_hash_rate();
    }

    /// Update hash rate based on elapsed time.
    pub fn update_hash_rate(&mut self) {
        if self.elapsed_ms > 0.0 {
            self.hash_rate = (self.total_hashes as f64) / (self.elapsed_ms / 1000.0);
        }
    }

    /// Format hash rate for display.
    pub fn format_hash_rate(&self) -> String {
        format_hash_rate(self.hash_rate)
    }
}

/// Format a hash rate for display (e.g., "1.50 MH/s").
pub fn format_hash_rate(hash_rate: f64) -> String {
    if hash_rate >= 1_000_000_000.0 {
        format!("{:.2} GH/s", hash_rate / 1_000_000_000.0)
    } else if hash_rate >= 1_000_000.0 {
        format!("{:.2} MH/s", hash_rate / 1_000_000.0)
    } else if hash_rate >= 1_000.0 {
        format!("{:.2} KH/s", hash_rate / 1_000.0)
    } else {
        format!("{:.2} H/s", hash_rate)
    }
}
