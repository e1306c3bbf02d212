//! Nonce ranges and the single-threaded search over one range.

use core::fmt;
use core::fmt::Write as _;

use sha2::{Digest as _, Sha256};

use crate::block::Block;
use crate::difficulty::Difficulty;
use crate::hash::{Digest, DIGEST_LEN};

/// Half-open range `[start, end)` of candidate nonces.
///
/// Nonces are `u128` so the counter never wraps in practice; they are
/// rendered as decimal strings in the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NonceRange {
    pub start: u128,
    pub end: u128,
}

impl NonceRange {
    pub const fn new(start: u128, end: u128) -> Self {
        NonceRange { start, end }
    }

    /// Number of candidates in the range.
    pub fn len(&self) -> u128 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, nonce: u128) -> bool {
        self.start <= nonce && nonce < self.end
    }
}

impl fmt::Display for NonceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Result of searching one range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A candidate met the difficulty. `hashes` counts it.
    Found {
        block: Block,
        digest: Digest,
        hashes: u64,
    },
    /// Every candidate in the range was tried.
    Exhausted { hashes: u64 },
    /// The stop check fired before the range was finished.
    Interrupted { hashes: u64 },
}

impl SearchOutcome {
    /// Number of digests computed.
    pub fn hashes(&self) -> u64 {
        match self {
            SearchOutcome::Found { hashes, .. }
            | SearchOutcome::Exhausted { hashes }
            | SearchOutcome::Interrupted { hashes } => *hashes,
        }
    }
}

/// Reusable search state for one template.
///
/// The `"<previous> <name> "` prefix is absorbed into a SHA256 state once;
/// each candidate clones that state and appends only its decimal nonce.
#[derive(Clone)]
pub struct Searcher {
    template: Block,
    difficulty: Difficulty,
    prefix_state: Sha256,
    nonce_buf: String,
}

impl Searcher {
    /// Prepare a search for `template`. Its current nonce is ignored.
    pub fn new(template: &Block, difficulty: Difficulty) -> Self {
        let mut prefix_state = Sha256::new();
        prefix_state.update(template.header_prefix().as_bytes());

        Searcher {
            template: template.with_nonce(""),
            difficulty,
            prefix_state,
            nonce_buf: String::with_capacity(40),
        }
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    /// Digest of the template with `nonce` as its decimal nonce.
    pub fn digest_for(&mut self, nonce: u128) -> Digest {
        self.nonce_buf.clear();
        // Writing into a String cannot fail.
        let _ = write!(self.nonce_buf, "{}", nonce);

        let mut state = self.prefix_state.clone();
        state.update(self.nonce_buf.as_bytes());
        let hash = state.finalize();

        let mut bytes = [0u8; DIGEST_LEN];
        bytes.copy_from_slice(&hash);
        Digest::from_bytes(bytes)
    }

    /// Try each nonce in `range` in ascending order until one meets the difficulty.
    ///
    /// `should_stop` is polled before every candidate.
    pub fn search<F>(&mut self, range: NonceRange, mut should_stop: F) -> SearchOutcome
    where
        F: FnMut() -> bool,
    {
        let mut hashes = 0u64;

        for nonce in range.start..range.end {
            if should_stop() {
                return SearchOutcome::Interrupted { hashes };
            }

            let digest = self.digest_for(nonce);
            hashes += 1;

            if self.difficulty.is_met_by(&digest) {
                return SearchOutcome::Found {
                    block: self.template.with_nonce(self.nonce_buf.as_str()),
                    digest,
                    hashes,
                };
            }
        }

        SearchOutcome::Exhausted { hashes }
    }
}

/// Search a single range with no stop condition.
pub fn search_range(template: &Block, difficulty: Difficulty, range: NonceRange) -> SearchOutcome {
    Searcher::new(template, difficulty).search(range, || false)
}
