//! Core NameChain mining logic.
//!
//! This crate provides pure Rust implementations of:
//! - SHA256 digests with a canonical lowercase hex form
//! - Block construction, canonical serialization and parsing
//! - Difficulty checks on leading zero hex digits
//! - A single-range nonce search used by the multi-threaded miner

pub mod block;
pub mod difficulty;
pub mod error;
pub mod hash;
pub mod search;

pub use block::{Block, ParseLimits};
pub use difficulty::{format_hashes, leading_zero_digits, Difficulty, MAX_TARGET_BITS};
pub use error::{BlockError, ConfigError, DigestError, ParseError};
pub use hash::{sha256, Digest, DIGEST_HEX_LEN, DIGEST_LEN};
pub use search::{search_range, NonceRange, SearchOutcome, Searcher};
