//! Difficulty as a count of leading zero hex digits.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::hash::{Digest, DIGEST_HEX_LEN};

/// Largest meaningful difficulty: every hex digit of the digest is zero.
pub const MAX_TARGET_BITS: u32 = DIGEST_HEX_LEN as u32;

/// Required number of leading `'0'` characters in a digest's hex string.
///
/// Despite the historical name `target_bits`, each unit is one hex digit
/// (four bits), so every step multiplies the expected work by 16.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Difficulty(u32);

impl Difficulty {
    /// Accepts every digest.
    pub const ZERO: Difficulty = Difficulty(0);

    /// Create a difficulty, rejecting targets longer than a digest's hex form.
    pub fn new(target_bits: u32) -> Result<Self, ConfigError> {
        if target_bits > MAX_TARGET_BITS {
            return Err(ConfigError::DifficultyTooHigh {
                bits: target_bits,
                max: MAX_TARGET_BITS,
            });
        }
        Ok(Difficulty(target_bits))
    }

    pub const fn target_bits(self) -> u32 {
        self.0
    }

    /// Check whether a digest has at least the required run of zero digits.
    #[inline]
    pub fn is_met_by(self, digest: &Digest) -> bool {
        leading_zero_digits(digest) >= self.0
    }

    /// Average number of hashes needed to meet this difficulty (16^k).
    pub fn expected_hashes(self) -> f64 {
        16f64.powi(self.0 as i32)
    }
}

impl TryFrom<u32> for Difficulty {
    type Error = ConfigError;

    fn try_from(target_bits: u32) -> Result<Self, Self::Error> {
        Difficulty::new(target_bits)
    }
}

impl From<Difficulty> for u32 {
    fn from(difficulty: Difficulty) -> Self {
        difficulty.0
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Count leading zero hex digits of a digest, without building its hex string.
///
/// Equivalent to counting leading `'0'` characters of `digest.to_hex()`.
pub fn leading_zero_digits(digest: &Digest) -> u32 {
    let mut zeros = 0u32;
    for byte in digest.as_bytes() {
        if *byte == 0 {
            zeros += 2;
        } else {
            if *byte < 0x10 {
                zeros += 1;
            }
            break;
        }
    }
    zeros
}

/// Format a hash count for display (e.g., "1.23G").
pub fn format_hashes(hashes: f64) -> String {
    if hashes >= 1e15 {
        format!("{:.2}P", hashes / 1e15)
    } else if hashes >= 1e12 {
        format!("{:.2}T", hashes / 1e12)
    } else if hashes >= 1e9 {
        format!("{:.2}G", hashes / 1e9)
    } else if hashes >= 1e6 {
        format!("{:.2}M", hashes / 1e6)
    } else if hashes >= 1e3 {
        format!("{:.2}K", hashes / 1e3)
    } else {
        format!("{:.2}", hashes)
    }
}
