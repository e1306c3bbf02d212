//! NameChain block model, canonical serialization and parsing.
//!
//! A block is three space-separated ASCII fields:
//!
//! ```text
//! <64 hex chars of previous digest> <name> <nonce>
//! ```
//!
//! The digest of a block is the SHA256 of exactly that line, so the
//! serialization is the consensus format and must never change shape.

use core::fmt;
use core::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::difficulty::Difficulty;
use crate::error::{BlockError, ConfigError, ParseError};
use crate::hash::{Digest, DIGEST_LEN};

/// Accepted length bounds for a serialized block line.
///
/// The bounds are a sanity guard tied to expected name and nonce sizes, not
/// part of the format. A 64-char digest plus two separators leaves 34 bytes
/// for name and nonce under the default maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Minimum accepted length in bytes.
    pub min_len: usize,
    /// Maximum accepted length in bytes.
    pub max_len: usize,
}

impl ParseLimits {
    pub const fn new(min_len: usize, max_len: usize) -> Self {
        ParseLimits { min_len, max_len }
    }

    /// No upper bound beyond what the three fields need.
    pub const fn unbounded() -> Self {
        ParseLimits {
            min_len: 0,
            max_len: usize::MAX,
        }
    }

    /// Default bounds with a different maximum. The minimum is lowered when
    /// it would otherwise exceed `max_len`.
    pub fn with_max_len(max_len: usize) -> Self {
        let default = ParseLimits::default();
        ParseLimits::new(default.min_len.min(max_len), max_len)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_len > self.max_len {
            return Err(ConfigError::ParseLimits {
                min: self.min_len,
                max: self.max_len,
            });
        }
        Ok(())
    }
}

impl Default for ParseLimits {
    fn default() -> Self {
        ParseLimits::new(66, 100)
    }
}

/// A NameChain block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Block {
    /// Digest of the chain predecessor.
    pub previous: Digest,
    /// Name being recorded. Non-empty, no whitespace.
    pub name: String,
    /// Proof-of-work nonce. No whitespace.
    pub nonce: String,
}

impl Block {
    /// Create a block from raw parts without checking the fields.
    pub fn new(previous: Digest, name: impl Into<String>, nonce: impl Into<String>) -> Self {
        Block {
            previous,
            name: name.into(),
            nonce: nonce.into(),
        }
    }

    /// Create a mining template pointing at `previous` with an empty nonce.
    pub fn template(previous: Digest, name: impl Into<String>) -> Result<Self, BlockError> {
        let block = Block::new(previous, name, "");
        block.check_fields()?;
        Ok(block)
    }

    /// Create a template for the block that extends `tip`.
    pub fn next_after(tip: &Block, name: impl Into<String>) -> Result<Self, BlockError> {
        Block::template(tip.digest(), name)
    }

    /// Copy of this block with a different nonce.
    pub fn with_nonce(&self, nonce: impl Into<String>) -> Self {
        Block {
            previous: self.previous,
            name: self.name.clone(),
            nonce: nonce.into(),
        }
    }

    /// Check that the name and nonce survive a round trip through the wire format.
    pub fn check_fields(&self) -> Result<(), BlockError> {
        if self.name.is_empty() {
            return Err(BlockError::EmptyName);
        }
        if self.name.contains(char::is_whitespace) {
            return Err(BlockError::Whitespace {
                field: "name",
                value: self.name.clone(),
            });
        }
        if self.nonce.contains(char::is_whitespace) {
            return Err(BlockError::Whitespace {
                field: "nonce",
                value: self.nonce.clone(),
            });
        }
        Ok(())
    }

    /// Canonical line: `<hex(previous)> <name> <nonce>`.
    pub fn serialize(&self) -> String {
        self.to_string()
    }

    /// Everything in the canonical line before the nonce, separator included.
    ///
    /// Hashing this once and appending candidate nonces gives the same digest
    /// as hashing the full line.
    pub fn header_prefix(&self) -> String {
        format!("{} {} ", self.previous, self.name)
    }

    /// SHA256 of the canonical line.
    pub fn digest(&self) -> Digest {
        Digest::of(self.serialize().as_bytes())
    }

    /// Whether this block's digest satisfies `difficulty`.
    pub fn meets(&self, difficulty: Difficulty) -> bool {
        difficulty.is_met_by(&self.digest())
    }

    /// Parse a block line with the default [`ParseLimits`].
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        Block::parse_with(s, &ParseLimits::default())
    }

    /// Parse a block line.
    ///
    /// The line is split on single spaces, then trailing whitespace (a
    /// newline from stream framing) is stripped from the nonce only, so a
    /// template's `"<hex> <name> "` reads back with an empty nonce. The
    /// length bounds apply to the line without that whitespace. Name and
    /// nonce contents are not checked beyond field splitting.
    pub fn parse_with(s: &str, limits: &ParseLimits) -> Result<Self, ParseError> {
        let fields: Vec<&str> = s.split(' ').collect();
        let &[prev_hex, name, raw_nonce] = fields.as_slice() else {
            return Err(ParseError::FieldCount(fields.len()));
        };
        let nonce = raw_nonce.trim_end();

        let len = s.len() - (raw_nonce.len() - nonce.len());
        if len < limits.min_len || len > limits.max_len {
            return Err(ParseError::Length {
                len,
                min: limits.min_len,
                max: limits.max_len,
            });
        }

        let prev_bytes = hex::decode(prev_hex)?;
        let previous: [u8; DIGEST_LEN] = prev_bytes
            .as_slice()
            .try_into()
            .map_err(|_| ParseError::DigestLength(prev_bytes.len()))?;

        Ok(Block {
            previous: Digest::from_bytes(previous),
            name: name.to_string(),
            nonce: nonce.to_string(),
        })
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.previous, self.name, self.nonce)
    }
}

impl FromStr for Block {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Block::parse(s)
    }
}

impl Serialize for Block {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Block {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Block::parse(&s).map_err(de::Error::custom)
    }
}
