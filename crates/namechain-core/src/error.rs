//! Error types shared by the NameChain crates.

use thiserror::Error;

/// A serialized block line could not be parsed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Line length (nonce trailing whitespace excluded) is outside the accepted bounds.
    #[error("invalid string length {len}, expect {min} to {max}")]
    Length { len: usize, min: usize, max: usize },

    /// The line did not split into `<digest> <name> <nonce>`.
    #[error("got {0} elements, expect 3")]
    FieldCount(usize),

    /// The previous-digest field is not hex.
    #[error("invalid previous digest: {0}")]
    Hex(#[from] hex::FromHexError),

    /// The previous-digest field decoded to the wrong number of bytes.
    #[error("got {0} byte hash, expect 32")]
    DigestLength(usize),
}

/// A hex string could not be turned into a [`Digest`](crate::Digest).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DigestError {
    #[error("expected 64 hex characters, got {0}")]
    Length(usize),

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// A block's fields cannot be placed on the wire unambiguously.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("block name must not be empty")]
    EmptyName,

    #[error("block {field} must not contain whitespace: {value:?}")]
    Whitespace { field: &'static str, value: String },
}

/// Invalid miner or parser configuration. Reported before any search starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("worker pool must have at least one worker")]
    NoWorkers,

    #[error("nonce chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("difficulty of {bits} leading zeros exceeds the {max} hex digits of a digest")]
    DifficultyTooHigh { bits: u32, max: u32 },

    #[error("parse limits are inverted: min {min} > max {max}")]
    ParseLimits { min: usize, max: usize },
}
