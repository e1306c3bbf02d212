//! SHA256 digests and their hex form.

use core::fmt;
use core::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};

use crate::error::DigestError;

/// Size of a digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Length of a digest's hex string.
pub const DIGEST_HEX_LEN: usize = DIGEST_LEN * 2;

/// Single SHA256 hash.
#[inline]
pub fn sha256(data: &[u8]) -> [u8; DIGEST_LEN] {
    let hash = Sha256::digest(data);
    let mut result = [0u8; DIGEST_LEN];
    result.copy_from_slice(&hash);
    result
}

/// A 32-byte SHA256 output.
///
/// Displays as 64 lowercase hex characters, which is also the form used on
/// the wire and in serde.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// The all-zero digest.
    pub const ZERO: Digest = Digest([0u8; DIGEST_LEN]);

    /// Wrap raw hash bytes.
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Digest(bytes)
    }

    /// Hash arbitrary data.
    pub fn of(data: &[u8]) -> Self {
        Digest(sha256(data))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex string, always 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Digest(bytes)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != DIGEST_HEX_LEN {
            return Err(DigestError::Length(s.len()));
        }
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Digest(bytes))
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_vectors() {
        assert_eq!(
            Digest::of(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            Digest::of(b"hello").to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_display_is_lowercase_64_chars() {
        let digest = Digest::from_bytes([0xAB; DIGEST_LEN]);
        let s = digest.to_string();
        assert_eq!(s.len(), DIGEST_HEX_LEN);
        assert_eq!(s, "ab".repeat(32));
    }

    #[test]
    fn test_from_str() {
        let digest = Digest::of(b"genesis");
        let parsed: Digest = digest.to_hex().parse().unwrap();
        assert_eq!(parsed, digest);

        // Uppercase input is accepted, output is normalised.
        let upper: Digest = digest.to_hex().to_uppercase().parse().unwrap();
        assert_eq!(upper, digest);

        assert_eq!("deadbeef".parse::<Digest>(), Err(DigestError::Length(8)));
        assert!(matches!(
            "zz".repeat(32).parse::<Digest>(),
            Err(DigestError::Hex(_))
        ));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let digest = Digest::of(b"genesis");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", digest));

        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);

        assert!(serde_json::from_str::<Digest>("\"nothex\"").is_err());
    }
}
