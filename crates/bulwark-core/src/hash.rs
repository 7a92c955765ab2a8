//! Content hashing.
//!
//! [`ContentHash`] is a 32-byte digest rendered as lowercase hex. Which
//! function produced it is decided by the injected [`ContentDigest`]; the
//! default is SHA-256.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte content digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// SHA-256 of `data`.
    #[must_use]
    pub fn sha256(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// BLAKE3 of `data`.
    #[must_use]
    pub fn blake3(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create a zero hash (used for genesis entries).
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Check if this is the zero hash.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Get the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Encode as hex string.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode from hex string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid hex or not 32 bytes.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "ContentHash({})", hex.get(..16).unwrap_or(&hex))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A content digest function.
///
/// The shadow pipeline uses this to fingerprint live files at proposal time
/// and again at apply time; both sides must use the same implementation.
pub trait ContentDigest: Send + Sync {
    /// Digest `data`.
    fn digest(&self, data: &[u8]) -> ContentHash;

    /// Short algorithm name for logs.
    fn algorithm(&self) -> &'static str;
}

/// SHA-256 digests (the default).
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Digest;

impl ContentDigest for Sha256Digest {
    fn digest(&self, data: &[u8]) -> ContentHash {
        ContentHash::sha256(data)
    }

    fn algorithm(&self) -> &'static str {
        "sha256"
    }
}

/// BLAKE3 digests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Digest;

impl ContentDigest for Blake3Digest {
    fn digest(&self, data: &[u8]) -> ContentHash {
        ContentHash::blake3(data)
    }

    fn algorithm(&self) -> &'static str {
        "blake3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let hash = ContentHash::sha256(b"hello");
        assert_eq!(
            hash.to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_digests_differ_by_algorithm() {
        let a = Sha256Digest.digest(b"data");
        let b = Blake3Digest.digest(b"data");
        assert_ne!(a, b);
        assert_eq!(Sha256Digest.algorithm(), "sha256");
    }

    #[test]
    fn test_hex_serde() {
        let hash = ContentHash::sha256(b"x");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_from_hex_rejects_short_input() {
        assert!(ContentHash::from_hex("abcd").is_err());
        assert!(ContentHash::zero().is_zero());
    }
}
