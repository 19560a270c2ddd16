//! Content hashing for ChunkVault
//!
//! Chunks are addressed by their BLAKE3-256 digest, rendered as lowercase hex.

use crate::error::{ChunkVaultError, Result};
use std::fmt;

/// Length of a content hash in bytes
pub const HASH_SIZE: usize = 32;

/// Length of a content hash rendered as hex
pub const HASH_HEX_LEN: usize = HASH_SIZE * 2;

/// Blake3 hash wrapper for content addressing
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(blake3::Hash);

impl ContentHash {
    /// Compute Blake3 hash of data
    pub fn compute(data: &[u8]) -> Self {
        Self(blake3::hash(data))
    }

    /// Wrap raw digest bytes
    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(blake3::Hash::from_bytes(bytes))
    }

    /// Get the raw hash bytes
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        self.0.as_bytes()
    }

    /// Convert to lowercase hex string
    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    /// Parse from a lowercase hex string.
    ///
    /// Upper-case digits are rejected. The hex text doubles as the chunk's
    /// file name, so there is exactly one spelling per digest.
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != HASH_HEX_LEN {
            return Err(ChunkVaultError::InvalidChunkId(format!(
                "expected {} hex characters, got {}",
                HASH_HEX_LEN,
                hex.len()
            )));
        }
        if !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(ChunkVaultError::InvalidChunkId(format!(
                "not lowercase hex: {}",
                hex
            )));
        }
        let hash = blake3::Hash::from_hex(hex)
            .map_err(|e| ChunkVaultError::InvalidChunkId(e.to_string()))?;
        Ok(Self(hash))
    }

    /// Verify that data matches this hash
    pub fn verify(&self, data: &[u8]) -> bool {
        let computed = Self::compute(data);
        self == &computed
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
