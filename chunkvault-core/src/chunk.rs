//! Chunk types
//!
//! Chunks are the fundamental unit of storage in ChunkVault.
//! Each chunk is content-addressed using Blake3 hashing.

use crate::crypto::{ContentHash, HASH_SIZE};
use crate::error::Result;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Number of leading hex characters used as the shard directory name
pub const SHARD_PREFIX_LEN: usize = 2;

/// Content-addressed chunk identifier
///
/// Rendered as the 64-character lowercase hex digest of the chunk bytes.
/// Example: `24662838814f422b3050a99575b29a62d8af9e0f5b4ac1e0e7c4f0a6a9d3e1b2`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId([u8; HASH_SIZE]);

impl ChunkId {
    /// Create a new ChunkId from raw bytes
    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a ChunkId from a Blake3 hash
    pub fn from_hash(hash: &ContentHash) -> Self {
        Self(*hash.as_bytes())
    }

    /// Compute ChunkId from data (content-addressing)
    pub fn from_data(data: &[u8]) -> Self {
        let hash = ContentHash::compute(data);
        Self::from_hash(&hash)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// The underlying content hash
    pub fn hash(&self) -> ContentHash {
        ContentHash::from_bytes(self.0)
    }

    /// Convert to lowercase hex (the on-disk address)
    pub fn to_hex(&self) -> String {
        self.hash().to_hex()
    }

    /// Parse from lowercase hex
    pub fn from_hex(s: &str) -> Result<Self> {
        let hash = ContentHash::from_hex(s)?;
        Ok(Self::from_hash(&hash))
    }

    /// Shard directory name: the first two hex characters of the address
    pub fn shard_prefix(&self) -> String {
        format!("{:02x}", self.0[0])
    }

    /// Check that `data` hashes to this address
    pub fn verify(&self, data: &[u8]) -> bool {
        self.hash().verify(data)
    }
}

impl FromStr for ChunkId {
    type Err = crate::error::ChunkVaultError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Half-open byte range `[from, to)` of a source stream.
///
/// Produced by the chunker; lives only for the duration of one add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub from: u64,
    pub to: u64,
}

impl Span {
    pub fn new(from: u64, to: u64) -> Self {
        debug_assert!(from <= to);
        Self { from, to }
    }

    pub fn len(&self) -> u64 {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }

    /// Range usable for indexing an in-memory buffer
    pub fn range(&self) -> Range<usize> {
        self.from as usize..self.to as usize
    }
}
