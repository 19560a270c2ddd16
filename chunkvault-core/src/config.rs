//! Chunking and store configuration
//!
//! Config file format:
//! ```toml
//! root = "/var/lib/chunkvault"
//! upload_concurrency = 32
//! read_ahead = 32
//! verify_reads = true
//!
//! [chunker]
//! min_size = 65536
//! max_size = 1048576
//! lookahead = 32768
//! blob_bits = 13
//! ```
//!
//! Changing any `[chunker]` value changes where chunks are cut, so data
//! added before the change stops deduplicating against data added after.

use crate::error::{ChunkVaultError, Result};
use crate::rollsum::DEFAULT_BLOB_BITS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Rolling-checksum boundaries are ignored below this chunk size (64 KiB)
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 64 * 1024;

/// Hard ceiling on chunk size (1 MiB)
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Read-ahead buffer size; also how early end-of-stream is seen (32 KiB)
pub const DEFAULT_LOOKAHEAD: usize = 32 * 1024;

/// Chunks hashed and written concurrently by one add
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 32;

/// Chunks fetched ahead of the writer by one cat
pub const DEFAULT_READ_AHEAD: usize = 32;

/// Chunk-cutting parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Floor below which rolling-checksum boundaries are ignored
    pub min_size: usize,

    /// Chunk size at which a cut is forced
    pub max_size: usize,

    /// Size of the read-ahead window at the end of a stream
    pub lookahead: usize,

    /// Boundary mask width; average spacing is `2^blob_bits` bytes
    pub blob_bits: u32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_MIN_CHUNK_SIZE,
            max_size: DEFAULT_MAX_CHUNK_SIZE,
            lookahead: DEFAULT_LOOKAHEAD,
            blob_bits: DEFAULT_BLOB_BITS,
        }
    }
}

impl ChunkerConfig {
    /// Set the size floor
    pub fn with_min_size(mut self, bytes: usize) -> Self {
        self.min_size = bytes;
        self
    }

    /// Set the size ceiling
    pub fn with_max_size(mut self, bytes: usize) -> Self {
        self.max_size = bytes;
        self
    }

    /// Set the read-ahead window
    pub fn with_lookahead(mut self, bytes: usize) -> Self {
        self.lookahead = bytes;
        self
    }

    /// Set the boundary mask width
    pub fn with_blob_bits(mut self, bits: u32) -> Self {
        self.blob_bits = bits;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(ChunkVaultError::Configuration(
                "chunker.max_size must be positive".to_string(),
            ));
        }
        if self.min_size >= self.max_size {
            return Err(ChunkVaultError::Configuration(format!(
                "chunker.min_size ({}) must be below chunker.max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.lookahead == 0 {
            return Err(ChunkVaultError::Configuration(
                "chunker.lookahead must be positive".to_string(),
            ));
        }
        if !(1..=31).contains(&self.blob_bits) {
            return Err(ChunkVaultError::Configuration(format!(
                "chunker.blob_bits must be in 1..=31, got {}",
                self.blob_bits
            )));
        }
        Ok(())
    }
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Repository root; holds `chunks/` and `manifests/`
    pub root: PathBuf,

    #[serde(default)]
    pub chunker: ChunkerConfig,

    /// Maximum chunks in flight during an add
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,

    /// Maximum chunks fetched ahead during a cat
    #[serde(default = "default_read_ahead")]
    pub read_ahead: usize,

    /// Re-hash chunks on read and fail on mismatch
    #[serde(default = "default_verify_reads")]
    pub verify_reads: bool,
}

fn default_upload_concurrency() -> usize {
    DEFAULT_UPLOAD_CONCURRENCY
}

fn default_read_ahead() -> usize {
    DEFAULT_READ_AHEAD
}

fn default_verify_reads() -> bool {
    true
}

impl StoreConfig {
    /// Create a new store config with the given root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chunker: ChunkerConfig::default(),
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            read_ahead: DEFAULT_READ_AHEAD,
            verify_reads: true,
        }
    }

    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: StoreConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Set chunking parameters
    pub fn with_chunker(mut self, chunker: ChunkerConfig) -> Self {
        self.chunker = chunker;
        self
    }

    /// Set upload concurrency
    pub fn with_upload_concurrency(mut self, n: usize) -> Self {
        self.upload_concurrency = n;
        self
    }

    /// Set read-ahead depth
    pub fn with_read_ahead(mut self, n: usize) -> Self {
        self.read_ahead = n;
        self
    }

    /// Enable/disable hash verification on read
    pub fn with_verify_reads(mut self, enabled: bool) -> Self {
        self.verify_reads = enabled;
        self
    }

    /// Directory holding chunk shards
    pub fn chunks_dir(&self) -> PathBuf {
        self.root.join("chunks")
    }

    /// Directory holding manifests
    pub fn manifests_dir(&self) -> PathBuf {
        self.root.join("manifests")
    }

    pub fn validate(&self) -> Result<()> {
        self.chunker.validate()?;
        // Semaphore permits are u32
        if self.upload_concurrency == 0 || self.upload_concurrency > u32::MAX as usize {
            return Err(ChunkVaultError::Configuration(format!(
                "upload_concurrency must be in 1..={}, got {}",
                u32::MAX,
                self.upload_concurrency
            )));
        }
        if self.read_ahead == 0 {
            return Err(ChunkVaultError::Configuration(
                "read_ahead must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
