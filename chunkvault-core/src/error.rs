//! Error types for ChunkVault
//!
//! Provides a unified error type for all ChunkVault operations.

use crate::chunk::ChunkId;
use thiserror::Error;

/// Result type alias for ChunkVault operations
pub type Result<T> = std::result::Result<T, ChunkVaultError>;

/// Unified error type for ChunkVault
#[derive(Error, Debug)]
pub enum ChunkVaultError {
    // ===== Not Found =====
    #[error("Manifest not found: {0}")]
    ManifestNotFound(String),

    /// A manifest references a chunk the store does not hold. This means
    /// the store is inconsistent, not that the caller asked for a bad name.
    #[error("Chunk not found: {0}")]
    ChunkNotFound(ChunkId),

    // ===== Corruption =====
    #[error("Corrupt manifest {name} (line {line}): {reason}")]
    CorruptManifest {
        name: String,
        line: usize,
        reason: String,
    },

    #[error("Chunk {id} stored under wrong shard directory {shard}")]
    ShardMismatch { shard: String, id: ChunkId },

    #[error("Chunk corrupted: {0} does not match its content")]
    ChunkCorrupted(ChunkId),

    #[error("Invalid chunk ID: {0}")]
    InvalidChunkId(String),

    // ===== Usage Errors =====
    #[error("Invalid manifest name: {0:?}")]
    InvalidName(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // ===== I/O Errors =====
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ===== Concurrency Errors =====
    #[error("Worker task failed: {0}")]
    TaskFailed(String),
}

impl ChunkVaultError {
    /// Missing manifest or missing chunk
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ChunkVaultError::ManifestNotFound(_) | ChunkVaultError::ChunkNotFound(_)
        )
    }

    /// Store contents that cannot be trusted
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            ChunkVaultError::CorruptManifest { .. }
                | ChunkVaultError::ShardMismatch { .. }
                | ChunkVaultError::ChunkCorrupted(_)
                | ChunkVaultError::InvalidChunkId(_)
        )
    }
}

impl From<toml::de::Error> for ChunkVaultError {
    fn from(err: toml::de::Error) -> Self {
        ChunkVaultError::Configuration(err.to_string())
    }
}
