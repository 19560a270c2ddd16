//! ChunkVault Core Library
//!
//! I/O-free building blocks for the ChunkVault deduplicating blob store.
//! This crate provides:
//! - Content addresses (Blake3-256, lowercase hex, two-character shards)
//! - The rolling checksum and content-defined chunk cutter
//! - Chunking and store configuration
//! - Common error handling

pub mod chunk;
pub mod chunker;
pub mod config;
pub mod crypto;
pub mod error;
pub mod rollsum;

pub use chunk::{ChunkId, Span, SHARD_PREFIX_LEN};
pub use chunker::{tail_window_start, ChunkCutter, SliceChunker};
pub use config::{ChunkerConfig, StoreConfig};
pub use crypto::ContentHash;
pub use error::{ChunkVaultError, Result};
pub use rollsum::RollSum;
