//! ChunkVault Storage
//!
//! Everything that touches storage or runs concurrently:
//! - `ChunkBackend` trait for pluggable chunk stores
//! - `FsBackend` for the sharded on-disk layout
//! - `MemoryBackend` for testing
//! - `StreamChunker` for chunking async readers
//! - `UploadPipeline` and `ParallelReader` for bounded, order-preserving
//!   writes and reads
//! - `GarbageCollector` for reclaiming unreferenced chunks
//! - `Repository` tying it all together

pub mod backend;
pub mod fs;
pub mod gc;
pub mod manifest;
pub mod memory;
pub mod pipeline;
pub mod reader;
pub mod repository;
pub mod stream;

pub use backend::{AsyncWrapper, ChunkBackend, ChunkBackendSync, StorageStats};
pub use fs::FsBackend;
pub use gc::{GarbageCollector, GcReport};
pub use manifest::{validate_name, Manifest, ManifestStore};
pub use memory::MemoryBackend;
pub use pipeline::UploadPipeline;
pub use reader::ParallelReader;
pub use repository::{Repository, RepositoryStats};
pub use stream::{ChunkSource, RawChunk, StreamChunker};
