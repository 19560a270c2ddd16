//! Chunk backend trait
//!
//! Defines the interface every chunk store implements. The local filesystem
//! backend, the in-memory backend and any remote backend are interchangeable
//! behind it; the upload pipeline, reader and collector only see this trait.

use bytes::Bytes;
use chunkvault_core::chunk::ChunkId;
use chunkvault_core::error::Result;
use futures::future::BoxFuture;

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Total number of chunks stored
    pub chunk_count: u64,

    /// Total bytes used by chunks
    pub bytes_used: u64,

    /// Number of read operations
    pub reads: u64,

    /// Number of chunk writes that created a new chunk
    pub writes: u64,

    /// Number of delete operations that removed a chunk
    pub deletes: u64,
}

impl StorageStats {
    /// Mean stored chunk size in bytes
    pub fn average_chunk_size(&self) -> u64 {
        if self.chunk_count == 0 {
            0
        } else {
            self.bytes_used / self.chunk_count
        }
    }
}

/// Async chunk backend trait
///
/// All implementations must be Send + Sync for use from spawned tasks.
/// `put` must be idempotent: storing an address that already exists leaves
/// the existing chunk untouched.
pub trait ChunkBackend: Send + Sync {
    /// Store a chunk under its address
    fn put(&self, id: ChunkId, data: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Retrieve a chunk; `None` if the address is not stored
    fn get(&self, id: ChunkId) -> BoxFuture<'_, Result<Option<Bytes>>>;

    /// Delete a chunk; `false` if it was not stored
    fn delete(&self, id: ChunkId) -> BoxFuture<'_, Result<bool>>;

    /// Check if a chunk exists
    fn exists(&self, id: ChunkId) -> BoxFuture<'_, Result<bool>>;

    /// List all stored chunk addresses
    fn list_chunks(&self) -> BoxFuture<'_, Result<Vec<ChunkId>>>;

    /// Get storage statistics
    fn stats(&self) -> BoxFuture<'_, Result<StorageStats>>;

    /// Flush any pending writes to durable storage
    fn flush(&self) -> BoxFuture<'_, Result<()>>;

    /// Release space left behind by deletes. Returns how many containers
    /// (shard directories, for the filesystem backend) were removed.
    fn compact(&self) -> BoxFuture<'_, Result<usize>>;
}

/// Synchronous chunk backend trait (for simpler implementations)
pub trait ChunkBackendSync: Send + Sync {
    /// Store a chunk
    fn put(&self, id: ChunkId, data: Bytes) -> Result<()>;

    /// Retrieve a chunk
    fn get(&self, id: ChunkId) -> Result<Option<Bytes>>;

    /// Delete a chunk
    fn delete(&self, id: ChunkId) -> Result<bool>;

    /// Check if a chunk exists
    fn exists(&self, id: ChunkId) -> Result<bool>;

    /// List all chunk IDs
    fn list_chunks(&self) -> Result<Vec<ChunkId>>;

    /// Get storage statistics
    fn stats(&self) -> Result<StorageStats>;

    /// Flush any pending writes
    fn flush(&self) -> Result<()>;

    /// Release space left behind by deletes
    fn compact(&self) -> Result<usize> {
        Ok(0)
    }
}

/// Wrapper to convert sync backend to async
pub struct AsyncWrapper<T: ChunkBackendSync>(pub T);

impl<T: ChunkBackendSync + 'static> ChunkBackend for AsyncWrapper<T> {
    fn put(&self, id: ChunkId, data: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.0.put(id, data) })
    }

    fn get(&self, id: ChunkId) -> BoxFuture<'_, Result<Option<Bytes>>> {
        Box::pin(async move { self.0.get(id) })
    }

    fn delete(&self, id: ChunkId) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { self.0.delete(id) })
    }

    fn exists(&self, id: ChunkId) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { self.0.exists(id) })
    }

    fn list_chunks(&self) -> BoxFuture<'_, Result<Vec<ChunkId>>> {
        Box::pin(async move { self.0.list_chunks() })
    }

    fn stats(&self) -> BoxFuture<'_, Result<StorageStats>> {
        Box::pin(async move { self.0.stats() })
    }

    fn flush(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.0.flush() })
    }

    fn compact(&self) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move { self.0.compact() })
    }
}
