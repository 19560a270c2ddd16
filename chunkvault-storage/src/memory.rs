//! In-memory chunk backend
//!
//! Used for testing and ephemeral stores. Not persistent.

use crate::backend::{ChunkBackendSync, StorageStats};
use bytes::Bytes;
use chunkvault_core::chunk::ChunkId;
use chunkvault_core::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory chunk backend
pub struct MemoryBackend {
    /// Chunk storage
    chunks: RwLock<HashMap<ChunkId, Bytes>>,

    /// Current bytes used
    bytes_used: AtomicU64,

    /// Operation counters
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
            bytes_used: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Clear all stored chunks
    pub fn clear(&self) {
        let mut chunks = self.chunks.write();
        chunks.clear();
        self.bytes_used.store(0, Ordering::SeqCst);
    }

    /// Number of stored chunks
    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkBackendSync for MemoryBackend {
    fn put(&self, id: ChunkId, data: Bytes) -> Result<()> {
        let mut chunks = self.chunks.write();

        // Same address, same bytes: nothing to do
        if chunks.contains_key(&id) {
            return Ok(());
        }

        self.bytes_used
            .fetch_add(data.len() as u64, Ordering::SeqCst);
        chunks.insert(id, data);
        self.writes.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    fn get(&self, id: ChunkId) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let chunks = self.chunks.read();
        Ok(chunks.get(&id).cloned())
    }

    fn delete(&self, id: ChunkId) -> Result<bool> {
        let mut chunks = self.chunks.write();

        if let Some(old) = chunks.remove(&id) {
            self.bytes_used
                .fetch_sub(old.len() as u64, Ordering::SeqCst);
            self.deletes.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn exists(&self, id: ChunkId) -> Result<bool> {
        let chunks = self.chunks.read();
        Ok(chunks.contains_key(&id))
    }

    fn list_chunks(&self) -> Result<Vec<ChunkId>> {
        let chunks = self.chunks.read();
        Ok(chunks.keys().copied().collect())
    }

    fn stats(&self) -> Result<StorageStats> {
        let chunks = self.chunks.read();
        Ok(StorageStats {
            chunk_count: chunks.len() as u64,
            bytes_used: self.bytes_used.load(Ordering::SeqCst),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }

    fn flush(&self) -> Result<()> {
        // No-op for in-memory storage
        Ok(())
    }
}
