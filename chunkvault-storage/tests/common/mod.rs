//! Shared helpers for the integration tests

#![allow(dead_code)]

use bytes::Bytes;
use chunkvault_core::{ChunkId, ChunkVaultError, ChunkerConfig, Result, StoreConfig};
use chunkvault_storage::{ChunkBackend, Repository, StorageStats};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncRead, ReadBuf};

/// Install a test subscriber once; `RUST_LOG` controls the output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Chunking tuned so a few hundred KiB gives a dozen or more chunks
pub fn small_chunks() -> ChunkerConfig {
    ChunkerConfig::default()
        .with_min_size(2 * 1024)
        .with_max_size(32 * 1024)
        .with_lookahead(1024)
        .with_blob_bits(11)
}

/// Seeded incompressible bytes
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut data = vec![0u8; len];
    StdRng::seed_from_u64(seed).fill_bytes(&mut data);
    data
}

/// A fresh on-disk repository with small chunks
pub fn temp_repo() -> (TempDir, Repository) {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::new(dir.path()).with_chunker(small_chunks());
    let repo = Repository::open(config).unwrap();
    (dir, repo)
}

/// A repository over `backend`, manifests in a fresh directory
pub fn repo_with(backend: Arc<dyn ChunkBackend>) -> (TempDir, Repository) {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::new(dir.path()).with_chunker(small_chunks());
    let repo = Repository::with_backend(config, backend).unwrap();
    (dir, repo)
}

/// Chunk files currently on disk under `<root>/chunks`
pub fn chunk_files(root: &std::path::Path) -> usize {
    let mut count = 0;
    for shard in std::fs::read_dir(root.join("chunks")).unwrap() {
        for entry in std::fs::read_dir(shard.unwrap().path()).unwrap() {
            let name = entry.unwrap().file_name();
            if !name.to_string_lossy().starts_with('.') {
                count += 1;
            }
        }
    }
    count
}

/// Backend wrapper that sleeps a seeded random time before every put and
/// get, so tasks finish out of order
pub struct SlowBackend {
    inner: Arc<dyn ChunkBackend>,
    latency_ms: (u64, u64),
    rng: Mutex<StdRng>,
}

impl SlowBackend {
    pub fn new(inner: Arc<dyn ChunkBackend>, min_ms: u64, max_ms: u64, seed: u64) -> Self {
        Self {
            inner,
            latency_ms: (min_ms, max_ms),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    async fn delay(&self) {
        let (min, max) = self.latency_ms;
        let ms = self.rng.lock().gen_range(min..=max);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

impl ChunkBackend for SlowBackend {
    fn put(&self, id: ChunkId, data: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.delay().await;
            self.inner.put(id, data).await
        })
    }

    fn get(&self, id: ChunkId) -> BoxFuture<'_, Result<Option<Bytes>>> {
        Box::pin(async move {
            self.delay().await;
            self.inner.get(id).await
        })
    }

    fn delete(&self, id: ChunkId) -> BoxFuture<'_, Result<bool>> {
        self.inner.delete(id)
    }

    fn exists(&self, id: ChunkId) -> BoxFuture<'_, Result<bool>> {
        self.inner.exists(id)
    }

    fn list_chunks(&self) -> BoxFuture<'_, Result<Vec<ChunkId>>> {
        self.inner.list_chunks()
    }

    fn stats(&self) -> BoxFuture<'_, Result<StorageStats>> {
        self.inner.stats()
    }

    fn flush(&self) -> BoxFuture<'_, Result<()>> {
        self.inner.flush()
    }

    fn compact(&self) -> BoxFuture<'_, Result<usize>> {
        self.inner.compact()
    }
}

/// Backend wrapper whose puts fail from the `fail_from`-th call on
pub struct FailingBackend {
    inner: Arc<dyn ChunkBackend>,
    fail_from: usize,
    puts: AtomicUsize,
}

impl FailingBackend {
    pub fn new(inner: Arc<dyn ChunkBackend>, fail_from: usize) -> Self {
        Self {
            inner,
            fail_from,
            puts: AtomicUsize::new(0),
        }
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

impl ChunkBackend for FailingBackend {
    fn put(&self, id: ChunkId, data: Bytes) -> BoxFuture<'_, Result<()>> {
        let call = self.puts.fetch_add(1, Ordering::SeqCst);
        if call >= self.fail_from {
            return Box::pin(async {
                Err(ChunkVaultError::Io(std::io::Error::other("injected put failure")))
            });
        }
        self.inner.put(id, data)
    }

    fn get(&self, id: ChunkId) -> BoxFuture<'_, Result<Option<Bytes>>> {
        self.inner.get(id)
    }

    fn delete(&self, id: ChunkId) -> BoxFuture<'_, Result<bool>> {
        self.inner.delete(id)
    }

    fn exists(&self, id: ChunkId) -> BoxFuture<'_, Result<bool>> {
        self.inner.exists(id)
    }

    fn list_chunks(&self) -> BoxFuture<'_, Result<Vec<ChunkId>>> {
        self.inner.list_chunks()
    }

    fn stats(&self) -> BoxFuture<'_, Result<StorageStats>> {
        self.inner.stats()
    }

    fn flush(&self) -> BoxFuture<'_, Result<()>> {
        self.inner.flush()
    }

    fn compact(&self) -> BoxFuture<'_, Result<usize>> {
        self.inner.compact()
    }
}

/// Reader that yields `data` up to `fail_at` bytes and then errors
pub struct FailingReader {
    data: Vec<u8>,
    pos: usize,
    fail_at: usize,
}

impl FailingReader {
    pub fn new(data: Vec<u8>, fail_at: usize) -> Self {
        let fail_at = fail_at.min(data.len());
        Self {
            data,
            pos: 0,
            fail_at,
        }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.pos >= self.fail_at {
            return Poll::Ready(Err(std::io::Error::other("injected read failure")));
        }
        let start = self.pos;
        let end = (start + buf.remaining()).min(self.fail_at);
        buf.put_slice(&self.data[start..end]);
        self.pos = end;
        Poll::Ready(Ok(()))
    }
}
