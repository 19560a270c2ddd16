//! Parallel, order-preserving reconstruction
//!
//! A producer task spawns one fetch task per address and queues the join
//! handles, in manifest order, on a bounded channel. The caller drains the
//! channel in order and writes each chunk as its fetch resolves, so fetches
//! complete in any order while output stays in manifest order. The channel
//! depth bounds how many chunks are held in memory.

use crate::backend::ChunkBackend;
use bytes::Bytes;
use chunkvault_core::chunk::ChunkId;
use chunkvault_core::error::{ChunkVaultError, Result};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A spawned chunk fetch, aborted if dropped before it is awaited
struct Fetch(JoinHandle<Result<Bytes>>);

impl Drop for Fetch {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn fetch(backend: Arc<dyn ChunkBackend>, id: ChunkId, verify: bool) -> Result<Bytes> {
    let data = match backend.get(id).await? {
        Some(data) => data,
        None => {
            warn!(chunk_id = %id, "Manifest references a chunk the store does not hold");
            return Err(ChunkVaultError::ChunkNotFound(id));
        }
    };

    if verify && !id.verify(&data) {
        warn!(chunk_id = %id, size = data.len(), "Chunk content does not match its address");
        return Err(ChunkVaultError::ChunkCorrupted(id));
    }

    Ok(data)
}

/// Reassembles files from their chunk addresses
#[derive(Clone)]
pub struct ParallelReader {
    backend: Arc<dyn ChunkBackend>,
    depth: usize,
    verify: bool,
}

impl ParallelReader {
    /// `depth` is the number of fetches queued ahead of the writer
    /// (at least one). With `verify` set every chunk is re-hashed.
    pub fn new(backend: Arc<dyn ChunkBackend>, depth: usize, verify: bool) -> Self {
        Self {
            backend,
            depth: depth.max(1),
            verify,
        }
    }

    /// Write the chunks of `ids`, in order, to `writer`. Returns the number
    /// of bytes written.
    ///
    /// On failure, chunks before the failing one have already been written.
    pub async fn reconstruct<W>(&self, ids: &[ChunkId], writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let (tx, mut rx) = mpsc::channel::<Fetch>(self.depth);
        let backend = self.backend.clone();
        let verify = self.verify;
        let ids = ids.to_vec();

        let producer = tokio::spawn(async move {
            for id in ids {
                let handle = Fetch(tokio::spawn(fetch(backend.clone(), id, verify)));
                if tx.send(handle).await.is_err() {
                    // Consumer gave up
                    break;
                }
            }
        });

        match Self::drain(&mut rx, writer).await {
            Ok(written) => {
                producer
                    .await
                    .map_err(|e| ChunkVaultError::TaskFailed(e.to_string()))?;
                writer.flush().await?;
                debug!(bytes = written, "Reconstruction complete");
                Ok(written)
            }
            Err(e) => {
                // Dropping a queued or in-hand fetch aborts it
                producer.abort();
                rx.close();
                while rx.try_recv().is_ok() {}
                if let Err(flush_err) = writer.flush().await {
                    debug!(error = %flush_err, "Discarding flush error after failed reconstruction");
                }
                Err(e)
            }
        }
    }

    async fn drain<W>(rx: &mut mpsc::Receiver<Fetch>, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut written = 0u64;

        while let Some(mut pending) = rx.recv().await {
            let data = (&mut pending.0)
                .await
                .map_err(|e| ChunkVaultError::TaskFailed(e.to_string()))??;
            writer.write_all(&data).await?;
            written += data.len() as u64;
        }

        Ok(written)
    }
}
