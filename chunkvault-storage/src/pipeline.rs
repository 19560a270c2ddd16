//! Upload pipeline
//!
//! Hashes and stores the chunks of one input with at most `concurrency`
//! chunks in flight. Each spawned task writes its address into the slot
//! reserved for its chunk's position, so the returned address list is in
//! input order however the tasks finish.
//!
//! The first error wins. Once an error is recorded no new chunk is
//! launched, but tasks already running are left to finish; `run` waits for
//! all of them before it returns.

use crate::backend::ChunkBackend;
use crate::stream::{ChunkSource, RawChunk};
use chunkvault_core::chunk::ChunkId;
use chunkvault_core::error::{ChunkVaultError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

type FirstError = Arc<Mutex<Option<ChunkVaultError>>>;

/// Record `err` unless an earlier error is already held
fn record_error(slot: &FirstError, err: ChunkVaultError) {
    let mut first = slot.lock();
    if first.is_none() {
        *first = Some(err);
    } else {
        debug!(error = %err, "Discarding error after first failure");
    }
}

/// Bounded-concurrency chunk writer
pub struct UploadPipeline {
    backend: Arc<dyn ChunkBackend>,
    gate: Arc<Semaphore>,
    concurrency: u32,
}

impl UploadPipeline {
    /// Create a pipeline allowing `concurrency` chunks in flight.
    /// A concurrency of zero is treated as one.
    pub fn new(backend: Arc<dyn ChunkBackend>, concurrency: usize) -> Self {
        let concurrency = concurrency.clamp(1, u32::MAX as usize) as u32;
        Self {
            backend,
            gate: Arc::new(Semaphore::new(concurrency as usize)),
            concurrency,
        }
    }

    /// Store every chunk `source` yields and return their addresses in
    /// source order
    pub async fn run<S: ChunkSource>(&self, source: &mut S) -> Result<Vec<ChunkId>> {
        let slots: Arc<Mutex<Vec<Option<ChunkId>>>> = Arc::new(Mutex::new(Vec::new()));
        let first_error: FirstError = Arc::new(Mutex::new(None));

        loop {
            let chunk = match source.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    record_error(&first_error, e);
                    break;
                }
            };

            if first_error.lock().is_some() {
                break;
            }

            let permit = match self.gate.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    record_error(
                        &first_error,
                        ChunkVaultError::TaskFailed("upload gate closed".into()),
                    );
                    break;
                }
            };

            let index = {
                let mut slots = slots.lock();
                slots.push(None);
                slots.len() - 1
            };

            let backend = self.backend.clone();
            let slots = slots.clone();
            let first_error = first_error.clone();

            tokio::spawn(async move {
                let _permit = permit;
                let RawChunk { span, data } = chunk;
                let id = ChunkId::from_data(&data);

                match backend.put(id, data).await {
                    Ok(()) => {
                        debug!(chunk_id = %id, index, from = span.from, to = span.to, "Chunk stored");
                        slots.lock()[index] = Some(id);
                    }
                    Err(e) => record_error(&first_error, e),
                }
            });
        }

        // Every launched task holds a permit until it finishes
        let drained = self
            .gate
            .acquire_many(self.concurrency)
            .await
            .map_err(|_| ChunkVaultError::TaskFailed("upload gate closed".into()))?;
        drop(drained);

        if let Some(err) = first_error.lock().take() {
            return Err(err);
        }

        let slots = std::mem::take(&mut *slots.lock());
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    ChunkVaultError::TaskFailed(format!("upload of chunk {} did not complete", index))
                })
            })
            .collect()
    }
}
