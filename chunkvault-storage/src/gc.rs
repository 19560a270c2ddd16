//! Mark-and-sweep garbage collection
//!
//! Mark reads every manifest and unions its addresses; sweep deletes every
//! stored chunk outside that set and then compacts the backend. Nothing
//! persists between runs, so an interrupted collection is finished by the
//! next one.
//!
//! The collector must have the store to itself: an add that has stored
//! chunks but not yet written its manifest would lose them.

use crate::backend::ChunkBackend;
use crate::manifest::ManifestStore;
use chunkvault_core::chunk::ChunkId;
use chunkvault_core::error::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of one collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Distinct addresses referenced by at least one manifest
    pub reachable: usize,
    /// Chunks found in the store
    pub scanned: usize,
    /// Chunks deleted (or, in dry-run mode, that would be)
    pub removed: usize,
    /// Empty shard containers released by compaction
    pub shards_pruned: usize,
}

pub struct GarbageCollector {
    manifests: ManifestStore,
    backend: Arc<dyn ChunkBackend>,
    verbose: bool,
    dry_run: bool,
}

impl GarbageCollector {
    pub fn new(manifests: ManifestStore, backend: Arc<dyn ChunkBackend>) -> Self {
        Self {
            manifests,
            backend,
            verbose: false,
            dry_run: false,
        }
    }

    /// Log every removed address at info level
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Report what would be removed without deleting anything
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Addresses referenced by any manifest
    pub async fn mark(&self) -> Result<HashSet<ChunkId>> {
        let mut reachable = HashSet::new();

        for name in self.manifests.list().await? {
            let manifest = self.manifests.load(&name).await?;
            debug!(name = %name, chunks = manifest.len(), "Marked manifest");
            reachable.extend(manifest.chunks().iter().copied());
        }

        Ok(reachable)
    }

    /// Run one full collection
    pub async fn collect(&self) -> Result<GcReport> {
        let reachable = self.mark().await?;
        let stored = self.backend.list_chunks().await?;

        let mut report = GcReport {
            reachable: reachable.len(),
            scanned: stored.len(),
            ..Default::default()
        };

        for id in stored {
            if reachable.contains(&id) {
                continue;
            }

            if self.dry_run {
                report.removed += 1;
            } else if self.backend.delete(id).await? {
                report.removed += 1;
            } else {
                continue;
            }

            if self.verbose {
                info!(chunk_id = %id, dry_run = self.dry_run, "Removing unreferenced chunk");
            } else {
                debug!(chunk_id = %id, dry_run = self.dry_run, "Removing unreferenced chunk");
            }
        }

        if !self.dry_run {
            report.shards_pruned = self.backend.compact().await?;
        }

        info!(
            reachable = report.reachable,
            scanned = report.scanned,
            removed = report.removed,
            shards_pruned = report.shards_pruned,
            dry_run = self.dry_run,
            "Garbage collection complete"
        );

        Ok(report)
    }
}
