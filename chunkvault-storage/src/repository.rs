//! Repository facade
//!
//! Ties the chunker, upload pipeline, manifest store, reader and collector
//! together over one root directory:
//!
//! ```text
//! <root>/chunks/<hh>/<address>
//! <root>/manifests/<name>
//! ```
//!
//! A repository assumes a single writer. Adds to the same name, or an add
//! racing a removal or collection, must be serialized by the caller.

use crate::backend::{ChunkBackend, StorageStats};
use crate::fs::{self as fs_backend, FsBackend};
use crate::gc::{GarbageCollector, GcReport};
use crate::manifest::{validate_name, Manifest, ManifestStore};
use crate::pipeline::UploadPipeline;
use crate::reader::ParallelReader;
use crate::stream::{ChunkSource, StreamChunker};
use bytes::Bytes;
use chunkvault_core::chunk::ChunkId;
use chunkvault_core::chunker::SliceChunker;
use chunkvault_core::config::StoreConfig;
use chunkvault_core::error::{ChunkVaultError, Result};
use memmap2::Mmap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, instrument};

/// Repository-wide counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryStats {
    /// Number of stored manifests
    pub manifests: usize,
    /// Chunk backend statistics
    pub storage: StorageStats,
}

/// A deduplicating blob store rooted at one directory
pub struct Repository {
    config: StoreConfig,
    backend: Arc<dyn ChunkBackend>,
    manifests: ManifestStore,
}

impl Repository {
    /// Open a repository on the local filesystem, creating its directories
    /// if missing
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let backend = Arc::new(FsBackend::open(config.chunks_dir())?);
        Self::with_backend(config, backend)
    }

    /// Open a repository whose chunks live in `backend`. Manifests stay
    /// under the configured root.
    pub fn with_backend(config: StoreConfig, backend: Arc<dyn ChunkBackend>) -> Result<Self> {
        config.validate()?;
        let manifests = ManifestStore::open(config.manifests_dir())?;

        info!(root = ?config.root, "Opened repository");

        Ok(Self {
            config,
            backend,
            manifests,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn ChunkBackend> {
        &self.backend
    }

    pub fn manifests(&self) -> &ManifestStore {
        &self.manifests
    }

    /// Where a chunk lives under the filesystem layout. Pure.
    pub fn chunk_path(&self, id: &ChunkId) -> PathBuf {
        fs_backend::chunk_path(&self.config.chunks_dir(), id)
    }

    /// Where a manifest lives. Pure.
    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.manifests.path(name)
    }

    /// Store one chunk and return its address
    pub async fn store_chunk(&self, data: Bytes) -> Result<ChunkId> {
        let id = ChunkId::from_data(&data);
        self.backend.put(id, data).await?;
        Ok(id)
    }

    /// Fetch one chunk by address
    pub async fn load_chunk(&self, id: ChunkId) -> Result<Bytes> {
        self.backend
            .get(id)
            .await?
            .ok_or(ChunkVaultError::ChunkNotFound(id))
    }

    /// Chunk and store everything `reader` yields, then record it as `name`.
    ///
    /// The manifest is written only after every chunk is stored.
    #[instrument(skip(self, reader))]
    pub async fn add<R>(&self, reader: R, name: &str) -> Result<Vec<ChunkId>>
    where
        R: AsyncRead + Unpin + Send,
    {
        validate_name(name)?;
        let mut source = StreamChunker::new(reader, &self.config.chunker);
        self.store_source(&mut source, name).await
    }

    /// Like [`add`](Self::add), reading the file through a memory map
    #[instrument(skip(self, path))]
    pub async fn add_file(&self, path: impl AsRef<Path>, name: &str) -> Result<Vec<ChunkId>> {
        validate_name(name)?;
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?.into_std().await;
        let len = file.metadata()?.len();
        debug!(path = %path.display(), len, "Mapping file");

        // Zero-length files cannot be mapped
        if len == 0 {
            let mut source = SliceChunker::new(Vec::<u8>::new(), &self.config.chunker);
            return self.store_source(&mut source, name).await;
        }

        // SAFETY: the map is read-only and dropped before returning. Another
        // process truncating the file while it is mapped is not supported.
        let map = unsafe { Mmap::map(&file)? };
        #[cfg(unix)]
        map.advise(memmap2::Advice::Sequential)?;

        let mut source = SliceChunker::new(map, &self.config.chunker);
        self.store_source(&mut source, name).await
    }

    async fn store_source<S: ChunkSource>(&self, source: &mut S, name: &str) -> Result<Vec<ChunkId>> {
        let pipeline = UploadPipeline::new(self.backend.clone(), self.config.upload_concurrency);
        let ids = pipeline.run(source).await?;
        self.backend.flush().await?;

        let manifest = Manifest::new(ids);
        self.manifests.write(name, &manifest).await?;

        info!(
            name = %name,
            chunks = manifest.len(),
            unique = manifest.unique_chunks().len(),
            "Added file"
        );
        Ok(manifest.into_chunks())
    }

    /// Write the contents of `name` to `writer`. Returns the bytes written.
    #[instrument(skip(self, writer))]
    pub async fn cat_file<W>(&self, name: &str, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let manifest = self.manifests.load(name).await?;
        let reader = ParallelReader::new(
            self.backend.clone(),
            self.config.read_ahead,
            self.config.verify_reads,
        );
        reader.reconstruct(manifest.chunks(), writer).await
    }

    /// Stored file names, sorted
    pub async fn ls_files(&self) -> Result<Vec<String>> {
        self.manifests.list().await
    }

    /// The manifest recorded for `name`
    pub async fn manifest(&self, name: &str) -> Result<Manifest> {
        self.manifests.load(name).await
    }

    /// Forget `name`. Its chunks stay until the next collection.
    #[instrument(skip(self))]
    pub async fn remove(&self, name: &str) -> Result<()> {
        self.manifests.remove(name).await?;
        info!(name = %name, "Removed file");
        Ok(())
    }

    /// Forget `name` and collect the chunks nothing else references
    pub async fn remove_and_collect(&self, name: &str) -> Result<GcReport> {
        self.remove(name).await?;
        self.gc().await
    }

    /// A collector for this repository, for callers that want verbose or
    /// dry-run collection
    pub fn collector(&self) -> GarbageCollector {
        GarbageCollector::new(self.manifests.clone(), self.backend.clone())
    }

    /// Delete every chunk no manifest references
    #[instrument(skip(self))]
    pub async fn gc(&self) -> Result<GcReport> {
        self.collector().collect().await
    }

    pub async fn stats(&self) -> Result<RepositoryStats> {
        Ok(RepositoryStats {
            manifests: self.manifests.list().await?.len(),
            storage: self.backend.stats().await?,
        })
    }
}
