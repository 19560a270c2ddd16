//! Local filesystem chunk backend
//!
//! Layout: `<chunks>/<hh>/<address>`, where `hh` is the first two hex
//! characters of the address. Every chunk is one plain file holding the raw
//! chunk bytes.
//!
//! Writes land in a dot-prefixed temporary file inside the shard directory
//! and are renamed into place, so a chunk file is either absent or
//! complete. Listing skips dot-prefixed entries. Compaction deletes temp
//! files an interrupted put left behind, so it must not run alongside puts.

use crate::backend::{ChunkBackend, StorageStats};
use bytes::Bytes;
use chunkvault_core::chunk::{ChunkId, SHARD_PREFIX_LEN};
use chunkvault_core::error::{ChunkVaultError, Result};
use futures::future::BoxFuture;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, info};

/// Path of a chunk under a chunk root. Pure; does no I/O.
pub fn chunk_path(chunks_dir: &Path, id: &ChunkId) -> PathBuf {
    chunks_dir.join(id.shard_prefix()).join(id.to_hex())
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn is_temp_file(name: &str) -> bool {
    is_hidden(name) && name.ends_with(".tmp")
}

/// Remove a shard directory already seen to be empty. `Ok(false)` if it is
/// already gone.
async fn remove_empty_shard(dir: &Path) -> Result<bool> {
    match fs::remove_dir(dir).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn is_shard_name(name: &str) -> bool {
    name.len() == SHARD_PREFIX_LEN && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Filesystem-backed chunk store
pub struct FsBackend {
    /// Root of the shard directories
    root: PathBuf,

    /// Operation counters
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl FsBackend {
    /// Open a chunk root, creating it if missing
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        info!(path = ?root, "Opened filesystem chunk store");

        Ok(Self {
            root,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        })
    }

    /// Root of the shard directories
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a chunk file
    pub fn chunk_path(&self, id: &ChunkId) -> PathBuf {
        chunk_path(&self.root, id)
    }

    /// Shard directory names currently on disk
    async fn shard_dirs(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut shards = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_hidden(&name) {
                continue;
            }
            if !is_shard_name(&name) || !entry.file_type().await?.is_dir() {
                return Err(ChunkVaultError::InvalidChunkId(format!(
                    "unexpected entry in chunk root: {}",
                    name
                )));
            }
            shards.push((name, entry.path()));
        }

        shards.sort();
        Ok(shards)
    }

    async fn put_inner(&self, id: ChunkId, data: Bytes) -> Result<()> {
        let path = self.chunk_path(&id);

        if fs::try_exists(&path).await? {
            debug!(chunk_id = %id, "Chunk already stored");
            return Ok(());
        }

        let shard = self.root.join(id.shard_prefix());
        fs::create_dir_all(&shard).await?;

        let tmp = shard.join(format!(".{}.{}.tmp", id, uuid::Uuid::new_v4()));
        if let Err(e) = fs::write(&tmp, &data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!(chunk_id = %id, size = data.len(), "Stored chunk");
        Ok(())
    }

    async fn get_inner(&self, id: ChunkId) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        match fs::read(self.chunk_path(&id)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_inner(&self, id: ChunkId) -> Result<bool> {
        match fs::remove_file(self.chunk_path(&id)).await {
            Ok(()) => {
                self.deletes.fetch_add(1, Ordering::Relaxed);
                debug!(chunk_id = %id, "Deleted chunk");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_inner(&self) -> Result<Vec<ChunkId>> {
        let mut ids = Vec::new();

        for (shard, dir) in self.shard_dirs().await? {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if is_hidden(&name) {
                    continue;
                }
                let id = ChunkId::from_hex(&name)?;
                if id.shard_prefix() != shard {
                    return Err(ChunkVaultError::ShardMismatch { shard, id });
                }
                ids.push(id);
            }
        }

        Ok(ids)
    }

    async fn stats_inner(&self) -> Result<StorageStats> {
        let mut chunk_count = 0u64;
        let mut bytes_used = 0u64;

        for id in self.list_inner().await? {
            match fs::metadata(self.chunk_path(&id)).await {
                Ok(meta) => {
                    chunk_count += 1;
                    bytes_used += meta.len();
                }
                // Deleted between listing and stat
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(StorageStats {
            chunk_count,
            bytes_used,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }

    async fn compact_inner(&self) -> Result<usize> {
        let mut removed = 0;

        for (shard, dir) in self.shard_dirs().await? {
            let mut empty = true;
            let mut entries = fs::read_dir(&dir).await?;

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !is_temp_file(&name) {
                    empty = false;
                    continue;
                }
                match fs::remove_file(entry.path()).await {
                    Ok(()) => debug!(shard = %shard, file = %name, "Removed stale temp file"),
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }

            if empty && remove_empty_shard(&dir).await? {
                debug!(shard = %shard, "Removed empty shard directory");
                removed += 1;
            }
        }

        Ok(removed)
    }
}

impl ChunkBackend for FsBackend {
    fn put(&self, id: ChunkId, data: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.put_inner(id, data))
    }

    fn get(&self, id: ChunkId) -> BoxFuture<'_, Result<Option<Bytes>>> {
        Box::pin(self.get_inner(id))
    }

    fn delete(&self, id: ChunkId) -> BoxFuture<'_, Result<bool>> {
        Box::pin(self.delete_inner(id))
    }

    fn exists(&self, id: ChunkId) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { Ok(fs::try_exists(self.chunk_path(&id)).await?) })
    }

    fn list_chunks(&self) -> BoxFuture<'_, Result<Vec<ChunkId>>> {
        Box::pin(self.list_inner())
    }

    fn stats(&self) -> BoxFuture<'_, Result<StorageStats>> {
        Box::pin(self.stats_inner())
    }

    fn flush(&self) -> BoxFuture<'_, Result<()>> {
        // Chunks are complete files once renamed into place
        Box::pin(async { Ok(()) })
    }

    fn compact(&self) -> BoxFuture<'_, Result<usize>> {
        Box::pin(self.compact_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, FsBackend) {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::open(dir.path().join("chunks")).unwrap();
        (dir, backend)
    }

    #[test]
    fn test_chunk_path_layout() {
        let id = ChunkId::from_data(b"layout");
        let hex = id.to_hex();
        let path = chunk_path(Path::new("/repo/chunks"), &id);
        assert_eq!(
            path,
            PathBuf::from(format!("/repo/chunks/{}/{}", &hex[..2], hex))
        );
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (_dir, backend) = open_temp();
        let data = Bytes::from_static(b"chunk bytes");
        let id = ChunkId::from_data(&data);

        backend.put(id, data.clone()).await.unwrap();
        assert!(backend.chunk_path(&id).is_file());
        assert_eq!(backend.get(id).await.unwrap(), Some(data));
        assert!(backend.exists(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (_dir, backend) = open_temp();
        let id = ChunkId::from_data(b"never stored");
        assert_eq!(backend.get(id).await.unwrap(), None);
        assert!(!backend.delete(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_leaves_existing_chunk_untouched() {
        let (_dir, backend) = open_temp();
        let data = Bytes::from_static(b"original");
        let id = ChunkId::from_data(&data);

        backend.put(id, data.clone()).await.unwrap();
        let before = std::fs::metadata(backend.chunk_path(&id)).unwrap().modified().unwrap();
        backend.put(id, data).await.unwrap();
        let after = std::fs::metadata(backend.chunk_path(&id)).unwrap().modified().unwrap();

        assert_eq!(before, after);
        assert_eq!(backend.stats().await.unwrap().writes, 1);
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let (_dir, backend) = open_temp();
        let data = Bytes::from_static(b"tidy");
        let id = ChunkId::from_data(&data);
        backend.put(id, data).await.unwrap();

        let shard = backend.root().join(id.shard_prefix());
        let names: Vec<String> = std::fs::read_dir(shard)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![id.to_hex()]);
    }

    #[tokio::test]
    async fn test_list_and_stats() {
        let (_dir, backend) = open_temp();
        let mut expected = Vec::new();
        for i in 0..20u8 {
            let data = Bytes::from(vec![i; 10]);
            let id = ChunkId::from_data(&data);
            backend.put(id, data).await.unwrap();
            expected.push(id);
        }

        let mut listed = backend.list_chunks().await.unwrap();
        listed.sort();
        expected.sort();
        assert_eq!(listed, expected);

        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.chunk_count, 20);
        assert_eq!(stats.bytes_used, 200);
    }

    #[tokio::test]
    async fn test_list_detects_shard_mismatch() {
        let (_dir, backend) = open_temp();
        let id = ChunkId::from_data(b"misplaced");
        let wrong_shard = if id.shard_prefix() == "00" { "01" } else { "00" };
        let dir = backend.root().join(wrong_shard);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(id.to_hex()), b"misplaced").unwrap();

        let err = backend.list_chunks().await.unwrap_err();
        assert!(matches!(err, ChunkVaultError::ShardMismatch { .. }));
        assert!(err.is_corrupt());
    }

    #[tokio::test]
    async fn test_list_rejects_foreign_files() {
        let (_dir, backend) = open_temp();
        let dir = backend.root().join("ab");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("not-a-chunk"), b"junk").unwrap();

        let err = backend.list_chunks().await.unwrap_err();
        assert!(matches!(err, ChunkVaultError::InvalidChunkId(_)));
    }

    #[tokio::test]
    async fn test_compact_removes_only_empty_shards() {
        let (_dir, backend) = open_temp();
        let keep = Bytes::from_static(b"keep");
        let keep_id = ChunkId::from_data(&keep);
        let (gone, gone_id) = (0u32..)
            .map(|i| {
                let data = Bytes::from(format!("gone {}", i));
                let id = ChunkId::from_data(&data);
                (data, id)
            })
            .find(|(_, id)| id.shard_prefix() != keep_id.shard_prefix())
            .unwrap();

        backend.put(keep_id, keep).await.unwrap();
        backend.put(gone_id, gone).await.unwrap();
        assert!(backend.delete(gone_id).await.unwrap());

        assert_eq!(backend.compact().await.unwrap(), 1);
        assert!(!backend.root().join(gone_id.shard_prefix()).exists());
        assert!(backend.root().join(keep_id.shard_prefix()).exists());
        assert_eq!(backend.compact().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_compact_reclaims_stale_temp_files() {
        let (_dir, backend) = open_temp();
        let keep = Bytes::from_static(b"kept chunk");
        let keep_id = ChunkId::from_data(&keep);
        backend.put(keep_id, keep).await.unwrap();

        // Leftovers of puts that died before the rename
        let kept_shard = backend.root().join(keep_id.shard_prefix());
        let stale = kept_shard.join(format!(".{}.dead.tmp", keep_id));
        std::fs::write(&stale, b"partial").unwrap();
        let orphan_shard = backend.root().join("ab");
        std::fs::create_dir_all(&orphan_shard).unwrap();
        std::fs::write(orphan_shard.join(".abcd.dead.tmp"), b"partial").unwrap();

        let pruned = backend.compact().await.unwrap();

        assert!(!stale.exists());
        assert!(backend.chunk_path(&keep_id).is_file());
        if keep_id.shard_prefix() == "ab" {
            assert_eq!(pruned, 0);
        } else {
            assert_eq!(pruned, 1);
            assert!(!orphan_shard.exists());
        }
        assert_eq!(backend.list_chunks().await.unwrap(), vec![keep_id]);
    }

    #[tokio::test]
    async fn test_remove_empty_shard_reports_failures() {
        let (dir, _backend) = open_temp();

        let empty = dir.path().join("empty");
        std::fs::create_dir(&empty).unwrap();
        assert!(remove_empty_shard(&empty).await.unwrap());
        assert!(!remove_empty_shard(&empty).await.unwrap());

        // Not a directory
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        let err = remove_empty_shard(&file).await.unwrap_err();
        assert!(matches!(err, ChunkVaultError::Io(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_compact_fails_when_shard_cannot_be_removed() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, backend) = open_temp();
        std::fs::create_dir(backend.root().join("ab")).unwrap();

        let locked = std::fs::Permissions::from_mode(0o555);
        std::fs::set_permissions(backend.root(), locked).unwrap();
        let result = backend.compact().await;
        // Privileged users ignore directory permissions
        let privileged = std::fs::write(backend.root().join("write-check"), b"").is_ok();
        std::fs::set_permissions(backend.root(), std::fs::Permissions::from_mode(0o755)).unwrap();

        if privileged {
            return;
        }
        assert!(matches!(result, Err(ChunkVaultError::Io(_))));
        assert!(backend.root().join("ab").is_dir());
    }
}
