//! Manifests
//!
//! A manifest is the ordered list of chunk addresses that reconstructs one
//! named file. On disk it is one lowercase hex address per line with a
//! trailing newline and nothing else; the empty manifest is the empty file.

use chunkvault_core::chunk::ChunkId;
use chunkvault_core::error::{ChunkVaultError, Result};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Check that `name` is usable as a manifest name.
///
/// A name is a single non-empty path component that does not start with a
/// dot. Dot-prefixed names are reserved for temporary files.
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0']);

    if valid {
        Ok(())
    } else {
        Err(ChunkVaultError::InvalidName(name.to_string()))
    }
}

/// Ordered chunk addresses of one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    chunks: Vec<ChunkId>,
}

impl Manifest {
    pub fn new(chunks: Vec<ChunkId>) -> Self {
        Self { chunks }
    }

    pub fn chunks(&self) -> &[ChunkId] {
        &self.chunks
    }

    pub fn into_chunks(self) -> Vec<ChunkId> {
        self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Distinct addresses referenced
    pub fn unique_chunks(&self) -> HashSet<ChunkId> {
        self.chunks.iter().copied().collect()
    }

    /// Serialize to the on-disk text form
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.chunks.len() * 65);
        for id in &self.chunks {
            out.push_str(&id.to_hex());
            out.push('\n');
        }
        out
    }

    /// Parse the on-disk text form. `name` is only used in errors.
    ///
    /// A missing final newline is accepted; blank lines, stray whitespace and
    /// anything that is not a lowercase hex address are not.
    pub fn parse(name: &str, text: &str) -> Result<Self> {
        if text.is_empty() {
            return Ok(Self::default());
        }

        let body = text.strip_suffix('\n').unwrap_or(text);
        let mut chunks = Vec::new();

        for (i, line) in body.split('\n').enumerate() {
            let corrupt = |reason: &str| ChunkVaultError::CorruptManifest {
                name: name.to_string(),
                line: i + 1,
                reason: reason.to_string(),
            };

            if line.is_empty() {
                return Err(corrupt("blank line"));
            }
            let id = ChunkId::from_hex(line).map_err(|_| corrupt("not a chunk address"))?;
            chunks.push(id);
        }

        Ok(Self { chunks })
    }
}

impl From<Vec<ChunkId>> for Manifest {
    fn from(chunks: Vec<ChunkId>) -> Self {
        Self::new(chunks)
    }
}

/// The manifests directory of a repository
#[derive(Debug, Clone)]
pub struct ManifestStore {
    dir: PathBuf,
}

impl ManifestStore {
    /// Open a manifests directory, creating it if missing
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a manifest. Pure; does no I/O and no validation.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Load the manifest stored under `name`
    pub async fn load(&self, name: &str) -> Result<Manifest> {
        validate_name(name)?;

        let raw = match fs::read(self.path(name)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ChunkVaultError::ManifestNotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let text = std::str::from_utf8(&raw).map_err(|e| ChunkVaultError::CorruptManifest {
            name: name.to_string(),
            line: 0,
            reason: format!("not UTF-8: {}", e),
        })?;

        Manifest::parse(name, text)
    }

    /// Write `manifest` under `name`, replacing any existing one
    pub async fn write(&self, name: &str, manifest: &Manifest) -> Result<()> {
        validate_name(name)?;

        let path = self.path(name);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));

        if let Err(e) = fs::write(&tmp, manifest.encode()).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(name = %name, chunks = manifest.len(), "Wrote manifest");
        Ok(())
    }

    /// Whether a manifest exists under `name`
    pub async fn exists(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        Ok(fs::try_exists(self.path(name)).await?)
    }

    /// All manifest names, sorted. Entries whose names are not UTF-8 cannot
    /// be addressed and are skipped.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!(name = ?raw, "Skipping manifest with a non-UTF-8 name");
                    continue;
                }
            };
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }

        names.sort();
        Ok(names)
    }

    /// Delete the manifest stored under `name`. Chunks are left alone.
    pub async fn remove(&self, name: &str) -> Result<()> {
        validate_name(name)?;

        match fs::remove_file(self.path(name)).await {
            Ok(()) => {
                debug!(name = %name, "Removed manifest");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ChunkVaultError::ManifestNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
