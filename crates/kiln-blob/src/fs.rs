use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{BlobError, BlobResult};
use crate::name::{generate_name, is_generated_name, validate_name, DEFAULT_EXTENSION};
use crate::traits::BlobStore;

/// Configuration for the [`FsBlobStore`].
#[derive(Clone, Debug)]
pub struct FsBlobConfig {
    /// Extension appended to generated names (without the dot).
    pub extension: String,
    /// `fsync` each blob before it becomes visible under its final name.
    pub sync_on_write: bool,
}

impl Default for FsBlobConfig {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            sync_on_write: true,
        }
    }
}

/// Directory-backed blob store: one file per blob.
///
/// Bytes are written to a temporary file in the same directory and renamed
/// into place, so a crash or failed write never leaves a partial blob under
/// a real name.
pub struct FsBlobStore {
    root: PathBuf,
    config: FsBlobConfig,
}

impl FsBlobStore {
    /// Open (or create) a blob directory.
    pub fn open(root: impl Into<PathBuf>, config: FsBlobConfig) -> BlobResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        info!(root = %root.display(), "blob store opened");
        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> BlobResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    fn write_new(&self, name: &str, bytes: &[u8]) -> BlobResult<()> {
        let path = self.path_for(name)?;
        let write_failed = |source: io::Error| BlobError::WriteFailed {
            name: name.to_string(),
            source,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&self.root).map_err(write_failed)?;
        tmp.write_all(bytes).map_err(write_failed)?;
        if self.config.sync_on_write {
            tmp.as_file().sync_all().map_err(write_failed)?;
        }
        tmp.persist_noclobber(&path)
            .map_err(|e| write_failed(e.error))?;

        debug!(name, bytes = bytes.len(), "blob written");
        Ok(())
    }
}

impl BlobStore for FsBlobStore {
    fn save(&self, bytes: &[u8]) -> BlobResult<String> {
        let name = generate_name(&self.config.extension);
        self.write_new(&name, bytes)?;
        Ok(name)
    }

    fn load(&self, name: &str) -> BlobResult<Vec<u8>> {
        let path = self.path_for(name)?;
        fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => BlobError::NotFound(name.to_string()),
            _ => BlobError::ReadFailed {
                name: name.to_string(),
                source,
            },
        })
    }

    fn delete(&self, name: &str) -> BlobResult<()> {
        let path = self.path_for(name)?;
        fs::remove_file(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => BlobError::NotFound(name.to_string()),
            _ => BlobError::DeleteFailed {
                name: name.to_string(),
                source,
            },
        })?;
        debug!(name, "blob deleted");
        Ok(())
    }

    fn exists(&self, name: &str) -> BlobResult<bool> {
        let path = self.path_for(name)?;
        Ok(path.try_exists()?)
    }

    fn import(&self, name: &str, bytes: &[u8]) -> BlobResult<bool> {
        if self.exists(name)? {
            return Ok(false);
        }
        match self.write_new(name, bytes) {
            Ok(()) => Ok(true),
            // Lost a race with a concurrent import of the same name.
            Err(BlobError::WriteFailed { source, .. })
                if source.kind() == io::ErrorKind::AlreadyExists =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn list(&self) -> BlobResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                // Temp files and anything else sharing the directory are not blobs.
                if is_generated_name(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

impl std::fmt::Debug for FsBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsBlobStore")
            .field("root", &self.root)
            .field("extension", &self.config.extension)
            .finish()
    }
}
