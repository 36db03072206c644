use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::graph::Graph;

const FORMAT_VERSION: u32 = 1;

/// First line of a snapshot file.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotHeader {
    format_version: u32,
    /// Hex-encoded BLAKE3 digest of the body bytes that follow.
    checksum: String,
}

/// On-disk snapshot of the whole graph.
///
/// Layout is one JSON header line followed by the graph as JSON. The
/// checksum covers the body bytes exactly as written. Saves go through a
/// temporary file in the same directory and an atomic rename.
#[derive(Clone, Debug)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and verify the snapshot. Returns `None` if no file exists yet.
    pub fn load(&self) -> StoreResult<Option<Graph>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut reader = bytes.as_slice();
        let mut header_line = String::new();
        reader.read_line(&mut header_line)?;
        let header: SnapshotHeader = serde_json::from_str(header_line.trim_end())
            .map_err(|e| StoreError::Serialization(format!("snapshot header: {e}")))?;
        if header.format_version != FORMAT_VERSION {
            return Err(StoreError::Serialization(format!(
                "unsupported snapshot format version {}",
                header.format_version
            )));
        }

        let body = reader;
        let computed = hex::encode(blake3::hash(body).as_bytes());
        if computed != header.checksum {
            return Err(StoreError::CorruptSnapshot {
                path: self.path.clone(),
                expected: header.checksum,
                computed,
            });
        }

        let mut graph: Graph = serde_json::from_slice(body)
            .map_err(|e| StoreError::Serialization(format!("snapshot body: {e}")))?;
        graph.reindex()?;
        info!(
            path = %self.path.display(),
            pieces = graph.pieces.len(),
            media = graph.media.len(),
            "snapshot loaded"
        );
        Ok(Some(graph))
    }

    /// Write the graph atomically.
    pub fn save(&self, graph: &Graph) -> StoreResult<()> {
        let body = serde_json::to_vec(graph)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let header = SnapshotHeader {
            format_version: FORMAT_VERSION,
            checksum: hex::encode(blake3::hash(&body).as_bytes()),
        };
        let header = serde_json::to_string(&header)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(header.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        debug!(path = %self.path.display(), bytes = body.len(), "snapshot saved");
        Ok(())
    }
}
