use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

/// Name of the config file looked up inside the data directory.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Settings for one Kiln studio on disk.
///
/// Every field has a default, so an empty or missing `kiln.toml` is valid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KilnConfig {
    /// Directory holding the record snapshot.
    pub data_dir: PathBuf,
    /// Photo directory. Relative paths are resolved against `data_dir`;
    /// unset means `<data_dir>/photos`.
    pub photos_dir: Option<PathBuf>,
    /// Extension given to newly stored photos.
    pub photo_extension: String,
    /// `fsync` photos before they become visible.
    pub sync_on_write: bool,
    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".kiln"),
            photos_dir: None,
            photo_extension: kiln_blob::DEFAULT_EXTENSION.to_string(),
            sync_on_write: true,
            log_filter: "warn".to_string(),
        }
    }
}

impl KilnConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Resolve the effective config.
    ///
    /// An explicit `--config` file must exist. Otherwise `kiln.toml` in the
    /// data directory is used when present. `--data-dir` overrides whatever
    /// the file says.
    pub fn discover(config: Option<&Path>, data_dir: Option<&Path>) -> anyhow::Result<Self> {
        let mut loaded = match config {
            Some(path) => Self::load(path)?,
            None => {
                let dir = data_dir
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| Self::default().data_dir);
                let candidate = dir.join(CONFIG_FILE);
                if candidate.is_file() {
                    Self::load(&candidate)?
                } else {
                    Self::default()
                }
            }
        };
        if let Some(dir) = data_dir {
            loaded.data_dir = dir.to_path_buf();
        }
        loaded.validate()?;
        Ok(loaded)
    }

    /// Garbage collection deletes unreferenced photo files, so the photo
    /// directory must not hold the snapshot or the config.
    pub fn validate(&self) -> anyhow::Result<()> {
        let photos = lexical(&self.photos_path());
        let data = lexical(&self.data_dir);
        if data.starts_with(&photos) {
            bail!(
                "photos_dir {} must not be the data directory {} or contain it",
                self.photos_path().display(),
                self.data_dir.display()
            );
        }
        Ok(())
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }

    pub fn photos_path(&self) -> PathBuf {
        match &self.photos_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.data_dir.join(dir),
            None => self.data_dir.join("photos"),
        }
    }
}

/// Fold `.` and `..` without touching the filesystem.
fn lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir if matches!(out.components().next_back(), Some(Component::Normal(_))) => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
