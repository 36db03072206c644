use std::io;

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// No blob is stored under this name.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// The blob bytes could not be written. Nothing was stored.
    #[error("failed to write blob {name}: {source}")]
    WriteFailed {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The blob exists but could not be removed.
    #[error("failed to delete blob {name}: {source}")]
    DeleteFailed {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The blob exists but could not be read.
    #[error("failed to read blob {name}: {source}")]
    ReadFailed {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The name is not one this store could have generated.
    #[error("invalid blob name: {0:?}")]
    InvalidName(String),

    /// The store root could not be opened or listed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BlobError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias for blob operations.
pub type BlobResult<T> = Result<T, BlobError>;
