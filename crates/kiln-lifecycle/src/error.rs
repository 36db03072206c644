use kiln_blob::BlobError;
use kiln_store::StoreError;

/// Errors from coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Saving photo bytes failed. No media record was created.
    #[error("photo storage write failed: {0}")]
    StorageWriteFailed(#[source] BlobError),

    /// A blob read or listing failed.
    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),

    /// A media record arrived without bytes for a blob this device does not
    /// have.
    #[error("media {media} needs blob {file_name}, which is neither stored nor supplied")]
    MissingBlob { media: String, file_name: String },

    #[error("coordinator lock poisoned")]
    LockPoisoned,
}

impl LifecycleError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Store(e) => e.is_not_found(),
            Self::Blob(e) => e.is_not_found(),
            _ => false,
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
