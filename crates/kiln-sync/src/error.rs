use kiln_blob::BlobError;
use kiln_lifecycle::LifecycleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("lifecycle error: {0}")]
    Lifecycle(LifecycleError),

    /// A media upsert named a blob this replica does not have and the
    /// change carried no bytes for it.
    #[error("media {media} needs blob {file_name}, which is neither stored nor supplied")]
    MissingBlob { media: String, file_name: String },

    #[error("blob error: {0}")]
    Blob(#[from] BlobError),

    /// The outbox fell behind the change feed and missed changes.
    #[error("outbox lagged behind the change feed by {0} changes")]
    Lagged(u64),

    #[error("change feed closed")]
    FeedClosed,

    #[error("transport error: {0}")]
    Transport(String),
}

impl SyncError {
    /// The mutation refers to something not (yet) present here. The channel
    /// is expected to redeliver it.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Lifecycle(e) if e.is_not_found())
    }
}

impl From<LifecycleError> for SyncError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::MissingBlob { media, file_name } => {
                Self::MissingBlob { media, file_name }
            }
            other => Self::Lifecycle(other),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
