use std::io;
use std::path::PathBuf;

use kiln_types::EntityRef;

/// Errors from entity store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record with this identifier already exists.
    #[error("duplicate identity: {0}")]
    DuplicateIdentity(EntityRef),

    /// No record with this identifier exists.
    #[error("not found: {0}")]
    NotFound(EntityRef),

    /// The relationship graph is inconsistent. Indicates a bug in the
    /// cascade rules, never a user error.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The snapshot on disk does not match its recorded checksum.
    #[error("corrupt snapshot {path}: expected checksum {expected}, computed {computed}")]
    CorruptSnapshot {
        path: PathBuf,
        expected: String,
        computed: String,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the snapshot file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A writer panicked while holding the store lock.
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub(crate) fn invariant(reason: impl Into<String>) -> Self {
        Self::InvariantViolation(reason.into())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
