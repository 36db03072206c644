use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown stage: {0}")]
    UnknownStage(String),

    #[error("invalid entity id: {0}")]
    InvalidId(String),

    #[error("unknown entity kind: {0}")]
    UnknownKind(String),
}
