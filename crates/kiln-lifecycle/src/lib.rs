//! # kiln-lifecycle
//!
//! The lifecycle coordinator: the only component that works across both
//! the entity store and the blob store.
//!
//! - Stage transitions (`advance_stage`, `move_to_stage`, event edits) and
//!   the stage board.
//! - Photo pairing: a media record exists exactly when its blob does,
//!   outside of a single coordinator call.
//! - Deletes: the record cascade commits atomically, then the released
//!   blobs are deleted. Blob failures are reported, never rolled back into
//!   the records.
//! - Remote apply hooks used by `kiln-sync`.

pub mod board;
pub mod coordinator;
pub mod error;
pub mod report;

#[cfg(test)]
mod testing;

pub use board::{BoardCard, BoardColumn, StageBoard};
pub use coordinator::LifecycleCoordinator;
pub use error::{LifecycleError, LifecycleResult};
pub use report::{DeleteReport, GcReport, LeakedBlob, PairingReport};
