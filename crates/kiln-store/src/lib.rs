//! # kiln-store
//!
//! The entity store: a graph of typed records (pieces, stage events, clay
//! bodies, glazes, recipe lines, firings, firing methods, media) with
//! globally unique identity, validated relationship edges, and per-kind
//! cascade-delete rules.
//!
//! ## Architecture
//!
//! - [`EntityStore`]: commit-based store. Every write runs on a copy of the
//!   graph, is verified, optionally persisted, then swapped in.
//! - [`Removal`]: what a delete removed, what it nullified, and which blobs
//!   the caller must now delete.
//! - [`ChangeFeed`]: broadcast of committed [`Change`]s, tagged with their
//!   [`Origin`] so a replication layer can skip its own echoes.
//! - [`SnapshotFile`]: checksummed JSON snapshot with atomic replace.
//!
//! The store never touches blob storage.

pub mod cascade;
pub mod change;
pub mod error;
pub mod feed;
pub mod graph;
pub mod query;
pub mod snapshot;
pub mod store;

pub use cascade::Removal;
pub use change::{Change, ChangeOp, Origin};
pub use error::{StoreError, StoreResult};
pub use feed::{ChangeFeed, ChangeFilter, ChangeStream, FeedConfig};
pub use graph::Graph;
pub use query::Entity;
pub use snapshot::SnapshotFile;
pub use store::{EntityStore, StoreConfig};
