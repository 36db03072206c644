//! Foundation types for Kiln.
//!
//! This crate provides the identity, stage, and record types shared by every
//! other Kiln crate. It has no I/O and no storage logic: records here are
//! plain values, and the relationship rules between them are enforced by
//! `kiln-store`.
//!
//! # Key Types
//!
//! - [`EntityId`] -- UUID v7 identity assigned at construction
//! - [`Stage`] -- the seven ordered production stages, with [`next_stage`]
//!   and [`current_stage`]
//! - [`Piece`], [`StageEvent`] -- a ceramic piece and its stage history
//! - [`ClayBody`], [`Glaze`], [`RecipeLine`] -- materials
//! - [`Firing`], [`FiringMethod`] -- kiln sessions and the method catalog
//! - [`Media`] -- a photo record pointing at a blob by file name
//! - [`Record`] -- sum type over every record kind, used by the change feed

pub mod clay;
pub mod error;
pub mod firing;
pub mod glaze;
pub mod id;
pub mod media;
pub mod piece;
pub mod record;
pub mod stage;

pub use clay::{ClayBody, ClayBodyPatch};
pub use error::TypeError;
pub use firing::{Firing, FiringMethod, FiringPatch};
pub use glaze::{Glaze, GlazePatch, RecipeLine};
pub use id::{EntityId, EntityKind, EntityRef};
pub use media::{Media, MediaOwner};
pub use piece::{NewPiece, Piece, PiecePatch, StageEvent, StageEventPatch};
pub use record::Record;
pub use stage::{current_stage, next_stage, Stage};

/// Wall-clock timestamp used on every record.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
