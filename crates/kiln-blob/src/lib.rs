//! Photo blob storage for Kiln.
//!
//! Blobs are opaque byte strings (photos) stored outside the record graph
//! and addressed by a file name that the store generates on save. Callers
//! never choose names; the only exception is [`BlobStore::import`], which
//! accepts a name generated by a peer store during replication.
//!
//! # Backends
//!
//! All backends implement the [`BlobStore`] trait:
//!
//! - [`FsBlobStore`] -- one file per blob in a directory
//! - [`InMemoryBlobStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Writes are all-or-nothing: a failed save leaves no file behind.
//! 2. A name, once generated, is never reused for different bytes.
//! 3. I/O errors are propagated with the blob name attached.
//! 4. The store never calls into the entity store.

pub mod error;
pub mod fs;
pub mod memory;
pub mod name;
pub mod traits;

pub use error::{BlobError, BlobResult};
pub use fs::{FsBlobConfig, FsBlobStore};
pub use memory::InMemoryBlobStore;
pub use name::{generate_name, is_generated_name, validate_name, DEFAULT_EXTENSION};
pub use traits::BlobStore;
