use serde::Serialize;

use kiln_store::Removal;
use kiln_types::{EntityRef, Media};

/// A blob whose record is gone but whose bytes could not be deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeakedBlob {
    pub file_name: String,
    pub reason: String,
}

/// Outcome of a delete.
///
/// The record side always committed in full. `leaked_blobs` lists blob
/// deletions that failed afterwards; those bytes are orphaned, not
/// referenced.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DeleteReport {
    pub removed: Vec<EntityRef>,
    pub nullified: Vec<EntityRef>,
    pub deleted_blobs: Vec<String>,
    pub leaked_blobs: Vec<LeakedBlob>,
}

impl DeleteReport {
    pub(crate) fn from_removal(removal: Removal) -> Self {
        Self {
            removed: removal.removed,
            nullified: removal.nullified,
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.leaked_blobs.is_empty()
    }
}

/// Mismatches between media records and blob storage.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PairingReport {
    /// Blobs no media record refers to. Left behind by leaked deletes.
    pub orphan_blobs: Vec<String>,
    /// Media records whose blob is missing.
    pub dangling_media: Vec<Media>,
}

impl PairingReport {
    pub fn is_healthy(&self) -> bool {
        self.orphan_blobs.is_empty() && self.dangling_media.is_empty()
    }
}

/// Outcome of an orphan-blob sweep.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GcReport {
    pub deleted: Vec<String>,
    pub failed: Vec<LeakedBlob>,
}
