use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::id::EntityId;
use crate::Timestamp;

/// A kiln firing session.
///
/// `pieces` is the owning side of the many-to-many piece membership; the
/// store mirrors it into `Piece::firings`. `media` is an inverse edge list
/// maintained by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Firing {
    pub id: EntityId,
    pub kiln_name: String,
    pub firing_type: String,
    pub cone: String,
    pub atmosphere: Option<String>,
    pub start_at: Option<Timestamp>,
    pub end_at: Option<Timestamp>,
    pub notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub pieces: Vec<EntityId>,
    #[serde(default)]
    pub media: Vec<EntityId>,
}

impl Firing {
    pub fn new(
        kiln_name: impl Into<String>,
        firing_type: impl Into<String>,
        cone: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            kiln_name: kiln_name.into(),
            firing_type: firing_type.into(),
            cone: cone.into(),
            atmosphere: None,
            start_at: None,
            end_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
            pieces: Vec::new(),
            media: Vec::new(),
        }
    }

    /// Add a piece to this firing. Returns `false` if it was already loaded.
    pub fn add_piece(&mut self, piece: EntityId) -> bool {
        if self.pieces.contains(&piece) {
            return false;
        }
        self.pieces.push(piece);
        self.touch();
        true
    }

    /// Remove a piece from this firing. Returns `false` if it was absent.
    pub fn remove_piece(&mut self, piece: EntityId) -> bool {
        let before = self.pieces.len();
        self.pieces.retain(|p| *p != piece);
        let removed = self.pieces.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Started at or before `now` and not yet ended.
    pub fn is_in_progress(&self, now: Timestamp) -> bool {
        match (self.start_at, self.end_at) {
            (Some(start), Some(end)) => start <= now && now <= end,
            (Some(start), None) => start <= now,
            _ => false,
        }
    }

    pub fn is_completed(&self, now: Timestamp) -> bool {
        self.end_at.is_some_and(|end| now > end)
    }

    pub fn duration(&self) -> Option<Duration> {
        Some(self.end_at? - self.start_at?)
    }

    pub fn apply(&mut self, patch: &FiringPatch) {
        if let Some(v) = &patch.kiln_name {
            self.kiln_name = v.clone();
        }
        if let Some(v) = &patch.firing_type {
            self.firing_type = v.clone();
        }
        if let Some(v) = &patch.cone {
            self.cone = v.clone();
        }
        if let Some(v) = &patch.atmosphere {
            self.atmosphere = v.clone();
        }
        if let Some(v) = patch.start_at {
            self.start_at = v;
        }
        if let Some(v) = patch.end_at {
            self.end_at = v;
        }
        if let Some(v) = &patch.notes {
            self.notes = v.clone();
        }
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Fields of a [`Firing`] that may change in one update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FiringPatch {
    pub kiln_name: Option<String>,
    pub firing_type: Option<String>,
    pub cone: Option<String>,
    pub atmosphere: Option<Option<String>>,
    pub start_at: Option<Option<Timestamp>>,
    pub end_at: Option<Option<Timestamp>>,
    pub notes: Option<Option<String>>,
}

/// Catalog entry describing a way of firing. Not linked to any other record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FiringMethod {
    pub id: EntityId,
    pub name: String,
    pub firing_type: String,
    pub atmosphere: Option<String>,
    pub default_cone: Option<String>,
    pub description: Option<String>,
    pub created_at: Timestamp,
}

impl FiringMethod {
    pub fn new(name: impl Into<String>, firing_type: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            firing_type: firing_type.into(),
            atmosphere: None,
            default_cone: None,
            description: None,
            created_at: Utc::now(),
        }
    }
}
