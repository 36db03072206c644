use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Globally unique identifier for any Kiln record (UUID v7 for time-ordering).
///
/// Assigned once by a record constructor and never changed afterwards.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(uuid::Uuid);

impl EntityId {
    /// Generate a new time-ordered identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (first 8 characters of the UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.short_id())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TypeError::InvalidId(format!("{s}: {e}")))
    }
}

/// The record kinds held by the entity store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Piece,
    StageEvent,
    ClayBody,
    Glaze,
    RecipeLine,
    Firing,
    FiringMethod,
    Media,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        Self::Piece,
        Self::StageEvent,
        Self::ClayBody,
        Self::Glaze,
        Self::RecipeLine,
        Self::Firing,
        Self::FiringMethod,
        Self::Media,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Piece => "piece",
            Self::StageEvent => "stage-event",
            Self::ClayBody => "clay-body",
            Self::Glaze => "glaze",
            Self::RecipeLine => "recipe-line",
            Self::Firing => "firing",
            Self::FiringMethod => "firing-method",
            Self::Media => "media",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| TypeError::UnknownKind(s.to_string()))
    }
}

/// A typed pointer to a record: its kind plus its identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: EntityId) -> Self {
        Self { kind, id }
    }

    pub fn piece(id: EntityId) -> Self {
        Self::new(EntityKind::Piece, id)
    }

    pub fn stage_event(id: EntityId) -> Self {
        Self::new(EntityKind::StageEvent, id)
    }

    pub fn clay_body(id: EntityId) -> Self {
        Self::new(EntityKind::ClayBody, id)
    }

    pub fn glaze(id: EntityId) -> Self {
        Self::new(EntityKind::Glaze, id)
    }

    pub fn recipe_line(id: EntityId) -> Self {
        Self::new(EntityKind::RecipeLine, id)
    }

    pub fn firing(id: EntityId) -> Self {
        Self::new(EntityKind::Firing, id)
    }

    pub fn firing_method(id: EntityId) -> Self {
        Self::new(EntityKind::FiringMethod, id)
    }

    pub fn media(id: EntityId) -> Self {
        Self::new(EntityKind::Media, id)
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id.short_id())
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}
