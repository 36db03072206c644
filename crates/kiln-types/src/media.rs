use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::id::{EntityId, EntityRef};
use crate::stage::Stage;
use crate::Timestamp;

/// The record a photo is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "kebab-case")]
pub enum MediaOwner {
    Piece(EntityId),
    Glaze(EntityId),
    Firing(EntityId),
}

impl MediaOwner {
    pub fn id(&self) -> EntityId {
        match self {
            Self::Piece(id) | Self::Glaze(id) | Self::Firing(id) => *id,
        }
    }

    pub fn entity_ref(&self) -> EntityRef {
        match self {
            Self::Piece(id) => EntityRef::piece(*id),
            Self::Glaze(id) => EntityRef::glaze(*id),
            Self::Firing(id) => EntityRef::firing(*id),
        }
    }
}

/// A photo record. `file_name` is the key of its bytes in the blob store.
///
/// All three owner fields exist; normally exactly one is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub id: EntityId,
    pub file_name: String,
    pub piece_id: Option<EntityId>,
    pub glaze_id: Option<EntityId>,
    pub firing_id: Option<EntityId>,
    pub caption: Option<String>,
    pub stage_at_capture: Option<Stage>,
    pub created_at: Timestamp,
}

impl Media {
    pub fn new(file_name: impl Into<String>, owner: MediaOwner) -> Self {
        let mut media = Self {
            id: EntityId::new(),
            file_name: file_name.into(),
            piece_id: None,
            glaze_id: None,
            firing_id: None,
            caption: None,
            stage_at_capture: None,
            created_at: Utc::now(),
        };
        match owner {
            MediaOwner::Piece(id) => media.piece_id = Some(id),
            MediaOwner::Glaze(id) => media.glaze_id = Some(id),
            MediaOwner::Firing(id) => media.firing_id = Some(id),
        }
        media
    }

    pub fn with_caption(mut self, caption: Option<String>) -> Self {
        self.caption = caption;
        self
    }

    pub fn with_stage(mut self, stage: Option<Stage>) -> Self {
        self.stage_at_capture = stage;
        self
    }

    /// Every owner this record names, in piece/glaze/firing order.
    pub fn owners(&self) -> Vec<MediaOwner> {
        let mut owners = Vec::with_capacity(1);
        if let Some(id) = self.piece_id {
            owners.push(MediaOwner::Piece(id));
        }
        if let Some(id) = self.glaze_id {
            owners.push(MediaOwner::Glaze(id));
        }
        if let Some(id) = self.firing_id {
            owners.push(MediaOwner::Firing(id));
        }
        owners
    }

    pub fn is_owned_by(&self, owner: MediaOwner) -> bool {
        match owner {
            MediaOwner::Piece(id) => self.piece_id == Some(id),
            MediaOwner::Glaze(id) => self.glaze_id == Some(id),
            MediaOwner::Firing(id) => self.firing_id == Some(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sets_exactly_one_owner() {
        let piece = EntityId::new();
        let media = Media::new("a.jpg", MediaOwner::Piece(piece));
        assert_eq!(media.piece_id, Some(piece));
        assert!(media.glaze_id.is_none());
        assert!(media.firing_id.is_none());
        assert_eq!(media.owners(), vec![MediaOwner::Piece(piece)]);
        assert!(media.is_owned_by(MediaOwner::Piece(piece)));
        assert!(!media.is_owned_by(MediaOwner::Glaze(piece)));
    }

    #[test]
    fn builder_sets_caption_and_stage() {
        let media = Media::new("b.jpg", MediaOwner::Firing(EntityId::new()))
            .with_caption(Some("cone pack".into()))
            .with_stage(Some(Stage::GlazeFired));
        assert_eq!(media.caption.as_deref(), Some("cone pack"));
        assert_eq!(media.stage_at_capture, Some(Stage::GlazeFired));
    }

    #[test]
    fn owner_maps_to_entity_ref() {
        let id = EntityId::new();
        assert_eq!(MediaOwner::Glaze(id).entity_ref(), EntityRef::glaze(id));
        assert_eq!(MediaOwner::Glaze(id).id(), id);
    }
}
