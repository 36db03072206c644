//! Delete rules.
//!
//! | deleted       | owned children removed        | references nullified         |
//! |---------------|-------------------------------|------------------------------|
//! | piece         | stage events, media           | dropped from firings         |
//! | glaze         | recipe lines, media           | `Piece.glaze`                |
//! | firing        | media                         | dropped from `Piece.firings` |
//! | clay body     |                               | `Piece.clay_body`            |
//! | firing method |                               |                              |
//! | media         |                               | detached from every owner    |
//!
//! Nullifying an edge does not bump the survivor's `updated_at`.
//! `Piece.clay_body_name` is free text and survives a clay body delete.

use serde::Serialize;

use kiln_types::{EntityId, EntityRef, MediaOwner};

use crate::error::{StoreError, StoreResult};
use crate::graph::{Graph, Slot};

/// Everything one delete touched.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Removal {
    /// Removed records, dependents first and the target last.
    pub removed: Vec<EntityRef>,
    /// Surviving records whose edges were cleared or shrunk.
    pub nullified: Vec<EntityRef>,
    /// Blob names of removed media. The records are gone; the caller owns
    /// deleting the bytes.
    pub released_blobs: Vec<String>,
}

impl Removal {
    fn nullify(&mut self, target: EntityRef) {
        if !self.nullified.contains(&target) {
            self.nullified.push(target);
        }
    }
}

impl Graph {
    /// Remove `target` and apply its cascade rules.
    pub(crate) fn delete(&mut self, target: EntityRef) -> StoreResult<Removal> {
        let slot = self.locate(target)?;
        let id = target.id;
        let mut removal = Removal::default();

        match slot {
            Slot::Piece => {
                let piece = self.take_piece(id)?;
                for event in &piece.stages {
                    self.index.remove(&event.id);
                    removal.removed.push(EntityRef::stage_event(event.id));
                }
                for media in &piece.media {
                    self.remove_media(*media, &mut removal)?;
                }
                for firing_id in &piece.firings {
                    if let Some(firing) = self.firings.get_mut(firing_id) {
                        firing.pieces.retain(|p| *p != id);
                        removal.nullify(EntityRef::firing(*firing_id));
                    }
                }
            }
            Slot::Glaze => {
                let glaze = self
                    .glazes
                    .remove(&id)
                    .ok_or(StoreError::NotFound(target))?;
                for line in &glaze.recipe {
                    self.index.remove(&line.id);
                    removal.removed.push(EntityRef::recipe_line(line.id));
                }
                for media in &glaze.media {
                    self.remove_media(*media, &mut removal)?;
                }
                for piece in self.pieces.values_mut() {
                    if piece.glaze == Some(id) {
                        piece.glaze = None;
                        removal.nullify(EntityRef::piece(piece.id));
                    }
                }
            }
            Slot::Firing => {
                let firing = self
                    .firings
                    .remove(&id)
                    .ok_or(StoreError::NotFound(target))?;
                for media in &firing.media {
                    self.remove_media(*media, &mut removal)?;
                }
                for piece_id in &firing.pieces {
                    if let Some(piece) = self.pieces.get_mut(piece_id) {
                        piece.firings.retain(|f| *f != id);
                        removal.nullify(EntityRef::piece(*piece_id));
                    }
                }
            }
            Slot::ClayBody => {
                self.clay_bodies
                    .remove(&id)
                    .ok_or(StoreError::NotFound(target))?;
                for piece in self.pieces.values_mut() {
                    if piece.clay_body == Some(id) {
                        piece.clay_body = None;
                        removal.nullify(EntityRef::piece(piece.id));
                    }
                }
            }
            Slot::FiringMethod => {
                self.firing_methods
                    .remove(&id)
                    .ok_or(StoreError::NotFound(target))?;
            }
            Slot::StageEvent(piece_id) => {
                self.pieces
                    .get_mut(&piece_id)
                    .and_then(|p| p.remove_stage(id))
                    .ok_or(StoreError::NotFound(target))?;
                removal.nullify(EntityRef::piece(piece_id));
            }
            Slot::RecipeLine(glaze_id) => {
                self.glazes
                    .get_mut(&glaze_id)
                    .and_then(|g| g.remove_recipe_line(id))
                    .ok_or(StoreError::NotFound(target))?;
                removal.nullify(EntityRef::glaze(glaze_id));
            }
            Slot::Media => {
                self.remove_media(id, &mut removal)?;
                return Ok(removal);
            }
        }

        self.index.remove(&id);
        removal.removed.push(target);
        removal
            .nullified
            .retain(|n| !removal.removed.contains(n));
        Ok(removal)
    }

    fn take_piece(&mut self, id: EntityId) -> StoreResult<kiln_types::Piece> {
        self.pieces
            .remove(&id)
            .ok_or(StoreError::NotFound(EntityRef::piece(id)))
    }

    /// Remove one media record and detach it from any surviving owner.
    fn remove_media(&mut self, id: EntityId, removal: &mut Removal) -> StoreResult<()> {
        let media = self
            .media
            .remove(&id)
            .ok_or(StoreError::NotFound(EntityRef::media(id)))?;
        self.index.remove(&id);

        for owner in media.owners() {
            if let Some(list) = self.owner_media_mut(owner) {
                list.retain(|m| *m != id);
                removal.nullify(owner.entity_ref());
            }
        }
        removal.removed.push(EntityRef::media(id));
        removal.released_blobs.push(media.file_name);
        Ok(())
    }

    /// Media records whose owners include `owner`.
    pub(crate) fn media_of(&self, owner: MediaOwner) -> Vec<EntityId> {
        match owner {
            MediaOwner::Piece(id) => self.pieces.get(&id).map(|p| p.media.clone()),
            MediaOwner::Glaze(id) => self.glazes.get(&id).map(|g| g.media.clone()),
            MediaOwner::Firing(id) => self.firings.get(&id).map(|f| f.media.clone()),
        }
        .unwrap_or_default()
    }
}
