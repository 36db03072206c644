//! The relationship graph behind the entity store.
//!
//! Top-level records live in one ordered map per kind. Stage events and
//! recipe lines live inside their owner. A global index maps every
//! identifier (children included) to where it lives, which is what makes
//! identities unique across kinds.
//!
//! Edge ownership:
//! - `Piece.clay_body`, `Piece.glaze` and `Firing.pieces` are written by
//!   callers and validated here.
//! - `Piece.media`, `Glaze.media`, `Firing.media` and `Piece.firings` are
//!   inverse lists owned by the graph. Incoming values are discarded.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use kiln_types::{
    ClayBody, EntityId, EntityKind, EntityRef, Firing, FiringMethod, Glaze, Media, MediaOwner,
    Piece, RecipeLine, Record, StageEvent,
};

use crate::error::{StoreError, StoreResult};

/// Where an identifier lives in the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Slot {
    Piece,
    StageEvent(EntityId),
    ClayBody,
    Glaze,
    RecipeLine(EntityId),
    Firing,
    FiringMethod,
    Media,
}

impl Slot {
    pub(crate) fn kind(&self) -> EntityKind {
        match self {
            Self::Piece => EntityKind::Piece,
            Self::StageEvent(_) => EntityKind::StageEvent,
            Self::ClayBody => EntityKind::ClayBody,
            Self::Glaze => EntityKind::Glaze,
            Self::RecipeLine(_) => EntityKind::RecipeLine,
            Self::Firing => EntityKind::Firing,
            Self::FiringMethod => EntityKind::FiringMethod,
            Self::Media => EntityKind::Media,
        }
    }
}

/// Whether a put may replace an existing record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PutMode {
    Insert,
    Upsert,
    /// Upsert from a peer. An existing owner keeps its own stages or recipe
    /// and child writes leave the owner's `updated_at` alone; children
    /// travel as their own changes.
    Replicate,
}

/// All records and their relationship edges.
///
/// This is the unit that is cloned, mutated, verified, and swapped in on
/// every commit, and the unit that is persisted.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Graph {
    pub(crate) pieces: BTreeMap<EntityId, Piece>,
    pub(crate) clay_bodies: BTreeMap<EntityId, ClayBody>,
    pub(crate) glazes: BTreeMap<EntityId, Glaze>,
    pub(crate) firings: BTreeMap<EntityId, Firing>,
    pub(crate) firing_methods: BTreeMap<EntityId, FiringMethod>,
    pub(crate) media: BTreeMap<EntityId, Media>,
    #[serde(skip)]
    pub(crate) index: HashMap<EntityId, Slot>,
}

impl Graph {
    /// Rebuild the identifier index from the record maps, then verify.
    pub(crate) fn reindex(&mut self) -> StoreResult<()> {
        let mut index = HashMap::new();
        let mut claim = |id: EntityId, slot: Slot| match index.insert(id, slot) {
            None => Ok(()),
            Some(_) => Err(StoreError::DuplicateIdentity(EntityRef::new(slot.kind(), id))),
        };

        for (id, piece) in &self.pieces {
            claim(*id, Slot::Piece)?;
            for event in &piece.stages {
                claim(event.id, Slot::StageEvent(*id))?;
            }
        }
        for id in self.clay_bodies.keys() {
            claim(*id, Slot::ClayBody)?;
        }
        for (id, glaze) in &self.glazes {
            claim(*id, Slot::Glaze)?;
            for line in &glaze.recipe {
                claim(line.id, Slot::RecipeLine(*id))?;
            }
        }
        for id in self.firings.keys() {
            claim(*id, Slot::Firing)?;
        }
        for id in self.firing_methods.keys() {
            claim(*id, Slot::FiringMethod)?;
        }
        for id in self.media.keys() {
            claim(*id, Slot::Media)?;
        }

        self.index = index;
        self.verify()
    }

    pub(crate) fn slot(&self, id: EntityId) -> Option<Slot> {
        self.index.get(&id).copied()
    }

    pub(crate) fn contains(&self, target: EntityRef) -> bool {
        self.slot(target.id).map(|s| s.kind()) == Some(target.kind)
    }

    /// The slot of `target`, or `NotFound` if absent or of another kind.
    pub(crate) fn locate(&self, target: EntityRef) -> StoreResult<Slot> {
        match self.slot(target.id) {
            Some(slot) if slot.kind() == target.kind => Ok(slot),
            _ => Err(StoreError::NotFound(target)),
        }
    }

    /// The current state of `target` as a [`Record`].
    pub(crate) fn record(&self, target: EntityRef) -> Option<Record> {
        let id = target.id;
        match self.locate(target).ok()? {
            Slot::Piece => self.pieces.get(&id).cloned().map(Record::Piece),
            Slot::StageEvent(piece) => {
                let event = self.pieces.get(&piece)?.stage_event(id)?.clone();
                Some(Record::StageEvent { piece, event })
            }
            Slot::ClayBody => self.clay_bodies.get(&id).cloned().map(Record::ClayBody),
            Slot::Glaze => self.glazes.get(&id).cloned().map(Record::Glaze),
            Slot::RecipeLine(glaze) => {
                let line = self.glazes.get(&glaze)?.recipe.iter().find(|l| l.id == id)?.clone();
                Some(Record::RecipeLine { glaze, line })
            }
            Slot::Firing => self.firings.get(&id).cloned().map(Record::Firing),
            Slot::FiringMethod => self.firing_methods.get(&id).cloned().map(Record::FiringMethod),
            Slot::Media => self.media.get(&id).cloned().map(Record::Media),
        }
    }

    /// Write a record. Returns the stored state, or `None` if the write
    /// changed nothing.
    pub(crate) fn put(&mut self, record: Record, mode: PutMode) -> StoreResult<Option<Record>> {
        let target = record.entity_ref();
        if let Some(slot) = self.slot(target.id) {
            if mode == PutMode::Insert || slot.kind() != target.kind {
                return Err(StoreError::DuplicateIdentity(target));
            }
        }

        match record {
            Record::Piece(piece) => self.put_piece(piece, mode),
            Record::StageEvent { piece, event } => self.put_stage_event(piece, event, mode),
            Record::ClayBody(clay) => {
                if self.clay_bodies.get(&clay.id) == Some(&clay) {
                    return Ok(None);
                }
                self.index.insert(clay.id, Slot::ClayBody);
                self.clay_bodies.insert(clay.id, clay.clone());
                Ok(Some(Record::ClayBody(clay)))
            }
            Record::Glaze(glaze) => self.put_glaze(glaze, mode),
            Record::RecipeLine { glaze, line } => self.put_recipe_line(glaze, line, mode),
            Record::Firing(firing) => self.put_firing(firing),
            Record::FiringMethod(method) => {
                if self.firing_methods.get(&method.id) == Some(&method) {
                    return Ok(None);
                }
                self.index.insert(method.id, Slot::FiringMethod);
                self.firing_methods.insert(method.id, method.clone());
                Ok(Some(Record::FiringMethod(method)))
            }
            Record::Media(media) => self.put_media(media),
        }
    }

    fn put_piece(&mut self, mut piece: Piece, mode: PutMode) -> StoreResult<Option<Record>> {
        if mode == PutMode::Replicate {
            if let Some(old) = self.pieces.get(&piece.id) {
                piece.stages = old.stages.clone();
            }
        }
        // An existing piece may have had its history emptied by explicit
        // stage-event deletes; a new one must arrive with at least one.
        if piece.stages.is_empty() && !self.pieces.contains_key(&piece.id) {
            return Err(StoreError::invariant(format!(
                "new piece {} has no stage events",
                piece.id
            )));
        }
        self.check_children(
            piece.stages.iter().map(|e| e.id),
            EntityKind::StageEvent,
            Slot::StageEvent(piece.id),
        )?;
        self.require(piece.clay_body.map(EntityRef::clay_body))?;
        self.require(piece.glaze.map(EntityRef::glaze))?;

        let existing = self.pieces.get(&piece.id).cloned();
        match &existing {
            Some(old) => {
                piece.media = old.media.clone();
                piece.firings = old.firings.clone();
            }
            None => {
                piece.media.clear();
                piece.firings.clear();
            }
        }
        if existing.as_ref() == Some(&piece) {
            return Ok(None);
        }

        if let Some(old) = &existing {
            for event in &old.stages {
                self.index.remove(&event.id);
            }
        }
        self.index.insert(piece.id, Slot::Piece);
        for event in &piece.stages {
            self.index.insert(event.id, Slot::StageEvent(piece.id));
        }
        self.pieces.insert(piece.id, piece.clone());
        Ok(Some(Record::Piece(piece)))
    }

    fn put_stage_event(
        &mut self,
        piece_id: EntityId,
        event: StageEvent,
        mode: PutMode,
    ) -> StoreResult<Option<Record>> {
        if let Some(Slot::StageEvent(owner)) = self.slot(event.id) {
            if owner != piece_id {
                return Err(StoreError::invariant(format!(
                    "stage event {} belongs to piece {owner}, not {piece_id}",
                    event.id
                )));
            }
        }
        let piece = self
            .pieces
            .get_mut(&piece_id)
            .ok_or(StoreError::NotFound(EntityRef::piece(piece_id)))?;
        let stamp = piece.updated_at;

        let record = Record::StageEvent {
            piece: piece_id,
            event: event.clone(),
        };
        match piece.stage_event_mut(event.id) {
            Some(existing) if *existing == event => return Ok(None),
            Some(existing) => {
                *existing = event;
                piece.touch();
            }
            None => {
                self.index.insert(event.id, Slot::StageEvent(piece_id));
                piece.push_stage(event);
            }
        }
        if mode == PutMode::Replicate {
            piece.updated_at = stamp;
        }
        Ok(Some(record))
    }

    fn put_glaze(&mut self, mut glaze: Glaze, mode: PutMode) -> StoreResult<Option<Record>> {
        if mode == PutMode::Replicate {
            if let Some(old) = self.glazes.get(&glaze.id) {
                glaze.recipe = old.recipe.clone();
            }
        }
        self.check_children(
            glaze.recipe.iter().map(|l| l.id),
            EntityKind::RecipeLine,
            Slot::RecipeLine(glaze.id),
        )?;

        let existing = self.glazes.get(&glaze.id).cloned();
        glaze.media = existing.as_ref().map(|g| g.media.clone()).unwrap_or_default();
        if existing.as_ref() == Some(&glaze) {
            return Ok(None);
        }

        if let Some(old) = &existing {
            for line in &old.recipe {
                self.index.remove(&line.id);
            }
        }
        self.index.insert(glaze.id, Slot::Glaze);
        for line in &glaze.recipe {
            self.index.insert(line.id, Slot::RecipeLine(glaze.id));
        }
        self.glazes.insert(glaze.id, glaze.clone());
        Ok(Some(Record::Glaze(glaze)))
    }

    fn put_recipe_line(
        &mut self,
        glaze_id: EntityId,
        line: RecipeLine,
        mode: PutMode,
    ) -> StoreResult<Option<Record>> {
        if let Some(Slot::RecipeLine(owner)) = self.slot(line.id) {
            if owner != glaze_id {
                return Err(StoreError::invariant(format!(
                    "recipe line {} belongs to glaze {owner}, not {glaze_id}",
                    line.id
                )));
            }
        }
        let glaze = self
            .glazes
            .get_mut(&glaze_id)
            .ok_or(StoreError::NotFound(EntityRef::glaze(glaze_id)))?;

        let record = Record::RecipeLine {
            glaze: glaze_id,
            line: line.clone(),
        };
        match glaze.recipe.iter_mut().find(|l| l.id == line.id) {
            Some(existing) if *existing == line => return Ok(None),
            Some(existing) => *existing = line,
            None => {
                self.index.insert(line.id, Slot::RecipeLine(glaze_id));
                glaze.recipe.push(line);
            }
        }
        if mode != PutMode::Replicate {
            glaze.touch();
        }
        Ok(Some(record))
    }

    fn put_firing(&mut self, mut firing: Firing) -> StoreResult<Option<Record>> {
        let mut seen = HashSet::new();
        firing.pieces.retain(|p| seen.insert(*p));
        for piece in &firing.pieces {
            self.require(Some(EntityRef::piece(*piece)))?;
        }

        let existing = self.firings.get(&firing.id).cloned();
        firing.media = existing.as_ref().map(|f| f.media.clone()).unwrap_or_default();
        if existing.as_ref() == Some(&firing) {
            return Ok(None);
        }

        let old_pieces = existing.map(|f| f.pieces).unwrap_or_default();
        for dropped in old_pieces.iter().filter(|p| !firing.pieces.contains(p)) {
            if let Some(piece) = self.pieces.get_mut(dropped) {
                piece.firings.retain(|f| *f != firing.id);
            }
        }
        for added in firing.pieces.iter().filter(|p| !old_pieces.contains(p)) {
            if let Some(piece) = self.pieces.get_mut(added) {
                if !piece.firings.contains(&firing.id) {
                    piece.firings.push(firing.id);
                }
            }
        }

        self.index.insert(firing.id, Slot::Firing);
        self.firings.insert(firing.id, firing.clone());
        Ok(Some(Record::Firing(firing)))
    }

    fn put_media(&mut self, media: Media) -> StoreResult<Option<Record>> {
        if media.file_name.is_empty() {
            return Err(StoreError::invariant(format!(
                "media {} has no file name",
                media.id
            )));
        }
        let owners = media.owners();
        if owners.is_empty() {
            return Err(StoreError::invariant(format!(
                "media {} names no owner",
                media.id
            )));
        }
        for owner in &owners {
            self.require(Some(owner.entity_ref()))?;
        }

        let existing = self.media.get(&media.id).cloned();
        if existing.as_ref() == Some(&media) {
            return Ok(None);
        }

        let old_owners = existing.map(|m| m.owners()).unwrap_or_default();
        for dropped in old_owners.iter().filter(|o| !owners.contains(o)) {
            if let Some(list) = self.owner_media_mut(*dropped) {
                list.retain(|m| *m != media.id);
            }
        }
        for added in owners.iter().filter(|o| !old_owners.contains(o)) {
            if let Some(list) = self.owner_media_mut(*added) {
                if !list.contains(&media.id) {
                    list.push(media.id);
                }
            }
        }

        self.index.insert(media.id, Slot::Media);
        self.media.insert(media.id, media.clone());
        Ok(Some(Record::Media(media)))
    }

    pub(crate) fn owner_media_mut(&mut self, owner: MediaOwner) -> Option<&mut Vec<EntityId>> {
        match owner {
            MediaOwner::Piece(id) => self.pieces.get_mut(&id).map(|p| &mut p.media),
            MediaOwner::Glaze(id) => self.glazes.get_mut(&id).map(|g| &mut g.media),
            MediaOwner::Firing(id) => self.firings.get_mut(&id).map(|f| &mut f.media),
        }
    }

    fn require(&self, target: Option<EntityRef>) -> StoreResult<()> {
        match target {
            Some(target) if !self.contains(target) => Err(StoreError::NotFound(target)),
            _ => Ok(()),
        }
    }

    /// Child ids must be unique among themselves and either unused or
    /// already owned by the same parent.
    fn check_children(
        &self,
        ids: impl Iterator<Item = EntityId>,
        kind: EntityKind,
        owned: Slot,
    ) -> StoreResult<()> {
        let mut seen = HashSet::new();
        for id in ids {
            let taken = matches!(self.slot(id), Some(slot) if slot != owned);
            if !seen.insert(id) || taken {
                return Err(StoreError::DuplicateIdentity(EntityRef::new(kind, id)));
            }
        }
        Ok(())
    }

    /// Check every edge and the index. Any failure is an
    /// `InvariantViolation`: the graph must never be observable in this
    /// state.
    pub(crate) fn verify(&self) -> StoreResult<()> {
        let mut expected = 0usize;

        for (id, piece) in &self.pieces {
            ensure(piece.id == *id, || format!("piece keyed {id} has id {}", piece.id))?;
            self.expect_slot(*id, Slot::Piece)?;
            for event in &piece.stages {
                self.expect_slot(event.id, Slot::StageEvent(*id))?;
            }
            expected += 1 + piece.stages.len();

            if let Some(clay) = piece.clay_body {
                ensure(self.clay_bodies.contains_key(&clay), || {
                    format!("piece {id} references missing clay body {clay}")
                })?;
            }
            if let Some(glaze) = piece.glaze {
                ensure(self.glazes.contains_key(&glaze), || {
                    format!("piece {id} references missing glaze {glaze}")
                })?;
            }
            for media in &piece.media {
                ensure(
                    self.media.get(media).is_some_and(|m| m.is_owned_by(MediaOwner::Piece(*id))),
                    || format!("piece {id} lists media {media} that is not attached to it"),
                )?;
            }
            for firing in &piece.firings {
                ensure(
                    self.firings.get(firing).is_some_and(|f| f.pieces.contains(id)),
                    || format!("piece {id} lists firing {firing} that does not contain it"),
                )?;
            }
        }

        for (id, clay) in &self.clay_bodies {
            ensure(clay.id == *id, || format!("clay body keyed {id} has id {}", clay.id))?;
            self.expect_slot(*id, Slot::ClayBody)?;
            expected += 1;
        }

        for (id, glaze) in &self.glazes {
            ensure(glaze.id == *id, || format!("glaze keyed {id} has id {}", glaze.id))?;
            self.expect_slot(*id, Slot::Glaze)?;
            for line in &glaze.recipe {
                self.expect_slot(line.id, Slot::RecipeLine(*id))?;
            }
            expected += 1 + glaze.recipe.len();
            for media in &glaze.media {
                ensure(
                    self.media.get(media).is_some_and(|m| m.is_owned_by(MediaOwner::Glaze(*id))),
                    || format!("glaze {id} lists media {media} that is not attached to it"),
                )?;
            }
        }

        for (id, firing) in &self.firings {
            ensure(firing.id == *id, || format!("firing keyed {id} has id {}", firing.id))?;
            self.expect_slot(*id, Slot::Firing)?;
            expected += 1;
            for piece in &firing.pieces {
                ensure(
                    self.pieces.get(piece).is_some_and(|p| p.firings.contains(id)),
                    || format!("firing {id} lists piece {piece} that does not list it back"),
                )?;
            }
            for media in &firing.media {
                ensure(
                    self.media.get(media).is_some_and(|m| m.is_owned_by(MediaOwner::Firing(*id))),
                    || format!("firing {id} lists media {media} that is not attached to it"),
                )?;
            }
        }

        for (id, method) in &self.firing_methods {
            ensure(method.id == *id, || format!("firing method keyed {id} has id {}", method.id))?;
            self.expect_slot(*id, Slot::FiringMethod)?;
            expected += 1;
        }

        for (id, media) in &self.media {
            ensure(media.id == *id, || format!("media keyed {id} has id {}", media.id))?;
            self.expect_slot(*id, Slot::Media)?;
            expected += 1;
            let owners = media.owners();
            ensure(!owners.is_empty(), || format!("media {id} names no owner"))?;
            for owner in owners {
                let listed = match owner {
                    MediaOwner::Piece(o) => self.pieces.get(&o).map(|p| p.media.contains(id)),
                    MediaOwner::Glaze(o) => self.glazes.get(&o).map(|g| g.media.contains(id)),
                    MediaOwner::Firing(o) => self.firings.get(&o).map(|f| f.media.contains(id)),
                };
                ensure(listed == Some(true), || {
                    format!("media {id} owner {:?} is missing or does not list it", owner.entity_ref())
                })?;
            }
        }

        ensure(self.index.len() == expected, || {
            format!("index holds {} ids, graph holds {expected}", self.index.len())
        })
    }

    fn expect_slot(&self, id: EntityId, slot: Slot) -> StoreResult<()> {
        ensure(self.slot(id) == Some(slot), || {
            format!("index has {:?} for {id}, expected {slot:?}", self.slot(id))
        })
    }
}

fn ensure(cond: bool, reason: impl FnOnce() -> String) -> StoreResult<()> {
    if cond {
        Ok(())
    } else {
        Err(StoreError::invariant(reason()))
    }
}
