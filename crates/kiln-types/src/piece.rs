use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::id::EntityId;
use crate::stage::{current_stage, Stage};
use crate::Timestamp;

/// A dated entry in a piece's production history.
///
/// Owned by exactly one [`Piece`]; it has no lifecycle of its own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    pub id: EntityId,
    pub stage: Stage,
    pub date: Timestamp,
    pub note: Option<String>,
}

impl StageEvent {
    pub fn new(stage: Stage, date: Timestamp, note: Option<String>) -> Self {
        Self {
            id: EntityId::new(),
            stage,
            date,
            note,
        }
    }

    /// Apply a partial update. Only the fields set in `patch` change.
    pub fn apply(&mut self, patch: &StageEventPatch) {
        if let Some(stage) = patch.stage {
            self.stage = stage;
        }
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(note) = &patch.note {
            self.note = note.clone();
        }
    }
}

/// Fields of a [`StageEvent`] that may be edited after the fact.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StageEventPatch {
    pub stage: Option<Stage>,
    pub date: Option<Timestamp>,
    pub note: Option<Option<String>>,
}

/// A single handmade ceramic piece.
///
/// `stages` is seeded with a `thrown` event at construction. `media` and
/// `firings` are inverse edge lists maintained by the entity store: values
/// supplied by callers on insert or upsert are ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Piece {
    pub id: EntityId,
    pub name: String,
    /// Free-text clay body label kept alongside `clay_body` for older records.
    pub clay_body_name: Option<String>,
    pub clay_body: Option<EntityId>,
    pub glaze: Option<EntityId>,
    pub intended_form: Option<String>,
    pub width_cm: Option<f64>,
    pub height_cm: Option<f64>,
    pub weight_g: Option<f64>,
    pub notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub stages: Vec<StageEvent>,
    #[serde(default)]
    pub media: Vec<EntityId>,
    #[serde(default)]
    pub firings: Vec<EntityId>,
}

impl Piece {
    /// Create a piece whose history starts with a `thrown` event dated now.
    pub fn new(name: impl Into<String>) -> Self {
        NewPiece::named(name).build()
    }

    /// The effective stage: the stage of the latest-dated event.
    pub fn current_stage(&self) -> Stage {
        current_stage(&self.stages)
    }

    /// Append a stage event and bump `updated_at`.
    ///
    /// No ordering check is made against the current stage.
    pub fn add_stage_event(
        &mut self,
        stage: Stage,
        date: Timestamp,
        note: Option<String>,
    ) -> StageEvent {
        let event = StageEvent::new(stage, date, note);
        self.push_stage(event.clone());
        event
    }

    /// Append an already-constructed event and bump `updated_at`.
    pub fn push_stage(&mut self, event: StageEvent) {
        self.stages.push(event);
        self.touch();
    }

    pub fn stage_event(&self, id: EntityId) -> Option<&StageEvent> {
        self.stages.iter().find(|e| e.id == id)
    }

    pub fn stage_event_mut(&mut self, id: EntityId) -> Option<&mut StageEvent> {
        self.stages.iter_mut().find(|e| e.id == id)
    }

    /// Remove a stage event by id. May leave the history empty.
    pub fn remove_stage(&mut self, id: EntityId) -> Option<StageEvent> {
        let pos = self.stages.iter().position(|e| e.id == id)?;
        let removed = self.stages.remove(pos);
        self.touch();
        Some(removed)
    }

    /// Apply a partial update. Only the fields set in `patch` change.
    pub fn apply(&mut self, patch: &PiecePatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(v) = &patch.clay_body_name {
            self.clay_body_name = v.clone();
        }
        if let Some(v) = patch.clay_body {
            self.clay_body = v;
        }
        if let Some(v) = patch.glaze {
            self.glaze = v;
        }
        if let Some(v) = &patch.intended_form {
            self.intended_form = v.clone();
        }
        if let Some(v) = patch.width_cm {
            self.width_cm = v;
        }
        if let Some(v) = patch.height_cm {
            self.height_cm = v;
        }
        if let Some(v) = patch.weight_g {
            self.weight_g = v;
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

/// Construction parameters for a [`Piece`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewPiece {
    pub name: String,
    pub clay_body_name: Option<String>,
    pub clay_body: Option<EntityId>,
    pub glaze: Option<EntityId>,
    pub intended_form: Option<String>,
    pub width_cm: Option<f64>,
    pub height_cm: Option<f64>,
    pub weight_g: Option<f64>,
    pub notes: Option<String>,
}

impl NewPiece {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Assign identity and timestamps and seed the `thrown` event.
    pub fn build(self) -> Piece {
        let now = Utc::now();
        Piece {
            id: EntityId::new(),
            name: self.name,
            clay_body_name: self.clay_body_name,
            clay_body: self.clay_body,
            glaze: self.glaze,
            intended_form: self.intended_form,
            width_cm: self.width_cm,
            height_cm: self.height_cm,
            weight_g: self.weight_g,
            notes: self.notes,
            created_at: now,
            updated_at: now,
            stages: vec![StageEvent::new(Stage::Thrown, now, None)],
            media: Vec::new(),
            firings: Vec::new(),
        }
    }
}

/// Fields of a [`Piece`] that may change in one update.
///
/// `None` leaves a field alone; `Some(None)` clears a nullable field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PiecePatch {
    pub name: Option<String>,
    pub clay_body_name: Option<Option<String>>,
    pub clay_body: Option<Option<EntityId>>,
    pub glaze: Option<Option<EntityId>>,
    pub intended_form: Option<Option<String>>,
    pub width_cm: Option<Option<f64>>,
    pub height_cm: Option<Option<f64>>,
    pub weight_g: Option<Option<f64>>,
    pub notes: Option<Option<String>>,
}

impl PiecePatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
