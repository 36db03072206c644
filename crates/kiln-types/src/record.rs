use serde::{Deserialize, Serialize};

use crate::clay::ClayBody;
use crate::firing::{Firing, FiringMethod};
use crate::glaze::{Glaze, RecipeLine};
use crate::id::{EntityId, EntityKind, EntityRef};
use crate::media::Media;
use crate::piece::{Piece, StageEvent};

/// Any record the entity store can hold.
///
/// Owned children that live inside their owner (stage events, recipe lines)
/// carry the owner's id so they can be inserted or replicated on their own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Record {
    Piece(Piece),
    StageEvent { piece: EntityId, event: StageEvent },
    ClayBody(ClayBody),
    Glaze(Glaze),
    RecipeLine { glaze: EntityId, line: RecipeLine },
    Firing(Firing),
    FiringMethod(FiringMethod),
    Media(Media),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Piece(_) => EntityKind::Piece,
            Self::StageEvent { .. } => EntityKind::StageEvent,
            Self::ClayBody(_) => EntityKind::ClayBody,
            Self::Glaze(_) => EntityKind::Glaze,
            Self::RecipeLine { .. } => EntityKind::RecipeLine,
            Self::Firing(_) => EntityKind::Firing,
            Self::FiringMethod(_) => EntityKind::FiringMethod,
            Self::Media(_) => EntityKind::Media,
        }
    }

    pub fn id(&self) -> EntityId {
        match self {
            Self::Piece(r) => r.id,
            Self::StageEvent { event, .. } => event.id,
            Self::ClayBody(r) => r.id,
            Self::Glaze(r) => r.id,
            Self::RecipeLine { line, .. } => line.id,
            Self::Firing(r) => r.id,
            Self::FiringMethod(r) => r.id,
            Self::Media(r) => r.id,
        }
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind(), self.id())
    }
}

impl From<Piece> for Record {
    fn from(r: Piece) -> Self {
        Self::Piece(r)
    }
}

impl From<ClayBody> for Record {
    fn from(r: ClayBody) -> Self {
        Self::ClayBody(r)
    }
}

impl From<Glaze> for Record {
    fn from(r: Glaze) -> Self {
        Self::Glaze(r)
    }
}

impl From<Firing> for Record {
    fn from(r: Firing) -> Self {
        Self::Firing(r)
    }
}

impl From<FiringMethod> for Record {
    fn from(r: FiringMethod) -> Self {
        Self::FiringMethod(r)
    }
}

impl From<Media> for Record {
    fn from(r: Media) -> Self {
        Self::Media(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Stage;
    use chrono::Utc;

    #[test]
    fn kind_and_id_match_inner_record() {
        let glaze = Glaze::new("Tenmoku", "10", "Glossy");
        let record = Record::from(glaze.clone());
        assert_eq!(record.kind(), EntityKind::Glaze);
        assert_eq!(record.id(), glaze.id);
        assert_eq!(record.entity_ref(), EntityRef::glaze(glaze.id));
    }

    #[test]
    fn child_records_report_their_own_id() {
        let piece = EntityId::new();
        let event = StageEvent::new(Stage::Bisque, Utc::now(), None);
        let record = Record::StageEvent {
            piece,
            event: event.clone(),
        };
        assert_eq!(record.id(), event.id);
        assert_eq!(record.kind(), EntityKind::StageEvent);
    }

    #[test]
    fn serde_is_tagged_by_kind() {
        let record = Record::from(ClayBody::new("B-Mix"));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "clay-body");
        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
