use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::id::EntityId;
use crate::Timestamp;

/// A clay body from the studio catalog. Referenced, never owned, by pieces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClayBody {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    pub cone: Option<String>,
    pub color: Option<String>,
    pub created_at: Timestamp,
}

impl ClayBody {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            description: None,
            cone: None,
            color: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_cone(mut self, cone: impl Into<String>) -> Self {
        self.cone = Some(cone.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn apply(&mut self, patch: &ClayBodyPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(v) = &patch.description {
            self.description = v.clone();
        }
        if let Some(v) = &patch.cone {
            self.cone = v.clone();
        }
        if let Some(v) = &patch.color {
            self.color = v.clone();
        }
    }
}

/// Fields of a [`ClayBody`] that may change in one update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClayBodyPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub cone: Option<Option<String>>,
    pub color: Option<Option<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_optional_fields() {
        let clay = ClayBody::new("Porcelain").with_cone("10").with_color("White");
        assert_eq!(clay.cone.as_deref(), Some("10"));
        assert_eq!(clay.color.as_deref(), Some("White"));
        assert!(clay.description.is_none());
    }

    #[test]
    fn patch_clears_and_sets() {
        let mut clay = ClayBody::new("Stoneware")
            .with_cone("10")
            .with_description("High-fire");
        clay.apply(&ClayBodyPatch {
            cone: Some(Some("6".into())),
            description: Some(None),
            ..Default::default()
        });
        assert_eq!(clay.name, "Stoneware");
        assert_eq!(clay.cone.as_deref(), Some("6"));
        assert!(clay.description.is_none());
    }
}
