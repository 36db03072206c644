use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::id::EntityId;
use crate::Timestamp;

/// Tolerance used by [`Glaze::recipe_is_balanced`].
const RECIPE_TOLERANCE: f64 = 0.5;

/// One ingredient line of a glaze recipe. Owned by exactly one [`Glaze`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecipeLine {
    pub id: EntityId,
    pub ingredient: String,
    pub percentage: f64,
}

impl RecipeLine {
    pub fn new(ingredient: impl Into<String>, percentage: f64) -> Self {
        Self {
            id: EntityId::new(),
            ingredient: ingredient.into(),
            percentage,
        }
    }
}

/// A glaze with its recipe. Owns its recipe lines and photos.
///
/// `media` is an inverse edge list maintained by the entity store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Glaze {
    pub id: EntityId,
    pub name: String,
    pub cone: String,
    pub finish: String,
    pub notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub recipe: Vec<RecipeLine>,
    #[serde(default)]
    pub media: Vec<EntityId>,
}

impl Glaze {
    pub fn new(name: impl Into<String>, cone: impl Into<String>, finish: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            name: name.into(),
            cone: cone.into(),
            finish: finish.into(),
            notes: None,
            created_at: now,
            updated_at: now,
            recipe: Vec::new(),
            media: Vec::new(),
        }
    }

    /// Append an ingredient line and bump `updated_at`.
    pub fn add_recipe_line(&mut self, ingredient: impl Into<String>, percentage: f64) -> RecipeLine {
        let line = RecipeLine::new(ingredient, percentage);
        self.recipe.push(line.clone());
        self.touch();
        line
    }

    pub fn remove_recipe_line(&mut self, id: EntityId) -> Option<RecipeLine> {
        let pos = self.recipe.iter().position(|l| l.id == id)?;
        let removed = self.recipe.remove(pos);
        self.touch();
        Some(removed)
    }

    /// Sum of all ingredient percentages.
    pub fn recipe_total(&self) -> f64 {
        self.recipe.iter().map(|l| l.percentage).sum()
    }

    /// Advisory check that the recipe sums to roughly 100%. Never enforced.
    pub fn recipe_is_balanced(&self) -> bool {
        (self.recipe_total() - 100.0).abs() <= RECIPE_TOLERANCE
    }

    pub fn apply(&mut self, patch: &GlazePatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(cone) = &patch.cone {
            self.cone = cone.clone();
        }
        if let Some(finish) = &patch.finish {
            self.finish = finish.clone();
        }
        if let Some(notes) = &patch.notes {
            self.notes = notes.clone();
        }
        if let Some(recipe) = &patch.recipe {
            self.recipe = recipe
                .iter()
                .map(|(ingredient, pct)| RecipeLine::new(ingredient.clone(), *pct))
                .collect();
        }
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Fields of a [`Glaze`] that may change in one update.
///
/// Setting `recipe` replaces every line with freshly identified ones.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GlazePatch {
    pub name: Option<String>,
    pub cone: Option<String>,
    pub finish: Option<String>,
    pub notes: Option<Option<String>>,
    pub recipe: Option<Vec<(String, f64)>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn celadon() -> Glaze {
        let mut g = Glaze::new("Celadon", "10", "Satin");
        g.add_recipe_line("Custer Feldspar", 25.0);
        g.add_recipe_line("Silica", 35.0);
        g.add_recipe_line("Whiting", 20.0);
        g.add_recipe_line("EPK", 20.0);
        g
    }

    #[test]
    fn recipe_total_and_balance() {
        let g = celadon();
        assert_eq!(g.recipe.len(), 4);
        assert!((g.recipe_total() - 100.0).abs() < f64::EPSILON);
        assert!(g.recipe_is_balanced());
    }

    #[test]
    fn unbalanced_recipe_is_allowed() {
        let mut g = Glaze::new("Test Tile", "6", "Matte");
        g.add_recipe_line("Silica", 40.0);
        g.add_recipe_line("Red Iron Oxide", 2.0);
        assert!(!g.recipe_is_balanced());
        assert_eq!(g.recipe.len(), 2);
    }

    #[test]
    fn remove_recipe_line_by_id() {
        let mut g = celadon();
        let id = g.recipe[1].id;
        let removed = g.remove_recipe_line(id).unwrap();
        assert_eq!(removed.ingredient, "Silica");
        assert_eq!(g.recipe.len(), 3);
        assert!(g.remove_recipe_line(id).is_none());
    }

    #[test]
    fn patch_replaces_recipe_with_new_ids() {
        let mut g = celadon();
        let old_ids: Vec<_> = g.recipe.iter().map(|l| l.id).collect();
        g.apply(&GlazePatch {
            finish: Some("Glossy".into()),
            recipe: Some(vec![("Frit 3134".into(), 60.0), ("EPK".into(), 40.0)]),
            ..Default::default()
        });
        assert_eq!(g.finish, "Glossy");
        assert_eq!(g.cone, "10");
        assert_eq!(g.recipe.len(), 2);
        assert!(g.recipe.iter().all(|l| !old_ids.contains(&l.id)));
    }
}
