use kiln_types::{
    ClayBody, EntityId, EntityKind, Firing, FiringMethod, Glaze, Media, Piece, RecipeLine,
    StageEvent,
};

use crate::graph::{Graph, Slot};

/// A record type the store can fetch and scan by type.
///
/// Implemented for every record kind, owned children included.
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn entity_id(&self) -> EntityId;

    #[doc(hidden)]
    fn scan(graph: &Graph) -> Box<dyn Iterator<Item = &Self> + '_>;

    #[doc(hidden)]
    fn lookup(graph: &Graph, id: EntityId) -> Option<&Self>;
}

macro_rules! top_level_entity {
    ($ty:ty, $kind:ident, $field:ident) => {
        impl Entity for $ty {
            const KIND: EntityKind = EntityKind::$kind;

            fn entity_id(&self) -> EntityId {
                self.id
            }

            fn scan(graph: &Graph) -> Box<dyn Iterator<Item = &Self> + '_> {
                Box::new(graph.$field.values())
            }

            fn lookup(graph: &Graph, id: EntityId) -> Option<&Self> {
                graph.$field.get(&id)
            }
        }
    };
}

top_level_entity!(Piece, Piece, pieces);
top_level_entity!(ClayBody, ClayBody, clay_bodies);
top_level_entity!(Glaze, Glaze, glazes);
top_level_entity!(Firing, Firing, firings);
top_level_entity!(FiringMethod, FiringMethod, firing_methods);
top_level_entity!(Media, Media, media);

impl Entity for StageEvent {
    const KIND: EntityKind = EntityKind::StageEvent;

    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn scan(graph: &Graph) -> Box<dyn Iterator<Item = &Self> + '_> {
        Box::new(graph.pieces.values().flat_map(|p| p.stages.iter()))
    }

    fn lookup(graph: &Graph, id: EntityId) -> Option<&Self> {
        match graph.slot(id)? {
            Slot::StageEvent(piece) => graph.pieces.get(&piece)?.stage_event(id),
            _ => None,
        }
    }
}

impl Entity for RecipeLine {
    const KIND: EntityKind = EntityKind::RecipeLine;

    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn scan(graph: &Graph) -> Box<dyn Iterator<Item = &Self> + '_> {
        Box::new(graph.glazes.values().flat_map(|g| g.recipe.iter()))
    }

    fn lookup(graph: &Graph, id: EntityId) -> Option<&Self> {
        match graph.slot(id)? {
            Slot::RecipeLine(glaze) => graph.glazes.get(&glaze)?.recipe.iter().find(|l| l.id == id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PutMode;
    use kiln_types::Record;

    #[test]
    fn child_lookup_goes_through_owner() {
        let mut graph = Graph::default();
        let mut glaze = Glaze::new("Tenmoku", "10", "Glossy");
        let line = glaze.add_recipe_line("Red Iron Oxide", 10.0);
        graph.put(Record::from(glaze), PutMode::Insert).unwrap();

        assert_eq!(RecipeLine::lookup(&graph, line.id), Some(&line));
        assert_eq!(RecipeLine::scan(&graph).count(), 1);
        assert!(Glaze::lookup(&graph, line.id).is_none());
    }

    #[test]
    fn stage_events_scan_across_pieces() {
        let mut graph = Graph::default();
        graph.put(Piece::new("A").into(), PutMode::Insert).unwrap();
        graph.put(Piece::new("B").into(), PutMode::Insert).unwrap();
        assert_eq!(StageEvent::scan(&graph).count(), 2);
        assert_eq!(Piece::scan(&graph).count(), 2);
    }
}
