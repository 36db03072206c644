use std::path::PathBuf;
use std::sync::RwLock;

use tracing::{debug, info};

use kiln_types::{
    ClayBody, ClayBodyPatch, EntityId, EntityKind, EntityRef, Firing, FiringPatch, Glaze,
    GlazePatch, Media, MediaOwner, Piece, PiecePatch, Record, StageEvent, StageEventPatch,
};

use crate::cascade::Removal;
use crate::change::{Change, ChangeOp, Origin};
use crate::error::{StoreError, StoreResult};
use crate::feed::{ChangeFeed, ChangeFilter, ChangeStream, FeedConfig};
use crate::graph::{Graph, PutMode, Slot};
use crate::query::Entity;
use crate::snapshot::SnapshotFile;

/// Configuration for an [`EntityStore`].
#[derive(Clone, Debug, Default)]
pub struct StoreConfig {
    /// Snapshot file. `None` keeps the store purely in memory.
    pub path: Option<PathBuf>,
    pub feed: FeedConfig,
}

struct StoreState {
    graph: Graph,
    seq: u64,
}

/// The typed record graph.
///
/// Every write is a commit: the graph is cloned, the mutation and its
/// cascade run on the clone, the result is verified and (if configured)
/// persisted, and only then swapped in. A failed write leaves nothing
/// behind. Committed changes are published on the change feed in commit
/// order.
pub struct EntityStore {
    inner: RwLock<StoreState>,
    feed: ChangeFeed,
    snapshot: Option<SnapshotFile>,
}

impl EntityStore {
    /// A store with no snapshot file.
    pub fn in_memory() -> Self {
        Self::from_parts(Graph::default(), ChangeFeed::default(), None)
    }

    /// Open a snapshot-backed store, creating it on first write.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::with_config(StoreConfig {
            path: Some(path.into()),
            ..Default::default()
        })
    }

    pub fn with_config(config: StoreConfig) -> StoreResult<Self> {
        let snapshot = config.path.map(SnapshotFile::new);
        let graph = match &snapshot {
            Some(file) => file.load()?.unwrap_or_default(),
            None => Graph::default(),
        };
        if let Some(file) = &snapshot {
            info!(
                path = %file.path().display(),
                records = graph.index.len(),
                "entity store opened"
            );
        }
        Ok(Self::from_parts(graph, ChangeFeed::new(config.feed), snapshot))
    }

    fn from_parts(graph: Graph, feed: ChangeFeed, snapshot: Option<SnapshotFile>) -> Self {
        Self {
            inner: RwLock::new(StoreState { graph, seq: 0 }),
            feed,
            snapshot,
        }
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Insert a new record. Fails with `DuplicateIdentity` if the id is
    /// taken by any record of any kind.
    pub fn insert(&self, record: impl Into<Record>) -> StoreResult<Record> {
        self.insert_from(Origin::Local, record.into())
    }

    pub fn insert_from(&self, origin: Origin, record: Record) -> StoreResult<Record> {
        self.commit(origin, |graph| {
            let stored = graph
                .put(record, PutMode::Insert)?
                .ok_or_else(|| StoreError::invariant("insert produced no change"))?;
            Ok((stored.clone(), vec![ChangeOp::Upserted(stored)]))
        })
    }

    /// Insert several records in one commit. Either all land or none do.
    pub fn insert_batch(&self, records: Vec<Record>) -> StoreResult<Vec<Record>> {
        self.commit(Origin::Local, |graph| {
            let mut stored = Vec::with_capacity(records.len());
            for record in records {
                if let Some(record) = graph.put(record, PutMode::Insert)? {
                    stored.push(record);
                }
            }
            let ops = stored.iter().cloned().map(ChangeOp::Upserted).collect();
            Ok((stored, ops))
        })
    }

    /// Create or replace a record. Returns `false` if the stored record was
    /// already identical, in which case nothing is published.
    ///
    /// A remote upsert of a piece or glaze that already exists keeps the
    /// local stage history or recipe. Those children arrive as their own
    /// changes.
    pub fn upsert_from(&self, origin: Origin, record: Record) -> StoreResult<bool> {
        let mode = match origin {
            Origin::Local => PutMode::Upsert,
            Origin::Remote => PutMode::Replicate,
        };
        self.commit(origin, |graph| match graph.put(record, mode)? {
            Some(stored) => Ok((true, vec![ChangeOp::Upserted(stored)])),
            None => Ok((false, Vec::new())),
        })
    }

    /// Delete a record and apply its cascade rules.
    ///
    /// The returned [`Removal`] names the blobs of removed media. The store
    /// does not touch blob storage.
    pub fn delete(&self, target: EntityRef) -> StoreResult<Removal> {
        self.delete_from(Origin::Local, target)
    }

    pub fn delete_from(&self, origin: Origin, target: EntityRef) -> StoreResult<Removal> {
        self.commit(origin, |graph| {
            let removal = graph.delete(target)?;
            let mut ops: Vec<ChangeOp> = removal
                .removed
                .iter()
                .copied()
                .map(ChangeOp::Deleted)
                .collect();
            ops.extend(
                removal
                    .nullified
                    .iter()
                    .filter_map(|n| graph.record(*n))
                    .map(ChangeOp::Upserted),
            );
            Ok((removal, ops))
        })
    }

    pub fn update_piece(&self, id: EntityId, patch: &PiecePatch) -> StoreResult<Piece> {
        self.commit(Origin::Local, |graph| {
            let mut piece = Piece::lookup(graph, id)
                .cloned()
                .ok_or(StoreError::NotFound(EntityRef::piece(id)))?;
            piece.apply(patch);
            let ops = put_ops(graph, piece.into())?;
            let stored = Piece::lookup(graph, id).cloned().ok_or(StoreError::NotFound(EntityRef::piece(id)))?;
            Ok((stored, ops))
        })
    }

    pub fn update_glaze(&self, id: EntityId, patch: &GlazePatch) -> StoreResult<Glaze> {
        self.commit(Origin::Local, |graph| {
            let mut glaze = Glaze::lookup(graph, id)
                .cloned()
                .ok_or(StoreError::NotFound(EntityRef::glaze(id)))?;
            let replaced: Vec<EntityId> = match patch.recipe {
                Some(_) => glaze.recipe.iter().map(|line| line.id).collect(),
                None => Vec::new(),
            };
            glaze.apply(patch);
            let mut ops = put_ops(graph, glaze.into())?;
            let stored = Glaze::lookup(graph, id).cloned().ok_or(StoreError::NotFound(EntityRef::glaze(id)))?;
            // Peers keep their own recipe on a glaze upsert, so a replaced
            // recipe is published line by line.
            if patch.recipe.is_some() {
                ops.extend(replaced.into_iter().map(|line| ChangeOp::Deleted(EntityRef::recipe_line(line))));
                ops.extend(stored.recipe.iter().map(|line| {
                    ChangeOp::Upserted(Record::RecipeLine {
                        glaze: id,
                        line: line.clone(),
                    })
                }));
            }
            Ok((stored, ops))
        })
    }

    pub fn update_firing(&self, id: EntityId, patch: &FiringPatch) -> StoreResult<Firing> {
        self.commit(Origin::Local, |graph| {
            let mut firing = Firing::lookup(graph, id)
                .cloned()
                .ok_or(StoreError::NotFound(EntityRef::firing(id)))?;
            firing.apply(patch);
            let ops = put_ops(graph, firing.into())?;
            let stored = Firing::lookup(graph, id).cloned().ok_or(StoreError::NotFound(EntityRef::firing(id)))?;
            Ok((stored, ops))
        })
    }

    pub fn update_clay_body(&self, id: EntityId, patch: &ClayBodyPatch) -> StoreResult<ClayBody> {
        self.commit(Origin::Local, |graph| {
            let mut clay = ClayBody::lookup(graph, id)
                .cloned()
                .ok_or(StoreError::NotFound(EntityRef::clay_body(id)))?;
            clay.apply(patch);
            let ops = put_ops(graph, clay.clone().into())?;
            Ok((clay, ops))
        })
    }

    /// Edit one stage event in place. Returns the owning piece's id and the
    /// updated event.
    pub fn update_stage_event(
        &self,
        id: EntityId,
        patch: &StageEventPatch,
    ) -> StoreResult<(EntityId, StageEvent)> {
        self.commit(Origin::Local, |graph| {
            let piece = match graph.locate(EntityRef::stage_event(id))? {
                Slot::StageEvent(piece) => piece,
                _ => return Err(StoreError::NotFound(EntityRef::stage_event(id))),
            };
            let mut event = StageEvent::lookup(graph, id)
                .cloned()
                .ok_or(StoreError::NotFound(EntityRef::stage_event(id)))?;
            event.apply(patch);
            let ops = put_ops(
                graph,
                Record::StageEvent {
                    piece,
                    event: event.clone(),
                },
            )?;
            Ok(((piece, event), ops))
        })
    }

    /// Load a piece into a firing. Returns `false` if it was already loaded.
    pub fn add_piece_to_firing(&self, firing: EntityId, piece: EntityId) -> StoreResult<bool> {
        self.edit_firing_membership(firing, piece, |f| f.add_piece(piece))
    }

    /// Unload a piece from a firing. Returns `false` if it was not loaded.
    pub fn remove_piece_from_firing(&self, firing: EntityId, piece: EntityId) -> StoreResult<bool> {
        self.edit_firing_membership(firing, piece, |f| f.remove_piece(piece))
    }

    fn edit_firing_membership(
        &self,
        firing_id: EntityId,
        piece: EntityId,
        edit: impl FnOnce(&mut Firing) -> bool,
    ) -> StoreResult<bool> {
        self.commit(Origin::Local, |graph| {
            if !graph.contains(EntityRef::piece(piece)) {
                return Err(StoreError::NotFound(EntityRef::piece(piece)));
            }
            let mut firing = Firing::lookup(graph, firing_id)
                .cloned()
                .ok_or(StoreError::NotFound(EntityRef::firing(firing_id)))?;
            if !edit(&mut firing) {
                return Ok((false, Vec::new()));
            }
            let ops = put_ops(graph, firing.into())?;
            Ok((true, ops))
        })
    }

    /// Run `f` against a private copy of the graph and swap it in if it
    /// verifies (and persists). `f` returns the caller's result plus the
    /// change ops to publish; no ops means nothing changed.
    fn commit<T>(
        &self,
        origin: Origin,
        f: impl FnOnce(&mut Graph) -> StoreResult<(T, Vec<ChangeOp>)>,
    ) -> StoreResult<T> {
        let mut state = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut next = state.graph.clone();
        let (out, ops) = f(&mut next)?;
        if ops.is_empty() {
            return Ok(out);
        }

        next.verify()?;
        if let Some(snapshot) = &self.snapshot {
            snapshot.save(&next)?;
        }
        state.graph = next;

        let first = state.seq + 1;
        for op in ops {
            state.seq += 1;
            self.feed.publish(&Change {
                seq: state.seq,
                origin,
                op,
            });
        }
        debug!(?origin, first, last = state.seq, "commit applied");
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    fn read<T>(&self, f: impl FnOnce(&Graph) -> T) -> StoreResult<T> {
        let state = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&state.graph))
    }

    /// Fetch a record by id. `NotFound` if absent.
    pub fn get<T: Entity>(&self, id: EntityId) -> StoreResult<T> {
        self.find(id)?
            .ok_or(StoreError::NotFound(EntityRef::new(T::KIND, id)))
    }

    pub fn find<T: Entity>(&self, id: EntityId) -> StoreResult<Option<T>> {
        self.read(|g| T::lookup(g, id).cloned())
    }

    /// Every record of one kind, in identifier order.
    pub fn all<T: Entity>(&self) -> StoreResult<Vec<T>> {
        self.read(|g| T::scan(g).cloned().collect())
    }

    /// Records of one kind matching `pred`.
    pub fn query<T: Entity>(&self, pred: impl Fn(&T) -> bool) -> StoreResult<Vec<T>> {
        self.read(|g| T::scan(g).filter(|r| pred(r)).cloned().collect())
    }

    pub fn count<T: Entity>(&self) -> StoreResult<usize> {
        self.read(|g| T::scan(g).count())
    }

    pub fn contains(&self, target: EntityRef) -> StoreResult<bool> {
        self.read(|g| g.contains(target))
    }

    /// The current state of any record as a [`Record`].
    pub fn record(&self, target: EntityRef) -> StoreResult<Option<Record>> {
        self.read(|g| g.record(target))
    }

    /// The piece that owns a stage event.
    pub fn stage_owner(&self, stage_event: EntityId) -> StoreResult<Option<EntityId>> {
        self.read(|g| match g.slot(stage_event) {
            Some(Slot::StageEvent(piece)) => Some(piece),
            _ => None,
        })
    }

    /// The glaze that owns a recipe line.
    pub fn recipe_owner(&self, line: EntityId) -> StoreResult<Option<EntityId>> {
        self.read(|g| match g.slot(line) {
            Some(Slot::RecipeLine(glaze)) => Some(glaze),
            _ => None,
        })
    }

    /// Media attached to `owner`, in attach order.
    pub fn media_for(&self, owner: MediaOwner) -> StoreResult<Vec<Media>> {
        self.read(|g| {
            g.media_of(owner)
                .iter()
                .filter_map(|id| g.media.get(id).cloned())
                .collect()
        })
    }

    /// Blob names referenced by any media record.
    pub fn media_file_names(&self) -> StoreResult<Vec<String>> {
        self.read(|g| g.media.values().map(|m| m.file_name.clone()).collect())
    }

    /// Number of records per kind, children included.
    pub fn counts(&self) -> StoreResult<Vec<(EntityKind, usize)>> {
        self.read(|g| {
            EntityKind::ALL
                .iter()
                .map(|kind| (*kind, g.index.values().filter(|s| s.kind() == *kind).count()))
                .collect()
        })
    }

    /// Re-check every relationship edge.
    pub fn verify(&self) -> StoreResult<()> {
        self.read(|g| g.verify())?
    }

    /// Sequence number of the last published change.
    pub fn last_seq(&self) -> StoreResult<u64> {
        let state = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.seq)
    }

    pub fn subscribe(&self, filter: ChangeFilter) -> ChangeStream {
        self.feed.subscribe(filter)
    }

    pub fn snapshot_path(&self) -> Option<&std::path::Path> {
        self.snapshot.as_ref().map(|s| s.path())
    }
}

fn put_ops(graph: &mut Graph, record: Record) -> StoreResult<Vec<ChangeOp>> {
    Ok(graph
        .put(record, PutMode::Upsert)?
        .map(ChangeOp::Upserted)
        .into_iter()
        .collect())
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let records = self.read(|g| g.index.len()).unwrap_or_default();
        f.debug_struct("EntityStore")
            .field("records", &records)
            .field("snapshot", &self.snapshot_path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use kiln_types::{FiringMethod, RecipeLine, Stage};

    // -----------------------------------------------------------------------
    // Insert and read
    // -----------------------------------------------------------------------

    #[test]
    fn insert_then_get() {
        let store = EntityStore::in_memory();
        let piece = Piece::new("Bowl A");
        store.insert(piece.clone()).unwrap();

        let fetched: Piece = store.get(piece.id).unwrap();
        assert_eq!(fetched, piece);
        assert_eq!(store.count::<Piece>().unwrap(), 1);
        assert_eq!(store.count::<StageEvent>().unwrap(), 1);
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = EntityStore::in_memory();
        let err = store.get::<Glaze>(EntityId::new()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(r) if r.kind == EntityKind::Glaze));
    }

    #[test]
    fn get_with_wrong_kind_is_not_found() {
        let store = EntityStore::in_memory();
        let clay = ClayBody::new("B-Mix");
        store.insert(clay.clone()).unwrap();
        assert!(store.find::<Glaze>(clay.id).unwrap().is_none());
    }

    #[test]
    fn duplicate_insert_leaves_store_unchanged() {
        let store = EntityStore::in_memory();
        let clay = ClayBody::new("B-Mix");
        store.insert(clay.clone()).unwrap();
        let seq = store.last_seq().unwrap();

        let err = store.insert(clay).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateIdentity(_)));
        assert_eq!(store.last_seq().unwrap(), seq);
        assert_eq!(store.count::<ClayBody>().unwrap(), 1);
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let store = EntityStore::in_memory();
        let clay = ClayBody::new("B-Mix");
        let batch = vec![
            Record::from(FiringMethod::new("Cone 6 oxidation", "Glaze")),
            Record::from(clay.clone()),
            Record::from(clay),
        ];
        assert!(store.insert_batch(batch).is_err());
        assert_eq!(store.count::<FiringMethod>().unwrap(), 0);

        let stored = store
            .insert_batch(vec![
                Record::from(ClayBody::new("Porcelain")),
                Record::from(Glaze::new("Clear", "6", "Glossy")),
            ])
            .unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[test]
    fn query_filters_by_predicate() {
        let store = EntityStore::in_memory();
        store.insert(ClayBody::new("B-Mix").with_cone("10")).unwrap();
        store.insert(ClayBody::new("Red Art").with_cone("04")).unwrap();
        let mid_fire = store
            .query::<ClayBody>(|c| c.cone.as_deref() == Some("10"))
            .unwrap();
        assert_eq!(mid_fire.len(), 1);
        assert_eq!(mid_fire[0].name, "B-Mix");
    }

    // -----------------------------------------------------------------------
    // Updates
    // -----------------------------------------------------------------------

    #[test]
    fn update_piece_checks_references() {
        let store = EntityStore::in_memory();
        let piece = Piece::new("Mug");
        store.insert(piece.clone()).unwrap();

        let patch = PiecePatch {
            glaze: Some(Some(EntityId::new())),
            ..Default::default()
        };
        assert!(store.update_piece(piece.id, &patch).unwrap_err().is_not_found());

        let glaze = Glaze::new("Shino", "10", "Satin");
        store.insert(glaze.clone()).unwrap();
        let patch = PiecePatch {
            glaze: Some(Some(glaze.id)),
            notes: Some(Some("carbon trap".into())),
            ..Default::default()
        };
        let updated = store.update_piece(piece.id, &patch).unwrap();
        assert_eq!(updated.glaze, Some(glaze.id));
        assert_eq!(updated.notes.as_deref(), Some("carbon trap"));
    }

    #[test]
    fn update_stage_event_reports_owner() {
        let store = EntityStore::in_memory();
        let piece = Piece::new("Mug");
        let thrown = piece.stages[0].id;
        store.insert(piece.clone()).unwrap();

        let patch = StageEventPatch {
            note: Some(Some("pulled handle".into())),
            ..Default::default()
        };
        let (owner, event) = store.update_stage_event(thrown, &patch).unwrap();
        assert_eq!(owner, piece.id);
        assert_eq!(event.note.as_deref(), Some("pulled handle"));
        assert_eq!(store.stage_owner(thrown).unwrap(), Some(piece.id));
    }

    #[test]
    fn recipe_line_insert_appends_to_glaze() {
        let store = EntityStore::in_memory();
        let glaze = Glaze::new("Celadon", "10", "Satin");
        store.insert(glaze.clone()).unwrap();
        let line = RecipeLine::new("Silica", 30.0);
        store
            .insert(Record::RecipeLine {
                glaze: glaze.id,
                line: line.clone(),
            })
            .unwrap();

        let stored: Glaze = store.get(glaze.id).unwrap();
        assert_eq!(stored.recipe, vec![line.clone()]);
        assert_eq!(store.recipe_owner(line.id).unwrap(), Some(glaze.id));
    }

    #[test]
    fn firing_membership_round_trip() {
        let store = EntityStore::in_memory();
        let piece = Piece::new("Jar");
        let firing = Firing::new("Skutt", "Bisque", "04");
        store.insert(piece.clone()).unwrap();
        store.insert(firing.clone()).unwrap();

        assert!(store.add_piece_to_firing(firing.id, piece.id).unwrap());
        assert!(!store.add_piece_to_firing(firing.id, piece.id).unwrap());
        let loaded: Piece = store.get(piece.id).unwrap();
        assert_eq!(loaded.firings, vec![firing.id]);

        assert!(store.remove_piece_from_firing(firing.id, piece.id).unwrap());
        assert!(!store.remove_piece_from_firing(firing.id, piece.id).unwrap());
        let loaded: Piece = store.get(piece.id).unwrap();
        assert!(loaded.firings.is_empty());
    }

    #[test]
    fn firing_patch_sets_schedule() {
        let store = EntityStore::in_memory();
        let firing = Firing::new("Skutt", "Glaze", "6");
        store.insert(firing.clone()).unwrap();
        let start = Utc::now();
        let patch = FiringPatch {
            start_at: Some(Some(start)),
            end_at: Some(Some(start + Duration::hours(9))),
            ..Default::default()
        };
        let updated = store.update_firing(firing.id, &patch).unwrap();
        assert_eq!(updated.duration(), Some(Duration::hours(9)));
    }

    // -----------------------------------------------------------------------
    // Delete and change feed
    // -----------------------------------------------------------------------

    #[test]
    fn delete_publishes_removed_then_nullified() {
        let store = EntityStore::in_memory();
        let clay = ClayBody::new("B-Mix");
        store.insert(clay.clone()).unwrap();
        let mut piece = Piece::new("Plate");
        piece.clay_body = Some(clay.id);
        store.insert(piece.clone()).unwrap();

        let mut stream = store.subscribe(ChangeFilter::default());
        let removal = store.delete(EntityRef::clay_body(clay.id)).unwrap();
        assert_eq!(removal.nullified, vec![EntityRef::piece(piece.id)]);

        let first = stream.try_recv().unwrap();
        assert_eq!(first.op, ChangeOp::Deleted(EntityRef::clay_body(clay.id)));
        let second = stream.try_recv().unwrap();
        assert_eq!(second.seq, first.seq + 1);
        match second.op {
            ChangeOp::Upserted(Record::Piece(p)) => assert_eq!(p.clay_body, None),
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn identical_upsert_publishes_nothing() {
        let store = EntityStore::in_memory();
        let glaze = Glaze::new("Clear", "6", "Glossy");
        store.insert(glaze.clone()).unwrap();
        let mut stream = store.subscribe(ChangeFilter::default());

        assert!(!store.upsert_from(Origin::Remote, glaze.into()).unwrap());
        assert!(stream.try_recv().is_err());
    }

    #[test]
    fn replaced_recipe_reaches_a_peer_line_by_line() {
        let local = EntityStore::in_memory();
        let peer = EntityStore::in_memory();
        let mut glaze = Glaze::new("Tenmoku", "10", "Glossy");
        glaze.add_recipe_line("Custer Feldspar", 50.0);
        local.insert(glaze.clone()).unwrap();
        peer.upsert_from(Origin::Remote, glaze.clone().into()).unwrap();

        let mut stream = local.subscribe(ChangeFilter::local());
        let patch = GlazePatch {
            recipe: Some(vec![("Silica".into(), 30.0), ("Red Iron Oxide".into(), 10.0)]),
            ..Default::default()
        };
        let updated = local.update_glaze(glaze.id, &patch).unwrap();

        let mut kinds = Vec::new();
        while let Ok(change) = stream.try_recv() {
            kinds.push((change.op.kind(), matches!(change.op, ChangeOp::Deleted(_))));
            match change.op {
                ChangeOp::Upserted(record) => {
                    peer.upsert_from(Origin::Remote, record).unwrap();
                }
                ChangeOp::Deleted(target) => {
                    peer.delete_from(Origin::Remote, target).unwrap();
                }
            }
        }
        assert_eq!(
            kinds,
            vec![
                (EntityKind::Glaze, false),
                (EntityKind::RecipeLine, true),
                (EntityKind::RecipeLine, false),
                (EntityKind::RecipeLine, false),
            ]
        );
        assert_eq!(peer.get::<Glaze>(glaze.id).unwrap().recipe, updated.recipe);
    }

    #[test]
    fn remote_changes_carry_remote_origin() {
        let store = EntityStore::in_memory();
        let mut local = store.subscribe(ChangeFilter::local());
        let mut all = store.subscribe(ChangeFilter::default());

        store
            .upsert_from(Origin::Remote, ClayBody::new("Porcelain").into())
            .unwrap();
        assert!(local.try_recv().is_err());
        assert_eq!(all.try_recv().unwrap().origin, Origin::Remote);
    }

    #[test]
    fn media_for_owner() {
        let store = EntityStore::in_memory();
        let piece = Piece::new("Vase");
        store.insert(piece.clone()).unwrap();
        let media = Media::new("a.jpg", MediaOwner::Piece(piece.id)).with_stage(Some(Stage::Glazed));
        store.insert(media.clone()).unwrap();

        let attached = store.media_for(MediaOwner::Piece(piece.id)).unwrap();
        assert_eq!(attached, vec![media]);
        assert_eq!(store.media_file_names().unwrap(), vec!["a.jpg"]);
    }

    #[test]
    fn counts_include_children() {
        let store = EntityStore::in_memory();
        store.insert(Piece::new("A")).unwrap();
        let counts = store.counts().unwrap();
        let lookup = |kind| counts.iter().find(|(k, _)| *k == kind).map(|(_, n)| *n);
        assert_eq!(lookup(EntityKind::Piece), Some(1));
        assert_eq!(lookup(EntityKind::StageEvent), Some(1));
        assert_eq!(lookup(EntityKind::Media), Some(0));
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    #[test]
    fn reopen_restores_committed_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let piece = Piece::new("Bowl A");
        {
            let store = EntityStore::open(&path).unwrap();
            store.insert(piece.clone()).unwrap();
        }
        let store = EntityStore::open(&path).unwrap();
        let loaded: Piece = store.get(piece.id).unwrap();
        assert_eq!(loaded.name, "Bowl A");
        assert_eq!(loaded.stages.len(), 1);
        store.verify().unwrap();
    }

    #[test]
    fn failed_write_does_not_touch_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = EntityStore::open(&path).unwrap();
        store.insert(ClayBody::new("B-Mix")).unwrap();
        let before = std::fs::read(&path).unwrap();

        let mut orphan = Piece::new("Orphan");
        orphan.clay_body = Some(EntityId::new());
        assert!(store.insert(orphan).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }
}
