use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info, warn};

use kiln_blob::{BlobStore, InMemoryBlobStore};
use kiln_store::{ChangeFilter, ChangeStream, EntityStore, Origin, StoreError};
use kiln_types::{
    ClayBody, ClayBodyPatch, EntityId, EntityKind, EntityRef, Firing, FiringMethod, FiringPatch,
    Glaze, GlazePatch, Media, MediaOwner, NewPiece, Piece, PiecePatch, RecipeLine, Record, Stage,
    StageEvent, StageEventPatch, Timestamp,
};

use crate::board::StageBoard;
use crate::error::{LifecycleError, LifecycleResult};
use crate::report::{DeleteReport, GcReport, LeakedBlob, PairingReport};

/// Sequences every operation that spans the entity store and the blob
/// store, and owns the stage-transition rules.
///
/// All writes run under one coordinator lock, so the transient
/// blob-without-record and record-without-blob states of an attach or
/// delete are never observable from another coordinator call. Reads go
/// straight to the store.
pub struct LifecycleCoordinator {
    store: Arc<EntityStore>,
    blobs: Arc<dyn BlobStore>,
    gate: Mutex<()>,
}

impl LifecycleCoordinator {
    pub fn new(store: Arc<EntityStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            blobs,
            gate: Mutex::new(()),
        }
    }

    /// A coordinator over a fresh in-memory store and blob store.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(EntityStore::in_memory()),
            Arc::new(InMemoryBlobStore::new()),
        )
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub fn subscribe(&self, filter: ChangeFilter) -> ChangeStream {
        self.store.subscribe(filter)
    }

    fn lock(&self) -> LifecycleResult<MutexGuard<'_, ()>> {
        self.gate.lock().map_err(|_| LifecycleError::LockPoisoned)
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Create a piece. Its history starts with one `thrown` event.
    pub fn create_piece(&self, new: NewPiece) -> LifecycleResult<Piece> {
        let piece = new.build();
        self.insert(piece.clone())?;
        info!(piece = %piece.id, name = %piece.name, "piece created");
        Ok(piece)
    }

    pub fn create_clay_body(&self, clay: ClayBody) -> LifecycleResult<ClayBody> {
        self.insert(clay.clone())?;
        Ok(clay)
    }

    pub fn create_glaze(&self, glaze: Glaze) -> LifecycleResult<Glaze> {
        self.insert(glaze.clone())?;
        Ok(glaze)
    }

    /// Create a firing. Any pieces it lists must already exist.
    pub fn create_firing(&self, firing: Firing) -> LifecycleResult<Firing> {
        self.insert(firing.clone())?;
        Ok(firing)
    }

    pub fn create_firing_method(&self, method: FiringMethod) -> LifecycleResult<FiringMethod> {
        self.insert(method.clone())?;
        Ok(method)
    }

    /// Insert catalog records in one commit. Deciding whether the catalog
    /// still needs seeding is up to the caller.
    pub fn seed_catalog(&self, records: Vec<Record>) -> LifecycleResult<usize> {
        let _guard = self.lock()?;
        let stored = self.store.insert_batch(records)?;
        info!(records = stored.len(), "catalog seeded");
        Ok(stored.len())
    }

    fn insert(&self, record: impl Into<Record>) -> LifecycleResult<Record> {
        let _guard = self.lock()?;
        Ok(self.store.insert(record)?)
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    pub fn current_stage(&self, piece: EntityId) -> LifecycleResult<Stage> {
        Ok(self.store.get::<Piece>(piece)?.current_stage())
    }

    /// The stage after the piece's current one, or `None` once glaze-fired.
    pub fn next_stage(&self, piece: EntityId) -> LifecycleResult<Option<Stage>> {
        Ok(self.current_stage(piece)?.next())
    }

    /// Record that `piece` reached `stage` on `date`.
    ///
    /// Any stage may be recorded at any time, including one earlier than
    /// the current stage. Whichever event carries the latest date decides
    /// the current stage.
    pub fn advance_stage(
        &self,
        piece: EntityId,
        stage: Stage,
        date: Timestamp,
        note: Option<String>,
    ) -> LifecycleResult<StageEvent> {
        let event = StageEvent::new(stage, date, note);
        self.insert(Record::StageEvent {
            piece,
            event: event.clone(),
        })?;
        debug!(%piece, stage = %stage, "stage recorded");
        Ok(event)
    }

    /// Move a piece to `stage` now, as dropping it on a board column does.
    /// Returns `None` without writing anything if it is already there.
    pub fn move_to_stage(
        &self,
        piece: EntityId,
        stage: Stage,
        note: Option<String>,
    ) -> LifecycleResult<Option<StageEvent>> {
        if self.current_stage(piece)? == stage {
            return Ok(None);
        }
        self.advance_stage(piece, stage, Utc::now(), note).map(Some)
    }

    pub fn edit_stage_event(
        &self,
        id: EntityId,
        patch: &StageEventPatch,
    ) -> LifecycleResult<StageEvent> {
        let _guard = self.lock()?;
        let (_, event) = self.store.update_stage_event(id, patch)?;
        Ok(event)
    }

    /// Remove one event from a piece's history. Removing the last one is
    /// allowed; the piece then reads as `thrown`.
    pub fn delete_stage_event(&self, id: EntityId) -> LifecycleResult<DeleteReport> {
        self.remove(Origin::Local, EntityRef::stage_event(id))
    }

    pub fn board(&self) -> LifecycleResult<StageBoard> {
        let pieces = self.store.all::<Piece>()?;
        Ok(StageBoard::build(&pieces))
    }

    // -----------------------------------------------------------------------
    // Edits
    // -----------------------------------------------------------------------

    pub fn update_piece(&self, id: EntityId, patch: &PiecePatch) -> LifecycleResult<Piece> {
        let _guard = self.lock()?;
        Ok(self.store.update_piece(id, patch)?)
    }

    pub fn update_glaze(&self, id: EntityId, patch: &GlazePatch) -> LifecycleResult<Glaze> {
        let _guard = self.lock()?;
        Ok(self.store.update_glaze(id, patch)?)
    }

    pub fn update_firing(&self, id: EntityId, patch: &FiringPatch) -> LifecycleResult<Firing> {
        let _guard = self.lock()?;
        Ok(self.store.update_firing(id, patch)?)
    }

    pub fn update_clay_body(
        &self,
        id: EntityId,
        patch: &ClayBodyPatch,
    ) -> LifecycleResult<ClayBody> {
        let _guard = self.lock()?;
        Ok(self.store.update_clay_body(id, patch)?)
    }

    pub fn add_recipe_line(
        &self,
        glaze: EntityId,
        ingredient: impl Into<String>,
        percentage: f64,
    ) -> LifecycleResult<RecipeLine> {
        let line = RecipeLine::new(ingredient, percentage);
        self.insert(Record::RecipeLine {
            glaze,
            line: line.clone(),
        })?;
        Ok(line)
    }

    pub fn add_piece_to_firing(&self, firing: EntityId, piece: EntityId) -> LifecycleResult<bool> {
        let _guard = self.lock()?;
        Ok(self.store.add_piece_to_firing(firing, piece)?)
    }

    pub fn remove_piece_from_firing(
        &self,
        firing: EntityId,
        piece: EntityId,
    ) -> LifecycleResult<bool> {
        let _guard = self.lock()?;
        Ok(self.store.remove_piece_from_firing(firing, piece)?)
    }

    // -----------------------------------------------------------------------
    // Photos
    // -----------------------------------------------------------------------

    /// Store photo bytes and attach a media record for them to `owner`.
    ///
    /// Either both the blob and the record exist afterwards or neither
    /// does. A failed blob write surfaces as `StorageWriteFailed`.
    pub fn attach_photo(
        &self,
        owner: MediaOwner,
        bytes: &[u8],
        caption: Option<String>,
        stage: Option<Stage>,
    ) -> LifecycleResult<Media> {
        let _guard = self.lock()?;
        let target = owner.entity_ref();
        if !self.store.contains(target)? {
            return Err(StoreError::NotFound(target).into());
        }

        let file_name = self
            .blobs
            .save(bytes)
            .map_err(LifecycleError::StorageWriteFailed)?;
        let media = Media::new(file_name, owner)
            .with_caption(caption)
            .with_stage(stage);

        if let Err(e) = self.store.insert(media.clone()) {
            warn!(file_name = %media.file_name, error = %e, "media insert failed, rolling back blob");
            if let Err(cleanup) = self.blobs.delete(&media.file_name) {
                warn!(file_name = %media.file_name, error = %cleanup, "rollback left blob behind");
            }
            return Err(e.into());
        }

        debug!(media = %media.id, owner = %target, bytes = bytes.len(), "photo attached");
        Ok(media)
    }

    /// Attach a photo to a piece. Without an explicit stage, the photo is
    /// labelled with the piece's current stage.
    pub fn attach_piece_photo(
        &self,
        piece: EntityId,
        bytes: &[u8],
        caption: Option<String>,
        stage: Option<Stage>,
    ) -> LifecycleResult<Media> {
        let stage = match stage {
            Some(stage) => stage,
            None => self.current_stage(piece)?,
        };
        self.attach_photo(MediaOwner::Piece(piece), bytes, caption, Some(stage))
    }

    pub fn photos(&self, owner: MediaOwner) -> LifecycleResult<Vec<Media>> {
        Ok(self.store.media_for(owner)?)
    }

    /// Piece photos taken while it was at `stage`.
    pub fn photos_at_stage(&self, piece: EntityId, stage: Stage) -> LifecycleResult<Vec<Media>> {
        let mut photos = self.photos(MediaOwner::Piece(piece))?;
        photos.retain(|m| m.stage_at_capture == Some(stage));
        Ok(photos)
    }

    pub fn load_photo(&self, media: EntityId) -> LifecycleResult<Vec<u8>> {
        let media = self.store.get::<Media>(media)?;
        Ok(self.blobs.load(&media.file_name)?)
    }

    // -----------------------------------------------------------------------
    // Deletes
    // -----------------------------------------------------------------------

    /// Delete a photo: its blob first, then its record.
    ///
    /// A blob that cannot be deleted does not keep the record alive; the
    /// failure is reported as a leaked blob. A blob that is already gone is
    /// not a failure.
    pub fn delete_media(&self, id: EntityId) -> LifecycleResult<DeleteReport> {
        self.remove(Origin::Local, EntityRef::media(id))
    }

    pub fn delete_piece(&self, id: EntityId) -> LifecycleResult<DeleteReport> {
        self.remove(Origin::Local, EntityRef::piece(id))
    }

    pub fn delete_glaze(&self, id: EntityId) -> LifecycleResult<DeleteReport> {
        self.remove(Origin::Local, EntityRef::glaze(id))
    }

    pub fn delete_firing(&self, id: EntityId) -> LifecycleResult<DeleteReport> {
        self.remove(Origin::Local, EntityRef::firing(id))
    }

    pub fn delete_clay_body(&self, id: EntityId) -> LifecycleResult<DeleteReport> {
        self.remove(Origin::Local, EntityRef::clay_body(id))
    }

    pub fn delete_firing_method(&self, id: EntityId) -> LifecycleResult<DeleteReport> {
        self.remove(Origin::Local, EntityRef::firing_method(id))
    }

    pub fn delete_recipe_line(&self, id: EntityId) -> LifecycleResult<DeleteReport> {
        self.remove(Origin::Local, EntityRef::recipe_line(id))
    }

    fn remove(&self, origin: Origin, target: EntityRef) -> LifecycleResult<DeleteReport> {
        let _guard = self.lock()?;

        let report = if target.kind == EntityKind::Media {
            let media = self.store.get::<Media>(target.id)?;
            let mut report = DeleteReport::default();
            self.release_blob(&media.file_name, &mut report);
            let removal = self.store.delete_from(origin, target)?;
            report.removed = removal.removed;
            report.nullified = removal.nullified;
            report
        } else {
            let removal = self.store.delete_from(origin, target)?;
            let blobs = removal.released_blobs.clone();
            let mut report = DeleteReport::from_removal(removal);
            for name in &blobs {
                self.release_blob(name, &mut report);
            }
            report
        };

        info!(
            entity = %target,
            ?origin,
            removed = report.removed.len(),
            nullified = report.nullified.len(),
            leaked = report.leaked_blobs.len(),
            "deleted"
        );
        Ok(report)
    }

    fn release_blob(&self, name: &str, report: &mut DeleteReport) {
        match self.blobs.delete(name) {
            Ok(()) => report.deleted_blobs.push(name.to_string()),
            Err(e) if e.is_not_found() => {
                debug!(file_name = name, "blob already absent");
            }
            Err(e) => {
                warn!(file_name = name, error = %e, "blob delete failed, bytes leaked");
                report.leaked_blobs.push(LeakedBlob {
                    file_name: name.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Compare media records against stored blobs.
    pub fn verify_pairing(&self) -> LifecycleResult<PairingReport> {
        let _guard = self.lock()?;
        self.pairing()
    }

    fn pairing(&self) -> LifecycleResult<PairingReport> {
        let referenced: HashSet<String> = self.store.media_file_names()?.into_iter().collect();
        let orphan_blobs = self
            .blobs
            .list()?
            .into_iter()
            .filter(|name| !referenced.contains(name))
            .collect();

        let mut dangling_media = Vec::new();
        for media in self.store.all::<Media>()? {
            if !self.blobs.exists(&media.file_name)? {
                dangling_media.push(media);
            }
        }
        Ok(PairingReport {
            orphan_blobs,
            dangling_media,
        })
    }

    /// Delete blobs that no media record refers to.
    pub fn collect_garbage(&self) -> LifecycleResult<GcReport> {
        let _guard = self.lock()?;
        let mut gc = GcReport::default();
        for name in self.pairing()?.orphan_blobs {
            match self.blobs.delete(&name) {
                Ok(()) => gc.deleted.push(name),
                Err(e) if e.is_not_found() => {}
                Err(e) => gc.failed.push(LeakedBlob {
                    file_name: name,
                    reason: e.to_string(),
                }),
            }
        }
        info!(deleted = gc.deleted.len(), failed = gc.failed.len(), "orphan blobs collected");
        Ok(gc)
    }

    // -----------------------------------------------------------------------
    // Remote changes
    // -----------------------------------------------------------------------

    /// Apply a record received from a peer. Returns `false` if the store
    /// already held exactly this record.
    ///
    /// Media records go through [`Self::apply_remote_media`] with no bytes,
    /// so their blob must already be present.
    pub fn apply_remote(&self, record: Record) -> LifecycleResult<bool> {
        match record {
            Record::Media(media) => self.apply_remote_media(media, None),
            record => {
                let _guard = self.lock()?;
                Ok(self.store.upsert_from(Origin::Remote, record)?)
            }
        }
    }

    /// Apply a media record received from a peer, importing its blob under
    /// the peer's name first.
    ///
    /// Bytes may be omitted if the blob is already here. If the record
    /// cannot be written, a blob imported by this call is deleted again.
    /// If the record now points at a different blob, the old one is
    /// deleted.
    pub fn apply_remote_media(&self, media: Media, bytes: Option<&[u8]>) -> LifecycleResult<bool> {
        let _guard = self.lock()?;

        let imported = match bytes {
            Some(bytes) => self
                .blobs
                .import(&media.file_name, bytes)
                .map_err(LifecycleError::StorageWriteFailed)?,
            None => {
                if !self.blobs.exists(&media.file_name)? {
                    return Err(LifecycleError::MissingBlob {
                        media: media.id.to_string(),
                        file_name: media.file_name,
                    });
                }
                false
            }
        };

        let previous = self.store.find::<Media>(media.id)?;
        let file_name = media.file_name.clone();
        match self.store.upsert_from(Origin::Remote, media.into()) {
            Ok(changed) => {
                if let Some(old) = previous.filter(|old| old.file_name != file_name) {
                    let mut report = DeleteReport::default();
                    self.release_blob(&old.file_name, &mut report);
                }
                Ok(changed)
            }
            Err(e) => {
                if imported {
                    warn!(file_name = %file_name, error = %e, "remote media rejected, removing imported blob");
                    if let Err(cleanup) = self.blobs.delete(&file_name) {
                        warn!(file_name = %file_name, error = %cleanup, "rollback left blob behind");
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Apply a delete received from a peer. Deleting something that is not
    /// here is a no-op.
    pub fn apply_remote_delete(&self, target: EntityRef) -> LifecycleResult<DeleteReport> {
        match self.remove(Origin::Remote, target) {
            Err(e) if e.is_not_found() => {
                debug!(entity = %target, "remote delete of absent record");
                Ok(DeleteReport::default())
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for LifecycleCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleCoordinator")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FlakyBlobStore;
    use chrono::Duration;

    fn flaky() -> (LifecycleCoordinator, Arc<FlakyBlobStore>) {
        let blobs = Arc::new(FlakyBlobStore::default());
        let coordinator = LifecycleCoordinator::new(Arc::new(EntityStore::in_memory()), blobs.clone());
        (coordinator, blobs)
    }

    // -----------------------------------------------------------------------
    // Scenarios
    // -----------------------------------------------------------------------

    #[test]
    fn bowl_a_from_wheel_to_delete() {
        let kiln = LifecycleCoordinator::in_memory();
        let bowl = kiln.create_piece(NewPiece::named("Bowl A")).unwrap();
        assert_eq!(kiln.current_stage(bowl.id).unwrap(), Stage::Thrown);
        assert_eq!(kiln.store().get::<Piece>(bowl.id).unwrap().stages.len(), 1);

        let day_two = bowl.created_at + Duration::days(1);
        kiln.advance_stage(bowl.id, Stage::Glazed, day_two, None).unwrap();
        assert_eq!(kiln.current_stage(bowl.id).unwrap(), Stage::Glazed);

        let photo = kiln
            .attach_photo(MediaOwner::Piece(bowl.id), b"jpeg", None, Some(Stage::Glazed))
            .unwrap();
        assert_eq!(kiln.photos(MediaOwner::Piece(bowl.id)).unwrap().len(), 1);
        assert_eq!(kiln.load_photo(photo.id).unwrap(), b"jpeg");

        let report = kiln.delete_piece(bowl.id).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.deleted_blobs, vec![photo.file_name.clone()]);
        assert!(kiln.photos(MediaOwner::Piece(bowl.id)).unwrap().is_empty());
        assert!(kiln.blobs().load(&photo.file_name).unwrap_err().is_not_found());
        assert!(kiln
            .store()
            .query::<Media>(|m| m.piece_id == Some(bowl.id))
            .unwrap()
            .is_empty());
        assert_eq!(kiln.store().count::<StageEvent>().unwrap(), 0);
    }

    #[test]
    fn celadon_delete_clears_both_pieces() {
        let kiln = LifecycleCoordinator::in_memory();
        let mut celadon = Glaze::new("Celadon", "10", "Satin");
        celadon.add_recipe_line("Custer Feldspar", 25.0);
        celadon.add_recipe_line("Silica", 35.0);
        let celadon = kiln.create_glaze(celadon).unwrap();

        let mut pieces = Vec::new();
        for name in ["Teabowl", "Vase"] {
            let new = NewPiece {
                glaze: Some(celadon.id),
                notes: Some("wax resist foot".into()),
                ..NewPiece::named(name)
            };
            pieces.push(kiln.create_piece(new).unwrap());
        }

        let report = kiln.delete_glaze(celadon.id).unwrap();
        assert_eq!(report.removed.len(), 3);
        assert_eq!(report.nullified.len(), 2);
        assert!(kiln.store().find::<Glaze>(celadon.id).unwrap().is_none());
        assert_eq!(kiln.store().count::<RecipeLine>().unwrap(), 0);

        for before in pieces {
            let after = kiln.store().get::<Piece>(before.id).unwrap();
            assert_eq!(after.glaze, None);
            assert_eq!(after.name, before.name);
            assert_eq!(after.notes, before.notes);
            assert_eq!(after.stages, before.stages);
        }
    }

    #[test]
    fn firing_delete_keeps_pieces() {
        let kiln = LifecycleCoordinator::in_memory();
        let jar = kiln.create_piece(NewPiece::named("Jar")).unwrap();
        let firing = kiln.create_firing(Firing::new("Skutt", "Bisque", "04")).unwrap();
        kiln.add_piece_to_firing(firing.id, jar.id).unwrap();
        let shot = kiln
            .attach_photo(MediaOwner::Firing(firing.id), b"kiln shelf", None, None)
            .unwrap();

        let report = kiln.delete_firing(firing.id).unwrap();
        assert_eq!(report.deleted_blobs, vec![shot.file_name]);
        let jar = kiln.store().get::<Piece>(jar.id).unwrap();
        assert!(jar.firings.is_empty());
        assert_eq!(kiln.store().count::<Media>().unwrap(), 0);
    }

    // -----------------------------------------------------------------------
    // Photo pairing
    // -----------------------------------------------------------------------

    #[test]
    fn failed_save_creates_no_media() {
        let (kiln, blobs) = flaky();
        let piece = kiln.create_piece(NewPiece::named("Mug")).unwrap();
        blobs.fail_saves(true);

        let err = kiln
            .attach_photo(MediaOwner::Piece(piece.id), b"x", None, None)
            .unwrap_err();
        assert!(matches!(err, LifecycleError::StorageWriteFailed(_)));
        assert_eq!(kiln.store().count::<Media>().unwrap(), 0);
        assert!(blobs.inner.is_empty());
    }

    #[test]
    fn attach_to_missing_owner_writes_no_blob() {
        let (kiln, blobs) = flaky();
        let err = kiln
            .attach_photo(MediaOwner::Glaze(EntityId::new()), b"x", None, None)
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(blobs.inner.is_empty());
    }

    #[test]
    fn successful_attach_is_loadable_by_exact_name() {
        let kiln = LifecycleCoordinator::in_memory();
        let glaze = kiln.create_glaze(Glaze::new("Shino", "10", "Satin")).unwrap();
        let media = kiln
            .attach_photo(MediaOwner::Glaze(glaze.id), b"test tile", Some("tile".into()), None)
            .unwrap();
        let stored = kiln.store().get::<Media>(media.id).unwrap();
        assert_eq!(stored.file_name, media.file_name);
        assert_eq!(kiln.blobs().load(&stored.file_name).unwrap(), b"test tile");
    }

    #[test]
    fn piece_photo_defaults_to_current_stage() {
        let kiln = LifecycleCoordinator::in_memory();
        let piece = kiln.create_piece(NewPiece::named("Plate")).unwrap();
        kiln.move_to_stage(piece.id, Stage::Trimmed, None).unwrap();

        let media = kiln.attach_piece_photo(piece.id, b"x", None, None).unwrap();
        assert_eq!(media.stage_at_capture, Some(Stage::Trimmed));
        assert_eq!(kiln.photos_at_stage(piece.id, Stage::Trimmed).unwrap().len(), 1);
        assert!(kiln.photos_at_stage(piece.id, Stage::Thrown).unwrap().is_empty());
    }

    #[test]
    fn delete_media_reports_leak_but_removes_record() {
        let (kiln, blobs) = flaky();
        let piece = kiln.create_piece(NewPiece::named("Vase")).unwrap();
        let media = kiln
            .attach_photo(MediaOwner::Piece(piece.id), b"x", None, None)
            .unwrap();
        blobs.fail_deletes(true);

        let report = kiln.delete_media(media.id).unwrap();
        assert_eq!(report.removed, vec![EntityRef::media(media.id)]);
        assert_eq!(report.leaked_blobs.len(), 1);
        assert!(kiln.store().find::<Media>(media.id).unwrap().is_none());

        let pairing = kiln.verify_pairing().unwrap();
        assert_eq!(pairing.orphan_blobs, vec![media.file_name.clone()]);

        blobs.fail_deletes(false);
        let gc = kiln.collect_garbage().unwrap();
        assert_eq!(gc.deleted, vec![media.file_name]);
        assert!(kiln.verify_pairing().unwrap().is_healthy());
    }

    #[test]
    fn delete_media_tolerates_blob_removed_out_of_band() {
        let (kiln, blobs) = flaky();
        let piece = kiln.create_piece(NewPiece::named("Vase")).unwrap();
        let media = kiln
            .attach_photo(MediaOwner::Piece(piece.id), b"x", None, None)
            .unwrap();
        assert!(blobs.inner.remove_out_of_band(&media.file_name));

        let dangling = kiln.verify_pairing().unwrap().dangling_media;
        assert_eq!(dangling.len(), 1);

        let report = kiln.delete_media(media.id).unwrap();
        assert!(report.is_clean());
        assert!(report.deleted_blobs.is_empty());
        assert!(kiln.photos(MediaOwner::Piece(piece.id)).unwrap().is_empty());
    }

    #[test]
    fn cascade_leaks_are_reported_per_blob() {
        let (kiln, blobs) = flaky();
        let piece = kiln.create_piece(NewPiece::named("Set")).unwrap();
        for _ in 0..3 {
            kiln.attach_photo(MediaOwner::Piece(piece.id), b"x", None, None)
                .unwrap();
        }
        blobs.fail_deletes(true);

        let report = kiln.delete_piece(piece.id).unwrap();
        assert_eq!(report.leaked_blobs.len(), 3);
        assert!(kiln.store().find::<Piece>(piece.id).unwrap().is_none());
        assert_eq!(kiln.verify_pairing().unwrap().orphan_blobs.len(), 3);
    }

    #[test]
    fn gc_spares_files_sharing_the_photo_directory() {
        use kiln_blob::{FsBlobConfig, FsBlobStore};

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kiln.toml"), "log_filter = \"warn\"\n").unwrap();
        let store = Arc::new(EntityStore::open(dir.path().join("store.json")).unwrap());
        let blobs = Arc::new(FsBlobStore::open(dir.path(), FsBlobConfig::default()).unwrap());
        let kiln = LifecycleCoordinator::new(store, blobs.clone());

        let piece = kiln.create_piece(NewPiece::named("Bowl A")).unwrap();
        let kept = kiln
            .attach_photo(MediaOwner::Piece(piece.id), b"kept", None, None)
            .unwrap();
        let orphan = blobs.save(b"orphan").unwrap();

        let gc = kiln.collect_garbage().unwrap();
        assert_eq!(gc.deleted, vec![orphan]);
        assert!(dir.path().join("store.json").is_file());
        assert!(dir.path().join("kiln.toml").is_file());
        assert!(blobs.exists(&kept.file_name).unwrap());
        assert!(kiln.verify_pairing().unwrap().is_healthy());
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    #[test]
    fn earlier_stage_with_later_date_wins() {
        // History is permissive: a correction back to an earlier stage
        // supersedes a later stage if it is dated after it.
        let kiln = LifecycleCoordinator::in_memory();
        let piece = kiln.create_piece(NewPiece::named("Cup")).unwrap();
        let t0 = piece.created_at;
        kiln.advance_stage(piece.id, Stage::Bisque, t0 + Duration::hours(1), None)
            .unwrap();
        kiln.advance_stage(piece.id, Stage::Trimmed, t0 + Duration::hours(2), Some("recorded late".into()))
            .unwrap();
        assert_eq!(kiln.current_stage(piece.id).unwrap(), Stage::Trimmed);
        assert_eq!(kiln.next_stage(piece.id).unwrap(), Some(Stage::LeatherHard));
    }

    #[test]
    fn move_to_current_stage_is_a_no_op() {
        let kiln = LifecycleCoordinator::in_memory();
        let piece = kiln.create_piece(NewPiece::named("Cup")).unwrap();
        let seq = kiln.store().last_seq().unwrap();
        assert!(kiln.move_to_stage(piece.id, Stage::Thrown, None).unwrap().is_none());
        assert_eq!(kiln.store().last_seq().unwrap(), seq);

        let event = kiln
            .move_to_stage(piece.id, Stage::BoneDry, None)
            .unwrap()
            .unwrap();
        assert_eq!(event.stage, Stage::BoneDry);
    }

    #[test]
    fn advance_on_missing_piece_is_not_found() {
        let kiln = LifecycleCoordinator::in_memory();
        let err = kiln
            .advance_stage(EntityId::new(), Stage::Trimmed, Utc::now(), None)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn editing_event_date_changes_current_stage() {
        let kiln = LifecycleCoordinator::in_memory();
        let piece = kiln.create_piece(NewPiece::named("Cup")).unwrap();
        let t0 = piece.created_at;
        let trimmed = kiln
            .advance_stage(piece.id, Stage::Trimmed, t0 + Duration::hours(1), None)
            .unwrap();
        kiln.advance_stage(piece.id, Stage::LeatherHard, t0 + Duration::hours(2), None)
            .unwrap();

        let patch = StageEventPatch {
            date: Some(t0 + Duration::hours(3)),
            ..Default::default()
        };
        kiln.edit_stage_event(trimmed.id, &patch).unwrap();
        assert_eq!(kiln.current_stage(piece.id).unwrap(), Stage::Trimmed);
    }

    #[test]
    fn deleting_every_event_falls_back_to_thrown() {
        let kiln = LifecycleCoordinator::in_memory();
        let piece = kiln.create_piece(NewPiece::named("Cup")).unwrap();
        let bisque = kiln
            .advance_stage(piece.id, Stage::Bisque, piece.created_at + Duration::hours(1), None)
            .unwrap();

        kiln.delete_stage_event(bisque.id).unwrap();
        kiln.delete_stage_event(piece.stages[0].id).unwrap();
        let stored = kiln.store().get::<Piece>(piece.id).unwrap();
        assert!(stored.stages.is_empty());
        assert_eq!(kiln.current_stage(piece.id).unwrap(), Stage::Thrown);

        kiln.update_piece(
            piece.id,
            &PiecePatch {
                name: Some("Cup (reclaimed)".into()),
                ..Default::default()
            },
        )
        .unwrap();
    }

    #[test]
    fn board_groups_by_stage() {
        let kiln = LifecycleCoordinator::in_memory();
        let a = kiln.create_piece(NewPiece::named("A")).unwrap();
        kiln.create_piece(NewPiece::named("B")).unwrap();
        kiln.move_to_stage(a.id, Stage::Glazed, None).unwrap();

        let board = kiln.board().unwrap();
        assert_eq!(board.column(Stage::Thrown).count(), 1);
        assert_eq!(board.column(Stage::Glazed).pieces[0].id, a.id);
    }

    // -----------------------------------------------------------------------
    // Catalog and edits
    // -----------------------------------------------------------------------

    #[test]
    fn seed_catalog_is_atomic() {
        let kiln = LifecycleCoordinator::in_memory();
        let clay = ClayBody::new("B-Mix");
        let records = vec![
            Record::from(clay.clone()),
            Record::from(FiringMethod::new("Cone 10 reduction", "Glaze")),
            Record::from(clay),
        ];
        assert!(kiln.seed_catalog(records).is_err());
        assert_eq!(kiln.store().count::<ClayBody>().unwrap(), 0);

        let n = kiln
            .seed_catalog(vec![
                ClayBody::new("Porcelain").into(),
                Glaze::new("Clear", "6", "Glossy").into(),
                FiringMethod::new("Cone 6 oxidation", "Glaze").into(),
            ])
            .unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn clay_body_delete_leaves_free_text_label() {
        let kiln = LifecycleCoordinator::in_memory();
        let clay = kiln.create_clay_body(ClayBody::new("Speckled Buff")).unwrap();
        let piece = kiln
            .create_piece(NewPiece {
                clay_body: Some(clay.id),
                clay_body_name: Some("Speckled Buff".into()),
                ..NewPiece::named("Mug")
            })
            .unwrap();

        kiln.delete_clay_body(clay.id).unwrap();
        let piece = kiln.store().get::<Piece>(piece.id).unwrap();
        assert_eq!(piece.clay_body, None);
        assert_eq!(piece.clay_body_name.as_deref(), Some("Speckled Buff"));
    }

    #[test]
    fn recipe_lines_are_added_and_removed() {
        let kiln = LifecycleCoordinator::in_memory();
        let glaze = kiln.create_glaze(Glaze::new("Tenmoku", "10", "Glossy")).unwrap();
        let line = kiln.add_recipe_line(glaze.id, "Red Iron Oxide", 10.0).unwrap();
        kiln.add_recipe_line(glaze.id, "Base", 90.0).unwrap();
        assert!(kiln.store().get::<Glaze>(glaze.id).unwrap().recipe_is_balanced());

        kiln.delete_recipe_line(line.id).unwrap();
        let glaze = kiln.store().get::<Glaze>(glaze.id).unwrap();
        assert_eq!(glaze.recipe.len(), 1);
        assert!(!glaze.recipe_is_balanced());
    }

    // -----------------------------------------------------------------------
    // Remote changes
    // -----------------------------------------------------------------------

    #[test]
    fn remote_media_needs_its_blob() {
        let kiln = LifecycleCoordinator::in_memory();
        let piece = kiln.create_piece(NewPiece::named("Vase")).unwrap();
        let media = Media::new(kiln_blob::generate_name("jpg"), MediaOwner::Piece(piece.id));

        let err = kiln.apply_remote_media(media.clone(), None).unwrap_err();
        assert!(matches!(err, LifecycleError::MissingBlob { .. }));

        assert!(kiln.apply_remote_media(media.clone(), Some(b"peer bytes")).unwrap());
        assert!(!kiln.apply_remote_media(media.clone(), Some(b"peer bytes")).unwrap());
        assert_eq!(kiln.load_photo(media.id).unwrap(), b"peer bytes");
    }

    #[test]
    fn rejected_remote_media_rolls_back_import() {
        let kiln = LifecycleCoordinator::in_memory();
        let media = Media::new(kiln_blob::generate_name("jpg"), MediaOwner::Piece(EntityId::new()));
        let err = kiln.apply_remote_media(media.clone(), Some(b"x")).unwrap_err();
        assert!(err.is_not_found());
        assert!(!kiln.blobs().exists(&media.file_name).unwrap());
    }

    #[test]
    fn remote_delete_of_absent_record_is_a_no_op() {
        let kiln = LifecycleCoordinator::in_memory();
        let report = kiln
            .apply_remote_delete(EntityRef::media(EntityId::new()))
            .unwrap();
        assert_eq!(report, DeleteReport::default());
    }

    #[test]
    fn remote_changes_are_not_seen_by_local_subscribers() {
        let kiln = LifecycleCoordinator::in_memory();
        let mut local = kiln.subscribe(ChangeFilter::local());
        kiln.apply_remote(ClayBody::new("Porcelain").into()).unwrap();
        assert!(local.try_recv().is_err());

        kiln.create_clay_body(ClayBody::new("Stoneware")).unwrap();
        assert_eq!(local.try_recv().unwrap().origin, Origin::Local);
    }
}
