use std::sync::Arc;

use tracing::debug;

use kiln_lifecycle::{DeleteReport, LifecycleCoordinator};
use kiln_store::ChangeOp;
use kiln_types::{
    ClayBody, EntityId, EntityKind, EntityRef, Firing, FiringMethod, Glaze, Media, Piece,
    RecipeLine, Record, StageEvent,
};

use crate::error::SyncResult;
use crate::remote::{RemoteMutation, ReplicatedChange};

/// What applying one remote mutation did on this replica.
#[derive(Clone, Debug, PartialEq)]
pub enum Applied {
    /// Nothing changed: the record was already in this state, or already
    /// gone.
    Unchanged,
    Upserted,
    Deleted(DeleteReport),
}

impl Applied {
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Entry points the replication adapter calls when a peer's change
/// arrives. One per record kind.
///
/// Every entry point is safe to call again with the same mutation.
/// Changes applied here are published with `Origin::Remote`, so the local
/// outbox does not send them back.
pub struct ReplicaApplier {
    coordinator: Arc<LifecycleCoordinator>,
}

impl ReplicaApplier {
    pub fn new(coordinator: Arc<LifecycleCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn apply_piece(&self, mutation: RemoteMutation<Piece>) -> SyncResult<Applied> {
        self.apply(mutation, EntityKind::Piece, Record::Piece)
    }

    /// A stage event for `piece`. Fails with `NotFound` if the piece has not
    /// arrived yet.
    pub fn apply_stage_event(
        &self,
        piece: EntityId,
        mutation: RemoteMutation<StageEvent>,
    ) -> SyncResult<Applied> {
        self.apply(mutation, EntityKind::StageEvent, |event| Record::StageEvent {
            piece,
            event,
        })
    }

    pub fn apply_clay_body(&self, mutation: RemoteMutation<ClayBody>) -> SyncResult<Applied> {
        self.apply(mutation, EntityKind::ClayBody, Record::ClayBody)
    }

    pub fn apply_glaze(&self, mutation: RemoteMutation<Glaze>) -> SyncResult<Applied> {
        self.apply(mutation, EntityKind::Glaze, Record::Glaze)
    }

    pub fn apply_recipe_line(
        &self,
        glaze: EntityId,
        mutation: RemoteMutation<RecipeLine>,
    ) -> SyncResult<Applied> {
        self.apply(mutation, EntityKind::RecipeLine, |line| Record::RecipeLine {
            glaze,
            line,
        })
    }

    pub fn apply_firing(&self, mutation: RemoteMutation<Firing>) -> SyncResult<Applied> {
        self.apply(mutation, EntityKind::Firing, Record::Firing)
    }

    pub fn apply_firing_method(
        &self,
        mutation: RemoteMutation<FiringMethod>,
    ) -> SyncResult<Applied> {
        self.apply(mutation, EntityKind::FiringMethod, Record::FiringMethod)
    }

    /// A media record, with the photo bytes if the peer sent them.
    ///
    /// An upsert fails with `MissingBlob` when the bytes are absent here and
    /// not supplied.
    pub fn apply_media(
        &self,
        mutation: RemoteMutation<Media>,
        bytes: Option<&[u8]>,
    ) -> SyncResult<Applied> {
        match mutation {
            RemoteMutation::Upsert(media) => {
                let changed = self.coordinator.apply_remote_media(media, bytes)?;
                Ok(upserted(changed))
            }
            RemoteMutation::Delete(id) => self.delete(EntityRef::media(id)),
        }
    }

    /// Route a packaged change to its entry point.
    pub fn apply_change(&self, change: &ReplicatedChange) -> SyncResult<Applied> {
        debug!(seq = change.seq, entity = %change.op.entity_ref(), "applying remote change");
        let record = match &change.op {
            ChangeOp::Deleted(target) => return self.delete(*target),
            ChangeOp::Upserted(record) => record.clone(),
        };
        match record {
            Record::Piece(p) => self.apply_piece(RemoteMutation::Upsert(p)),
            Record::StageEvent { piece, event } => {
                self.apply_stage_event(piece, RemoteMutation::Upsert(event))
            }
            Record::ClayBody(c) => self.apply_clay_body(RemoteMutation::Upsert(c)),
            Record::Glaze(g) => self.apply_glaze(RemoteMutation::Upsert(g)),
            Record::RecipeLine { glaze, line } => {
                self.apply_recipe_line(glaze, RemoteMutation::Upsert(line))
            }
            Record::Firing(f) => self.apply_firing(RemoteMutation::Upsert(f)),
            Record::FiringMethod(m) => self.apply_firing_method(RemoteMutation::Upsert(m)),
            Record::Media(m) => self.apply_media(RemoteMutation::Upsert(m), change.blob.as_deref()),
        }
    }

    fn apply<T>(
        &self,
        mutation: RemoteMutation<T>,
        kind: EntityKind,
        wrap: impl FnOnce(T) -> Record,
    ) -> SyncResult<Applied> {
        match mutation {
            RemoteMutation::Upsert(value) => {
                let changed = self.coordinator.apply_remote(wrap(value))?;
                Ok(upserted(changed))
            }
            RemoteMutation::Delete(id) => self.delete(EntityRef::new(kind, id)),
        }
    }

    fn delete(&self, target: EntityRef) -> SyncResult<Applied> {
        let report = self.coordinator.apply_remote_delete(target)?;
        if report.removed.is_empty() {
            Ok(Applied::Unchanged)
        } else {
            Ok(Applied::Deleted(report))
        }
    }
}

fn upserted(changed: bool) -> Applied {
    if changed {
        Applied::Upserted
    } else {
        Applied::Unchanged
    }
}
