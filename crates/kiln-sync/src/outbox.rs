use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, warn};

use kiln_blob::BlobStore;
use kiln_lifecycle::LifecycleCoordinator;
use kiln_store::{Change, ChangeFilter, ChangeOp, ChangeStream};
use kiln_types::Record;

use crate::channel::ReplicationChannel;
use crate::error::{SyncError, SyncResult};
use crate::remote::ReplicatedChange;

/// Outgoing queue of locally committed changes.
///
/// Subscribes to local-origin changes only, so changes applied from a
/// peer are never echoed back. Media upserts are packaged with their blob
/// bytes.
pub struct Outbox {
    stream: ChangeStream,
    blobs: Arc<dyn BlobStore>,
    /// Taken from the stream but not yet sent.
    pending: Option<ReplicatedChange>,
}

impl Outbox {
    pub fn new(coordinator: &LifecycleCoordinator) -> Self {
        Self {
            stream: coordinator.subscribe(ChangeFilter::local()),
            blobs: coordinator.blobs().clone(),
            pending: None,
        }
    }

    /// Wait for the next local change.
    pub async fn next(&mut self) -> SyncResult<ReplicatedChange> {
        if let Some(change) = self.pending.take() {
            return Ok(change);
        }
        match self.stream.recv().await {
            Ok(change) => self.package(change),
            Err(RecvError::Lagged(n)) => Err(SyncError::Lagged(n)),
            Err(RecvError::Closed) => Err(SyncError::FeedClosed),
        }
    }

    /// The next local change if one is already queued.
    pub fn try_next(&mut self) -> SyncResult<Option<ReplicatedChange>> {
        if let Some(change) = self.pending.take() {
            return Ok(Some(change));
        }
        match self.stream.try_recv() {
            Ok(change) => self.package(change).map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Lagged(n)) => Err(SyncError::Lagged(n)),
            Err(TryRecvError::Closed) => Err(SyncError::FeedClosed),
        }
    }

    /// Send every queued change over `channel`, in commit order. Returns
    /// how many were sent.
    ///
    /// If a send fails, that change is kept and goes first on the next
    /// call.
    pub async fn forward(&mut self, channel: &dyn ReplicationChannel) -> SyncResult<usize> {
        let mut sent = 0;
        while let Some(change) = self.try_next()? {
            if let Err(e) = channel.send(&change).await {
                warn!(seq = change.seq, sent, error = %e, "send failed, change kept for retry");
                self.pending = Some(change);
                return Err(e);
            }
            sent += 1;
        }
        if sent > 0 {
            debug!(sent, "outbox forwarded");
        }
        Ok(sent)
    }

    fn package(&self, change: Change) -> SyncResult<ReplicatedChange> {
        let blob = match &change.op {
            ChangeOp::Upserted(Record::Media(media)) => match self.blobs.load(&media.file_name) {
                Ok(bytes) => Some(bytes),
                // Deleted since the change was committed; the delete follows.
                Err(e) if e.is_not_found() => {
                    warn!(file_name = %media.file_name, "blob gone before it could be sent");
                    None
                }
                Err(e) => return Err(e.into()),
            },
            _ => None,
        };
        Ok(ReplicatedChange {
            seq: change.seq,
            op: change.op,
            blob,
        })
    }
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("queued", &(self.stream.len() + usize::from(self.pending.is_some())))
            .finish()
    }
}
