use async_trait::async_trait;

use crate::error::SyncResult;
use crate::remote::ReplicatedChange;

/// Outgoing side of the replication transport.
///
/// Delivery is at-least-once: an implementation may send a change more
/// than once, and the receiving applier tolerates that.
#[async_trait]
pub trait ReplicationChannel: Send + Sync {
    async fn send(&self, change: &ReplicatedChange) -> SyncResult<()>;
}
