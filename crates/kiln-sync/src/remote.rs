use serde::{Deserialize, Serialize};

use kiln_store::ChangeOp;
use kiln_types::EntityId;

/// One incoming mutation for a single record kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "kebab-case")]
pub enum RemoteMutation<T> {
    /// Create the record, or replace it with this state.
    Upsert(T),
    /// Remove the record and apply its cascade rules.
    Delete(EntityId),
}

/// A committed local change, packaged for a peer.
///
/// Media upserts carry the photo bytes so the peer can import the blob
/// under the same name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedChange {
    /// Sequence number on the originating replica.
    pub seq: u64,
    pub op: ChangeOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<Vec<u8>>,
}
