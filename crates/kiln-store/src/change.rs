use serde::{Deserialize, Serialize};

use kiln_types::{EntityKind, EntityRef, Record};

/// Where a mutation came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Issued on this device.
    Local,
    /// Applied from the replication channel.
    Remote,
}

/// What happened to one record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ChangeOp {
    /// The record was created or its fields changed; carries the new state.
    Upserted(Record),
    /// The record was removed.
    Deleted(EntityRef),
}

impl ChangeOp {
    pub fn entity_ref(&self) -> EntityRef {
        match self {
            Self::Upserted(record) => record.entity_ref(),
            Self::Deleted(target) => *target,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.entity_ref().kind
    }
}

/// A committed mutation, published after the fact.
///
/// `seq` is strictly increasing per store instance. All changes from one
/// commit are published together, in order, before the next commit starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub seq: u64,
    pub origin: Origin,
    pub op: ChangeOp,
}
