//! Replication boundary for Kiln.
//!
//! Kiln does not merge or resolve conflicts. It exposes two sides that an
//! external transport plugs into:
//!
//! - incoming: [`ReplicaApplier`], one apply entry point per record kind,
//!   idempotent under redelivery;
//! - outgoing: [`Outbox`], the stream of locally committed changes packaged
//!   as [`ReplicatedChange`]s, forwarded over a [`ReplicationChannel`].

pub mod applier;
pub mod channel;
pub mod error;
pub mod outbox;
pub mod remote;

pub use applier::{Applied, ReplicaApplier};
pub use channel::ReplicationChannel;
pub use error::{SyncError, SyncResult};
pub use outbox::Outbox;
pub use remote::{RemoteMutation, ReplicatedChange};
