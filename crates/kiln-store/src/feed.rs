use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;

use kiln_types::EntityKind;

use crate::change::{Change, Origin};

/// Filter for subscribing to a subset of store changes.
#[derive(Clone, Debug, Default)]
pub struct ChangeFilter {
    /// If set, only changes to these record kinds are delivered.
    pub kinds: Option<Vec<EntityKind>>,
    /// If set, only changes with this origin are delivered.
    pub origin: Option<Origin>,
}

impl ChangeFilter {
    /// Only locally issued changes; what a replication outbox wants.
    pub fn local() -> Self {
        Self {
            origin: Some(Origin::Local),
            ..Default::default()
        }
    }

    /// Returns `true` if the given change matches this filter.
    pub fn matches(&self, change: &Change) -> bool {
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&change.op.kind()) {
                return false;
            }
        }
        if let Some(origin) = self.origin {
            if change.origin != origin {
                return false;
            }
        }
        true
    }
}

/// Configuration for the [`ChangeFeed`].
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Capacity of per-subscriber broadcast channels. Slow subscribers that
    /// fall further behind observe `RecvError::Lagged`.
    pub channel_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// A broadcast channel receiver for store changes.
pub type ChangeStream = broadcast::Receiver<Change>;

struct Subscriber {
    filter: ChangeFilter,
    sender: broadcast::Sender<Change>,
}

/// Fan-out router that delivers committed changes to matching subscribers.
///
/// Publishing never blocks: each subscriber has its own bounded channel.
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Subscriber>>,
    config: FeedConfig,
}

impl ChangeFeed {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            config,
        }
    }

    /// Register a new subscriber with the given filter.
    pub fn subscribe(&self, filter: ChangeFilter) -> ChangeStream {
        let (tx, rx) = broadcast::channel(self.config.channel_capacity);
        self.write().push(Subscriber { filter, sender: tx });
        rx
    }

    /// Route a change to all matching subscribers.
    /// Subscribers whose receivers are gone are pruned.
    pub fn publish(&self, change: &Change) {
        let mut subs = self.write();
        subs.retain(|sub| {
            if sub.filter.matches(change) {
                sub.sender.send(change.clone()).is_ok()
            } else {
                sub.sender.receiver_count() > 0
            }
        });
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.read().len()
    }

    // Every write leaves the list whole, so a poisoned lock is still safe
    // to use. Publishing must not fail after a commit has been swapped in.
    fn read(&self) -> RwLockReadGuard<'_, Vec<Subscriber>> {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Subscriber>> {
        self.subscribers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(FeedConfig::default())
    }
}
