//! Cache change notifications.
//!
//! Consumers subscribe to learn when data under a key changed. Events are
//! published only after the store write has committed, so a subscriber that
//! reads back immediately sees the new value.

use tokio::sync::broadcast;

/// Buffer for the broadcast channel; slow subscribers that fall further
/// behind than this see a `Lagged` error and resubscribe.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// A key was written with fresh data.
    Updated { key: String },
    /// A single key was removed.
    Removed { key: String },
    /// All keys under a prefix were invalidated.
    Invalidated { prefix: String, removed: usize },
    /// The logout purge swept the store.
    Purged { removed: usize },
}

pub(crate) fn channel() -> broadcast::Sender<CacheEvent> {
    broadcast::channel(EVENT_CHANNEL_CAPACITY).0
}
