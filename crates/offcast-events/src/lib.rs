#![forbid(unsafe_code)]

//! Observer events for offcast.
//!
//! Every publisher in the workspace follows the persist-then-notify rule:
//! an event is only put on the bus after the corresponding store write
//! succeeded, and events for one item are published from a single context,
//! so subscribers observe state changes in the order they were persisted.

use offcast_core::ItemState;
use tokio::sync::broadcast;

/// One observer notification.
#[derive(Clone, Debug)]
pub enum Event {
    /// The item's persisted lifecycle state changed.
    ItemStateChanged {
        item_id: String,
        state: ItemState,
        /// Human-readable cause for failure states.
        error: Option<String>,
    },
    /// Bytes landed on disk for the item.
    ItemProgress {
        item_id: String,
        downloaded: u64,
        estimated: u64,
    },
}

/// Broadcast bus for [`Event`]s.
///
/// `publish()` is a sync call, safe from async tasks and blocking threads
/// alike. With no subscribers events are silently dropped; slow subscribers
/// observe `RecvError::Lagged` instead of blocking publishers.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
