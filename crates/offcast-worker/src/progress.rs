//! Progress accounting and item state transitions.
//!
//! All state leaves the worker through this type, which enforces the two
//! rules the observer contract depends on: the store write happens before
//! the event is published, and `downloaded_size` never decreases.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use offcast_core::{ItemRecord, ItemState};
use offcast_events::{Event, EventBus};
use offcast_store::{StoreResult, TaskStore};
use tracing::{debug, warn};

pub struct ProgressAggregator {
    item_id: String,
    store: Arc<dyn TaskStore>,
    bus: EventBus,
    downloaded: AtomicU64,
    estimated: u64,
}

impl ProgressAggregator {
    pub fn new(item: &ItemRecord, store: Arc<dyn TaskStore>, bus: EventBus) -> Self {
        Self {
            item_id: item.id.clone(),
            store,
            bus,
            downloaded: AtomicU64::new(item.downloaded_size),
            estimated: item.estimated_size,
        }
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Acquire)
    }

    /// Record newly transferred bytes: persist the counter on the item
    /// record, then notify. The item's lifecycle state is left untouched,
    /// so progress arriving after a pause cannot flip the item back to
    /// in-progress.
    pub async fn add_bytes(&self, bytes: u64) -> StoreResult<()> {
        let downloaded = self.downloaded.fetch_add(bytes, Ordering::AcqRel) + bytes;

        if let Some(mut item) = self.store.item(&self.item_id).await? {
            item.downloaded_size = item.downloaded_size.max(downloaded);
            self.store.upsert_item(item).await?;
        }

        self.bus.publish(Event::ItemProgress {
            item_id: self.item_id.clone(),
            downloaded,
            estimated: self.estimated,
        });
        Ok(())
    }

    /// Persist a state transition, then notify. Illegal transitions are
    /// dropped with a warning instead of corrupting the persisted state.
    pub async fn transition(&self, to: ItemState, error: Option<String>) -> StoreResult<()> {
        let Some(mut item) = self.store.item(&self.item_id).await? else {
            warn!(item_id = %self.item_id, ?to, "transition for unknown item");
            return Ok(());
        };

        if !item.state.can_transition(to) {
            warn!(
                item_id = %self.item_id,
                from = %item.state,
                to = %to,
                "dropping illegal state transition"
            );
            return Ok(());
        }

        debug!(item_id = %self.item_id, from = %item.state, to = %to, "item state change");
        item.state = to;
        item.downloaded_size = item.downloaded_size.max(self.downloaded());
        self.store.upsert_item(item).await?;

        self.bus.publish(Event::ItemStateChanged {
            item_id: self.item_id.clone(),
            state: to,
            error,
        });
        Ok(())
    }

    /// Best-effort escalation to `DbFailure`: the store itself may be the
    /// failing component, so the notification goes out even when the write
    /// cannot land.
    pub async fn escalate_db_failure(&self, error: String) {
        if let Err(e) = self.transition(ItemState::DbFailure, Some(error.clone())).await {
            warn!(item_id = %self.item_id, %e, "could not persist db-failure state");
            self.bus.publish(Event::ItemStateChanged {
                item_id: self.item_id.clone(),
                state: ItemState::DbFailure,
                error: Some(error),
            });
        }
    }
}
