#![forbid(unsafe_code)]

//! Durable item/task persistence for offcast.
//!
//! The worker and the facade talk to the [`TaskStore`] trait; the concrete
//! [`FsTaskStore`] keeps whole-object JSON files under a state directory,
//! written with the temp-file + atomic-rename contract so a crash never
//! leaves a half-written record. One in-process lock serializes writers,
//! which makes update-then-read consistent within a process; durability
//! across restarts comes from the files themselves.

mod atomic;
mod error;
mod fs_store;

use async_trait::async_trait;
use offcast_core::{DownloadTask, ItemRecord, ItemState};
use url::Url;

pub use error::{StoreError, StoreResult};
pub use fs_store::FsTaskStore;

/// Persistence seam consumed by the worker and the facade.
///
/// Task identity is `(item id, source URL)`; `replace_tasks` overwrites any
/// pre-existing task list for the item.
#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    async fn upsert_item(&self, item: ItemRecord) -> StoreResult<()>;
    async fn item(&self, item_id: &str) -> StoreResult<Option<ItemRecord>>;
    async fn items_in_state(&self, state: ItemState) -> StoreResult<Vec<ItemRecord>>;
    async fn delete_item(&self, item_id: &str) -> StoreResult<()>;

    async fn replace_tasks(&self, item_id: &str, tasks: Vec<DownloadTask>) -> StoreResult<()>;
    /// Tasks for an item, ascending by planner order.
    async fn tasks_for_item(&self, item_id: &str) -> StoreResult<Vec<DownloadTask>>;
    /// Persist a changed task (matched by source URL), e.g. a resume token.
    async fn update_task(&self, task: &DownloadTask) -> StoreResult<()>;
    async fn delete_task(&self, item_id: &str, url: &Url) -> StoreResult<()>;
    async fn delete_tasks(&self, item_id: &str) -> StoreResult<()>;
}
