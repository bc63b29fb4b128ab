use std::path::PathBuf;

use async_trait::async_trait;
use offcast_core::{item_dir_name, DownloadTask, ItemRecord, ItemState};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::{
    atomic,
    error::StoreResult,
    TaskStore,
};

/// On-disk JSON schemas are an implementation detail of this crate.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct ItemsFile {
    version: u32,
    items: Vec<ItemRecord>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct TasksFile {
    version: u32,
    tasks: Vec<DownloadTask>,
}

/// File-backed [`TaskStore`].
///
/// Layout under the state directory:
///
/// ```text
/// <state>/items.json            all item records
/// <state>/tasks/<safe(id)>.json task list of one item
/// ```
pub struct FsTaskStore {
    state_dir: PathBuf,
    /// Serializes read-modify-write cycles across all files.
    write_guard: Mutex<()>,
}

impl FsTaskStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            write_guard: Mutex::new(()),
        }
    }

    fn items_path(&self) -> PathBuf {
        self.state_dir.join("items.json")
    }

    fn tasks_path(&self, item_id: &str) -> PathBuf {
        self.state_dir
            .join("tasks")
            .join(format!("{}.json", item_dir_name(item_id)))
    }

    async fn load_items(&self) -> StoreResult<ItemsFile> {
        let bytes = atomic::read_all(&self.items_path()).await?;
        if bytes.is_empty() {
            return Ok(ItemsFile::default());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn store_items(&self, file: &ItemsFile) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(file)?;
        atomic::write_all(&self.items_path(), &bytes).await
    }

    async fn load_tasks(&self, item_id: &str) -> StoreResult<TasksFile> {
        let bytes = atomic::read_all(&self.tasks_path(item_id)).await?;
        if bytes.is_empty() {
            return Ok(TasksFile::default());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn store_tasks(&self, item_id: &str, file: &TasksFile) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(file)?;
        atomic::write_all(&self.tasks_path(item_id), &bytes).await
    }
}

#[async_trait]
impl TaskStore for FsTaskStore {
    async fn upsert_item(&self, item: ItemRecord) -> StoreResult<()> {
        let _guard = self.write_guard.lock().await;
        let mut file = self.load_items().await?;
        file.version = 1;
        match file.items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => *existing = item,
            None => file.items.push(item),
        }
        self.store_items(&file).await
    }

    async fn item(&self, item_id: &str) -> StoreResult<Option<ItemRecord>> {
        let file = self.load_items().await?;
        Ok(file.items.into_iter().find(|i| i.id == item_id))
    }

    async fn items_in_state(&self, state: ItemState) -> StoreResult<Vec<ItemRecord>> {
        let file = self.load_items().await?;
        Ok(file
            .items
            .into_iter()
            .filter(|i| i.state == state)
            .collect())
    }

    async fn delete_item(&self, item_id: &str) -> StoreResult<()> {
        let _guard = self.write_guard.lock().await;
        let mut file = self.load_items().await?;
        file.items.retain(|i| i.id != item_id);
        self.store_items(&file).await
    }

    async fn replace_tasks(&self, item_id: &str, tasks: Vec<DownloadTask>) -> StoreResult<()> {
        let _guard = self.write_guard.lock().await;
        debug!(item_id, count = tasks.len(), "replacing task list");
        self.store_tasks(item_id, &TasksFile { version: 1, tasks })
            .await
    }

    async fn tasks_for_item(&self, item_id: &str) -> StoreResult<Vec<DownloadTask>> {
        let mut file = self.load_tasks(item_id).await?;
        file.tasks.sort_by_key(|t| t.order);
        Ok(file.tasks)
    }

    async fn update_task(&self, task: &DownloadTask) -> StoreResult<()> {
        let _guard = self.write_guard.lock().await;
        let mut file = self.load_tasks(&task.item_id).await?;
        if let Some(existing) = file.tasks.iter_mut().find(|t| t.url == task.url) {
            *existing = task.clone();
        }
        self.store_tasks(&task.item_id, &file).await
    }

    async fn delete_task(&self, item_id: &str, url: &Url) -> StoreResult<()> {
        let _guard = self.write_guard.lock().await;
        let mut file = self.load_tasks(item_id).await?;
        file.tasks.retain(|t| &t.url != url);
        self.store_tasks(item_id, &file).await
    }

    async fn delete_tasks(&self, item_id: &str) -> StoreResult<()> {
        let _guard = self.write_guard.lock().await;
        match tokio::fs::remove_file(self.tasks_path(item_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
