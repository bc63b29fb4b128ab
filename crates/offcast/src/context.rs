use std::collections::HashMap;
use std::sync::Arc;

use offcast_core::{encode_path_segment, item_dir_name, ItemRecord, ItemState};
use offcast_events::{Event, EventBus};
use offcast_hls::{DeviceCapabilities, Planner, SelectionOptions};
use offcast_net::HttpClient;
use offcast_store::{FsTaskStore, TaskStore};
use offcast_worker::{ItemWorker, WorkerHandle};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use crate::{
    config::OffcastConfig,
    error::{OffcastError, OffcastResult},
    layout::Layout,
    localize::MetadataLoader,
    server::PlaybackServer,
};

/// The download manager context.
///
/// One explicit handle per application, constructed at startup and passed
/// to whoever needs it; cloning shares the same store, event bus, worker
/// registry and playback server. There is no global instance.
#[derive(Clone)]
pub struct Offcast {
    inner: Arc<Inner>,
}

struct Inner {
    config: OffcastConfig,
    layout: Layout,
    store: Arc<FsTaskStore>,
    bus: EventBus,
    client: HttpClient,
    /// At most one live worker per item id.
    workers: Mutex<HashMap<String, Arc<WorkerHandle>>>,
    server: OnceCell<PlaybackServer>,
}

impl Offcast {
    /// Open (or create) a manager rooted at `config.root_dir`.
    pub async fn open(config: OffcastConfig) -> OffcastResult<Self> {
        let layout = Layout::new(&config.root_dir);
        tokio::fs::create_dir_all(layout.items_root()).await?;
        tokio::fs::create_dir_all(layout.state_root()).await?;

        let store = Arc::new(FsTaskStore::new(layout.state_root()));
        let client = HttpClient::new(config.net.clone());

        info!(root = %config.root_dir.display(), "offcast context opened");
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                layout,
                store,
                bus: EventBus::default(),
                client,
                workers: Mutex::new(HashMap::new()),
                server: OnceCell::new(),
            }),
        })
    }

    /// Subscribe to item state and progress events. Events are published
    /// only after the corresponding store write succeeded, in per-item
    /// persistence order.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.bus.subscribe()
    }

    pub fn layout(&self) -> &Layout {
        &self.inner.layout
    }

    /// Register a new item for the given master playlist URL.
    pub async fn add_item(&self, item_id: &str, source_url: Url) -> OffcastResult<()> {
        if let Some(existing) = self.inner.store.item(item_id).await? {
            return Err(OffcastError::InvalidState {
                operation: "add_item",
                state: existing.state,
            });
        }

        let item = ItemRecord::new(item_id, source_url);
        self.inner.store.upsert_item(item.clone()).await?;
        self.inner.bus.publish(Event::ItemStateChanged {
            item_id: item_id.to_owned(),
            state: ItemState::New,
            error: None,
        });
        Ok(())
    }

    pub async fn item(&self, item_id: &str) -> OffcastResult<ItemRecord> {
        self.inner
            .store
            .item(item_id)
            .await?
            .ok_or_else(|| OffcastError::ItemNotFound(item_id.to_owned()))
    }

    pub async fn items_in_state(&self, state: ItemState) -> OffcastResult<Vec<ItemRecord>> {
        Ok(self.inner.store.items_in_state(state).await?)
    }

    /// Load playlists, select renditions, plan tasks and write localized
    /// playlists. Network access is a blocking sequence of GETs, each under
    /// the configured per-request timeout.
    pub async fn load_metadata(
        &self,
        item_id: &str,
        options: &SelectionOptions,
        caps: &DeviceCapabilities,
    ) -> OffcastResult<()> {
        let mut item = self.item(item_id).await?;
        if item.state != ItemState::New {
            return Err(OffcastError::InvalidState {
                operation: "load_metadata",
                state: item.state,
            });
        }

        let loader = MetadataLoader {
            client: &self.inner.client,
            options,
            caps,
            planner: self.inner.config.planner(),
        };
        let localized = loader.load(item_id, &item.source_url).await?;

        let item_root = self.inner.layout.item_root(item_id);
        Planner::ensure_type_dirs(&item_root).await?;
        tokio::fs::write(
            self.inner.layout.master_path(item_id),
            &localized.master_text,
        )
        .await?;
        for (rel_path, content) in &localized.media_playlists {
            tokio::fs::write(item_root.join(rel_path), content).await?;
        }

        self.inner
            .store
            .replace_tasks(item_id, localized.plan.tasks)
            .await?;

        item.state = ItemState::MetadataLoaded;
        item.estimated_size = localized.plan.estimated_size;
        item.duration_seconds = localized.plan.total_duration;
        self.inner.store.upsert_item(item).await?;
        self.inner.bus.publish(Event::ItemStateChanged {
            item_id: item_id.to_owned(),
            state: ItemState::MetadataLoaded,
            error: None,
        });
        Ok(())
    }

    /// Start (or resume) downloading. A second start while a worker is
    /// live is a no-op.
    pub async fn start(&self, item_id: &str) -> OffcastResult<()> {
        let mut item = self.item(item_id).await?;

        {
            let workers = self.inner.workers.lock();
            if let Some(handle) = workers.get(item_id) {
                if !handle.is_finished() {
                    debug!(item_id, "start ignored, worker already live");
                    return Ok(());
                }
            }
        }

        // A stale in-progress record (e.g. after a crash) may be restarted;
        // anything else must be startable.
        if item.state != ItemState::InProgress && !item.state.is_startable() {
            return Err(OffcastError::InvalidState {
                operation: "start",
                state: item.state,
            });
        }

        if item.state != ItemState::InProgress {
            item.state = ItemState::InProgress;
            self.inner.store.upsert_item(item.clone()).await?;
            self.inner.bus.publish(Event::ItemStateChanged {
                item_id: item_id.to_owned(),
                state: ItemState::InProgress,
                error: None,
            });
        }

        let handle = ItemWorker::spawn(
            &item,
            self.inner.layout.item_root(item_id),
            self.inner.store.clone() as Arc<dyn TaskStore>,
            self.inner.client.clone(),
            self.inner.bus.clone(),
            self.inner.config.worker_config(),
        );
        self.inner
            .workers
            .lock()
            .insert(item_id.to_owned(), Arc::new(handle));
        Ok(())
    }

    /// Pause the item's worker: in-flight fetches surrender resume tokens,
    /// the tokens are persisted, and the item lands in `Paused`.
    pub async fn pause(&self, item_id: &str) -> OffcastResult<()> {
        let handle = self.inner.workers.lock().get(item_id).cloned();
        match handle {
            Some(handle) if !handle.is_finished() => {
                handle.pause().await;
                Ok(())
            }
            _ => {
                let item = self.item(item_id).await?;
                Err(OffcastError::InvalidState {
                    operation: "pause",
                    state: item.state,
                })
            }
        }
    }

    /// Tear down the worker, delete tasks and records, and remove the item
    /// directory.
    pub async fn remove_item(&self, item_id: &str) -> OffcastResult<()> {
        self.item(item_id).await?;

        let handle = self.inner.workers.lock().remove(item_id);
        if let Some(handle) = handle {
            handle.cancel().await;
        }

        self.inner.store.delete_tasks(item_id).await?;
        self.inner.store.delete_item(item_id).await?;

        match tokio::fs::remove_dir_all(self.inner.layout.item_root(item_id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.inner.bus.publish(Event::ItemStateChanged {
            item_id: item_id.to_owned(),
            state: ItemState::Removed,
            error: None,
        });
        info!(item_id, "item removed");
        Ok(())
    }

    /// Local playback URL for the item's rewritten master playlist. The
    /// loopback server is started on first use and its port held stable
    /// for the process lifetime.
    pub async fn playback_url(&self, item_id: &str) -> OffcastResult<Url> {
        self.item(item_id).await?;

        let items_root = self.inner.layout.items_root();
        let port = self.inner.config.server_port;
        let server = self
            .inner
            .server
            .get_or_try_init(|| PlaybackServer::start(items_root, port))
            .await?;

        let segment = encode_path_segment(&item_dir_name(item_id));
        let url = format!(
            "http://127.0.0.1:{}/{}/master.m3u8",
            server.port(),
            segment
        );
        Url::parse(&url)
            .map_err(|e| OffcastError::InvalidInternalState(format!("playback url: {e}")))
    }
}
