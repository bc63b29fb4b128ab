//! Item worker: owns the fetch pool and the item's terminal transitions.

use std::path::PathBuf;
use std::sync::Arc;

use offcast_core::{DownloadTask, ItemRecord, ItemState};
use offcast_events::EventBus;
use offcast_net::{HttpClient, RetryPolicy};
use offcast_store::TaskStore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::{classify, Escalation, WorkerResult},
    fetch::{TaskFetcher, TaskOutcome},
    progress::ProgressAggregator,
};

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Upper bound on parallel fetches within one item.
    pub max_concurrent_fetches: usize,
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 4,
            retry: RetryPolicy::default(),
        }
    }
}

/// Control handle for a spawned worker. Dropping the handle does not stop
/// the worker; `pause` and `cancel` do, each awaiting the driver's exit so
/// the caller observes a settled item when the call returns.
pub struct WorkerHandle {
    pause: CancellationToken,
    cancel: CancellationToken,
    join: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    /// Stop scheduling, collect resume tokens from in-flight fetches,
    /// persist them, and transition the item to paused.
    pub async fn pause(&self) {
        self.pause.cancel();
        self.join().await;
    }

    /// Abort in-flight fetches without persisting tokens. The item's task
    /// list and state are left for the caller to clean up.
    pub async fn cancel(&self) {
        self.cancel.cancel();
        self.join().await;
    }

    /// Wait for the driver to exit (after natural completion too).
    pub async fn join(&self) {
        if let Some(handle) = self.join.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Whether the driver has exited. Used by the facade to decide whether
    /// `start` on an existing registry entry is a stale handle or a no-op.
    pub fn is_finished(&self) -> bool {
        match self.join.try_lock() {
            Ok(guard) => guard.as_ref().map_or(true, JoinHandle::is_finished),
            Err(_) => false,
        }
    }
}

/// Spawns the per-item download driver.
pub struct ItemWorker;

impl ItemWorker {
    pub fn spawn(
        item: &ItemRecord,
        item_root: PathBuf,
        store: Arc<dyn TaskStore>,
        client: HttpClient,
        bus: EventBus,
        config: WorkerConfig,
    ) -> WorkerHandle {
        let pause = CancellationToken::new();
        let cancel = CancellationToken::new();

        let driver = Driver {
            item_id: item.id.clone(),
            store: store.clone(),
            aggregator: ProgressAggregator::new(item, store, bus),
            fetcher: Arc::new(TaskFetcher {
                client,
                retry: config.retry,
                item_root,
            }),
            pause: pause.clone(),
            cancel: cancel.clone(),
            max_concurrent: config.max_concurrent_fetches.max(1),
        };

        let handle = tokio::spawn(driver.run());

        WorkerHandle {
            pause,
            cancel,
            join: tokio::sync::Mutex::new(Some(handle)),
        }
    }
}

struct Driver {
    item_id: String,
    store: Arc<dyn TaskStore>,
    aggregator: ProgressAggregator,
    fetcher: Arc<TaskFetcher>,
    pause: CancellationToken,
    cancel: CancellationToken,
    max_concurrent: usize,
}

impl Driver {
    async fn run(self) {
        let tasks = match self.store.tasks_for_item(&self.item_id).await {
            Ok(tasks) => tasks,
            Err(error) => {
                self.aggregator.escalate_db_failure(error.to_string()).await;
                return;
            }
        };
        debug!(item_id = %self.item_id, tasks = tasks.len(), "worker started");

        // Escalation aborts in-flight fetches through a child token so an
        // explicit cancel stays distinguishable from an internal stop.
        let internal_cancel = self.cancel.child_token();
        let mut queue = tasks.into_iter();
        let mut in_flight: JoinSet<(DownloadTask, WorkerResult<TaskOutcome>)> = JoinSet::new();
        let mut escalation: Option<(Escalation, String)> = None;

        loop {
            let stop = self.pause.is_cancelled()
                || self.cancel.is_cancelled()
                || escalation.is_some();

            // Dispatch in planner order; completions may land out of order.
            while !stop && in_flight.len() < self.max_concurrent {
                let Some(task) = queue.next() else { break };
                let fetcher = Arc::clone(&self.fetcher);
                let pause = self.pause.clone();
                let cancel = internal_cancel.clone();
                in_flight.spawn(async move {
                    let result = fetcher.run(&task, &pause, &cancel).await;
                    (task, result)
                });
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };

            match joined {
                Ok((task, Ok(TaskOutcome::Completed { bytes }))) => {
                    // Persist the deletion before reporting progress, so a
                    // crash after notification never strands a stale task.
                    if let Err(error) = self.store.delete_task(&self.item_id, &task.url).await {
                        escalation
                            .get_or_insert((Escalation::DbFailure, error.to_string()));
                        internal_cancel.cancel();
                        continue;
                    }
                    if let Err(error) = self.aggregator.add_bytes(bytes).await {
                        escalation
                            .get_or_insert((Escalation::DbFailure, error.to_string()));
                        internal_cancel.cancel();
                    }
                }
                Ok((mut task, Ok(TaskOutcome::Paused { token }))) => {
                    if let Some(token) = token {
                        task.resume = Some(token);
                        if let Err(error) = self.store.update_task(&task).await {
                            escalation
                                .get_or_insert((Escalation::DbFailure, error.to_string()));
                            internal_cancel.cancel();
                        }
                    }
                }
                Ok((_, Ok(TaskOutcome::Cancelled))) => {}
                Ok((task, Err(error))) => {
                    warn!(
                        item_id = %self.item_id,
                        url = %task.url,
                        error = %error,
                        "task escalated"
                    );
                    escalation.get_or_insert((classify(&error), error.to_string()));
                    internal_cancel.cancel();
                }
                Err(join_error) => {
                    escalation.get_or_insert((
                        Escalation::Failed,
                        format!("fetch task panicked: {join_error}"),
                    ));
                    internal_cancel.cancel();
                }
            }
        }

        self.finish(escalation).await;
    }

    async fn finish(&self, escalation: Option<(Escalation, String)>) {
        // Explicit cancel: the caller tears the item down and owns all
        // further persistence.
        if self.cancel.is_cancelled() {
            debug!(item_id = %self.item_id, "worker cancelled");
            return;
        }

        if let Some((kind, message)) = escalation {
            let state = match kind {
                Escalation::Interrupted => ItemState::Interrupted,
                Escalation::Failed => ItemState::Failed,
                Escalation::DbFailure => {
                    self.aggregator.escalate_db_failure(message).await;
                    return;
                }
            };
            if let Err(error) = self.aggregator.transition(state, Some(message)).await {
                self.aggregator.escalate_db_failure(error.to_string()).await;
            }
            return;
        }

        if self.pause.is_cancelled() {
            if let Err(error) = self.aggregator.transition(ItemState::Paused, None).await {
                self.aggregator.escalate_db_failure(error.to_string()).await;
            }
            return;
        }

        // Natural drain: completed only if the persisted task list is empty.
        match self.store.tasks_for_item(&self.item_id).await {
            Ok(remaining) if remaining.is_empty() => {
                if let Err(error) = self.aggregator.transition(ItemState::Completed, None).await {
                    self.aggregator.escalate_db_failure(error.to_string()).await;
                }
            }
            Ok(remaining) => {
                warn!(
                    item_id = %self.item_id,
                    remaining = remaining.len(),
                    "drained with tasks outstanding"
                );
                let _ = self
                    .aggregator
                    .transition(
                        ItemState::Interrupted,
                        Some("tasks outstanding after drain".into()),
                    )
                    .await;
            }
            Err(error) => self.aggregator.escalate_db_failure(error.to_string()).await,
        }
    }
}
