use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use offcast_core::{DownloadTask, ItemRecord, ItemState, ResumeToken, TaskType};
use offcast_events::{Event, EventBus};
use offcast_net::{HttpClient, NetOptions, RetryPolicy};
use offcast_store::{FsTaskStore, TaskStore};
use offcast_worker::{ItemWorker, WorkerConfig};
use url::Url;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn client() -> HttpClient {
    HttpClient::new(NetOptions {
        request_timeout: Duration::from_secs(30),
        ..NetOptions::default()
    })
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5))
}

fn task(addr: SocketAddr, item_id: &str, name: &str, order: u32) -> DownloadTask {
    let url = Url::parse(&format!("http://{addr}/{name}")).unwrap();
    DownloadTask {
        item_id: item_id.into(),
        url,
        task_type: TaskType::Video,
        rel_dest: format!("video/{name}"),
        order,
        resume: None,
    }
}

struct Fixture {
    store: Arc<FsTaskStore>,
    bus: EventBus,
    item: ItemRecord,
    item_root: std::path::PathBuf,
    _dir: tempfile::TempDir,
}

async fn fixture(estimated: u64) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let item_root = dir.path().join("items/a");
    tokio::fs::create_dir_all(item_root.join("video"))
        .await
        .unwrap();

    let store = Arc::new(FsTaskStore::new(dir.path().join("state")));
    let mut item = ItemRecord::new(
        "a",
        Url::parse("https://cdn.example.com/master.m3u8").unwrap(),
    );
    item.state = ItemState::InProgress;
    item.estimated_size = estimated;
    store.upsert_item(item.clone()).await.unwrap();

    Fixture {
        store,
        bus: EventBus::new(64),
        item,
        item_root,
        _dir: dir,
    }
}

fn spawn_worker(fx: &Fixture, retry: RetryPolicy) -> offcast_worker::WorkerHandle {
    ItemWorker::spawn(
        &fx.item,
        fx.item_root.clone(),
        fx.store.clone() as Arc<dyn TaskStore>,
        client(),
        fx.bus.clone(),
        WorkerConfig {
            max_concurrent_fetches: 4,
            retry,
        },
    )
}

#[tokio::test]
async fn downloads_all_tasks_and_completes() {
    let body = payload(1000);
    let app = Router::new().route(
        "/{name}",
        get({
            let body = body.clone();
            move || {
                let body = body.clone();
                async move { body }
            }
        }),
    );
    let addr = serve(app).await;

    let fx = fixture(3000).await;
    let mut rx = fx.bus.subscribe();
    fx.store
        .replace_tasks(
            "a",
            vec![
                task(addr, "a", "seg0.ts", 0),
                task(addr, "a", "seg1.ts", 1),
                task(addr, "a", "seg2.ts", 2),
            ],
        )
        .await
        .unwrap();

    let handle = spawn_worker(&fx, fast_retry());
    handle.join().await;

    let item = fx.store.item("a").await.unwrap().unwrap();
    assert_eq!(item.state, ItemState::Completed);
    assert_eq!(item.downloaded_size, 3000);
    assert!(fx.store.tasks_for_item("a").await.unwrap().is_empty());

    for name in ["seg0.ts", "seg1.ts", "seg2.ts"] {
        let on_disk = tokio::fs::read(fx.item_root.join("video").join(name)).await;
        assert!(on_disk.is_ok(), "{name} missing");
        assert_eq!(on_disk.unwrap(), body);
    }

    // Three progress events, then the completion state change, in order.
    let mut progressed = 0;
    loop {
        match rx.recv().await.unwrap() {
            Event::ItemProgress { .. } => progressed += 1,
            Event::ItemStateChanged { state, .. } => {
                assert_eq!(state, ItemState::Completed);
                break;
            }
        }
    }
    assert_eq!(progressed, 3);
}

#[tokio::test]
async fn terminal_http_answer_fails_item_and_keeps_tasks() {
    let app = Router::new().route("/{name}", get(|| async { StatusCode::NOT_FOUND }));
    let addr = serve(app).await;

    let fx = fixture(1000).await;
    fx.store
        .replace_tasks("a", vec![task(addr, "a", "seg0.ts", 0)])
        .await
        .unwrap();

    let handle = spawn_worker(&fx, fast_retry());
    handle.join().await;

    let item = fx.store.item("a").await.unwrap().unwrap();
    assert_eq!(item.state, ItemState::Failed);
    // Persisted tasks stay intact for the caller to remove.
    assert_eq!(fx.store.tasks_for_item("a").await.unwrap().len(), 1);
}

#[tokio::test]
async fn server_errors_interrupt_after_retry_budget() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new().route(
        "/{name}",
        get({
            let hits = hits.clone();
            move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        }),
    );
    let addr = serve(app).await;

    let fx = fixture(1000).await;
    fx.store
        .replace_tasks("a", vec![task(addr, "a", "seg0.ts", 0)])
        .await
        .unwrap();

    let handle = spawn_worker(&fx, fast_retry());
    handle.join().await;

    let item = fx.store.item("a").await.unwrap().unwrap();
    assert_eq!(item.state, ItemState::Interrupted);
    // Initial try plus two retries.
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(fx.store.tasks_for_item("a").await.unwrap().len(), 1);
}

#[tokio::test]
async fn pause_preserves_outstanding_task_set() {
    // Server that never answers within the test window.
    let app = Router::new().route(
        "/{name}",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            StatusCode::OK
        }),
    );
    let addr = serve(app).await;

    let fx = fixture(2000).await;
    fx.store
        .replace_tasks(
            "a",
            vec![task(addr, "a", "seg0.ts", 0), task(addr, "a", "seg1.ts", 1)],
        )
        .await
        .unwrap();
    let before: Vec<String> = fx
        .store
        .tasks_for_item("a")
        .await
        .unwrap()
        .iter()
        .map(|t| t.url.to_string())
        .collect();

    let handle = spawn_worker(&fx, fast_retry());
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.pause().await;

    let item = fx.store.item("a").await.unwrap().unwrap();
    assert_eq!(item.state, ItemState::Paused);

    // Pause followed by start reproduces the same outstanding task set.
    let after: Vec<String> = fx
        .store
        .tasks_for_item("a")
        .await
        .unwrap()
        .iter()
        .map(|t| t.url.to_string())
        .collect();
    assert_eq!(before, after);
}

#[tokio::test]
async fn completed_tasks_are_not_refetched_after_restart() {
    let seg0_hits = Arc::new(AtomicUsize::new(0));
    let body = payload(500);
    let app = Router::new()
        .route(
            "/seg0.ts",
            get({
                let hits = seg0_hits.clone();
                move || {
                    let hits = hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        StatusCode::OK
                    }
                }
            }),
        )
        .route(
            "/seg1.ts",
            get({
                let body = body.clone();
                move || {
                    let body = body.clone();
                    async move { body }
                }
            }),
        );
    let addr = serve(app).await;

    let fx = fixture(1000).await;
    // Simulate a restart after seg0 completed: its task is already deleted.
    fx.store
        .replace_tasks("a", vec![task(addr, "a", "seg1.ts", 1)])
        .await
        .unwrap();

    let handle = spawn_worker(&fx, fast_retry());
    handle.join().await;

    assert_eq!(seg0_hits.load(Ordering::SeqCst), 0);
    let item = fx.store.item("a").await.unwrap().unwrap();
    assert_eq!(item.state, ItemState::Completed);
}

#[derive(Clone)]
struct RangeState {
    body: Vec<u8>,
    range_hits: Arc<AtomicUsize>,
}

async fn range_handler(State(state): State<RangeState>, headers: HeaderMap) -> Response {
    let range_start = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("bytes="))
        .and_then(|v| v.strip_suffix('-'))
        .and_then(|v| v.parse::<usize>().ok());

    match range_start {
        Some(start) if start < state.body.len() => {
            state.range_hits.fetch_add(1, Ordering::SeqCst);
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {start}-{}/{}", state.body.len() - 1, state.body.len()),
                )
                .body(Body::from(state.body[start..].to_vec()))
                .unwrap()
        }
        _ => Response::builder()
            .status(StatusCode::OK)
            .body(Body::from(state.body.clone()))
            .unwrap(),
    }
}

#[tokio::test]
async fn resume_token_continues_with_range_request() {
    let body = payload(1000);
    let range_hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/{name}", get(range_handler))
        .with_state(RangeState {
            body: body.clone(),
            range_hits: range_hits.clone(),
        });
    let addr = serve(app).await;

    let fx = fixture(1000).await;

    // A paused transfer left 400 bytes in the partial file and a token.
    let part = fx.item_root.join("video/seg0.ts.part");
    tokio::fs::write(&part, &body[..400]).await.unwrap();
    let mut t = task(addr, "a", "seg0.ts", 0);
    t.resume = Some(ResumeToken {
        offset: 400,
        etag: None,
    });
    fx.store.replace_tasks("a", vec![t]).await.unwrap();

    let handle = spawn_worker(&fx, fast_retry());
    handle.join().await;

    assert_eq!(range_hits.load(Ordering::SeqCst), 1);
    let on_disk = tokio::fs::read(fx.item_root.join("video/seg0.ts"))
        .await
        .unwrap();
    assert_eq!(on_disk, body);

    let item = fx.store.item("a").await.unwrap().unwrap();
    assert_eq!(item.state, ItemState::Completed);
    assert_eq!(item.downloaded_size, 1000);
}
