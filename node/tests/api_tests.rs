use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt; // for oneshot

use eventagg::aggregator::{Aggregator, Collector, Registry};
use eventagg::mq::Queue;
use eventagg::persistence::file::{index_file_path, shard_path, Config, FilePersistence};
use eventagg::Event;

use eventagg_node::config::NodeConfig;
use eventagg_node::server::{build_router, AppState};

const SHARD_COUNT: usize = 4;

struct TestNode {
    app: Router,
    persistence: Arc<FilePersistence>,
    shutdown: CancellationToken,
}

async fn start_node(data_dir: &Path) -> TestNode {
    let persistence = Arc::new(
        FilePersistence::new(Config {
            data_dir: data_dir.to_path_buf(),
            count: SHARD_COUNT,
        })
        .unwrap(),
    );

    let queue = Arc::new(Queue::new());
    queue.subscribe(persistence.clone()).unwrap();

    let registry = Registry::with_builtins().unwrap();
    let mut views: HashMap<String, Arc<dyn Aggregator>> = HashMap::new();
    for spec in NodeConfig::default_aggregators(data_dir) {
        let aggregator = registry.create(&spec.name, &spec.params).unwrap();
        queue.subscribe(aggregator.clone()).unwrap();
        views.insert(spec.alias, aggregator);
    }

    let shutdown = CancellationToken::new();
    {
        let queue = Arc::clone(&queue);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            queue.run(shutdown).await.unwrap();
        });
    }
    // the consumer loop is up once a no-op insert goes through
    for _ in 0..1000 {
        if queue.insert(None).await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let state = Arc::new(AppState {
        queue: Arc::clone(&queue),
        views,
    });
    TestNode {
        app: build_router(state),
        persistence,
        shutdown,
    }
}

async fn post_event(app: &Router, body: String) -> StatusCode {
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/event")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    app.clone().oneshot(req).await.unwrap().status()
}

async fn get_view(app: &Router, path: &str) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn wait_for_shard_lines(dir: &Path, total_lines: usize) {
    for _ in 0..1000 {
        let lines: usize = (0..SHARD_COUNT)
            .map(|idx| {
                std::fs::read_to_string(index_file_path(&shard_path(dir, idx)))
                    .map(|index| index.lines().count())
                    .unwrap_or(0)
            })
            .sum();
        if lines >= total_lines {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("shards never reached {total_lines} index lines");
}

#[tokio::test]
async fn test_health() {
    let dir = tempdir().unwrap();
    let node = start_node(dir.path()).await;

    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = node.app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024)
        .await
        .unwrap();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn test_ingest_and_realtime_view() {
    let dir = tempdir().unwrap();
    let node = start_node(dir.path()).await;

    for i in 0..3 {
        let ev = Event::new("click", 1700000000 + i);
        let status = post_event(&node.app, serde_json::to_string(&ev).unwrap()).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }
    for i in 0..2 {
        let ev = Event::new("page_view", 1700000010 + i);
        let status = post_event(&node.app, serde_json::to_string(&ev).unwrap()).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    // dispatch is asynchronous; poll the view until the counts land
    let mut clicks = serde_json::Value::Null;
    for _ in 0..1000 {
        let (status, body) =
            get_view(&node.app, "/api/v1/aggregator/realtime_count?event_type=click").await;
        assert_eq!(status, StatusCode::OK);
        if body == serde_json::json!(3) {
            clicks = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(clicks, serde_json::json!(3));

    let (status, body) = get_view(&node.app, "/api/v1/aggregator/realtime_count").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"click": 3, "page_view": 2}));
}

#[tokio::test]
async fn test_null_event_is_accepted_and_dispatches_nothing() {
    let dir = tempdir().unwrap();
    let node = start_node(dir.path()).await;

    let status = post_event(&node.app, "null".to_string()).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = get_view(&node.app, "/api/v1/aggregator/realtime_count").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({}));
}

#[tokio::test]
async fn test_range_count_replays_persisted_events() {
    let dir = tempdir().unwrap();
    let node = start_node(dir.path()).await;

    // 1700000000 == 2023-11-14T22:13:20 UTC
    for i in 0..5 {
        let ev = Event::new("click", 1700000000 + i);
        let status = post_event(&node.app, serde_json::to_string(&ev).unwrap()).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    // persistence is subscribed ahead of the live rollup, so once the
    // rollup has seen every event the write path has too
    for _ in 0..1000 {
        let (_, body) =
            get_view(&node.app, "/api/v1/aggregator/realtime_count?event_type=click").await;
        if body == serde_json::json!(5) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // flush the write path before replaying from disk
    node.shutdown.cancel();
    node.persistence.close().await.unwrap();
    wait_for_shard_lines(dir.path(), 5).await;

    let (status, body) = get_view(
        &node.app,
        "/api/v1/aggregator/range_count?after=2023-11-14T22:13:19&before=2023-11-14T22:13:30",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"click": 5}));
}

#[tokio::test]
async fn test_bad_time_bound_is_rejected() {
    let dir = tempdir().unwrap();
    let node = start_node(dir.path()).await;

    let (status, body) =
        get_view(&node.app, "/api/v1/aggregator/range_count?after=yesterday").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("after"));
}

#[tokio::test]
async fn test_unknown_view_alias_is_rejected() {
    let dir = tempdir().unwrap();
    let node = start_node(dir.path()).await;

    let (status, body) = get_view(&node.app, "/api/v1/aggregator/nope").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("nope"));
}
