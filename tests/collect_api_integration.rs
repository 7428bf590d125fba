//! HTTP-level tests for the collector endpoints

use axum::{
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{Request, StatusCode},
    Router,
};
use beacon::api::{self, AppState};
use beacon::config::{NetworkConfig, TrustedProxyMode};
use beacon::ingest::{IngestionQueue, Ingestor};
use beacon::privacy::PrivacyGuard;
use beacon::storage::{SqliteStorage, Storage};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const BROWSER_UA: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";

struct TestApp {
    router: Router,
    queue: Arc<IngestionQueue>,
    privacy: Arc<PrivacyGuard>,
}

async fn create_test_app(capacity: usize, network: NetworkConfig) -> TestApp {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    let storage: Arc<dyn Storage> = Arc::new(storage);

    let queue = Arc::new(IngestionQueue::new(capacity));
    let privacy = Arc::new(PrivacyGuard::new(
        None,
        "api-secret".to_string(),
        false,
        Duration::from_secs(300),
    ));

    let state = Arc::new(AppState {
        ingestor: Arc::new(Ingestor::new(Arc::clone(&queue), Arc::clone(&privacy))),
        storage,
        network,
        privacy_header: "x-beacon-privacy".to_string(),
    });

    let router = api::create_router(state)
        .layer(MockConnectInfo(SocketAddr::from(([198, 51, 100, 7], 40000))));

    TestApp {
        router,
        queue,
        privacy,
    }
}

fn beacon_body(ua: &str, url: &str) -> Value {
    json!({
        "t": "pageview",
        "sid": "s-1",
        "ts": 1_700_000_000_000i64,
        "url": url,
        "ref": "",
        "ua": ua,
        "fp": { "sr": "1440x900" },
        "d": { "title": "Pricing" }
    })
}

async fn post_collect(router: &Router, body: String, headers: &[(&str, &str)]) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/collect")
        .header("content-type", "text/plain;charset=UTF-8");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let response = router
        .clone()
        .oneshot(builder.body(Body::from(body)).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn next_ip(queue: &IngestionQueue) -> String {
    queue.close();
    let receiver = queue.receiver();
    let mut rx = receiver.lock().await;
    rx.recv().await.unwrap().ip
}

#[tokio::test]
async fn test_collect_accepts_browser_beacon() {
    let app = create_test_app(10, NetworkConfig::default()).await;

    let (status, body) = post_collect(
        &app.router,
        beacon_body(BROWSER_UA, "https://example.com/pricing").to_string(),
        &[],
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
    assert_eq!(app.queue.stats().accepted, 1);
    assert_eq!(next_ip(&app.queue).await, "198.51.100.7");
}

#[tokio::test]
async fn test_collect_ignores_curl() {
    let app = create_test_app(10, NetworkConfig::default()).await;

    let (status, body) = post_collect(
        &app.router,
        beacon_body("curl/7.68.0", "https://example.com").to_string(),
        &[],
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ignored", "reason": "bot" }));
    assert_eq!(app.queue.stats().accepted, 0);
}

#[tokio::test]
async fn test_collect_rejects_invalid_url() {
    let app = create_test_app(10, NetworkConfig::default()).await;

    let (status, body) = post_collect(
        &app.router,
        beacon_body(BROWSER_UA, "javascript:alert(1)").to_string(),
        &[],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert_eq!(app.queue.stats().accepted, 0);
}

#[tokio::test]
async fn test_collect_rejects_malformed_json() {
    let app = create_test_app(10, NetworkConfig::default()).await;

    let (status, body) = post_collect(&app.router, "{not json".to_string(), &[]).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid payload");
}

#[tokio::test]
async fn test_collect_reports_dropped_when_full() {
    let app = create_test_app(1, NetworkConfig::default()).await;
    let payload = beacon_body(BROWSER_UA, "https://example.com").to_string();

    let (_, first) = post_collect(&app.router, payload.clone(), &[]).await;
    let (status, second) = post_collect(&app.router, payload, &[]).await;

    assert_eq!(first["status"], "ok");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["status"], "dropped");
    assert_eq!(app.queue.stats().dropped, 1);
}

#[tokio::test]
async fn test_privacy_header_forces_hashing() {
    let app = create_test_app(10, NetworkConfig::default()).await;
    let expected = app.privacy.hash_ip("198.51.100.7");

    let (status, _) = post_collect(
        &app.router,
        beacon_body(BROWSER_UA, "https://example.com").to_string(),
        &[("x-beacon-privacy", "true")],
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(next_ip(&app.queue).await, expected);
}

#[tokio::test]
async fn test_cloudflare_client_ip() {
    let network = NetworkConfig {
        trusted_proxy_mode: TrustedProxyMode::Cloudflare,
        ..Default::default()
    };
    let app = create_test_app(10, network).await;

    post_collect(
        &app.router,
        beacon_body(BROWSER_UA, "https://example.com").to_string(),
        &[("cf-connecting-ip", "12.34.56.78")],
    )
    .await;

    assert_eq!(next_ip(&app.queue).await, "12.34.56.78");
}

#[tokio::test]
async fn test_health_and_stats() {
    let app = create_test_app(10, NetworkConfig::default()).await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    post_collect(
        &app.router,
        beacon_body(BROWSER_UA, "https://example.com").to_string(),
        &[],
    )
    .await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/stats/ingest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let stats: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(stats["queue"]["accepted"], 1);
    assert_eq!(stats["queue"]["capacity"], 10);
    assert_eq!(stats["privacy_mode"], false);
    assert_eq!(stats["tables"]["events"], 0);
}
