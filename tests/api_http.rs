// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /discover (default mode, bad mode)
// - GET /history, /stats, /budget, /insights after a run
// - POST /admin/reload-sources

use std::sync::Arc;

use axum::{
    body::{self, Body},
    Router,
};
use http::{Request, StatusCode};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use community_event_discovery::acquire::MockContentSource;
use community_event_discovery::api::{self, AppState};
use community_event_discovery::budget::{BudgetLedger, MemoryLedgerStore, SharedLedger};
use community_event_discovery::dedup::MemoryDedupCache;
use community_event_discovery::{DiscoveryEngine, EngineConfig};

const BODY_LIMIT: usize = 1024 * 1024;

fn test_router() -> Router {
    let cfg = EngineConfig::default();
    let ledger = SharedLedger::new(BudgetLedger::open(MemoryLedgerStore::default(), cfg.daily_budget));
    let engine = DiscoveryEngine::with_parts(
        cfg,
        Arc::new(MockContentSource::new()),
        ledger,
        Box::new(MemoryDedupCache::new()),
    );
    api::router(AppState::new(engine))
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

async fn call_json(app: &Router, method: &str, uri: &str) -> (StatusCode, Json) {
    let (status, bytes) = call(app, method, uri).await;
    let v = serde_json::from_slice(&bytes).expect("json body");
    (status, v)
}

#[tokio::test]
async fn health_returns_ok() {
    let app = test_router();
    let (status, body) = call(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap().trim(), "OK");
}

#[tokio::test]
async fn discover_runs_and_views_reflect_it() {
    let app = test_router();

    let (status, v) = call_json(&app, "POST", "/discover").await;
    assert_eq!(status, StatusCode::OK);
    let candidates = v["candidates"].as_array().expect("candidates array");
    assert!(!candidates.is_empty());
    assert!(candidates[0].get("qualityScore").is_some(), "camelCase contract");
    assert_eq!(v["metrics"]["mode"], "quick");
    assert!(v["degraded"].is_null());

    let (_, history) = call_json(&app, "GET", "/history").await;
    assert_eq!(history.as_array().map(|a| a.len()), Some(1));

    let (_, stats) = call_json(&app, "GET", "/stats").await;
    assert_eq!(stats["totalRuns"], 1);
    assert!(stats["knownSources"].as_u64().unwrap() > 0);

    let (_, budget) = call_json(&app, "GET", "/budget").await;
    assert_eq!(budget["budget"], 100);
    assert_eq!(budget["used"], 0, "mock content is not metered");

    let (_, insights) = call_json(&app, "GET", "/insights").await;
    assert!(insights["eventsAnalyzed"].as_u64().unwrap() > 0);
    assert!(insights["trendingTopics"].is_array());
}

#[tokio::test]
async fn discover_rejects_unknown_mode() {
    let app = test_router();
    let (status, v) = call_json(&app, "POST", "/discover?mode=exhaustive").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(v["error"].as_str().unwrap().contains("exhaustive"));
}

#[tokio::test]
async fn deep_mode_is_accepted() {
    let app = test_router();
    let (status, v) = call_json(&app, "POST", "/discover?mode=deep").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["metrics"]["mode"], "deep");
}

#[tokio::test]
async fn reload_sources_reports_counts() {
    let app = test_router();
    let (status, v) = call_json(&app, "POST", "/admin/reload-sources").await;
    assert_eq!(status, StatusCode::OK);
    assert!(v["sources"].as_u64().unwrap() > 0);
    assert!(v["patterns"].as_u64().unwrap() > 0);
}
