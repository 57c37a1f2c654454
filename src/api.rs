// src/api.rs
//! HTTP surface for a host process. Runs are serialised behind one async
//! mutex; read-only views that do not need the engine skip the lock.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::budget::{BudgetUsage, SharedLedger};
use crate::history::{RunHistory, RunMetrics};
use crate::insights::CommunityInsights;
use crate::orchestrator::{DiscoveryEngine, DiscoveryStats, Strategy};

const HISTORY_LIMIT: usize = 50;

#[derive(Clone)]
pub struct AppState {
    engine: Arc<Mutex<DiscoveryEngine>>,
    history: Arc<RunHistory>,
    ledger: SharedLedger,
}

impl AppState {
    pub fn new(engine: DiscoveryEngine) -> Self {
        Self {
            history: engine.history(),
            ledger: engine.ledger(),
            engine: Arc::new(Mutex::new(engine)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/discover", post(discover))
        .route("/history", get(history))
        .route("/stats", get(stats))
        .route("/budget", get(budget))
        .route("/insights", get(insights))
        .route("/admin/reload-sources", post(reload_sources))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct DiscoverParams {
    mode: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

async fn discover(State(state): State<AppState>, Query(q): Query<DiscoverParams>) -> Response {
    let strategy = match q.mode.as_deref().unwrap_or("quick").parse::<Strategy>() {
        Ok(s) => s,
        Err(error) => return (StatusCode::BAD_REQUEST, Json(ErrorBody { error })).into_response(),
    };
    let mut engine = state.engine.lock().await;
    let result = engine.run_discovery(strategy).await;
    Json(result).into_response()
}

async fn history(State(state): State<AppState>) -> Json<Vec<RunMetrics>> {
    Json(state.history.snapshot_last_n(HISTORY_LIMIT))
}

async fn stats(State(state): State<AppState>) -> Json<DiscoveryStats> {
    Json(state.engine.lock().await.stats())
}

async fn budget(State(state): State<AppState>) -> Json<BudgetUsage> {
    Json(state.ledger.usage())
}

async fn insights(State(state): State<AppState>) -> Json<CommunityInsights> {
    Json(state.engine.lock().await.insights())
}

#[derive(Serialize)]
struct ReloadOut {
    sources: usize,
    patterns: usize,
}

async fn reload_sources(State(state): State<AppState>) -> Json<ReloadOut> {
    let mut engine = state.engine.lock().await;
    let fresh = engine.config().catalog();
    let out = ReloadOut {
        sources: fresh.len(),
        patterns: fresh.patterns.len(),
    };
    engine.reload_sources(fresh);
    Json(out)
}
