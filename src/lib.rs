// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod acquire;
pub mod api;
pub mod budget;
pub mod config;
pub mod dedup;
pub mod error;
pub mod event;
pub mod extract;
pub mod history;
pub mod insights;
pub mod metrics;
pub mod moderation;
pub mod orchestrator;
pub mod quality;
pub mod relevance;
pub mod sources;

pub use crate::api::router;
pub use crate::config::EngineConfig;
pub use crate::event::CandidateEvent;
pub use crate::orchestrator::{DegradedReason, DiscoveryEngine, RunResult, Strategy};

use axum::Router;
use tracing::info;

/// Full in-process app: config from file/env, engine, API routes and `/metrics`.
pub async fn app() -> anyhow::Result<Router> {
    let cfg = EngineConfig::load_default()?;
    let metrics = metrics::Metrics::init(cfg.daily_budget)?;
    let engine = DiscoveryEngine::from_config(cfg)?;
    info!(
        target: "discovery",
        sources = engine.catalog().len(),
        budget = engine.budget().budget,
        "discovery engine ready"
    );
    let state = api::AppState::new(engine);
    Ok(api::router(state).merge(metrics.router()))
}
