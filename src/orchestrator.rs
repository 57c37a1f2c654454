// src/orchestrator.rs
//! Discovery Orchestrator.
//!
//! A run is a fixed plan of fetch steps chosen by `Strategy`. Each step goes
//! acquisition → extraction → relevance; a failing step is logged and skipped.
//! The batch then goes through dedup and quality ranking, and one `RunMetrics`
//! row is recorded. An empty result is reported as degraded and, unless
//! disabled, padded with clearly tagged demonstration records.

use chrono::{Duration as ChronoDuration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::acquire::{Acquirer, ContentCache, ContentSource, FetchTarget, JinaClient, MockContentSource};
use crate::budget::{BudgetLedger, BudgetUsage, FileLedgerStore, MemoryLedgerStore, SharedLedger};
use crate::config::EngineConfig;
use crate::dedup::{near_duplicates, DedupCache, Deduplicator, FileDedupCache, MemoryDedupCache, NearDuplicate};
use crate::event::{CandidateEvent, Platform, SourceKind, DEMO_TAG};
use crate::extract::Extractor;
use crate::history::{RunHistory, RunMetrics};
use crate::insights::{self, CommunityInsights};
use crate::quality::QualityScorer;
use crate::relevance::{filter_relevant, KeywordPolicy, RelevancePolicy, Taxonomy};
use crate::sources::SourceCatalog;

/// Source name carried by demonstration records.
pub const DEMO_SOURCE: &str = "demo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// A couple of established sources, lowest cost.
    Quick,
    /// `Quick` plus every other source and broad searches.
    Deep,
    /// Historically successful search queries.
    Intelligent,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Quick => "quick",
            Strategy::Deep => "deep",
            Strategy::Intelligent => "intelligent",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(Strategy::Quick),
            "deep" => Ok(Strategy::Deep),
            "intelligent" => Ok(Strategy::Intelligent),
            other => Err(format!("unknown strategy `{other}` (expected quick|deep|intelligent)")),
        }
    }
}

/// Why a run came back with no genuine discoveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DegradedReason {
    /// No step produced content (nothing planned, or every step failed).
    NoSourcesSucceeded,
    /// Content arrived but nothing survived the pipeline.
    NoRelevantCandidates,
}

impl DegradedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradedReason::NoSourcesSucceeded => "no-sources-succeeded",
            DegradedReason::NoRelevantCandidates => "no-relevant-candidates",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    /// Ranked candidates, or demonstration records when degraded.
    pub candidates: Vec<CandidateEvent>,
    pub metrics: RunMetrics,
    pub degraded: Option<DegradedReason>,
    /// Look-alike pairs among `candidates`, for moderators.
    pub near_duplicates: Vec<NearDuplicate>,
}

impl RunResult {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryStats {
    pub total_runs: usize,
    pub average_events_found: f32,
    pub average_quality_score: f32,
    pub known_sources: usize,
    pub dedup_cache_size: usize,
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("discovery_runs_total", "Discovery runs, by strategy and outcome.");
        describe_counter!("discovery_step_failures_total", "Fetch steps skipped after an error.");
        describe_histogram!("discovery_run_ms", "Wall time of one discovery run in milliseconds.");
    });
}

pub struct DiscoveryEngine {
    cfg: EngineConfig,
    catalog: SourceCatalog,
    acquirer: Acquirer,
    extractor: Extractor,
    policy: Arc<dyn RelevancePolicy>,
    dedup: Deduplicator,
    scorer: QualityScorer,
    history: Arc<RunHistory>,
    last_candidates: Vec<CandidateEvent>,
}

impl DiscoveryEngine {
    /// Wire the engine from configuration: real reader/search client when a
    /// credential is present, mock content otherwise; file-backed state when
    /// `state_dir` is set, in-memory otherwise.
    pub fn from_config(cfg: EngineConfig) -> anyhow::Result<Self> {
        let content: Arc<dyn ContentSource> = match cfg.api_key.as_deref() {
            Some(key) => Arc::new(JinaClient::new(key, cfg.jina.clone(), cfg.timeout())?),
            None => {
                info!(target: "discovery", "no content API key, using mock content");
                Arc::new(MockContentSource::new())
            }
        };

        let (ledger, cache, content_cache, history) = match &cfg.state_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let ledger = BudgetLedger::open(FileLedgerStore::in_dir(dir), cfg.daily_budget);
                let cache: Box<dyn DedupCache> = Box::new(FileDedupCache::in_dir_or_empty(dir));
                let history = RunHistory::new(cfg.history.max_runs, cfg.history.retention_days).persisted_in(dir);
                (ledger, cache, ContentCache::with_dir(dir.join("content")), history)
            }
            None => (
                BudgetLedger::open(MemoryLedgerStore::default(), cfg.daily_budget),
                Box::new(MemoryDedupCache::new()) as Box<dyn DedupCache>,
                ContentCache::in_memory(),
                RunHistory::new(cfg.history.max_runs, cfg.history.retention_days),
            ),
        };

        let engine = Self::with_parts(cfg, content, SharedLedger::new(ledger), cache)
            .with_content_cache(content_cache)
            .with_history(Arc::new(history))
            .with_taxonomy(Arc::new(Taxonomy::load_default()));
        Ok(engine)
    }

    /// Assemble from injected collaborators. Uses the built-in taxonomy, an
    /// in-memory content cache and an unpersisted history.
    pub fn with_parts(
        cfg: EngineConfig,
        content: Arc<dyn ContentSource>,
        ledger: SharedLedger,
        dedup_cache: Box<dyn DedupCache>,
    ) -> Self {
        ensure_metrics_described();
        let taxonomy = Arc::new(Taxonomy::default_seed());
        let acquirer = Acquirer::new(content, ledger, ContentCache::in_memory(), cfg.costs, cfg.timeout());
        Self {
            catalog: cfg.catalog(),
            extractor: Extractor::new(cfg.extractor.clone(), taxonomy.clone()),
            policy: Arc::new(KeywordPolicy::new(taxonomy.clone())),
            scorer: QualityScorer::new(cfg.quality.clone(), taxonomy.density.clone()),
            dedup: Deduplicator::new(dedup_cache),
            history: Arc::new(RunHistory::new(cfg.history.max_runs, cfg.history.retention_days)),
            last_candidates: Vec::new(),
            acquirer,
            cfg,
        }
    }

    /// Replace the taxonomy used by extraction tags, the keyword policy and quality density.
    pub fn with_taxonomy(mut self, taxonomy: Arc<Taxonomy>) -> Self {
        self.extractor = Extractor::new(self.cfg.extractor.clone(), taxonomy.clone());
        self.policy = Arc::new(KeywordPolicy::new(taxonomy.clone()));
        self.scorer = QualityScorer::new(self.cfg.quality.clone(), taxonomy.density.clone());
        self
    }

    pub fn with_relevance_policy(mut self, policy: Arc<dyn RelevancePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_history(mut self, history: Arc<RunHistory>) -> Self {
        self.history = history;
        self
    }

    /// Replace the same-day content cache, dropping entries from earlier days.
    pub fn with_content_cache(mut self, cache: ContentCache) -> Self {
        let pruned = cache.prune(Local::now().date_naive());
        if pruned > 0 {
            tracing::debug!(target: "discovery", pruned, "stale content cache entries removed");
        }
        self.acquirer = self.acquirer.with_cache(cache);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn catalog(&self) -> &SourceCatalog {
        &self.catalog
    }

    pub fn history(&self) -> Arc<RunHistory> {
        self.history.clone()
    }

    pub fn ledger(&self) -> SharedLedger {
        self.acquirer.ledger().clone()
    }

    pub fn budget(&self) -> BudgetUsage {
        self.acquirer.ledger().usage()
    }

    /// Swap the source catalog (e.g. after editing the catalog file).
    pub fn reload_sources(&mut self, catalog: SourceCatalog) {
        info!(target: "discovery", sources = catalog.len(), patterns = catalog.patterns.len(), "source catalog reloaded");
        self.catalog = catalog;
    }

    /// Ordered fetch steps for `strategy`.
    pub fn plan(&self, strategy: Strategy) -> Vec<FetchTarget> {
        let quick: Vec<FetchTarget> = self
            .catalog
            .established(self.cfg.quick_source_limit)
            .iter()
            .map(FetchTarget::from)
            .collect();

        match strategy {
            Strategy::Quick => quick,
            Strategy::Deep => {
                let mut steps = quick;
                for s in &self.catalog.sources {
                    let t = FetchTarget::from(s);
                    if !steps.contains(&t) {
                        steps.push(t);
                    }
                }
                steps.extend(self.cfg.deep_queries.iter().map(FetchTarget::search));
                steps
            }
            Strategy::Intelligent => self
                .catalog
                .ranked_patterns()
                .into_iter()
                .map(|p| FetchTarget::search(p.query))
                .collect(),
        }
    }

    /// Run one discovery pass. Never fails: problems surface as skipped steps
    /// in the metrics and, for empty results, as `degraded`.
    pub async fn run_discovery(&mut self, strategy: Strategy) -> RunResult {
        let t0 = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let ceiling = self.cfg.ceilings.for_strategy(strategy);
        let steps = self.plan(strategy);
        info!(target: "discovery", %run_id, strategy = %strategy, steps = steps.len(), ceiling, "run started");

        let mut spent = 0u32;
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut total_found = 0usize;
        let mut breakdown: BTreeMap<String, usize> = BTreeMap::new();
        let mut relevant: Vec<CandidateEvent> = Vec::new();

        for step in &steps {
            let cost = self.acquirer.cost_for(step.kind);
            if spent.saturating_add(cost) > ceiling {
                info!(target: "discovery", source = %step.source_name, spent, cost, ceiling, "step skipped, run ceiling reached");
                continue;
            }
            let fetched = self.acquirer.fetch(step).await;
            if step.kind != SourceKind::Search {
                self.catalog.mark_checked(&step.source_name, Utc::now());
            }

            let raw = match fetched {
                Ok(raw) => raw,
                Err(e) => {
                    failed += 1;
                    counter!("discovery_step_failures_total", "kind" => e.kind()).increment(1);
                    warn!(
                        target: "discovery",
                        source = %step.source_name,
                        step = step.kind.as_str(),
                        error = %e,
                        "step failed, skipping"
                    );
                    continue;
                }
            };
            succeeded += 1;
            spent = spent.saturating_add(raw.cost_units);

            let extracted = self.extractor.extract(&raw);
            total_found += extracted.len();
            *breakdown.entry(step.source_name.clone()).or_default() += extracted.len();

            let (kept, dropped) = filter_relevant(self.policy.as_ref(), extracted);
            tracing::debug!(target: "discovery", source = %step.source_name, kept = kept.len(), dropped, "relevance applied");
            relevant.extend(kept);
        }

        let relevant_count = relevant.len();
        let deduped = self.dedup.dedupe(relevant);
        let unique_added = deduped.kept.len();
        let today = Local::now().date_naive();
        let ranked = self.scorer.rank(deduped.kept, today).ranked;

        let average_quality_score = mean(ranked.iter().filter_map(|c| c.quality_score));

        let degraded = if ranked.is_empty() {
            Some(if succeeded == 0 {
                DegradedReason::NoSourcesSucceeded
            } else {
                DegradedReason::NoRelevantCandidates
            })
        } else {
            None
        };

        let candidates = match degraded {
            Some(reason) if self.cfg.demo_fallback => {
                warn!(target: "discovery", %run_id, reason = reason.as_str(), "empty run, returning demonstration records");
                self.demo_records(today)
            }
            Some(reason) => {
                warn!(target: "discovery", %run_id, reason = reason.as_str(), "empty run");
                Vec::new()
            }
            None => ranked,
        };
        let near = near_duplicates(&candidates, self.cfg.near_duplicate_threshold);

        let elapsed = t0.elapsed();
        let metrics = RunMetrics {
            run_id: run_id.clone(),
            mode: strategy.as_str().to_string(),
            recorded_at: Utc::now(),
            total_found,
            relevant: relevant_count,
            unique_added,
            duplicates_removed: deduped.removed,
            average_quality_score,
            total_cost: spent,
            cost_efficiency: if spent == 0 { 0.0 } else { unique_added as f32 / spent as f32 },
            source_breakdown: breakdown,
            failed_steps: failed,
            duration_ms: elapsed.as_millis() as u64,
            degraded: degraded.map(|d| d.as_str().to_string()),
        };
        self.history.push(metrics.clone());

        let outcome = if degraded.is_some() { "degraded" } else { "ok" };
        counter!("discovery_runs_total", "strategy" => strategy.as_str(), "outcome" => outcome).increment(1);
        histogram!("discovery_run_ms").record(elapsed.as_secs_f64() * 1_000.0);
        info!(
            target: "discovery",
            %run_id,
            strategy = %strategy,
            found = total_found,
            relevant = relevant_count,
            unique = unique_added,
            returned = candidates.len(),
            cost = spent,
            failed,
            "run finished"
        );

        self.last_candidates = candidates.iter().filter(|c| !c.is_demo).cloned().collect();
        RunResult {
            candidates,
            metrics,
            degraded,
            near_duplicates: near,
        }
    }

    pub fn stats(&self) -> DiscoveryStats {
        let runs = self.history.snapshot();
        DiscoveryStats {
            total_runs: runs.len(),
            average_events_found: mean(runs.iter().map(|m| m.total_found as f32)),
            average_quality_score: mean(runs.iter().map(|m| m.average_quality_score)),
            known_sources: self.catalog.len(),
            dedup_cache_size: self.dedup.cache_len(),
        }
    }

    /// Community intelligence over the last run's genuine candidates.
    pub fn insights(&self) -> CommunityInsights {
        insights::analyze(&self.last_candidates)
    }

    /// Fixed, clearly labelled placeholder records.
    pub fn demo_records(&self, today: NaiveDate) -> Vec<CandidateEvent> {
        let at = |days: i64, h: u32, m: u32| {
            let d = today + ChronoDuration::days(days);
            let t = NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default();
            Utc.from_utc_datetime(&d.and_time(t))
        };
        let tags = |xs: &[&str]| -> BTreeSet<String> { xs.iter().map(|s| s.to_string()).collect() };

        let mut out = vec![
            CandidateEvent {
                id: format!("demo-{}", uuid::Uuid::new_v4()),
                title: "Black QTIPOC+ Writing Workshop (Demo)".to_string(),
                description: "A creative writing workshop for Black QTIPOC+ writers to share stories and build community. This is demonstration data.".to_string(),
                occurs_at: at(7, 18, 30),
                date_uncertain: false,
                location: "London LGBTQ+ Community Centre".to_string(),
                organizer: "Demo Collective".to_string(),
                price_text: "Free".to_string(),
                tags: tags(&[DEMO_TAG, "qtipoc", "workshop", "writing", "black"]),
                source: DEMO_SOURCE.to_string(),
                platform: Platform::Community,
                source_url: String::new(),
                relevance_score: None,
                quality_score: None,
                is_demo: true,
            },
            CandidateEvent {
                id: format!("demo-{}", uuid::Uuid::new_v4()),
                title: "Trans POC Healing Circle (Demo)".to_string(),
                description: "A supportive online space for trans people of colour to connect, rest and heal together. This is demonstration data.".to_string(),
                occurs_at: at(14, 19, 0),
                date_uncertain: false,
                location: "Online via Zoom".to_string(),
                organizer: "Demo Collective".to_string(),
                price_text: "Donation based".to_string(),
                tags: tags(&[DEMO_TAG, "trans", "poc", "healing", "wellbeing"]),
                source: DEMO_SOURCE.to_string(),
                platform: Platform::Community,
                source_url: String::new(),
                relevance_score: None,
                quality_score: None,
                is_demo: true,
            },
        ];
        for c in &mut out {
            c.quality_score = Some(self.scorer.score(c, today));
        }
        out
    }
}

fn mean(xs: impl Iterator<Item = f32>) -> f32 {
    let (sum, n) = xs.fold((0.0f32, 0usize), |(s, n), x| (s + x, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f32
    }
}
