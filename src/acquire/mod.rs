// src/acquire/mod.rs
//! Content acquisition: one call per (source, endpoint) behind the budget
//! ledger, a same-day cache, and a hard timeout.
//!
//! Order inside `Acquirer::fetch`:
//! 1. price the call by kind (`CostTable`); unmetered sources cost 0
//! 2. unaffordable → same-day cache hit (cost 0) or `BudgetExhausted`
//! 3. upstream call bounded by `timeout`
//! 4. convert search/feed bodies to markdown
//! 5. debit, cache, return

pub mod cache;
pub mod feed;
pub mod jina;
pub mod mock;
pub mod search;

use async_trait::async_trait;
use chrono::{Local, Utc};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::budget::SharedLedger;
use crate::error::AcquisitionError;
use crate::event::{RawContent, Source, SourceKind};

pub use cache::ContentCache;
pub use jina::{JinaClient, JinaEndpoints};
pub use mock::MockContentSource;

/// Upstream that turns a target into an unstructured body.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, target: &FetchTarget) -> Result<String, AcquisitionError>;
    fn name(&self) -> &'static str;
    /// Metered sources are debited against the daily budget.
    fn is_metered(&self) -> bool {
        true
    }
}

/// What to fetch: a configured source, or an ad-hoc search query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    pub source_name: String,
    pub endpoint: String,
    pub kind: SourceKind,
}

impl FetchTarget {
    pub fn new(source_name: impl Into<String>, endpoint: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            source_name: source_name.into(),
            endpoint: endpoint.into(),
            kind,
        }
    }

    pub fn search(query: impl Into<String>) -> Self {
        let q = query.into();
        Self::new(format!("search: {q}"), q, SourceKind::Search)
    }
}

impl From<&Source> for FetchTarget {
    fn from(s: &Source) -> Self {
        Self::new(&s.name, &s.endpoint_or_url, s.kind)
    }
}

/// Units charged per call kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostTable {
    pub read: u32,
    pub search: u32,
    pub feed: u32,
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            read: 3,
            search: 4,
            feed: 1,
        }
    }
}

impl CostTable {
    pub fn for_kind(&self, kind: SourceKind) -> u32 {
        match kind {
            SourceKind::Read => self.read,
            SourceKind::Search => self.search,
            SourceKind::Feed => self.feed,
        }
    }
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("acquisition_calls_total", "Upstream acquisition calls attempted.");
        describe_counter!("acquisition_errors_total", "Acquisition calls that failed, by kind.");
        describe_counter!(
            "acquisition_cache_hits_total",
            "Calls served from the same-day cache because the budget could not cover them."
        );
        describe_histogram!("acquisition_ms", "Upstream call latency in milliseconds.");
    });
}

pub struct Acquirer {
    content: Arc<dyn ContentSource>,
    ledger: SharedLedger,
    cache: ContentCache,
    costs: CostTable,
    timeout: Duration,
}

impl Acquirer {
    pub fn new(
        content: Arc<dyn ContentSource>,
        ledger: SharedLedger,
        cache: ContentCache,
        costs: CostTable,
        timeout: Duration,
    ) -> Self {
        ensure_metrics_described();
        Self {
            content,
            ledger,
            cache,
            costs,
            timeout,
        }
    }

    pub fn with_cache(mut self, cache: ContentCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.content.name()
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Units this call would be debited.
    pub fn cost_for(&self, kind: SourceKind) -> u32 {
        if self.content.is_metered() {
            self.costs.for_kind(kind)
        } else {
            0
        }
    }

    pub async fn fetch(&self, target: &FetchTarget) -> Result<RawContent, AcquisitionError> {
        let kind = target.kind.as_str();
        let cost = self.cost_for(target.kind);
        let today = Local::now().date_naive();

        if cost > 0 && !self.ledger.can_afford(cost) {
            if let Some(body) = self.cache.get(target, today) {
                counter!("acquisition_cache_hits_total", "kind" => kind).increment(1);
                tracing::info!(target: "acquire", source = %target.source_name, "budget short, serving same-day cache");
                return Ok(self.raw(target, body, 0, true));
            }
            counter!("acquisition_errors_total", "kind" => "budget").increment(1);
            return Err(AcquisitionError::BudgetExhausted {
                cost,
                remaining: self.ledger.usage().remaining,
            });
        }

        counter!("acquisition_calls_total", "kind" => kind).increment(1);
        let t0 = Instant::now();
        let secs = self.timeout.as_secs();
        let outcome = match tokio::time::timeout(self.timeout, self.content.fetch(target)).await {
            Ok(Ok(body)) => normalize_body(target.kind, body),
            Ok(Err(AcquisitionError::Timeout { .. })) | Err(_) => Err(AcquisitionError::Timeout { secs }),
            Ok(Err(e)) => Err(e),
        };
        histogram!("acquisition_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let body = outcome.inspect_err(|e| {
            counter!("acquisition_errors_total", "kind" => e.kind()).increment(1);
        })?;

        if cost > 0 {
            self.ledger.debit(cost);
        }
        self.cache.put(target, today, &body);
        tracing::debug!(
            target: "acquire",
            source = %target.source_name,
            kind,
            cost,
            bytes = body.len(),
            provider = self.content.name(),
            "acquired"
        );
        Ok(self.raw(target, body, cost, false))
    }

    fn raw(&self, target: &FetchTarget, body: String, cost_units: u32, from_cache: bool) -> RawContent {
        RawContent {
            source_ref: target.source_name.clone(),
            endpoint: target.endpoint.clone(),
            kind: target.kind,
            body,
            fetched_at: Utc::now(),
            cost_units,
            from_cache,
        }
    }
}

fn normalize_body(kind: SourceKind, body: String) -> Result<String, AcquisitionError> {
    match kind {
        SourceKind::Read => Ok(body),
        SourceKind::Search => Ok(search::search_results_to_markdown(&body)),
        SourceKind::Feed => feed::feed_to_markdown(&body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{BudgetLedger, MemoryLedgerStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        body: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContentSource for Fixed {
        async fn fetch(&self, _t: &FetchTarget) -> Result<String, AcquisitionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.to_string())
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct Slow;

    #[async_trait]
    impl ContentSource for Slow {
        async fn fetch(&self, _t: &FetchTarget) -> Result<String, AcquisitionError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(String::new())
        }
        fn name(&self) -> &'static str {
            "slow"
        }
    }

    fn ledger(budget: u32) -> SharedLedger {
        SharedLedger::new(BudgetLedger::open(MemoryLedgerStore::default(), budget))
    }

    fn page() -> FetchTarget {
        FetchTarget::new("Org", "https://org.example", SourceKind::Read)
    }

    #[tokio::test]
    async fn success_debits_and_caches() {
        let src = Arc::new(Fixed {
            body: "### Something Happening Soon",
            calls: AtomicUsize::new(0),
        });
        let l = ledger(10);
        let a = Acquirer::new(src, l.clone(), ContentCache::in_memory(), CostTable::default(), Duration::from_secs(1));
        let raw = a.fetch(&page()).await.unwrap();
        assert_eq!(raw.cost_units, 3);
        assert!(!raw.from_cache);
        assert_eq!(l.usage().used, 3);
        assert_eq!(a.cache_len(), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_serves_cache_for_free() {
        let src = Arc::new(Fixed {
            body: "cached body",
            calls: AtomicUsize::new(0),
        });
        let l = ledger(4);
        let a = Acquirer::new(src.clone(), l.clone(), ContentCache::in_memory(), CostTable::default(), Duration::from_secs(1));
        a.fetch(&page()).await.unwrap();
        let again = a.fetch(&page()).await.unwrap();
        assert!(again.from_cache);
        assert_eq!(again.cost_units, 0);
        assert_eq!(again.body, "cached body");
        assert_eq!(src.calls.load(Ordering::SeqCst), 1);
        assert_eq!(l.usage().used, 3);
    }

    #[tokio::test]
    async fn exhausted_budget_without_cache_is_an_error() {
        let src = Arc::new(Fixed {
            body: "x",
            calls: AtomicUsize::new(0),
        });
        let a = Acquirer::new(src.clone(), ledger(2), ContentCache::in_memory(), CostTable::default(), Duration::from_secs(1));
        let err = a.fetch(&page()).await.unwrap_err();
        assert_eq!(err, AcquisitionError::BudgetExhausted { cost: 3, remaining: 2 });
        assert_eq!(src.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn slow_upstream_times_out_without_debit() {
        let l = ledger(10);
        let a = Acquirer::new(Arc::new(Slow), l.clone(), ContentCache::in_memory(), CostTable::default(), Duration::from_millis(50));
        let err = a.fetch(&page()).await.unwrap_err();
        assert_eq!(err.kind(), "timeout");
        assert_eq!(l.usage().used, 0);
    }

    #[tokio::test]
    async fn mock_source_is_free() {
        let l = ledger(0);
        let a = Acquirer::new(Arc::new(MockContentSource::new()), l.clone(), ContentCache::in_memory(), CostTable::default(), Duration::from_secs(1));
        let raw = a.fetch(&FetchTarget::search("queer poc events")).await.unwrap();
        assert_eq!(raw.cost_units, 0);
        assert!(raw.body.contains("### Black Trans Joy Workshop - London"));
    }
}
