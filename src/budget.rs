// src/budget.rs
//! Daily acquisition budget: a soft cap on spend that resets at the local-day
//! boundary and is persisted after every debit.
//!
//! `used <= budget` is advisory. Callers ask `can_afford` before spending and
//! `debit` after a successful call; `SharedLedger::try_debit` does both under
//! one lock for hosts that fan acquisition out across tasks.
//!
//! The file store is single-writer. Multi-process hosts must supply a
//! transactional `LedgerStore` instead.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Persisted ledger fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub used_units: u32,
    /// `YYYY-MM-DD` in local time.
    pub reset_day: String,
}

impl LedgerState {
    fn fresh(day: NaiveDate) -> Self {
        Self {
            used_units: 0,
            reset_day: day_key(day),
        }
    }
}

/// Load/save contract for ledger persistence.
pub trait LedgerStore: Send + Sync {
    fn load(&self) -> Result<Option<LedgerState>>;
    fn save(&self, state: &LedgerState) -> Result<()>;
}

/// JSON file store (`<dir>/budget.json`), written via tmp + rename.
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    path: PathBuf,
}

impl FileLedgerStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self::new(dir.as_ref().join("budget.json"))
    }
}

impl LedgerStore for FileLedgerStore {
    fn load(&self) -> Result<Option<LedgerState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let s = fs::read_to_string(&self.path)
            .with_context(|| format!("reading ledger {}", self.path.display()))?;
        let st = serde_json::from_str(&s)
            .with_context(|| format!("parsing ledger {}", self.path.display()))?;
        Ok(Some(st))
    }

    fn save(&self, state: &LedgerState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string(state)?;
        let mut f = fs::File::create(&tmp)?;
        f.write_all(json.as_bytes())?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing ledger {}", self.path.display()))?;
        Ok(())
    }
}

/// In-memory store. Clones share state so tests can inspect what was saved.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    inner: Arc<Mutex<Option<LedgerState>>>,
}

impl MemoryLedgerStore {
    pub fn with_state(state: LedgerState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(state))),
        }
    }

    pub fn snapshot(&self) -> Option<LedgerState> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self) -> Result<Option<LedgerState>> {
        Ok(self.snapshot())
    }

    fn save(&self, state: &LedgerState) -> Result<()> {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(state.clone());
        Ok(())
    }
}

/// Snapshot returned by `usage()`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetUsage {
    pub budget: u32,
    pub used: u32,
    pub remaining: u32,
    pub utilization_pct: f32,
}

pub struct BudgetLedger {
    daily_budget: u32,
    state: LedgerState,
    store: Box<dyn LedgerStore>,
}

impl std::fmt::Debug for BudgetLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetLedger")
            .field("daily_budget", &self.daily_budget)
            .field("state", &self.state)
            .finish()
    }
}

impl BudgetLedger {
    /// Load persisted state for the current local day.
    pub fn open<S: LedgerStore + 'static>(store: S, daily_budget: u32) -> Self {
        Self::open_at(store, daily_budget, today())
    }

    /// Load persisted state as if `today` were the current day. A state from
    /// any other day is zeroed and re-persisted.
    pub fn open_at<S: LedgerStore + 'static>(store: S, daily_budget: u32, today: NaiveDate) -> Self {
        let loaded = match store.load() {
            Ok(st) => st,
            Err(e) => {
                tracing::warn!(target: "budget", error = %format!("{e:#}"), "ledger load failed, starting fresh");
                None
            }
        };
        let mut ledger = Self {
            daily_budget,
            state: loaded.unwrap_or_else(|| LedgerState::fresh(today)),
            store: Box::new(store),
        };
        if ledger.roll_over(today) {
            ledger.persist();
        }
        ledger
    }

    pub fn daily_budget(&self) -> u32 {
        self.daily_budget
    }

    pub fn reset_day(&self) -> &str {
        &self.state.reset_day
    }

    /// Units spent today.
    pub fn used_units(&self) -> u32 {
        if self.state.reset_day == day_key(today()) {
            self.state.used_units
        } else {
            0
        }
    }

    pub fn can_afford(&self, cost: u32) -> bool {
        self.used_units().saturating_add(cost) <= self.daily_budget
    }

    /// Add `cost` to today's spend and persist. Persistence failures are logged;
    /// the in-memory count stays authoritative for this process.
    pub fn debit(&mut self, cost: u32) {
        self.roll_over(today());
        self.state.used_units = self.state.used_units.saturating_add(cost);
        metrics::gauge!("budget_used_units").set(self.state.used_units as f64);
        self.persist();
    }

    pub fn usage(&self) -> BudgetUsage {
        let used = self.used_units();
        let utilization_pct = if self.daily_budget == 0 {
            100.0
        } else {
            used as f32 / self.daily_budget as f32 * 100.0
        };
        BudgetUsage {
            budget: self.daily_budget,
            used,
            remaining: self.daily_budget.saturating_sub(used),
            utilization_pct,
        }
    }

    /// Zero the spend if `today` differs from the recorded day. Returns true on reset.
    fn roll_over(&mut self, today: NaiveDate) -> bool {
        let key = day_key(today);
        if self.state.reset_day != key {
            tracing::info!(target: "budget", previous = %self.state.reset_day, today = %key, "daily budget reset");
            self.state = LedgerState::fresh(today);
            return true;
        }
        false
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.state) {
            tracing::warn!(target: "budget", error = %format!("{e:#}"), "ledger persist failed");
        }
    }
}

/// Mutex-guarded ledger shared between the acquirer and the host.
#[derive(Debug, Clone)]
pub struct SharedLedger {
    inner: Arc<Mutex<BudgetLedger>>,
}

impl SharedLedger {
    pub fn new(ledger: BudgetLedger) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    pub fn can_afford(&self, cost: u32) -> bool {
        self.lock().can_afford(cost)
    }

    pub fn debit(&self, cost: u32) {
        self.lock().debit(cost)
    }

    /// Check and debit under one lock.
    pub fn try_debit(&self, cost: u32) -> bool {
        let mut g = self.lock();
        if g.can_afford(cost) {
            g.debit(cost);
            true
        } else {
            false
        }
    }

    pub fn usage(&self) -> BudgetUsage {
        self.lock().usage()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BudgetLedger> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn day_key(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn budget_monotonicity() {
        let mut l = BudgetLedger::open(MemoryLedgerStore::default(), 100);
        for c in [3, 4, 10, 20] {
            l.debit(c);
        }
        let s = 37;
        assert!(l.can_afford(100 - s));
        assert!(!l.can_afford(100 - s + 1));
    }

    #[test]
    fn yesterday_state_resets_on_open() {
        let yesterday = today() - Duration::days(1);
        let store = MemoryLedgerStore::with_state(LedgerState {
            used_units: 90,
            reset_day: day_key(yesterday),
        });
        let l = BudgetLedger::open(store.clone(), 100);
        assert_eq!(l.used_units(), 0);
        // reset is persisted immediately
        assert_eq!(store.snapshot().unwrap().used_units, 0);
        assert_eq!(store.snapshot().unwrap().reset_day, day_key(today()));
    }

    #[test]
    fn debit_persists_every_mutation() {
        let store = MemoryLedgerStore::default();
        let mut l = BudgetLedger::open(store.clone(), 50);
        l.debit(4);
        assert_eq!(store.snapshot().unwrap().used_units, 4);
        l.debit(3);
        assert_eq!(store.snapshot().unwrap().used_units, 7);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut l = BudgetLedger::open(FileLedgerStore::in_dir(dir.path()), 100);
            l.debit(12);
        }
        let l = BudgetLedger::open(FileLedgerStore::in_dir(dir.path()), 100);
        assert_eq!(l.used_units(), 12);
        assert_eq!(l.usage().remaining, 88);
    }

    #[test]
    fn usage_reports_percent() {
        let mut l = BudgetLedger::open(MemoryLedgerStore::default(), 200);
        l.debit(50);
        let u = l.usage();
        assert_eq!(u.used, 50);
        assert!((u.utilization_pct - 25.0).abs() < 1e-4);
    }

    #[test]
    fn try_debit_refuses_over_budget() {
        let shared = SharedLedger::new(BudgetLedger::open(MemoryLedgerStore::default(), 5));
        assert!(shared.try_debit(4));
        assert!(!shared.try_debit(2));
        assert_eq!(shared.usage().used, 4);
    }

    #[test]
    fn concurrent_try_debit_never_overspends() {
        let shared = SharedLedger::new(BudgetLedger::open(MemoryLedgerStore::default(), 10));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = shared.clone();
                std::thread::spawn(move || s.try_debit(3))
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(granted, 3);
        assert_eq!(shared.usage().used, 9);
    }
}
