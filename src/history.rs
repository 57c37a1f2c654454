// src/history.rs
//! Bounded run history: newest last, capped by count and by age.
//! Optionally mirrored to a JSON file after every push.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Summary of one orchestrator invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    pub run_id: String,
    pub mode: String,
    pub recorded_at: DateTime<Utc>,
    /// Candidates produced by extraction, before any filtering.
    pub total_found: usize,
    pub relevant: usize,
    pub unique_added: usize,
    pub duplicates_removed: usize,
    pub average_quality_score: f32,
    pub total_cost: u32,
    /// `unique_added / total_cost`, 0 when nothing was spent.
    pub cost_efficiency: f32,
    /// Candidates extracted per source name.
    pub source_breakdown: BTreeMap<String, usize>,
    pub failed_steps: usize,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

#[derive(Debug)]
pub struct RunHistory {
    inner: Mutex<Vec<RunMetrics>>,
    cap: usize,
    retention: Duration,
    path: Option<PathBuf>,
}

impl RunHistory {
    pub fn new(cap: usize, retention_days: i64) -> Self {
        let cap = cap.clamp(1, 10_000);
        Self {
            inner: Mutex::new(Vec::with_capacity(cap.min(256))),
            cap,
            retention: Duration::days(retention_days.max(1)),
            path: None,
        }
    }

    /// Mirror to `<dir>/history.json`, loading whatever is already there.
    pub fn persisted_in<P: AsRef<Path>>(mut self, dir: P) -> Self {
        let path = dir.as_ref().join("history.json");
        match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Vec<RunMetrics>>(&raw) {
                Ok(runs) => {
                    let mut v = self.lock();
                    *v = runs;
                    drop(v);
                    self.trim(Utc::now());
                }
                Err(e) => tracing::warn!(target: "discovery", error = %e, "history file unreadable, starting empty"),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(target: "discovery", error = %e, "history file unreadable, starting empty"),
        }
        self.path = Some(path);
        self
    }

    pub fn push(&self, m: RunMetrics) {
        let now = m.recorded_at;
        self.lock().push(m);
        self.trim(now);
        self.persist();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot_last_n(&self, n: usize) -> Vec<RunMetrics> {
        let v = self.lock();
        let start = v.len().saturating_sub(n);
        v[start..].to_vec()
    }

    pub fn snapshot(&self) -> Vec<RunMetrics> {
        self.lock().clone()
    }

    fn trim(&self, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        let mut v = self.lock();
        v.retain(|m| m.recorded_at >= cutoff);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
    }

    fn persist(&self) {
        let Some(path) = &self.path else { return };
        let json = match serde_json::to_string(&*self.lock()) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!(target: "discovery", error = %e, "history serialise failed");
                return;
            }
        };
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let tmp = path.with_extension("json.tmp");
            let mut f = fs::File::create(&tmp)?;
            f.write_all(json.as_bytes())?;
            fs::rename(&tmp, path)
        };
        if let Err(e) = write() {
            tracing::warn!(target: "discovery", error = %e, "history persist failed");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RunMetrics>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(id: &str, at: DateTime<Utc>) -> RunMetrics {
        RunMetrics {
            run_id: id.into(),
            mode: "quick".into(),
            recorded_at: at,
            total_found: 3,
            relevant: 2,
            unique_added: 1,
            duplicates_removed: 1,
            average_quality_score: 0.5,
            total_cost: 6,
            cost_efficiency: 1.0 / 6.0,
            source_breakdown: BTreeMap::new(),
            failed_steps: 0,
            duration_ms: 12,
            degraded: None,
        }
    }

    #[test]
    fn count_cap_drops_oldest() {
        let h = RunHistory::new(2, 30);
        let now = Utc::now();
        for id in ["a", "b", "c"] {
            h.push(run(id, now));
        }
        let ids: Vec<_> = h.snapshot().into_iter().map(|m| m.run_id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn retention_drops_old_runs() {
        let h = RunHistory::new(100, 30);
        let now = Utc::now();
        h.push(run("old", now - Duration::days(31)));
        h.push(run("new", now));
        assert_eq!(h.len(), 1);
        assert_eq!(h.snapshot_last_n(5)[0].run_id, "new");
    }

    #[test]
    fn persisted_history_reloads() {
        let dir = tempfile::tempdir().unwrap();
        {
            let h = RunHistory::new(10, 30).persisted_in(dir.path());
            h.push(run("kept", Utc::now()));
        }
        let h = RunHistory::new(10, 30).persisted_in(dir.path());
        assert_eq!(h.len(), 1);
        assert_eq!(h.snapshot()[0].run_id, "kept");
    }
}
