// src/dedup.rs
//! Deduplication by canonical fingerprint.
//!
//! - Key: `normalize(title)|YYYY-MM-DD|normalize(location)`, stored as SHA-256 hex.
//! - A candidate is dropped when its hash is in the persistent cache or was
//!   already seen earlier in the same batch; the first occurrence wins.
//! - Entries never expire. Hosts wanting a sliding window prune their store.
//!
//! `near_duplicates` is advisory only: it reports look-alike pairs for
//! moderators and never drops anything.

use anyhow::{Context, Result};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use strsim::normalized_levenshtein;

use crate::event::{is_generic_organizer, CandidateEvent};

/// Default similarity above which `near_duplicates` reports a pair.
pub const DEFAULT_NEAR_DUPLICATE_THRESHOLD: f32 = 0.8;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("dedup_removed_total", "Candidates dropped as already seen.");
        describe_counter!("dedup_added_total", "New fingerprints written to the dedup cache.");
    });
}

/// Lowercase, keep only `[a-z0-9\s]`, collapse whitespace.
pub fn normalize(s: &str) -> String {
    let lower = s.to_lowercase();
    let kept: String = lower
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn canonical_key(c: &CandidateEvent) -> String {
    format!(
        "{}|{}|{}",
        normalize(&c.title),
        c.occurs_on().format("%Y-%m-%d"),
        normalize(&c.location)
    )
}

pub fn dedup_hash(c: &CandidateEvent) -> String {
    let digest = Sha256::digest(canonical_key(c).as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// A persisted fact that a fingerprint has been seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupEntry {
    pub hash: String,
    pub first_seen_event_id: String,
}

/// Persistence contract for seen fingerprints.
pub trait DedupCache: Send {
    fn contains(&self, hash: &str) -> bool;
    fn insert(&mut self, entry: DedupEntry);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Write pending inserts to durable storage.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryDedupCache {
    entries: HashMap<String, DedupEntry>,
}

impl MemoryDedupCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DedupCache for MemoryDedupCache {
    fn contains(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    fn insert(&mut self, entry: DedupEntry) {
        self.entries.entry(entry.hash.clone()).or_insert(entry);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// JSON-file cache (`<dir>/dedup.json`). Loaded once, flushed via tmp + rename.
#[derive(Debug)]
pub struct FileDedupCache {
    path: PathBuf,
    entries: HashMap<String, DedupEntry>,
    dirty: bool,
}

impl FileDedupCache {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading dedup cache {}", path.display()))?;
            let list: Vec<DedupEntry> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing dedup cache {}", path.display()))?;
            list.into_iter().map(|e| (e.hash.clone(), e)).collect()
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            entries,
            dirty: false,
        })
    }

    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::open(dir.as_ref().join("dedup.json"))
    }

    /// Like `in_dir`, but an unreadable file yields an empty cache that
    /// replaces it on the next flush.
    pub fn in_dir_or_empty<P: AsRef<Path>>(dir: P) -> Self {
        let path = dir.as_ref().join("dedup.json");
        Self::open(&path).unwrap_or_else(|e| {
            tracing::warn!(target: "dedup", error = %format!("{e:#}"), "dedup cache unreadable, starting empty");
            Self {
                path,
                entries: HashMap::new(),
                dirty: false,
            }
        })
    }
}

impl DedupCache for FileDedupCache {
    fn contains(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    fn insert(&mut self, entry: DedupEntry) {
        if !self.entries.contains_key(&entry.hash) {
            self.entries.insert(entry.hash.clone(), entry);
            self.dirty = true;
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut list: Vec<&DedupEntry> = self.entries.values().collect();
        list.sort_by(|a, b| a.hash.cmp(&b.hash));
        let tmp = self.path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp)?;
        f.write_all(serde_json::to_string(&list)?.as_bytes())?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing dedup cache {}", self.path.display()))?;
        self.dirty = false;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub kept: Vec<CandidateEvent>,
    pub removed: usize,
}

pub struct Deduplicator {
    cache: Box<dyn DedupCache>,
}

impl Deduplicator {
    pub fn new(cache: Box<dyn DedupCache>) -> Self {
        ensure_metrics_described();
        Self { cache }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Drop already-seen candidates and record the rest. Order is preserved.
    pub fn dedupe(&mut self, candidates: Vec<CandidateEvent>) -> DedupOutcome {
        let mut batch: HashSet<String> = HashSet::new();
        let mut out = DedupOutcome::default();

        for c in candidates {
            let hash = dedup_hash(&c);
            if self.cache.contains(&hash) || !batch.insert(hash.clone()) {
                tracing::debug!(target: "dedup", title = %c.title, "duplicate dropped");
                out.removed += 1;
                continue;
            }
            self.cache.insert(DedupEntry {
                hash,
                first_seen_event_id: c.id.clone(),
            });
            out.kept.push(c);
        }

        if let Err(e) = self.cache.flush() {
            tracing::warn!(target: "dedup", error = %format!("{e:#}"), "dedup cache flush failed");
        }
        counter!("dedup_removed_total").increment(out.removed as u64);
        counter!("dedup_added_total").increment(out.kept.len() as u64);
        out
    }
}

/// A look-alike pair for moderator review.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearDuplicate {
    pub primary_id: String,
    pub duplicate_id: String,
    pub similarity: f32,
}

/// Weighted field similarity in `[0, 1]`: title .35, description .20,
/// date .25, location .15, organiser .05.
pub fn similarity(a: &CandidateEvent, b: &CandidateEvent) -> f32 {
    let text = |x: &str, y: &str| normalized_levenshtein(&normalize(x), &normalize(y)) as f32;

    let days = (a.occurs_on() - b.occurs_on()).num_days().abs();
    let date = match days {
        0 => 1.0,
        1 => 0.5,
        _ => 0.0,
    };
    let organizer = if is_generic_organizer(&a.organizer) || is_generic_organizer(&b.organizer) {
        0.0
    } else {
        text(&a.organizer, &b.organizer)
    };

    0.35 * text(&a.title, &b.title)
        + 0.20 * text(&a.description, &b.description)
        + 0.25 * date
        + 0.15 * text(&a.location, &b.location)
        + 0.05 * organizer
}

/// Pairs at or above `threshold`. The earlier candidate is the primary.
pub fn near_duplicates(candidates: &[CandidateEvent], threshold: f32) -> Vec<NearDuplicate> {
    let mut out = Vec::new();
    for (i, a) in candidates.iter().enumerate() {
        for b in &candidates[i + 1..] {
            let s = similarity(a, b);
            if s >= threshold {
                out.push(NearDuplicate {
                    primary_id: a.id.clone(),
                    duplicate_id: b.id.clone(),
                    similarity: s,
                });
            }
        }
    }
    out
}
