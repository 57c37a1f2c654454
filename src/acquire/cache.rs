// src/acquire/cache.rs
//! Same-day content cache. Bodies are keyed by (day, kind, endpoint) so a
//! cached page is only ever served on the day it was fetched.
//!
//! Memory first, optional directory behind it (one JSON file per entry,
//! written via tmp + rename).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::FetchTarget;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    day: String,
    body: String,
}

#[derive(Debug, Default)]
pub struct ContentCache {
    dir: Option<PathBuf>,
    mem: Mutex<HashMap<String, String>>,
}

impl ContentCache {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref().to_path_buf();
        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!(target: "acquire", error = %e, dir = %dir.display(), "cache dir unavailable, memory only");
            return Self::default();
        }
        Self {
            dir: Some(dir),
            mem: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, target: &FetchTarget, day: NaiveDate) -> Option<String> {
        let key = cache_key(target, day);
        if let Some(hit) = self.lock().get(&key) {
            return Some(hit.clone());
        }
        let dir = self.dir.as_ref()?;
        let path = dir.join(format!("{key}.json"));
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(target: "acquire", error = %e, path = %path.display(), "cache entry unreadable");
                return None;
            }
        };
        let file: CacheFile = match serde_json::from_str(&raw) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(target: "acquire", error = %e, path = %path.display(), "cache entry corrupt, ignoring");
                return None;
            }
        };
        if file.day != day.format("%Y-%m-%d").to_string() {
            return None;
        }
        self.lock().insert(key, file.body.clone());
        Some(file.body)
    }

    pub fn put(&self, target: &FetchTarget, day: NaiveDate, body: &str) {
        let key = cache_key(target, day);
        self.lock().insert(key.clone(), body.to_string());
        if let Some(dir) = &self.dir {
            let file = CacheFile {
                day: day.format("%Y-%m-%d").to_string(),
                body: body.to_string(),
            };
            if let Err(e) = write_entry(dir, &key, &file) {
                tracing::warn!(target: "acquire", error = %e, "cache write failed");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry not fetched on `today`, in memory and on disk.
    pub fn prune(&self, today: NaiveDate) -> usize {
        let prefix = format!("{}-", today.format("%Y%m%d"));
        let mut removed = 0;
        {
            let mut g = self.lock();
            let before = g.len();
            g.retain(|k, _| k.starts_with(&prefix));
            removed += before - g.len();
        }
        if let Some(dir) = &self.dir {
            if let Ok(entries) = fs::read_dir(dir) {
                for e in entries.flatten() {
                    let name = e.file_name().to_string_lossy().to_string();
                    if name.ends_with(".json") && !name.starts_with(&prefix) && fs::remove_file(e.path()).is_ok() {
                        removed += 1;
                    }
                }
            }
        }
        removed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.mem.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn cache_key(target: &FetchTarget, day: NaiveDate) -> String {
    let mut h = Sha256::new();
    h.update(target.kind.as_str().as_bytes());
    h.update(b"|");
    h.update(target.endpoint.as_bytes());
    let digest = h.finalize();
    let short: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("{}-{short}", day.format("%Y%m%d"))
}

fn write_entry(dir: &Path, key: &str, file: &CacheFile) -> std::io::Result<()> {
    let path = dir.join(format!("{key}.json"));
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(file).map_err(std::io::Error::other)?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)
}
