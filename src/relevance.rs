// src/relevance.rs
//! Relevance gate: a disaggregated keyword taxonomy and the pluggable
//! `RelevancePolicy` that decides whether a candidate enters the pipeline.
//!
//! Matching is case-insensitive substring over title + description + tags.
//! The default `KeywordPolicy` favours recall: one taxonomy keyword, or one
//! high-value compound term, is enough.

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::event::CandidateEvent;

pub const DEFAULT_RELEVANCE_CONFIG_PATH: &str = "config/relevance.toml";
pub const ENV_RELEVANCE_CONFIG_PATH: &str = "RELEVANCE_CONFIG_PATH";

// Dev logging gate: RELEVANCE_DEV_LOG=1 AND dev env (debug or SHUTTLE_ENV in {local,development,dev})
pub(crate) fn dev_logging_enabled() -> bool {
    let on = std::env::var("RELEVANCE_DEV_LOG").ok().as_deref() == Some("1");
    if !on {
        return false;
    }
    if cfg!(debug_assertions) {
        return true;
    }
    matches!(
        std::env::var("SHUTTLE_ENV")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "local" | "development" | "dev"
    )
}

/// Short stable id for log lines.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("relevance_kept_total", "Candidates that passed the relevance gate.");
        describe_counter!("relevance_dropped_total", "Candidates discarded as not relevant.");
    });
}

/// Keyword groups. `identity`, `community` and `cultural` drive both tagging
/// and relevance; `high_value` compounds pass on their own; `density` is the
/// core list the quality scorer measures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxonomy {
    #[serde(default)]
    pub identity: Vec<String>,
    #[serde(default)]
    pub community: Vec<String>,
    #[serde(default)]
    pub cultural: Vec<String>,
    #[serde(default)]
    pub high_value: Vec<String>,
    #[serde(default)]
    pub density: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Taxonomy {
    pub fn default_seed() -> Self {
        Self {
            identity: words(&[
                "queer", "lgbtq", "lgbt", "lesbian", "gay", "bisexual", "pansexual", "asexual",
                "trans", "transgender", "non-binary", "nonbinary", "genderqueer", "intersex",
                "qtipoc", "qpoc",
            ]),
            community: words(&[
                "black", "poc", "bpoc", "bipoc", "people of colour", "people of color", "african",
                "caribbean", "afro", "south asian", "east asian", "latinx", "indigenous",
                "mixed heritage", "diaspora",
            ]),
            cultural: words(&[
                "community", "healing", "justice", "liberation", "empowerment", "wellness",
                "workshop", "celebration", "pride", "activism", "solidarity", "safe space",
                "inclusive", "intersectional", "joy", "mutual aid",
            ]),
            high_value: words(&["qtipoc", "bpoc", "bipoc", "black lgb", "black queer", "queer poc"]),
            density: words(&["black", "qtipoc", "queer", "trans", "transgender", "lgbtq", "poc", "bipoc"]),
        }
    }

    /// Load from `$RELEVANCE_CONFIG_PATH` or `config/relevance.toml`.
    pub fn from_toml() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_RELEVANCE_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_RELEVANCE_CONFIG_PATH));
        let content = fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!("Failed to read relevance config at {}: {}", path.display(), e)
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let t: Taxonomy = toml::from_str(toml_str)?;
        let t = t.lowercased();
        if t.keywords().next().is_none() && t.high_value.is_empty() {
            anyhow::bail!("relevance taxonomy has no keywords");
        }
        Ok(t)
    }

    /// `from_toml()`, or the built-in seed when no file is usable.
    pub fn load_default() -> Self {
        match Self::from_toml() {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(target: "relevance", error = %e, "using built-in taxonomy");
                Self::default_seed()
            }
        }
    }

    fn lowercased(mut self) -> Self {
        for list in [
            &mut self.identity,
            &mut self.community,
            &mut self.cultural,
            &mut self.high_value,
            &mut self.density,
        ] {
            for w in list.iter_mut() {
                *w = w.trim().to_lowercase();
            }
            list.retain(|w| !w.is_empty());
        }
        self
    }

    /// Tagging keywords (identity, community, cultural).
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.identity
            .iter()
            .chain(&self.community)
            .chain(&self.cultural)
            .map(String::as_str)
    }

    /// Distinct tagging keywords present in already-lowercased `text`.
    pub fn matches(&self, text: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for k in self.keywords() {
            if text.contains(k) && !out.iter().any(|m| m == k) {
                out.push(k.to_string());
            }
        }
        out
    }

    fn groups(&self) -> [(&'static str, &[String]); 3] {
        [
            ("identity", &self.identity),
            ("community", &self.community),
            ("cultural", &self.cultural),
        ]
    }
}

/// Outcome of one relevance check.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Relevance {
    pub relevant: bool,
    /// Share of keyword groups hit, in `[0, 1]`.
    pub score: f32,
    pub matched: Vec<String>,
    pub reasons: Vec<String>,
}

/// Pluggable relevance decision. Implementations must be deterministic for a
/// given candidate.
pub trait RelevancePolicy: Send + Sync {
    fn assess(&self, candidate: &CandidateEvent) -> Relevance;

    fn is_relevant(&self, candidate: &CandidateEvent) -> bool {
        self.assess(candidate).relevant
    }
}

/// Keyword-substring policy over a `Taxonomy`.
#[derive(Debug, Clone)]
pub struct KeywordPolicy {
    taxonomy: std::sync::Arc<Taxonomy>,
    min_matches: usize,
}

impl KeywordPolicy {
    pub fn new(taxonomy: std::sync::Arc<Taxonomy>) -> Self {
        ensure_metrics_described();
        Self {
            taxonomy,
            min_matches: 1,
        }
    }

    pub fn with_min_matches(mut self, n: usize) -> Self {
        self.min_matches = n.max(1);
        self
    }
}

impl RelevancePolicy for KeywordPolicy {
    fn assess(&self, candidate: &CandidateEvent) -> Relevance {
        let text = candidate.search_text();
        let mut reasons = Vec::new();

        let mut groups_hit = 0usize;
        for (name, list) in self.taxonomy.groups() {
            if list.iter().any(|k| text.contains(k.as_str())) {
                groups_hit += 1;
                reasons.push(format!("group:{name}"));
            }
        }
        let high: Vec<&String> = self
            .taxonomy
            .high_value
            .iter()
            .filter(|k| text.contains(k.as_str()))
            .collect();
        for h in &high {
            reasons.push(format!("high_value:{h}"));
        }

        let matched = self.taxonomy.matches(&text);
        let relevant = matched.len() >= self.min_matches || !high.is_empty();
        Relevance {
            relevant,
            score: groups_hit as f32 / 3.0,
            matched,
            reasons,
        }
    }
}

/// Apply `policy`, annotating survivors with score and matched tags.
/// Returns the kept candidates and the number dropped.
pub fn filter_relevant(
    policy: &dyn RelevancePolicy,
    candidates: Vec<CandidateEvent>,
) -> (Vec<CandidateEvent>, usize) {
    let mut kept = Vec::with_capacity(candidates.len());
    let mut dropped = 0usize;
    for mut c in candidates {
        let r = policy.assess(&c);
        if dev_logging_enabled() {
            info!(
                target: "relevance",
                id = %anon_hash(&c.title),
                score = r.score,
                relevant = r.relevant,
                reasons = ?r.reasons.iter().take(5).collect::<Vec<_>>()
            );
        }
        if !r.relevant {
            dropped += 1;
            continue;
        }
        c.relevance_score = Some(r.score);
        c.tags.extend(r.matched);
        kept.push(c);
    }
    counter!("relevance_kept_total").increment(kept.len() as u64);
    counter!("relevance_dropped_total").increment(dropped as u64);
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Platform;
    use chrono::Utc;
    use std::sync::Arc;

    pub(crate) fn candidate(title: &str, description: &str) -> CandidateEvent {
        CandidateEvent {
            id: "t".into(),
            title: title.into(),
            description: description.into(),
            occurs_at: Utc::now(),
            date_uncertain: false,
            location: "London".into(),
            organizer: "Someone".into(),
            price_text: "TBD".into(),
            tags: Default::default(),
            source: "test".into(),
            platform: Platform::Community,
            source_url: String::new(),
            relevance_score: None,
            quality_score: None,
            is_demo: false,
        }
    }

    fn policy() -> KeywordPolicy {
        KeywordPolicy::new(Arc::new(Taxonomy::default_seed()))
    }

    #[test]
    fn single_keyword_is_enough() {
        let r = policy().assess(&candidate("A queer evening out", ""));
        assert!(r.relevant);
        assert_eq!(r.matched, vec!["queer".to_string()]);
    }

    #[test]
    fn no_terms_is_irrelevant() {
        let r = policy().assess(&candidate("Quarterly accounting seminar", "Spreadsheets and tax returns explained for small firms."));
        assert!(!r.relevant);
        assert!(r.matched.is_empty());
        assert_eq!(r.score, 0.0);
    }

    #[test]
    fn score_counts_groups() {
        let r = policy().assess(&candidate("Black trans healing workshop", ""));
        assert!((r.score - 1.0).abs() < 1e-6);
        assert!(r.reasons.contains(&"group:identity".to_string()));
    }

    #[test]
    fn high_value_compound_passes_alone() {
        let tax = Taxonomy {
            identity: vec![],
            community: vec![],
            cultural: vec![],
            high_value: vec!["queer poc".into()],
            density: vec![],
        };
        let p = KeywordPolicy::new(Arc::new(tax));
        assert!(p.is_relevant(&candidate("Queer POC brunch", "")));
    }

    #[test]
    fn filter_annotates_and_counts() {
        let (kept, dropped) = filter_relevant(
            &policy(),
            vec![
                candidate("Black joy picnic in the park", ""),
                candidate("Used car auction", ""),
            ],
        );
        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 1);
        assert!(kept[0].tags.contains("black"));
        assert!(kept[0].tags.contains("joy"));
        assert!(kept[0].relevance_score.is_some());
    }

    #[test]
    fn toml_taxonomy_is_lowercased_and_validated() {
        let t = Taxonomy::from_toml_str(
            r#"
identity = ["  QUEER "]
high_value = ["Queer POC"]
"#,
        )
        .unwrap();
        assert_eq!(t.identity, vec!["queer".to_string()]);
        assert_eq!(t.high_value, vec!["queer poc".to_string()]);
        assert!(Taxonomy::from_toml_str("identity = []").is_err());
    }
}
