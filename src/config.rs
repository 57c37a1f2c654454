// src/config.rs
//! Engine configuration.
//!
//! Resolution order:
//! 1) `$DISCOVERY_CONFIG_PATH` (must exist when set)
//! 2) `config/discovery.toml`
//! 3) built-in defaults
//!
//! Then env overrides: `JINA_API_KEY`, `DISCOVERY_DAILY_BUDGET`, `DISCOVERY_STATE_DIR`.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::acquire::{CostTable, JinaEndpoints};
use crate::event::Source;
use crate::extract::ExtractorConfig;
use crate::orchestrator::Strategy;
use crate::quality::QualityConfig;
use crate::sources::{QueryPattern, SourceCatalog};

pub const ENV_CONFIG_PATH: &str = "DISCOVERY_CONFIG_PATH";
pub const ENV_API_KEY: &str = "JINA_API_KEY";
pub const ENV_DAILY_BUDGET: &str = "DISCOVERY_DAILY_BUDGET";
pub const ENV_STATE_DIR: &str = "DISCOVERY_STATE_DIR";
pub const DEFAULT_CONFIG_PATH: &str = "config/discovery.toml";

/// Maximum units a single run of each strategy may spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostCeilings {
    pub quick: u32,
    pub deep: u32,
    pub intelligent: u32,
}

impl Default for CostCeilings {
    fn default() -> Self {
        Self {
            quick: 20,
            deep: 50,
            intelligent: 30,
        }
    }
}

impl CostCeilings {
    pub fn for_strategy(&self, s: Strategy) -> u32 {
        match s {
            Strategy::Quick => self.quick,
            Strategy::Deep => self.deep,
            Strategy::Intelligent => self.intelligent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_runs: usize,
    pub retention_days: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_runs: 200,
            retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reader/search credential. Without one the mock content source is used.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub daily_budget: u32,
    pub costs: CostTable,
    pub timeout_secs: u64,
    /// Directory for ledger, dedup cache, content cache and history. `None` keeps state in memory.
    pub state_dir: Option<PathBuf>,
    pub ceilings: CostCeilings,
    /// Established sources read by the `quick` strategy.
    pub quick_source_limit: usize,
    /// Broad queries added to the `deep` strategy.
    pub deep_queries: Vec<String>,
    /// Return demonstration records when a run finds nothing.
    pub demo_fallback: bool,
    pub near_duplicate_threshold: f32,
    pub history: HistoryConfig,
    pub extractor: ExtractorConfig,
    pub quality: QualityConfig,
    pub jina: JinaEndpoints,
    /// Separate catalog file (TOML/JSON with `sources` + `patterns`).
    pub catalog_path: Option<PathBuf>,
    /// Inline sources. `None` means the built-in seed; `Some([])` means none.
    pub sources: Option<Vec<Source>>,
    pub patterns: Option<Vec<QueryPattern>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            daily_budget: 100,
            costs: CostTable::default(),
            timeout_secs: 30,
            state_dir: None,
            ceilings: CostCeilings::default(),
            quick_source_limit: 2,
            deep_queries: vec![
                "Black queer community events UK".to_string(),
                "QTIPOC workshops London".to_string(),
            ],
            demo_fallback: true,
            near_duplicate_threshold: crate::dedup::DEFAULT_NEAR_DUPLICATE_THRESHOLD,
            history: HistoryConfig::default(),
            extractor: ExtractorConfig::default(),
            quality: QualityConfig::default(),
            jina: JinaEndpoints::default(),
            catalog_path: None,
            sources: None,
            patterns: None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: EngineConfig = toml::from_str(s).context("parsing engine config")?;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading engine config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Resolve file (env → default path → built-in) and apply env overrides.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::from_path(&pb)?
        } else {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Self::from_path(&default)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn apply_env(&mut self) {
        if let Some(key) = std::env::var(ENV_API_KEY).ok().filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key.trim().to_string());
        }
        if let Ok(raw) = std::env::var(ENV_DAILY_BUDGET) {
            match raw.trim().parse::<u32>() {
                Ok(b) => self.daily_budget = b,
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid {ENV_DAILY_BUDGET}"),
            }
        }
        if let Some(dir) = std::env::var(ENV_STATE_DIR).ok().filter(|d| !d.trim().is_empty()) {
            self.state_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Catalog file if configured, else inline sources/patterns, else the seed.
    pub fn catalog(&self) -> SourceCatalog {
        if let Some(p) = &self.catalog_path {
            return SourceCatalog::load_from_file(p);
        }
        let seed = SourceCatalog::default_seed();
        SourceCatalog::new(
            self.sources.clone().unwrap_or(seed.sources),
            self.patterns.clone().unwrap_or(seed.patterns),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    struct EnvSnapshot(Vec<(&'static str, Option<String>)>);

    impl EnvSnapshot {
        fn take(keys: &[&'static str]) -> Self {
            Self(keys.iter().map(|k| (*k, env::var(k).ok())).collect())
        }
    }

    impl Drop for EnvSnapshot {
        fn drop(&mut self) {
            for (k, v) in &self.0 {
                match v {
                    Some(v) => env::set_var(k, v),
                    None => env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = EngineConfig::from_toml_str(
            r#"
daily_budget = 40
demo_fallback = false

[costs]
search = 6

[quality]
threshold = 0.5
"#,
        )
        .unwrap();
        assert_eq!(cfg.daily_budget, 40);
        assert!(!cfg.demo_fallback);
        assert_eq!(cfg.costs.search, 6);
        assert_eq!(cfg.costs.read, 3);
        assert!((cfg.quality.threshold - 0.5).abs() < 1e-6);
        assert_eq!(cfg.quality.reliable_platforms.len(), 3);
        assert_eq!(cfg.ceilings.for_strategy(Strategy::Deep), 50);
    }

    #[test]
    fn example_file_parses() {
        let cfg = EngineConfig::from_path(Path::new("config/discovery.example.toml")).unwrap();
        let catalog = cfg.catalog();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.established(5).len(), 1);
        assert_eq!(catalog.patterns.len(), 1);
        assert_eq!(cfg.jina, JinaEndpoints::default());
    }

    #[test]
    fn inline_sources_round_trip_through_toml() {
        let cfg = EngineConfig::from_toml_str(
            r#"
[[sources]]
name = "UK Black Pride"
url = "https://www.ukblackpride.org.uk/events"
reliability = 0.95
"#,
        )
        .unwrap();
        let expected = EngineConfig {
            sources: Some(vec![Source::new(
                "UK Black Pride",
                "https://www.ukblackpride.org.uk/events",
                crate::event::SourceKind::Read,
            )
            .with_reliability(0.95)]),
            ..EngineConfig::default()
        };
        assert_eq!(cfg, expected);
        assert_ne!(cfg, EngineConfig::default());
    }

    #[test]
    fn explicit_empty_sources_means_none() {
        let cfg = EngineConfig::from_toml_str("sources = []").unwrap();
        assert!(cfg.catalog().is_empty());
        let seeded = EngineConfig::default();
        assert!(!seeded.catalog().is_empty());
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_apply() {
        let _snap = EnvSnapshot::take(&[ENV_CONFIG_PATH, ENV_API_KEY, ENV_DAILY_BUDGET, ENV_STATE_DIR]);
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("discovery.toml");
        fs::write(&p, "daily_budget = 10\n").unwrap();

        env::set_var(ENV_CONFIG_PATH, &p);
        env::set_var(ENV_API_KEY, "  secret ");
        env::set_var(ENV_DAILY_BUDGET, "55");
        env::set_var(ENV_STATE_DIR, dir.path());

        let cfg = EngineConfig::load_default().unwrap();
        assert_eq!(cfg.api_key.as_deref(), Some("secret"));
        assert_eq!(cfg.daily_budget, 55);
        assert_eq!(cfg.state_dir.as_deref(), Some(dir.path()));
    }

    #[serial_test::serial]
    #[test]
    fn missing_env_path_is_an_error() {
        let _snap = EnvSnapshot::take(&[ENV_CONFIG_PATH]);
        env::set_var(ENV_CONFIG_PATH, "/definitely/not/here.toml");
        assert!(EngineConfig::load_default().is_err());
    }

    #[test]
    fn api_key_is_never_serialised() {
        let cfg = EngineConfig {
            api_key: Some("secret".into()),
            ..EngineConfig::default()
        };
        let out = serde_json::to_string(&cfg).unwrap();
        assert!(!out.contains("secret"));
    }
}
