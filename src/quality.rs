// src/quality.rs
//! Composite quality score in [0,1] and the threshold/rank step.
//!
//! score = relevance * density          (core-term hit ratio)
//!       + date       * proximity       (1.0 within 30 days, 0.5 within 90)
//!       + completeness * filled/4      (title, description, location, organiser)
//!       + accessibility * [free | sliding scale]
//!       + source     * [platform on allow-list]
//!
//! Default weights 0.4 / 0.2 / 0.2 / 0.1 / 0.1.

use chrono::NaiveDate;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::event::{is_generic_organizer, CandidateEvent};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub relevance: f32,
    pub date: f32,
    pub completeness: f32,
    pub accessibility: f32,
    pub source: f32,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            relevance: 0.4,
            date: 0.2,
            completeness: 0.2,
            accessibility: 0.1,
            source: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Candidates scoring below this are dropped.
    pub threshold: f32,
    /// Platforms treated as reliable sources.
    pub reliable_platforms: Vec<String>,
    pub weights: QualityWeights,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            threshold: 0.4,
            reliable_platforms: vec!["eventbrite".into(), "facebook".into(), "outsavvy".into()],
            weights: QualityWeights::default(),
        }
    }
}

/// Per-signal contributions (already weighted).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct QualityBreakdown {
    pub relevance: f32,
    pub date: f32,
    pub completeness: f32,
    pub accessibility: f32,
    pub source: f32,
}

impl QualityBreakdown {
    pub fn total(&self) -> f32 {
        (self.relevance + self.date + self.completeness + self.accessibility + self.source).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Default)]
pub struct RankOutcome {
    pub ranked: Vec<CandidateEvent>,
    pub dropped: usize,
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("quality_dropped_total", "Candidates below the quality threshold.");
    });
}

#[derive(Debug, Clone)]
pub struct QualityScorer {
    cfg: QualityConfig,
    density_terms: Vec<String>,
}

impl QualityScorer {
    pub fn new(cfg: QualityConfig, density_terms: Vec<String>) -> Self {
        ensure_metrics_described();
        let density_terms = density_terms.into_iter().map(|t| t.to_lowercase()).collect();
        Self { cfg, density_terms }
    }

    pub fn threshold(&self) -> f32 {
        self.cfg.threshold
    }

    pub fn breakdown(&self, c: &CandidateEvent, today: NaiveDate) -> QualityBreakdown {
        let w = &self.cfg.weights;
        let text = c.search_text();

        let density = if self.density_terms.is_empty() {
            0.0
        } else {
            let hits = self.density_terms.iter().filter(|t| text.contains(t.as_str())).count();
            hits as f32 / self.density_terms.len() as f32
        };

        let days = (c.occurs_on() - today).num_days();
        let proximity = match days {
            0..=30 => 1.0,
            31..=90 => 0.5,
            _ => 0.0,
        };

        let filled = [
            c.title.trim().chars().count() > 5,
            c.has_description(),
            c.has_location(),
            !is_generic_organizer(&c.organizer),
        ]
        .iter()
        .filter(|x| **x)
        .count();

        let price = c.price_text.to_lowercase();
        let accessible = price.contains("free") || price.contains("sliding scale");

        let reliable = self
            .cfg
            .reliable_platforms
            .iter()
            .any(|p| p.eq_ignore_ascii_case(c.platform.as_str()));

        QualityBreakdown {
            relevance: w.relevance * density,
            date: w.date * proximity,
            completeness: w.completeness * filled as f32 / 4.0,
            accessibility: if accessible { w.accessibility } else { 0.0 },
            source: if reliable { w.source } else { 0.0 },
        }
    }

    pub fn score(&self, c: &CandidateEvent, today: NaiveDate) -> f32 {
        self.breakdown(c, today).total()
    }

    /// Score, drop below threshold, sort by score desc then date asc.
    pub fn rank(&self, candidates: Vec<CandidateEvent>, today: NaiveDate) -> RankOutcome {
        let mut out = RankOutcome::default();
        for mut c in candidates {
            let s = self.score(&c, today);
            c.quality_score = Some(s);
            if s < self.cfg.threshold {
                tracing::debug!(target: "quality", title = %c.title, score = s, "below threshold");
                out.dropped += 1;
                continue;
            }
            out.ranked.push(c);
        }
        out.ranked.sort_by(|a, b| {
            let sa = a.quality_score.unwrap_or(0.0);
            let sb = b.quality_score.unwrap_or(0.0);
            sb.total_cmp(&sa).then_with(|| a.occurs_at.cmp(&b.occurs_at))
        });
        counter!("quality_dropped_total").increment(out.dropped as u64);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Platform, DESCRIPTION_PENDING, GENERIC_ORGANIZER, LOCATION_TBA};
    use chrono::{Duration, TimeZone, Utc};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn scorer() -> QualityScorer {
        QualityScorer::new(
            QualityConfig::default(),
            crate::relevance::Taxonomy::default_seed().density,
        )
    }

    fn at(days: i64) -> chrono::DateTime<Utc> {
        Utc.from_utc_datetime(&(today() + Duration::days(days)).and_hms_opt(18, 0, 0).unwrap())
    }

    fn complete() -> CandidateEvent {
        CandidateEvent {
            id: "full".into(),
            title: "Black QTIPOC queer trans and transgender LGBTQ POC BIPOC gathering".into(),
            description: "An afternoon of food, music and conversation for our communities.".into(),
            occurs_at: at(5),
            date_uncertain: false,
            location: "Rich Mix, London".into(),
            organizer: "UK Black Pride".into(),
            price_text: "Free".into(),
            tags: Default::default(),
            source: "UK Black Pride".into(),
            platform: Platform::Eventbrite,
            source_url: "https://www.eventbrite.co.uk/e/1".into(),
            relevance_score: None,
            quality_score: None,
            is_demo: false,
        }
    }

    #[test]
    fn complete_near_free_reliable_scores_high() {
        let s = scorer().score(&complete(), today());
        assert!(s >= 0.9, "score {s}");
    }

    #[test]
    fn sparse_distant_candidate_scores_low_and_is_dropped() {
        let mut c = complete();
        c.title = "Neighbourhood queer meetup".into();
        c.description = DESCRIPTION_PENDING.into();
        c.location = LOCATION_TBA.into();
        c.organizer = GENERIC_ORGANIZER.into();
        c.price_text = "£10".into();
        c.platform = Platform::Community;
        c.occurs_at = at(200);
        let s = scorer().score(&c, today());
        assert!(s <= 0.3, "score {s}");
        let out = scorer().rank(vec![c], today());
        assert!(out.ranked.is_empty());
        assert_eq!(out.dropped, 1);
    }

    #[test]
    fn unknown_price_does_not_cost_completeness() {
        let mut c = complete();
        c.title = "Queer supper club".into();
        c.description = DESCRIPTION_PENDING.into();
        c.price_text = crate::event::PRICE_TBD.into();
        c.platform = Platform::Community;
        let s = scorer();
        let b = s.breakdown(&c, today());
        assert!((b.completeness - 0.15).abs() < 1e-6, "{b:?}");
        assert!((b.total() - 0.40).abs() < 1e-6, "{b:?}");
        let out = s.rank(vec![c], today());
        assert_eq!(out.ranked.len(), 1);
        assert_eq!(out.dropped, 0);
    }

    #[test]
    fn short_title_is_not_complete() {
        let mut c = complete();
        let full = scorer().breakdown(&c, today()).completeness;
        c.title = "Pride".into();
        let short = scorer().breakdown(&c, today()).completeness;
        assert!((full - short - 0.05).abs() < 1e-6);
    }

    #[test]
    fn proximity_bands() {
        let s = scorer();
        let mut c = complete();
        c.occurs_at = at(30);
        assert!((s.breakdown(&c, today()).date - 0.2).abs() < 1e-6);
        c.occurs_at = at(31);
        assert!((s.breakdown(&c, today()).date - 0.1).abs() < 1e-6);
        c.occurs_at = at(-1);
        assert_eq!(s.breakdown(&c, today()).date, 0.0);
    }

    #[test]
    fn rank_orders_by_score_then_date() {
        let s = scorer();
        let a = complete();
        let mut b = complete();
        b.id = "later".into();
        b.occurs_at = at(6);
        let mut c = complete();
        c.id = "weaker".into();
        c.price_text = "£5".into();
        let out = s.rank(vec![c, b, a], today());
        let ids: Vec<_> = out.ranked.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["full", "later", "weaker"]);
        assert!(out.ranked.iter().all(|e| e.quality_score.is_some()));
    }
}
