// src/extract/mod.rs
//! Turns one `RawContent` body (markdown) into zero or more `CandidateEvent`s.
//!
//! Title candidates are collected in priority order (headings level 1-3,
//! then bold spans, then link texts), de-duplicated, and gated on length.
//! Every other field is resolved from the candidate's own text block through
//! ordered strategies, falling back to sentinels. Extraction never fails.

pub mod location;
pub mod strategies;

use chrono::{Duration, Local, NaiveDate, TimeZone, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::{Lazy, OnceCell};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::event::{
    CandidateEvent, Platform, RawContent, DATE_UNCERTAIN_TAG, DESCRIPTION_PENDING, LOCATION_TBA, PRICE_TBD,
};
use crate::relevance::Taxonomy;
use location::TITLE_LOCATION_STRATEGIES;
use strategies::{first_match, DATE_STRATEGIES, PRICE_STRATEGIES};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Valid title candidates kept per document.
    pub max_candidates: usize,
    /// Minimum title length in characters.
    pub min_title_chars: usize,
    /// A paragraph must be longer than this to become the description.
    pub min_description_chars: usize,
    pub max_description_chars: usize,
    /// Window (days from today, inclusive) for synthesised dates.
    pub undated_min_days: i64,
    pub undated_max_days: i64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_candidates: 10,
            min_title_chars: 10,
            min_description_chars: 50,
            max_description_chars: 300,
            undated_min_days: 7,
            undated_max_days: 67,
        }
    }
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("extract_candidates_total", "Candidate events produced by extraction.");
        describe_counter!(
            "extract_rejected_titles_total",
            "Title candidates rejected by the validity gate."
        );
        describe_counter!(
            "extract_degraded_fields_total",
            "Fields filled with a sentinel or synthesised value."
        );
    });
}

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<(?:script|style)[^>]*>.*?</(?:script|style)>|</?[a-z][^>]*>").unwrap());
static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s{0,3}(#{1,3})\s+(.+?)\s*#*\s*$").unwrap());
static RE_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*|__([^_\n]+?)__").unwrap());
static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(!?)\[([^\]\n]+)\]\(([^)\s]+)[^)]*\)").unwrap());
static RE_LABEL_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^[\s>*_-]*(?:date|time|when|location|venue|address|where|organi[sz]ed by|organi[sz]er|hosted by|host|presented by|by|price|cost|fee|tickets?|entry|url(?: source)?|link|register|feed)\s*[*_]*\s*:",
    )
    .unwrap()
});
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Decode entities, drop HTML tags, normalise curly quotes. Line structure is kept.
pub fn clean_markdown(body: &str) -> String {
    let decoded = html_escape::decode_html_entities(body).to_string();
    let stripped = RE_TAGS.replace_all(&decoded, "");
    stripped
        .replace("\r\n", "\n")
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
}

/// Strip inline markdown (links → text, emphasis, code ticks) and collapse whitespace.
pub fn clean_inline(s: &str) -> String {
    let no_links = RE_LINK.replace_all(s, "$2");
    let no_marks = no_links.replace(['*', '`'], "").replace("__", "");
    RE_WS.replace_all(no_marks.trim(), " ").trim().to_string()
}

/// A heading-delimited slice of the document.
#[derive(Debug)]
struct Section<'a> {
    heading: Option<String>,
    text: &'a str,
}

fn split_sections(doc: &str) -> Vec<Section<'_>> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut heading: Option<String> = None;
    let mut offset = 0usize;
    for line in doc.split_inclusive('\n') {
        if let Some(c) = RE_HEADING.captures(line.trim_end_matches('\n')) {
            if offset > start || heading.is_some() {
                out.push(Section {
                    heading: heading.take(),
                    text: &doc[start..offset],
                });
            }
            start = offset;
            heading = Some(c[2].to_string());
        }
        offset += line.len();
    }
    if offset > start || heading.is_some() {
        out.push(Section {
            heading,
            text: &doc[start..offset],
        });
    }
    out
}

#[derive(Debug, Clone)]
struct TitleCandidate {
    title: String,
    link: Option<String>,
    section: usize,
}

pub struct Extractor {
    cfg: ExtractorConfig,
    taxonomy: Arc<Taxonomy>,
}

impl Extractor {
    pub fn new(cfg: ExtractorConfig, taxonomy: Arc<Taxonomy>) -> Self {
        ensure_metrics_described();
        Self { cfg, taxonomy }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.cfg
    }

    pub fn extract(&self, raw: &RawContent) -> Vec<CandidateEvent> {
        let doc = clean_markdown(&raw.body);
        let sections = split_sections(&doc);
        let titles = self.title_candidates(&sections);
        let today = Local::now().date_naive();

        let out: Vec<CandidateEvent> = titles
            .into_iter()
            .map(|t| self.build(raw, &t, sections[t.section].text, today))
            .collect();

        counter!("extract_candidates_total").increment(out.len() as u64);
        tracing::debug!(target: "extract", source = %raw.source_ref, candidates = out.len(), "extracted");
        out
    }

    fn title_candidates(&self, sections: &[Section<'_>]) -> Vec<TitleCandidate> {
        let mut ordered: Vec<TitleCandidate> = Vec::new();

        for (i, s) in sections.iter().enumerate() {
            if let Some(h) = &s.heading {
                let link = RE_LINK
                    .captures(h)
                    .filter(|c| c[1].is_empty())
                    .map(|c| c[3].to_string());
                ordered.push(TitleCandidate {
                    title: clean_inline(h),
                    link,
                    section: i,
                });
            }
        }
        for (i, s) in sections.iter().enumerate() {
            for c in RE_BOLD.captures_iter(s.text) {
                let t = c.get(1).or_else(|| c.get(2)).map(|m| m.as_str()).unwrap_or_default();
                ordered.push(TitleCandidate {
                    title: clean_inline(t),
                    link: None,
                    section: i,
                });
            }
        }
        for (i, s) in sections.iter().enumerate() {
            for c in RE_LINK.captures_iter(s.text) {
                if !c[1].is_empty() {
                    continue; // image
                }
                ordered.push(TitleCandidate {
                    title: clean_inline(&c[2]),
                    link: Some(c[3].to_string()),
                    section: i,
                });
            }
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut valid = Vec::new();
        let mut rejected = 0u64;
        for cand in ordered {
            if valid.len() >= self.cfg.max_candidates {
                break;
            }
            let key = cand.title.to_lowercase();
            if !seen.insert(key) {
                continue;
            }
            if !self.is_valid_title(&cand.title) {
                rejected += 1;
                continue;
            }
            valid.push(cand);
        }
        if rejected > 0 {
            counter!("extract_rejected_titles_total").increment(rejected);
        }
        valid
    }

    fn is_valid_title(&self, t: &str) -> bool {
        let trimmed = t.trim();
        trimmed.chars().count() >= self.cfg.min_title_chars
            && !trimmed.ends_with(':')
            && !trimmed.starts_with("http")
            && !RE_LABEL_LINE.is_match(trimmed)
    }

    fn build(&self, raw: &RawContent, t: &TitleCandidate, block: &str, today: NaiveDate) -> CandidateEvent {
        let mut degraded: Vec<&'static str> = Vec::new();

        let source_url = t
            .link
            .clone()
            .filter(|l| l.starts_with("http"))
            .or_else(|| strategies::labelled_url(block))
            .unwrap_or_else(|| raw.endpoint.clone());
        let platform = Platform::from_url(&source_url);

        let (date, date_uncertain) = match first_match(DATE_STRATEGIES, block) {
            Some((_, d)) => (d, false),
            None => {
                degraded.push("date");
                (self.synthesize_date(today), true)
            }
        };
        // listings carry no zone; wall-clock time is stored as-is
        let time = strategies::time_of_day(block).unwrap_or_default();
        let occurs_at = Utc.from_utc_datetime(&date.and_time(time));

        let location = strategies::labelled_location(block)
            .or_else(|| first_match(TITLE_LOCATION_STRATEGIES, &t.title).map(|(_, l)| l))
            .unwrap_or_else(|| {
                degraded.push("location");
                LOCATION_TBA.to_string()
            });

        let organizer = strategies::labelled_organizer(block).unwrap_or_else(|| {
            degraded.push("organizer");
            platform.organizer_sentinel().to_string()
        });

        let price_text = first_match(PRICE_STRATEGIES, block)
            .map(|(_, p)| p)
            .unwrap_or_else(|| {
                degraded.push("price");
                PRICE_TBD.to_string()
            });

        let description = self.description(block).unwrap_or_else(|| {
            degraded.push("description");
            DESCRIPTION_PENDING.to_string()
        });

        let haystack = format!("{} {}", t.title, description).to_lowercase();
        let mut tags: BTreeSet<String> = self.taxonomy.matches(&haystack).into_iter().collect();
        if date_uncertain {
            tags.insert(DATE_UNCERTAIN_TAG.to_string());
        }

        if !degraded.is_empty() {
            counter!("extract_degraded_fields_total").increment(degraded.len() as u64);
            tracing::debug!(target: "extract", title = %t.title, fields = ?degraded, "degraded fields");
        }

        CandidateEvent {
            id: uuid::Uuid::new_v4().to_string(),
            title: t.title.clone(),
            description,
            occurs_at,
            date_uncertain,
            location,
            organizer,
            price_text,
            tags,
            source: raw.source_ref.clone(),
            platform,
            source_url,
            relevance_score: None,
            quality_score: None,
            is_demo: false,
        }
    }

    /// Random day inside the configured window.
    fn synthesize_date(&self, today: NaiveDate) -> NaiveDate {
        let lo = self.cfg.undated_min_days.min(self.cfg.undated_max_days);
        let hi = self.cfg.undated_min_days.max(self.cfg.undated_max_days);
        let days = rand::rng().random_range(lo..=hi);
        today + Duration::days(days)
    }

    /// First paragraph (labels and headings removed) longer than the minimum, truncated.
    fn description(&self, block: &str) -> Option<String> {
        block.split("\n\n").find_map(|para| {
            let body: Vec<&str> = para
                .lines()
                .filter(|l| !RE_HEADING.is_match(l) && !RE_LABEL_LINE.is_match(l))
                .collect();
            let text = clean_inline(&body.join(" "));
            if text.chars().count() <= self.cfg.min_description_chars {
                return None;
            }
            Some(truncate_chars(&text, self.cfg.max_description_chars))
        })
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut.trim_end())
}
