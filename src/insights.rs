// src/insights.rs
//! Community intelligence over a candidate list: what people are talking
//! about, who is organising, where, and how accessible it is.

use serde::Serialize;
use std::collections::HashMap;

use crate::event::{is_generic_organizer, CandidateEvent, DATE_UNCERTAIN_TAG, DEMO_TAG};

const TOP_N: usize = 10;
const ACCESSIBILITY_TERMS: &[&str] = &["free", "accessible", "wheelchair", "sliding scale", "pay what you can"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Count {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityInsights {
    pub trending_topics: Vec<Count>,
    /// Organisers with at least two events.
    pub emerging_organizers: Vec<Count>,
    pub location_hotspots: Vec<Count>,
    /// Percentage of events with an accessibility signal.
    pub accessibility_score: f32,
    pub events_analyzed: usize,
}

/// Demonstration records are ignored.
pub fn analyze(events: &[CandidateEvent]) -> CommunityInsights {
    let real: Vec<&CandidateEvent> = events.iter().filter(|e| !e.is_demo).collect();
    if real.is_empty() {
        return CommunityInsights::default();
    }

    let mut topics: HashMap<String, usize> = HashMap::new();
    let mut organizers: HashMap<String, usize> = HashMap::new();
    let mut places: HashMap<String, usize> = HashMap::new();
    let mut accessible = 0usize;

    for e in &real {
        for t in e.tags.iter().filter(|t| *t != DEMO_TAG && *t != DATE_UNCERTAIN_TAG) {
            *topics.entry(t.clone()).or_default() += 1;
        }
        if !is_generic_organizer(&e.organizer) {
            *organizers.entry(e.organizer.trim().to_string()).or_default() += 1;
        }
        if e.has_location() {
            let area = e.location.split(',').next().unwrap_or_default().trim();
            if !area.is_empty() {
                *places.entry(area.to_string()).or_default() += 1;
            }
        }
        let text = format!("{} {}", e.price_text, e.description).to_lowercase();
        if ACCESSIBILITY_TERMS.iter().any(|t| text.contains(t)) {
            accessible += 1;
        }
    }

    organizers.retain(|_, n| *n >= 2);

    CommunityInsights {
        trending_topics: top(topics),
        emerging_organizers: top(organizers),
        location_hotspots: top(places),
        accessibility_score: accessible as f32 / real.len() as f32 * 100.0,
        events_analyzed: real.len(),
    }
}

/// Highest counts first, ties by name, capped at `TOP_N`.
fn top(map: HashMap<String, usize>) -> Vec<Count> {
    let mut v: Vec<Count> = map.into_iter().map(|(name, count)| Count { name, count }).collect();
    v.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    v.truncate(TOP_N);
    v
}
