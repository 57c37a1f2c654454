// tests/extract_relevance.rs
//
// Extraction validity gate and the relevance boundary.

use std::sync::Arc;

use chrono::Utc;
use community_event_discovery::event::{CandidateEvent, Platform, RawContent, SourceKind};
use community_event_discovery::extract::{Extractor, ExtractorConfig};
use community_event_discovery::relevance::{
    filter_relevant, KeywordPolicy, RelevancePolicy, Taxonomy,
};

fn raw(body: &str) -> RawContent {
    RawContent {
        source_ref: "Listing".into(),
        endpoint: "https://listing.example".into(),
        kind: SourceKind::Read,
        body: body.into(),
        fetched_at: Utc::now(),
        cost_units: 3,
        from_cache: false,
    }
}

fn extractor() -> Extractor {
    Extractor::new(ExtractorConfig::default(), Arc::new(Taxonomy::default_seed()))
}

fn candidate(title: &str) -> CandidateEvent {
    CandidateEvent {
        id: "c".into(),
        title: title.into(),
        description: String::new(),
        occurs_at: Utc::now(),
        date_uncertain: false,
        location: "Leeds".into(),
        organizer: "Someone".into(),
        price_text: "£4".into(),
        tags: Default::default(),
        source: "test".into(),
        platform: Platform::Community,
        source_url: String::new(),
        relevance_score: None,
        quality_score: None,
        is_demo: false,
    }
}

#[test]
fn three_char_heading_yields_nothing() {
    assert!(extractor().extract(&raw("# Hi")).is_empty());
}

#[test]
fn labels_and_urls_are_not_titles() {
    let body = "## Date: 12/05/2027\n**https://example.com/page**\n### Upcoming events this month:\n";
    assert!(extractor().extract(&raw(body)).is_empty());
}

#[test]
fn one_keyword_is_enough() {
    let policy = KeywordPolicy::new(Arc::new(Taxonomy::default_seed()));
    let r = policy.assess(&candidate("Queer film screening night"));
    assert!(r.relevant);
    assert_eq!(r.matched, vec!["queer".to_string()]);
}

#[test]
fn no_keyword_is_dropped() {
    let policy = KeywordPolicy::new(Arc::new(Taxonomy::default_seed()));
    assert!(!policy.is_relevant(&candidate("Allotment open morning for gardeners")));

    let (kept, dropped) = filter_relevant(
        &policy,
        vec![
            candidate("Allotment open morning for gardeners"),
            candidate("Black queer book swap"),
        ],
    );
    assert_eq!(dropped, 1);
    assert_eq!(kept.len(), 1);
    assert!(kept[0].tags.contains("queer") && kept[0].tags.contains("black"));
    assert!(kept[0].relevance_score.unwrap() > 0.0);
}

#[test]
fn taxonomy_file_replaces_seed() {
    let t = Taxonomy::from_toml_str("identity = [\"Sapphic\"]\n").unwrap();
    let policy = KeywordPolicy::new(Arc::new(t));
    assert!(policy.is_relevant(&candidate("Sapphic supper club")));
    assert!(!policy.is_relevant(&candidate("Queer film screening night")));
    assert!(Taxonomy::from_toml_str("identity = []\n").is_err());
}
