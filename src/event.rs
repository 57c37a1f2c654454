// src/event.rs
//! Data model shared by every pipeline stage: sources, raw acquisition payloads,
//! and the candidate events handed to moderation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Location sentinel used when no strategy could place the event.
pub const LOCATION_TBA: &str = "Location TBA";
/// Price sentinel used when no price-like text was found.
pub const PRICE_TBD: &str = "TBD";
/// Description sentinel used when no paragraph was long enough.
pub const DESCRIPTION_PENDING: &str = "Community event details to be confirmed.";
/// Tag added to every demonstration record.
pub const DEMO_TAG: &str = "demo";
/// Tag added when the event date had to be synthesised.
pub const DATE_UNCERTAIN_TAG: &str = "date-uncertain";

/// How a source is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Render a web page to markdown.
    Read,
    /// Run a web search query.
    Search,
    /// Pull an RSS feed.
    Feed,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Read => "read",
            SourceKind::Search => "search",
            SourceKind::Feed => "feed",
        }
    }
}

/// A known origin to query or scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    /// URL for `read`/`feed`, query string for `search`.
    #[serde(alias = "url", alias = "query")]
    pub endpoint_or_url: String,
    #[serde(default = "default_kind")]
    pub kind: SourceKind,
    /// Trust in `[0.0, 1.0]`.
    #[serde(default = "default_reliability")]
    pub reliability: f32,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
}

fn default_kind() -> SourceKind {
    SourceKind::Read
}

fn default_reliability() -> f32 {
    0.5
}

impl Source {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            endpoint_or_url: endpoint.into(),
            kind,
            reliability: default_reliability(),
            last_checked_at: None,
        }
    }

    pub fn with_reliability(mut self, reliability: f32) -> Self {
        self.reliability = reliability.clamp(0.0, 1.0);
        self
    }
}

/// Unstructured payload returned by one acquisition call. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RawContent {
    /// Name of the source that produced the body.
    pub source_ref: String,
    /// URL or query the body was fetched for.
    pub endpoint: String,
    pub kind: SourceKind,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
    /// Units debited from the ledger (0 for cache hits and mock content).
    pub cost_units: u32,
    pub from_cache: bool,
}

/// Event platform inferred from a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Eventbrite,
    Facebook,
    Outsavvy,
    Meetup,
    Community,
}

impl Platform {
    pub fn from_url(url: &str) -> Self {
        let u = url.to_ascii_lowercase();
        if u.contains("eventbrite") {
            Platform::Eventbrite
        } else if u.contains("facebook") {
            Platform::Facebook
        } else if u.contains("outsavvy") {
            Platform::Outsavvy
        } else if u.contains("meetup") {
            Platform::Meetup
        } else {
            Platform::Community
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Eventbrite => "eventbrite",
            Platform::Facebook => "facebook",
            Platform::Outsavvy => "outsavvy",
            Platform::Meetup => "meetup",
            Platform::Community => "community",
        }
    }

    /// Organiser sentinel used when a page names nobody.
    pub fn organizer_sentinel(&self) -> &'static str {
        match self {
            Platform::Eventbrite => "Eventbrite Community",
            Platform::Outsavvy => "Outsavvy Community",
            Platform::Meetup => "Meetup Community",
            Platform::Facebook | Platform::Community => GENERIC_ORGANIZER,
        }
    }
}

/// Catch-all organiser sentinel.
pub const GENERIC_ORGANIZER: &str = "Community Organizer";

/// True for any organiser value that was filled in by a sentinel.
pub fn is_generic_organizer(name: &str) -> bool {
    let n = name.trim();
    n.is_empty()
        || [
            GENERIC_ORGANIZER,
            "Eventbrite Community",
            "Outsavvy Community",
            "Meetup Community",
        ]
        .iter()
        .any(|s| s.eq_ignore_ascii_case(n))
}

/// A structured guess extracted from `RawContent`, awaiting moderation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    pub occurs_at: DateTime<Utc>,
    /// Set when `occurs_at` was synthesised because no date pattern matched.
    pub date_uncertain: bool,
    pub location: String,
    pub organizer: String,
    pub price_text: String,
    pub tags: BTreeSet<String>,
    /// Name of the configured source that produced this record.
    pub source: String,
    pub platform: Platform,
    pub source_url: String,
    pub relevance_score: Option<f32>,
    pub quality_score: Option<f32>,
    pub is_demo: bool,
}

impl CandidateEvent {
    pub fn occurs_on(&self) -> NaiveDate {
        self.occurs_at.date_naive()
    }

    pub fn has_location(&self) -> bool {
        let l = self.location.trim();
        !l.is_empty() && !l.eq_ignore_ascii_case(LOCATION_TBA) && !l.eq_ignore_ascii_case("TBD")
    }

    pub fn has_description(&self) -> bool {
        self.description != DESCRIPTION_PENDING && self.description.trim().chars().count() > 20
    }

    /// Lowercased title + description + tags, the text every keyword check runs on.
    pub fn search_text(&self) -> String {
        let tags = self.tags.iter().cloned().collect::<Vec<_>>().join(" ");
        format!("{} {} {}", self.title, self.description, tags).to_lowercase()
    }
}
