// src/acquire/mock.rs
//! Deterministic stand-in used when no reader/search credential is configured.
//! Bodies mimic the upstream wire shapes (page markdown, numbered search text,
//! RSS XML) so the normal conversion and extraction path runs on them.

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate};

use super::{ContentSource, FetchTarget};
use crate::error::AcquisitionError;
use crate::event::SourceKind;

#[derive(Debug, Clone, Default)]
pub struct MockContentSource {
    /// Fixed anchor day for reproducible output; `None` means today.
    anchor: Option<NaiveDate>,
}

impl MockContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn anchored_at(day: NaiveDate) -> Self {
        Self { anchor: Some(day) }
    }

    fn day_plus(&self, days: i64) -> String {
        let base = self.anchor.unwrap_or_else(|| Local::now().date_naive());
        (base + Duration::days(days)).format("%d/%m/%Y").to_string()
    }

    fn page(&self, t: &FetchTarget) -> String {
        format!(
            "Upcoming from {name}\n\n\
### QTIPOC+ Community Workshop @ Community Hub, London\n\
Date: {d1}\n\
Time: 6:30 PM\n\
Organiser: Community Collective\n\
Price: Free\n\
Link: {url}\n\n\
An evening workshop for queer and trans people of colour to share skills, stories and food in a welcoming space.\n\n\
### Black Queer Book Club | Online\n\
Date: {d2}\n\
Location: Online via Zoom\n\
Price: Pay what you can\n\n\
Monthly reading circle centring Black queer writers, open to newcomers and regulars alike.\n",
            name = t.source_name,
            url = t.endpoint,
            d1 = self.day_plus(7),
            d2 = self.day_plus(12),
        )
    }

    fn search(&self, t: &FetchTarget) -> String {
        format!(
            "[1] Title: Black Trans Joy Workshop - London\n\
[1] URL Source: https://example.com/event1\n\
[1] Description: Join us on {d1} for an empowering workshop celebrating Black trans joy and resilience. Matched query: {q}\n\
[2] Title: QTIPOC Poetry Night - Manchester\n\
[2] URL Source: https://example.com/event2\n\
[2] Description: An evening of poetry and performance by queer and trans people of colour on {d2}.\n",
            q = t.endpoint,
            d1 = self.day_plus(9),
            d2 = self.day_plus(16),
        )
    }

    fn feed(&self, t: &FetchTarget) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
<title>{name}</title>
<item>
<title>Black Pride Community Picnic</title>
<link>https://example.com/picnic</link>
<description>Bring food and friends on {d} for a free afternoon picnic with Black LGBTQ+ community groups.</description>
</item>
</channel></rss>"#,
            name = html_escape::encode_text(&t.source_name),
            d = self.day_plus(20),
        )
    }
}

#[async_trait]
impl ContentSource for MockContentSource {
    async fn fetch(&self, target: &FetchTarget) -> Result<String, AcquisitionError> {
        Ok(match target.kind {
            SourceKind::Read => self.page(target),
            SourceKind::Search => self.search(target),
            SourceKind::Feed => self.feed(target),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_metered(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::{feed::feed_to_markdown, search::search_results_to_markdown};

    #[tokio::test]
    async fn mock_bodies_convert_cleanly() {
        let m = MockContentSource::anchored_at(NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());
        let page = m
            .fetch(&FetchTarget::new("Org", "https://org.example", SourceKind::Read))
            .await
            .unwrap();
        assert!(page.contains("Date: 23/10/2026"));

        let s = m
            .fetch(&FetchTarget::new("q", "queer events", SourceKind::Search))
            .await
            .unwrap();
        assert_eq!(search_results_to_markdown(&s).matches("### ").count(), 2);

        let f = m
            .fetch(&FetchTarget::new("Feed & Co", "https://org.example/feed", SourceKind::Feed))
            .await
            .unwrap();
        assert!(feed_to_markdown(&f).unwrap().contains("### Black Pride Community Picnic"));
    }
}
