// src/acquire/feed.rs
//! RSS 2.0 → markdown. Each `<item>` becomes a level-3 heading section so the
//! extractor treats feed entries exactly like listing-page entries.

use metrics::{counter, histogram};
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;

use crate::error::AcquisitionError;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
}

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\r\n]+").unwrap());

/// Convert an RSS document to markdown. Items without a title are skipped.
pub fn feed_to_markdown(xml: &str) -> Result<String, AcquisitionError> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).map_err(|e| AcquisitionError::Parse(format!("rss: {e}")))?;

    let mut out = String::new();
    if let Some(t) = rss.channel.title.as_deref().map(flatten).filter(|t| !t.is_empty()) {
        // plain line, not a heading: channel names are not events
        out.push_str(&format!("Feed: {t}\n\n"));
    }

    let mut items = 0u64;
    for it in rss.channel.item {
        let title = it.title.as_deref().map(flatten).unwrap_or_default();
        if title.is_empty() {
            continue;
        }
        items += 1;
        out.push_str(&format!("### {title}\n"));
        if let Some(link) = it.link.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            out.push_str(&format!("URL: {link}\n"));
        }
        if let Some(desc) = it.description.as_deref().map(flatten).filter(|d| !d.is_empty()) {
            out.push('\n');
            out.push_str(&desc);
            out.push('\n');
        }
        out.push('\n');
    }

    histogram!("feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    counter!("feed_items_total").increment(items);
    Ok(out)
}

/// Decode entities, drop tags, collapse whitespace onto one line.
fn flatten(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();
    let no_tags = RE_TAGS.replace_all(&decoded, " ");
    RE_WS.replace_all(&no_tags, " ").trim().to_string()
}

// quick-xml only knows the five XML entities; HTML ones in feeds break parsing.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&pound;", "£")
        .replace("&hellip;", "...")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
<title>UK Black Pride</title>
<item>
  <title>Black Pride Picnic &ndash; Hackney</title>
  <link>https://www.ukblackpride.org.uk/picnic</link>
  <description>&lt;p&gt;Join us on 14/06/2027 for a &lt;b&gt;free&lt;/b&gt; community picnic.&lt;/p&gt;</description>
</item>
<item>
  <link>https://www.ukblackpride.org.uk/untitled</link>
</item>
</channel></rss>"#;

    #[test]
    fn items_become_heading_sections() {
        let md = feed_to_markdown(FEED).unwrap();
        assert!(md.contains("### Black Pride Picnic - Hackney\n"));
        assert!(md.contains("URL: https://www.ukblackpride.org.uk/picnic"));
        assert!(md.contains("Join us on 14/06/2027 for a free community picnic."));
        // untitled item dropped, channel title is not a heading
        assert_eq!(md.matches("### ").count(), 1);
        assert!(md.starts_with("Feed: UK Black Pride"));
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let err = feed_to_markdown("<rss><channel><item>").unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn empty_channel_is_fine() {
        let md = feed_to_markdown("<rss><channel><title>x</title></channel></rss>").unwrap();
        assert!(!md.contains("###"));
    }
}
