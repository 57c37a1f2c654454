// src/extract/location.rs
//! Location mining from titles like `Picnic @ Rich Mix, London | Eventbrite`
//! or `Picnic | Rich Mix, London | Sat 12 July` when the text block carries no
//! labelled location line.

use once_cell::sync::Lazy;
use regex::Regex;

use super::strategies::Strategy;

pub const TITLE_LOCATION_STRATEGIES: &[(&str, Strategy<String>)] = &[
    ("at_sign", at_sign),
    ("pipe_venue", pipe_venue),
    ("uk_postcode", uk_postcode),
    ("major_city", major_city),
    ("in_or_at", in_or_at),
];

const CITIES: &[&str] = &[
    "London",
    "Manchester",
    "Birmingham",
    "Leeds",
    "Liverpool",
    "Bristol",
    "Sheffield",
    "Newcastle",
    "Nottingham",
    "Leicester",
    "Brighton",
    "Glasgow",
];

static RE_AT_SIGN: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\s*([^|]+?)(?:\s*\||$)").unwrap());
static RE_NOT_VENUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\d{1,2}[/:.]\d{2}|\b(?:mon|tue|wed|thu|fri|sat|sun)(?:day)?\b|\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\s+\d|£|\$|\bfree\b",
    )
    .unwrap()
});
static RE_POSTCODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z]{1,2}\d{1,2}[A-Z]?\s?\d[A-Z]{2})\b").unwrap());
static RE_CITY: Lazy<Regex> = Lazy::new(|| {
    let alts = CITIES.join("|");
    Regex::new(&format!(r"(?i)\b({alts})\b")).unwrap()
});
static RE_VENUE_BEFORE_CITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:\bat|@)\s+([^,|@]+?)[,\s]*$").unwrap());
static RE_IN_AT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:in|at)\s+([A-Z][a-zA-Z\s]+?)(?:\s*[,|]|$)").unwrap());
static RE_PLATFORM_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[\s\-|]*\b(?:eventbrite|outsavvy|meetup|tickets?)\s*$").unwrap());

/// Trim platform suffixes and reject placeholders.
fn accept(candidate: &str) -> Option<String> {
    let cleaned = RE_PLATFORM_SUFFIX.replace(candidate.trim(), "");
    let cleaned = cleaned.trim().trim_end_matches(['-', ',']).trim();
    let lower = cleaned.to_ascii_lowercase();
    if cleaned.chars().count() <= 3 || matches!(lower.as_str(), "ticket" | "tickets" | "tbd" | "tba") {
        return None;
    }
    Some(cleaned.to_string())
}

/// Last `n` chars before byte offset `end`.
fn tail_chars(s: &str, end: usize, n: usize) -> &str {
    let head = &s[..end];
    let start = head
        .char_indices()
        .rev()
        .nth(n.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    &head[start..]
}

/// `Title @ Venue, City`.
pub fn at_sign(title: &str) -> Option<String> {
    RE_AT_SIGN.captures_iter(title).find_map(|c| accept(&c[1]))
}

/// `Title | Venue, City | Sat 12 July`: the first capitalised pipe segment
/// after the title that is not a date, price or platform.
pub fn pipe_venue(title: &str) -> Option<String> {
    title
        .split('|')
        .skip(1)
        .map(str::trim)
        .filter(|seg| !seg.contains('@') && !RE_NOT_VENUE.is_match(seg))
        .filter(|seg| seg.chars().next().is_some_and(char::is_uppercase))
        .find_map(accept)
}

/// A UK postcode, with the venue segment in front of it when there is one.
pub fn uk_postcode(title: &str) -> Option<String> {
    let m = RE_POSTCODE.find(title)?;
    let postcode = m.as_str();
    let before = tail_chars(title, m.start(), 30).trim_end_matches([',', ' ']);
    let segment = before.rsplit([',', '|', '@']).next().unwrap_or("").trim();
    let venue = segment
        .rsplit_once(" at ")
        .or_else(|| segment.rsplit_once(" - "))
        .map(|(_, v)| v.trim())
        .unwrap_or(segment);
    if venue.chars().count() > 3 {
        Some(format!("{venue}, {postcode}"))
    } else {
        Some(postcode.to_string())
    }
}

/// A major UK city, with an `at Venue` prefix when one sits in front of it.
pub fn major_city(title: &str) -> Option<String> {
    let m = RE_CITY.find(title)?;
    let city = CITIES
        .iter()
        .find(|c| c.eq_ignore_ascii_case(m.as_str()))
        .copied()
        .unwrap_or(m.as_str());
    let before = tail_chars(title, m.start(), 40);
    match RE_VENUE_BEFORE_CITY.captures(before) {
        Some(v) if v[1].trim().chars().count() > 2 => Some(format!("{}, {city}", v[1].trim())),
        _ => Some(city.to_string()),
    }
}

/// `... in Hackney`, `... at The Albany`.
pub fn in_or_at(title: &str) -> Option<String> {
    RE_IN_AT.captures_iter(title).find_map(|c| accept(&c[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::strategies::first_match;

    #[test]
    fn at_sign_with_platform_suffix() {
        assert_eq!(
            at_sign("Black Trans Joy @ Brooklyn Community Center, NY | Eventbrite").as_deref(),
            Some("Brooklyn Community Center, NY")
        );
        assert_eq!(at_sign("Party @ Tickets"), None);
    }

    #[test]
    fn pipe_segment_is_a_venue() {
        assert_eq!(
            pipe_venue("QTIPOC Open Mic | Sat 12 July | The Bread & Roses, Clapham | Eventbrite").as_deref(),
            Some("The Bread & Roses, Clapham")
        );
        assert_eq!(pipe_venue("Queer Swim | 18:30 | £5 | Eventbrite"), None);
        assert_eq!(pipe_venue("No pipes here"), None);
    }

    #[test]
    fn pipe_venue_runs_after_at_sign() {
        let (label, loc) =
            first_match(TITLE_LOCATION_STRATEGIES, "Black Pride Social | The Glory, Haggerston").unwrap();
        assert_eq!(label, "pipe_venue");
        assert_eq!(loc, "The Glory, Haggerston");
        let (label, _) = first_match(TITLE_LOCATION_STRATEGIES, "Social @ The Glory | Tickets").unwrap();
        assert_eq!(label, "at_sign");
    }

    #[test]
    fn postcode_keeps_venue() {
        assert_eq!(
            uk_postcode("Healing Circle at Rich Mix, E1 6LA").as_deref(),
            Some("Rich Mix, E1 6LA")
        );
    }

    #[test]
    fn city_with_venue_prefix() {
        assert_eq!(
            major_city("Queer Film Night at The Albany, london").as_deref(),
            Some("The Albany, London")
        );
        assert_eq!(major_city("QTIPOC Poetry Night - Manchester").as_deref(), Some("Manchester"));
    }

    #[test]
    fn in_or_at_needs_capitalised_place() {
        assert_eq!(in_or_at("Trans Picnic in Hackney Downs").as_deref(), Some("Hackney Downs"));
        assert_eq!(in_or_at("meet in the morning"), None);
    }

    #[test]
    fn ordered_title_mining() {
        let (label, loc) =
            first_match(TITLE_LOCATION_STRATEGIES, "Black Queer Brunch - Birmingham").unwrap();
        assert_eq!(label, "major_city");
        assert_eq!(loc, "Birmingham");
        assert!(first_match(TITLE_LOCATION_STRATEGIES, "a plain title with no place").is_none());
    }

    #[test]
    fn tail_is_char_safe() {
        let s = "ééééé@";
        assert_eq!(tail_chars(s, s.len() - 1, 2), "éé");
    }
}
