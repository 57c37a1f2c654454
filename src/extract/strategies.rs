// src/extract/strategies.rs
//! Ordered field strategies. Each is a pure `fn(&str) -> Option<T>` over one
//! candidate's text block; the first strategy that returns `Some` wins.

use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

use super::clean_inline;
use crate::event::LOCATION_TBA;

pub type Strategy<T> = fn(&str) -> Option<T>;

/// Run strategies in order, returning the winner's label with its value.
pub fn first_match<T>(strategies: &[(&'static str, Strategy<T>)], text: &str) -> Option<(&'static str, T)> {
    strategies
        .iter()
        .find_map(|(label, f)| f(text).map(|v| (*label, v)))
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

pub const DATE_STRATEGIES: &[(&str, Strategy<NaiveDate>)] = &[
    ("day_month_year", day_month_year),
    ("year_month_day", year_month_day),
    ("long_form", long_form_date),
];

static RE_DMY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4})\b").unwrap());
static RE_YMD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})[/.\-](\d{1,2})[/.\-](\d{1,2})\b").unwrap());
static RE_LONG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday),?\s+(\d{1,2})(?:st|nd|rd|th)?\s+(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?),?\s+(\d{4})\b",
    )
    .unwrap()
});

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

/// `DD/MM/YYYY` (also `-` and `.` separators). Invalid calendar dates are skipped.
pub fn day_month_year(text: &str) -> Option<NaiveDate> {
    RE_DMY.captures_iter(text).find_map(|c| ymd(&c[3], &c[2], &c[1]))
}

/// `YYYY/MM/DD` (also `-` and `.` separators).
pub fn year_month_day(text: &str) -> Option<NaiveDate> {
    RE_YMD.captures_iter(text).find_map(|c| ymd(&c[1], &c[2], &c[3]))
}

/// `Saturday, 14th June 2027` and close variants.
pub fn long_form_date(text: &str) -> Option<NaiveDate> {
    RE_LONG.captures_iter(text).find_map(|c| {
        let month = month_number(&c[2])?;
        NaiveDate::from_ymd_opt(c[3].parse().ok()?, month, c[1].parse().ok()?)
    })
}

fn month_number(name: &str) -> Option<u32> {
    let n = name.to_ascii_lowercase();
    let idx = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ]
    .iter()
    .position(|m| n.starts_with(m))?;
    Some(idx as u32 + 1)
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

static RE_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2}):(\d{2})\s*(am|pm)?\b").unwrap());

/// `18:30`, `6:30 PM`, `12:00am`.
pub fn time_of_day(text: &str) -> Option<NaiveTime> {
    RE_TIME.captures_iter(text).find_map(|c| {
        let mut h: u32 = c[1].parse().ok()?;
        let m: u32 = c[2].parse().ok()?;
        match c.get(3).map(|x| x.as_str().to_ascii_lowercase()) {
            Some(ap) if ap == "pm" && h < 12 => h += 12,
            Some(ap) if ap == "am" && h == 12 => h = 0,
            _ => {}
        }
        NaiveTime::from_hms_opt(h, m, 0)
    })
}

// ---------------------------------------------------------------------------
// Labelled lines (location, organiser, url)
// ---------------------------------------------------------------------------

static RE_LOCATION_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[\s>*_-]*(?:location|venue|address|where)\s*[*_]*\s*:\s*[*_]*\s*(.+?)\s*$").unwrap()
});
static RE_ORGANIZER_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[\s>*_-]*(?:organi[sz]ed by|organi[sz]er|hosted by|host|presented by|by)\s*[*_]*\s*:\s*[*_]*\s*(.+?)\s*$",
    )
    .unwrap()
});
static RE_URL_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[\s>*_-]*(?:url(?: source)?|link|tickets?|register)\s*[*_]*\s*:\s*[*_]*\s*<?(https?://\S+?)>?\s*$")
        .unwrap()
});

fn labelled(re: &Regex, text: &str) -> Option<String> {
    re.captures_iter(text).find_map(|c| {
        let v = clean_inline(&c[1]);
        let lower = v.to_ascii_lowercase();
        let placeholder = lower.is_empty()
            || lower == "tba"
            || lower == "tbd"
            || lower == LOCATION_TBA.to_ascii_lowercase();
        (!placeholder).then_some(v)
    })
}

/// `Location: ...`, `Venue: ...`, `Address: ...`, `Where: ...`.
pub fn labelled_location(text: &str) -> Option<String> {
    labelled(&RE_LOCATION_LABEL, text)
}

/// `Organiser: ...`, `Hosted by: ...`, `By: ...` and friends.
pub fn labelled_organizer(text: &str) -> Option<String> {
    labelled(&RE_ORGANIZER_LABEL, text)
}

/// `URL: ...`, `Link: ...`, `Tickets: ...`.
pub fn labelled_url(text: &str) -> Option<String> {
    RE_URL_LABEL.captures_iter(text).map(|c| c[1].to_string()).next()
}

// ---------------------------------------------------------------------------
// Price
// ---------------------------------------------------------------------------

pub const PRICE_STRATEGIES: &[(&str, Strategy<String>)] = &[
    ("labelled_amount", labelled_amount),
    ("free", free),
    ("sliding_scale", sliding_scale),
    ("pay_what_you_can", pay_what_you_can),
    ("donation", donation),
    ("bare_amount", bare_amount),
];

static RE_LABELLED_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:price|cost|fee|tickets?|entry)\s*[*_]*\s*:?\s*[*_]*\s*([£$€])\s?(\d+(?:\.\d{2})?)").unwrap()
});
static RE_AMOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"([£$€])\s?(\d+(?:\.\d{2})?)").unwrap());
static RE_FREE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bfree\b").unwrap());
static RE_SLIDING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bsliding[\s-]scale\b").unwrap());
static RE_PWYC: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bpay what you (?:can|feel)\b").unwrap());
static RE_DONATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bdonations?\b").unwrap());

pub fn labelled_amount(text: &str) -> Option<String> {
    RE_LABELLED_AMOUNT.captures(text).map(|c| format!("{}{}", &c[1], &c[2]))
}

pub fn free(text: &str) -> Option<String> {
    RE_FREE.is_match(text).then(|| "Free".to_string())
}

pub fn sliding_scale(text: &str) -> Option<String> {
    RE_SLIDING.is_match(text).then(|| "Sliding scale".to_string())
}

pub fn pay_what_you_can(text: &str) -> Option<String> {
    RE_PWYC.is_match(text).then(|| "Pay what you can".to_string())
}

pub fn donation(text: &str) -> Option<String> {
    RE_DONATION.is_match(text).then(|| "Donation based".to_string())
}

pub fn bare_amount(text: &str) -> Option<String> {
    RE_AMOUNT.captures(text).map(|c| format!("{}{}", &c[1], &c[2]))
}
