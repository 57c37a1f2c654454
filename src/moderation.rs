// src/moderation.rs
//! Trust tiers for declared sources. Moderation itself happens outside the
//! engine; this is the static classifier it consumes.

use serde::{Deserialize, Serialize};

use crate::event::CandidateEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Approve,
    Reject,
    Review,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustTiers {
    pub trusted: Vec<String>,
    pub auto_reject: Vec<String>,
    pub manual_review: Vec<String>,
}

impl Default for TrustTiers {
    fn default() -> Self {
        let v = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            trusted: v(&[
                "UK Black Pride",
                "ukblackpride.org.uk",
                "Gendered Intelligence",
                "genderedintelligence.co.uk",
                "Black Lives Matter UK",
                "Imkaan",
                "Stonewall",
                "Black Cultural Archives",
            ]),
            auto_reject: v(&["Web Search", "Unknown", "scraper-test"]),
            manual_review: v(&["Eventbrite", "Outsavvy", "Meetup", "Facebook", "research_agent"]),
        }
    }
}

impl TrustTiers {
    /// Exact (case-insensitive) match first, then substring. Unknown → review.
    pub fn classify(&self, source: &str) -> Recommendation {
        let s = source.trim().to_lowercase();
        let hit = |list: &[String], exact: bool| {
            list.iter().any(|x| {
                let x = x.to_lowercase();
                if exact {
                    x == s
                } else {
                    !x.is_empty() && s.contains(&x)
                }
            })
        };
        for exact in [true, false] {
            if hit(&self.auto_reject, exact) {
                return Recommendation::Reject;
            }
            if hit(&self.trusted, exact) {
                return Recommendation::Approve;
            }
            if hit(&self.manual_review, exact) {
                return Recommendation::Review;
            }
        }
        Recommendation::Review
    }

    /// Demonstration records are never approved.
    pub fn recommend(&self, event: &CandidateEvent) -> Recommendation {
        if event.is_demo {
            return Recommendation::Reject;
        }
        self.classify(&event.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers() {
        let t = TrustTiers::default();
        assert_eq!(t.classify("UK Black Pride"), Recommendation::Approve);
        assert_eq!(t.classify("UK Black Pride Feed"), Recommendation::Approve);
        assert_eq!(t.classify("web search"), Recommendation::Reject);
        assert_eq!(t.classify("Eventbrite BPOC Collection"), Recommendation::Review);
        assert_eq!(t.classify("search: queer events"), Recommendation::Review);
    }
}
