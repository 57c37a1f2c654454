// src/error.rs
//! Typed failures surfaced by content acquisition.
//!
//! None of these are fatal to a run: the orchestrator logs them per step and
//! moves on. Extraction never fails (fields degrade to sentinels) and an empty
//! run is reported through `orchestrator::DegradedReason`, not an error.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AcquisitionError {
    /// Daily budget cannot cover the call and there is no same-day cached body.
    #[error("budget exhausted: call costs {cost} units, {remaining} remaining")]
    BudgetExhausted { cost: u32, remaining: u32 },

    /// Upstream answered with a non-success status.
    #[error("upstream returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Network-level failure before a status was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// The call did not finish inside the configured bound.
    #[error("acquisition timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The body arrived but could not be decoded (e.g. malformed RSS).
    #[error("could not parse upstream body: {0}")]
    Parse(String),
}

impl AcquisitionError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AcquisitionError::BudgetExhausted { .. } => "budget",
            AcquisitionError::Http { .. } => "http",
            AcquisitionError::Transport(_) => "transport",
            AcquisitionError::Timeout { .. } => "timeout",
            AcquisitionError::Parse(_) => "parse",
        }
    }
}

impl From<reqwest::Error> for AcquisitionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // reqwest's own timeout; the configured bound is reported by the acquirer.
            AcquisitionError::Timeout { secs: 0 }
        } else if let Some(status) = e.status() {
            AcquisitionError::Http {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            AcquisitionError::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_status_and_body() {
        let e = AcquisitionError::Http {
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(e.to_string(), "upstream returned HTTP 502: bad gateway");
        assert_eq!(e.kind(), "http");
    }

    #[test]
    fn timeout_is_distinct_from_content_errors() {
        let t = AcquisitionError::Timeout { secs: 30 };
        let p = AcquisitionError::Parse("x".into());
        assert_ne!(t.kind(), p.kind());
    }
}
