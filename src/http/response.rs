//! Verdict to HTTP status and header mapping.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ratelimit::Verdict;

pub const STATUS_OK: u16 = 200;
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

pub const HEADER_RETRY_AFTER: &str = "Retry-After";
pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RESET: &str = "X-RateLimit-Reset";

/// What the route should send for a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitResponse {
    /// 200 to continue with the request, 429 to reject it
    pub status: u16,
    /// Headers to attach, in a stable order
    pub headers: Vec<(&'static str, String)>,
    /// Message key for the user-facing guidance on denial
    pub message: Option<&'static str>,
}

impl RateLimitResponse {
    /// Map a verdict onto status and headers.
    ///
    /// A fail-open verdict renders as a plain success without rate limit
    /// headers. `X-RateLimit-Reset` is a unix timestamp in seconds;
    /// `Retry-After` counts whole seconds until the reset, rounded up.
    pub fn from_verdict(verdict: &Verdict, now: DateTime<Utc>) -> Self {
        if verdict.fail_open {
            return Self {
                status: STATUS_OK,
                headers: Vec::new(),
                message: None,
            };
        }

        let mut headers = vec![
            (HEADER_LIMIT, verdict.limit.to_string()),
            (HEADER_REMAINING, verdict.remaining.to_string()),
        ];
        if let Some(reset_at) = verdict.reset_at {
            headers.push((HEADER_RESET, reset_at.timestamp().to_string()));
        }

        if verdict.allowed {
            return Self {
                status: STATUS_OK,
                headers,
                message: None,
            };
        }

        let retry_after = verdict
            .reset_at
            .map(|reset_at| seconds_until(now, reset_at))
            .unwrap_or(1);
        headers.insert(0, (HEADER_RETRY_AFTER, retry_after.to_string()));

        Self {
            status: STATUS_TOO_MANY_REQUESTS,
            headers,
            message: verdict.scope.map(|scope| scope.denial_message()),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Whole seconds from `now` until `until`, rounded up, at least one.
fn seconds_until(now: DateTime<Utc>, until: DateTime<Utc>) -> i64 {
    let millis = (until - now).num_milliseconds();
    ((millis + 999) / 1000).max(1)
}
