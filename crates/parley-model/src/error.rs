// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

/// Error taxonomy for provider calls.
///
/// The chat loop's retry policy keys off this classification: transient
/// errors back off and retry, rate limits honour the provider's interval,
/// permanent errors propagate and end the turn.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Timeout, connection failure, or 5xx — safe to retry with backoff.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Explicit rate limit.  `retry_after` is the provider's interval,
    /// clamped to at least 60 seconds.
    #[error("rate limited: {message} (retry after {retry_after:?})")]
    RateLimited {
        retry_after: Duration,
        message: String,
    },

    /// Bad request or schema violation — retrying cannot help.
    #[error("permanent provider error: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Permanent(_))
    }

    /// Build a rate-limit error, enforcing the 60 second floor.
    pub fn rate_limited(retry_after: Option<Duration>, message: impl Into<String>) -> Self {
        let floor = Duration::from_secs(60);
        Self::RateLimited {
            retry_after: retry_after.map_or(floor, |d| d.max(floor)),
            message: message.into(),
        }
    }

    /// Classify an HTTP status + body into the taxonomy.
    pub fn from_status(status: u16, retry_after: Option<Duration>, body: String) -> Self {
        match status {
            429 => Self::rate_limited(retry_after, body),
            s if s >= 500 => Self::Transient(format!("HTTP {s}: {body}")),
            s => Self::Permanent(format!("HTTP {s}: {body}")),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        // Connection-level failures never reached the API; always retryable.
        Self::Transient(e.to_string())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_hundred_is_transient() {
        let e = ProviderError::from_status(503, None, "overloaded".into());
        assert!(e.is_retryable());
        assert!(matches!(e, ProviderError::Transient(_)));
    }

    #[test]
    fn four_hundred_is_permanent() {
        let e = ProviderError::from_status(400, None, "bad schema".into());
        assert!(!e.is_retryable());
    }

    #[test]
    fn rate_limit_floors_at_sixty_seconds() {
        let e = ProviderError::from_status(429, Some(Duration::from_secs(5)), "slow down".into());
        match e {
            ProviderError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Duration::from_secs(60));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn rate_limit_honours_longer_intervals() {
        let e = ProviderError::rate_limited(Some(Duration::from_secs(90)), "later");
        match e {
            ProviderError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Duration::from_secs(90));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
