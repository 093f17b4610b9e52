//! Error classification and retry-delay scheduling (spec.md §4.11).
//!
//! Delay sequence and keyword lists are carried over verbatim from the
//! original implementation's `services/retry.py`.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorCategory {
    Transient,
    Permanent,
    Unknown,
}

/// Retry delays by attempt number (1-indexed), saturating at the last
/// entry: 1 min, 5 min, 15 min, 60 min.
const RETRY_DELAYS_MINUTES: [i64; 4] = [1, 5, 15, 60];

const TRANSIENT_ERROR_KEYWORDS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "network",
    "rate limit",
    "flood",
    "429",
    "502",
    "503",
    "504",
    "temporary",
    "unavailable",
    "retry",
    "throttl",
    "busy",
    "overload",
];

const PERMANENT_ERROR_KEYWORDS: &[&str] = &[
    "not found",
    "404",
    "missing",
    "invalid",
    "unauthorized",
    "401",
    "forbidden",
    "403",
    "permission denied",
    "does not exist",
    "already exists",
    "duplicate",
    "malformed",
    "corrupt",
    "password protected",
    "authentication failed",
];

/// Permanent keywords are checked first (higher precedence), then
/// transient; anything else is unknown.
pub fn categorize_error(error: Option<&str>) -> RetryErrorCategory {
    let Some(error) = error else {
        return RetryErrorCategory::Unknown;
    };
    let lower = error.to_lowercase();

    if PERMANENT_ERROR_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return RetryErrorCategory::Permanent;
    }
    if TRANSIENT_ERROR_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return RetryErrorCategory::Transient;
    }
    RetryErrorCategory::Unknown
}

/// `delay(n) = [1, 5, 15, 60][min(n-1, 3)]` minutes (R-1).
pub fn retry_delay(attempt: i32) -> Duration {
    let index = (attempt - 1).max(0) as usize;
    let index = index.min(RETRY_DELAYS_MINUTES.len() - 1);
    Duration::minutes(RETRY_DELAYS_MINUTES[index])
}

/// Outcome of a retry decision for a failed job.
pub struct RetryDecision {
    pub should_retry: bool,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub category: RetryErrorCategory,
}

/// Decide whether a failed job should be retried, per spec.md §4.11.
///
/// `attempts` and `max_attempts` are the job's current counters *after*
/// the failed attempt was recorded.
pub fn decide_retry(attempts: i32, max_attempts: i32, error: Option<&str>, now: DateTime<Utc>) -> RetryDecision {
    if attempts >= max_attempts {
        return RetryDecision {
            should_retry: false,
            next_retry_at: None,
            category: categorize_error(error),
        };
    }

    let category = categorize_error(error);

    if category == RetryErrorCategory::Permanent {
        return RetryDecision {
            should_retry: false,
            next_retry_at: None,
            category,
        };
    }

    if category == RetryErrorCategory::Unknown && attempts >= 2 {
        return RetryDecision {
            should_retry: false,
            next_retry_at: None,
            category,
        };
    }

    let delay = retry_delay(attempts);
    RetryDecision {
        should_retry: true,
        next_retry_at: Some(now + delay),
        category,
    }
}

/// Aggregate counts for the retry dashboard (supplemented from
/// `services/retry.py::get_retry_stats`).
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct RetryStats {
    pub pending_retry: i64,
    pub total_retried: i64,
    pub failed_after_max_retries: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_sequence_matches_r1() {
        assert_eq!(retry_delay(1), Duration::minutes(1));
        assert_eq!(retry_delay(2), Duration::minutes(5));
        assert_eq!(retry_delay(3), Duration::minutes(15));
        assert_eq!(retry_delay(4), Duration::minutes(60));
        assert_eq!(retry_delay(10), Duration::minutes(60));
    }

    #[test]
    fn permanent_keyword_classification() {
        assert_eq!(
            categorize_error(Some("permission denied")),
            RetryErrorCategory::Permanent
        );
        assert_eq!(categorize_error(Some("404 not found")), RetryErrorCategory::Permanent);
    }

    #[test]
    fn transient_keyword_classification() {
        assert_eq!(
            categorize_error(Some("upstream 429 throttled")),
            RetryErrorCategory::Transient
        );
    }

    #[test]
    fn permanent_takes_precedence_over_transient_keyword() {
        // contains both "timeout" (transient) and "unauthorized" (permanent)
        assert_eq!(
            categorize_error(Some("request timeout: unauthorized")),
            RetryErrorCategory::Permanent
        );
    }

    #[test]
    fn unknown_error_retries_at_most_once() {
        let now = Utc::now();
        let first = decide_retry(1, 4, Some("weird glitch"), now);
        assert!(first.should_retry);
        let second = decide_retry(2, 4, Some("weird glitch"), now);
        assert!(!second.should_retry);
    }

    #[test]
    fn permanent_error_never_retries() {
        let now = Utc::now();
        let decision = decide_retry(1, 4, Some("permission denied"), now);
        assert!(!decision.should_retry);
    }

    #[test]
    fn max_attempts_exhausted_stops_retrying() {
        let now = Utc::now();
        let decision = decide_retry(4, 4, Some("upstream 503"), now);
        assert!(!decision.should_retry);
    }

    #[test]
    fn scenario_4_retry_classification() {
        let now = Utc::now();
        let first = decide_retry(1, 4, Some("upstream 429 throttled"), now);
        assert!(first.should_retry);
        assert_eq!(first.next_retry_at.unwrap() - now, Duration::minutes(1));

        let second = decide_retry(2, 4, Some("permission denied"), now);
        assert!(!second.should_retry);
        assert_eq!(second.category, RetryErrorCategory::Permanent);
    }
}
