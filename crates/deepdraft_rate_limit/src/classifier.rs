//! Mapping provider errors to what the orchestrator should do next.

use chrono::{DateTime, Utc};
use deepdraft_error::{ProviderError, ProviderErrorKind};
use regex::Regex;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

/// `"retryDelay": "17s"` in Gemini `RetryInfo` error details.
static RETRY_DELAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""retryDelay"\s*:\s*"(\d+(?:\.\d+)?)s""#).expect("Valid retryDelay regex")
});

/// "Please retry in 12.5s", "retry after 300ms".
static RETRY_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)retry (?:in|after) (\d+(?:\.\d+)?)\s*(ms|s|sec|secs|seconds?)\b")
        .expect("Valid retry-in regex")
});

/// Phrases the provider uses when a model identifier is invalid or retired.
const UNAVAILABLE_PHRASES: &[&str] = &[
    "not found",
    "deprecated",
    "no longer available",
    "is not supported",
    "has been retired",
    "decommissioned",
];

/// Phrases that signal quota or overload regardless of status.
const RATE_LIMIT_PHRASES: &[&str] = &[
    "resource_exhausted",
    "resource has been exhausted",
    "quota",
    "rate limit",
    "too many requests",
    "overloaded",
];

/// What a provider error means for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Quota exceeded or overloaded; cool the model down and try again
    RateLimited {
        /// Delay requested by the provider, if any
        retry_after: Option<Duration>,
    },
    /// The model identifier is invalid or retired
    ModelUnavailable,
    /// Transient failure; retry with backoff
    Retryable,
    /// Request will never succeed as sent
    Fatal,
}

/// Classify a provider error.
///
/// # Example
///
/// ```
/// use deepdraft_error::ProviderError;
/// use deepdraft_rate_limit::{ErrorClass, classify};
///
/// let err = ProviderError::http(404, "models/gemini-1.0-pro is not found for API version v1beta");
/// assert_eq!(classify(&err), ErrorClass::ModelUnavailable);
///
/// let err = ProviderError::http(500, "Internal error");
/// assert_eq!(classify(&err), ErrorClass::Retryable);
/// ```
pub fn classify(error: &ProviderError) -> ErrorClass {
    let message = error.message().to_lowercase();
    let mentions = |phrases: &[&str]| phrases.iter().any(|p| message.contains(p));

    let class = match error.kind() {
        ProviderErrorKind::Http { status_code, .. } => match *status_code {
            410 => ErrorClass::ModelUnavailable,
            404 | 400 if mentions(UNAVAILABLE_PHRASES) => ErrorClass::ModelUnavailable,
            429 | 503 | 529 => rate_limited(error),
            _ if mentions(RATE_LIMIT_PHRASES) => rate_limited(error),
            408 => ErrorClass::Retryable,
            500..=599 => ErrorClass::Retryable,
            _ => ErrorClass::Fatal,
        },
        ProviderErrorKind::Network(_)
        | ProviderErrorKind::StreamInterrupted(_)
        | ProviderErrorKind::InvalidResponse(_) => {
            if mentions(UNAVAILABLE_PHRASES) && message.contains("model") {
                ErrorClass::ModelUnavailable
            } else if mentions(RATE_LIMIT_PHRASES) {
                rate_limited(error)
            } else {
                ErrorClass::Retryable
            }
        }
    };

    debug!(status = ?error.status(), ?class, "Classified provider error");
    class
}

fn rate_limited(error: &ProviderError) -> ErrorClass {
    ErrorClass::RateLimited {
        retry_after: error
            .retry_after()
            .or_else(|| retry_after_from_message(error.message())),
    }
}

/// Extract a retry delay embedded in an error message.
///
/// Recognises Gemini `retryDelay` details and "retry in Ns" phrasing.
pub fn retry_after_from_message(message: &str) -> Option<Duration> {
    if let Some(caps) = RETRY_DELAY.captures(message) {
        let secs: f64 = caps.get(1)?.as_str().parse().ok()?;
        return millis_to_duration(secs * 1000.0);
    }

    let caps = RETRY_IN.captures(message)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    match caps.get(2)?.as_str().to_lowercase().as_str() {
        "ms" => millis_to_duration(value),
        _ => millis_to_duration(value * 1000.0),
    }
}

fn millis_to_duration(millis: f64) -> Option<Duration> {
    if !millis.is_finite() || millis < 0.0 {
        return None;
    }
    Some(Duration::from_millis(millis.round() as u64))
}

/// Read a `Retry-After` header.
///
/// Accepts delta-seconds or an HTTP date, which is measured from `now`.
/// A date in the past yields a zero delay.
pub fn retry_after_from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
