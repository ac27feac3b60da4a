//! Errors reported by the language-model provider.

use std::time::Duration;

/// What went wrong while talking to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ProviderErrorKind {
    /// Provider answered with a non-success HTTP status
    #[display("HTTP {} error: {}", status_code, message)]
    Http {
        /// HTTP status code
        status_code: u16,
        /// Error message from the provider
        message: String,
    },
    /// The request never reached the provider or the connection dropped
    #[display("Network error: {}", _0)]
    Network(String),
    /// The stream ended with an error after it had started
    #[display("Stream interrupted: {}", _0)]
    StreamInterrupted(String),
    /// The provider answered with something that could not be understood
    #[display("Invalid provider response: {}", _0)]
    InvalidResponse(String),
}

/// Structured rejection from the provider client.
///
/// Carries an HTTP-like status (when there is one), the provider's message and
/// an optional server-specified retry delay taken from a `Retry-After` header
/// or equivalent.
///
/// # Examples
///
/// ```
/// use deepdraft_error::ProviderError;
/// use std::time::Duration;
///
/// let err = ProviderError::http(429, "Resource has been exhausted")
///     .with_retry_after(Duration::from_secs(17));
///
/// assert_eq!(err.status(), Some(429));
/// assert_eq!(err.retry_after(), Some(Duration::from_secs(17)));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Provider Error: {} at line {} in {}", kind, line, file)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    retry_after: Option<Duration>,
    line: u32,
    file: &'static str,
}

impl ProviderError {
    /// Create a new provider error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: ProviderErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            retry_after: None,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Shorthand for an HTTP status error.
    #[track_caller]
    pub fn http(status_code: u16, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Http {
            status_code,
            message: message.into(),
        })
    }

    /// Shorthand for a network error.
    #[track_caller]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network(message.into()))
    }

    /// Attach a provider-specified retry delay.
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> &ProviderErrorKind {
        &self.kind
    }

    /// HTTP status code, if the provider answered at all.
    pub fn status(&self) -> Option<u16> {
        match &self.kind {
            ProviderErrorKind::Http { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Provider message without the location suffix.
    pub fn message(&self) -> &str {
        match &self.kind {
            ProviderErrorKind::Http { message, .. } => message,
            ProviderErrorKind::Network(message)
            | ProviderErrorKind::StreamInterrupted(message)
            | ProviderErrorKind::InvalidResponse(message) => message,
        }
    }

    /// Retry delay explicitly attached by the provider client.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

impl From<ProviderErrorKind> for ProviderError {
    #[track_caller]
    fn from(kind: ProviderErrorKind) -> Self {
        Self::new(kind)
    }
}
