//! Terminal errors surfaced by the request orchestrator.

use std::fmt;

/// Why a generation request could not be completed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrchestrationErrorKind {
    /// Provider kept signalling quota exceeded or overload after every retry.
    RateLimited {
        /// Model that was rate limited last
        model: String,
        /// Seconds until its cooldown ends
        wait_seconds: u64,
    },
    /// Local daily ceiling reached for the model.
    QuotaExhausted {
        /// Exhausted model
        model: String,
    },
    /// Provider confirmed the model identifier is invalid or retired.
    ModelUnavailable {
        /// Model that no longer exists
        model: String,
    },
    /// Every candidate in the preferred model and fallback chain is impaired.
    NoAvailableModel {
        /// Model the caller asked for
        preferred: String,
        /// Seconds until the soonest candidate leaves cooldown, if waiting would help
        wait_seconds: Option<u64>,
    },
    /// Any other provider or network failure, after bounded retries.
    GenerationFailure {
        /// Model used for the last attempt
        model: String,
        /// Number of attempts made
        attempts: u32,
        /// Last underlying failure
        cause: String,
    },
}

impl fmt::Display for OrchestrationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestrationErrorKind::RateLimited {
                model,
                wait_seconds,
            } => write!(
                f,
                "{} is rate limited by the provider; try again in {} seconds",
                model, wait_seconds
            ),
            OrchestrationErrorKind::QuotaExhausted { model } => write!(
                f,
                "Daily request quota for {} is used up; it resets tomorrow",
                model
            ),
            OrchestrationErrorKind::ModelUnavailable { model } => write!(
                f,
                "{} is no longer available from the provider; choose another model in settings",
                model
            ),
            OrchestrationErrorKind::NoAvailableModel {
                preferred,
                wait_seconds: Some(secs),
            } => write!(
                f,
                "No model is available for {} right now; wait {} seconds and try again",
                preferred, secs
            ),
            OrchestrationErrorKind::NoAvailableModel {
                preferred,
                wait_seconds: None,
            } => write!(
                f,
                "No model is available for {}; check your model settings",
                preferred
            ),
            OrchestrationErrorKind::GenerationFailure {
                model,
                attempts,
                cause,
            } => write!(
                f,
                "Generation with {} failed after {} attempts: {}",
                model, attempts, cause
            ),
        }
    }
}

/// Orchestration error with location tracking.
///
/// # Examples
///
/// ```
/// use deepdraft_error::{OrchestrationError, OrchestrationErrorKind};
///
/// let err = OrchestrationError::new(OrchestrationErrorKind::NoAvailableModel {
///     preferred: "gemini-2.5-pro".to_string(),
///     wait_seconds: Some(42),
/// });
///
/// assert_eq!(err.wait_seconds(), Some(42));
/// assert!(err.user_message().contains("wait 42 seconds"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Orchestration Error: {} at line {} in {}", kind, line, file)]
pub struct OrchestrationError {
    kind: OrchestrationErrorKind,
    line: u32,
    file: &'static str,
}

impl OrchestrationError {
    /// Create a new orchestration error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: OrchestrationErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &OrchestrationErrorKind {
        &self.kind
    }

    /// Plain-language message for display, without source location.
    pub fn user_message(&self) -> String {
        self.kind.to_string()
    }

    /// Countdown to show alongside the message, when waiting would help.
    pub fn wait_seconds(&self) -> Option<u64> {
        match &self.kind {
            OrchestrationErrorKind::RateLimited { wait_seconds, .. } => Some(*wait_seconds),
            OrchestrationErrorKind::NoAvailableModel { wait_seconds, .. } => *wait_seconds,
            _ => None,
        }
    }
}

impl From<OrchestrationErrorKind> for OrchestrationError {
    #[track_caller]
    fn from(kind: OrchestrationErrorKind) -> Self {
        Self::new(kind)
    }
}
