//! Top-level error wrapper types.

use crate::{ConfigError, OrchestrationError, ProviderError};

/// Every error a Deepdraft crate can return.
///
/// # Examples
///
/// ```
/// use deepdraft_error::{DeepdraftError, ProviderError};
///
/// let err: DeepdraftError = ProviderError::network("connection reset").into();
/// assert!(format!("{}", err).contains("Network error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum DeepdraftErrorKind {
    /// Provider rejected a request
    #[from(ProviderError)]
    Provider(ProviderError),
    /// Request could not be completed by the orchestrator
    #[from(OrchestrationError)]
    Orchestration(OrchestrationError),
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
}

/// Deepdraft error with kind discrimination.
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Deepdraft Error: {}", _0)]
pub struct DeepdraftError(Box<DeepdraftErrorKind>);

impl DeepdraftError {
    /// Create a new error from a kind.
    pub fn new(kind: DeepdraftErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &DeepdraftErrorKind {
        &self.0
    }

    /// Plain-language message suitable for the UI.
    pub fn user_message(&self) -> String {
        match self.kind() {
            DeepdraftErrorKind::Orchestration(err) => err.user_message(),
            DeepdraftErrorKind::Provider(err) => err.kind().to_string(),
            DeepdraftErrorKind::Config(err) => err.kind().to_string(),
        }
    }
}

impl<T> From<T> for DeepdraftError
where
    T: Into<DeepdraftErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Deepdraft operations.
pub type DeepdraftResult<T> = std::result::Result<T, DeepdraftError>;
