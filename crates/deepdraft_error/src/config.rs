//! Configuration error types.

/// Configuration error conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ConfigErrorKind {
    /// Configuration sources could not be read or merged
    #[display("Failed to load configuration: {}", _0)]
    Load(String),
    /// Configuration was read but did not match the expected shape
    #[display("Failed to parse configuration: {}", _0)]
    Parse(String),
    /// Requested provider is missing from the configuration
    #[display("Unknown provider '{}'", _0)]
    UnknownProvider(String),
    /// Requested tier is missing for the provider
    #[display("Unknown tier '{}' for provider '{}'", tier, provider)]
    UnknownTier {
        /// Provider name
        provider: String,
        /// Tier name
        tier: String,
    },
    /// The fallback chain has no entries
    #[display("Fallback chain is empty; configure at least one model")]
    EmptyFallbackChain,
    /// A chain entry is not classified as fallback-capable
    #[display("Model '{}' is in the fallback chain but is not marked fallback-capable", _0)]
    NotFallbackCapable(String),
    /// A numeric or textual field is out of range
    #[display("Invalid value for '{}': {}", field, reason)]
    InvalidValue {
        /// Field name
        field: String,
        /// Why the value was rejected
        reason: String,
    },
}

/// Configuration error with source location.
///
/// # Examples
///
/// ```
/// use deepdraft_error::{ConfigError, ConfigErrorKind};
///
/// let err = ConfigError::new(ConfigErrorKind::EmptyFallbackChain);
/// assert!(format!("{}", err).contains("Fallback chain is empty"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Configuration Error: {} at line {} in {}", kind, line, file)]
pub struct ConfigError {
    kind: ConfigErrorKind,
    line: u32,
    file: &'static str,
}

impl ConfigError {
    /// Create a new ConfigError at the current location.
    #[track_caller]
    pub fn new(kind: ConfigErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &ConfigErrorKind {
        &self.kind
    }
}

impl From<ConfigErrorKind> for ConfigError {
    #[track_caller]
    fn from(kind: ConfigErrorKind) -> Self {
        Self::new(kind)
    }
}
