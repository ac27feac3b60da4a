//! Configuration structures for quotas and request orchestration.
//!
//! This module provides TOML-based configuration. The configuration system supports:
//! - Bundled defaults (include_str! from deepdraft.toml)
//! - User overrides (./deepdraft.toml or ~/.config/deepdraft/deepdraft.toml)
//! - Automatic merging with user values taking precedence

use crate::{FallbackChain, ModelQuota, QuotaRegistry};
use chrono::{FixedOffset, Local, Utc};
use config::{Config, File, FileFormat};
use deepdraft_error::{ConfigError, ConfigErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Model-specific quota overrides.
///
/// All fields are optional - only specified fields override tier defaults.
///
/// # Example
///
/// ```toml
/// [providers.gemini.tiers.free.models."gemini-2.5-pro"]
/// rpm = 5
/// rpd = 100
/// fallback = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct ModelTierConfig {
    /// Requests per minute limit (overrides tier default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm: Option<u32>,

    /// Requests per day limit (overrides tier default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpd: Option<u32>,

    /// Whether the model may serve as a fallback for another model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<bool>,
}

/// Quotas for one API tier of a provider.
///
/// Tier-level `rpm`/`rpd` are the ceilings for models without an entry of
/// their own; `None` means the conservative built-in default.
///
/// ```toml
/// [providers.gemini.tiers.free]
/// name = "Free"
/// rpm = 2
/// rpd = 50
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TierConfig {
    /// Name of the tier (e.g., "Free", "Pay-as-you-go")
    pub name: String,

    /// Requests per minute limit (tier-level default)
    #[serde(default)]
    pub rpm: Option<u32>,

    /// Requests per day limit (tier-level default)
    #[serde(default)]
    pub rpd: Option<u32>,

    /// Model-specific overrides
    #[serde(default)]
    pub models: HashMap<String, ModelTierConfig>,
}

impl TierConfig {
    /// Resolve the quota for a model with model-specific overrides applied.
    ///
    /// Fields missing from both the model entry and the tier fall back to
    /// [`ModelQuota::CONSERVATIVE`].
    pub fn quota_for(&self, model_name: &str) -> ModelQuota {
        let overrides = self.models.get(model_name).cloned().unwrap_or_default();

        let rpm = overrides
            .rpm
            .or(self.rpm)
            .unwrap_or(*ModelQuota::CONSERVATIVE.requests_per_minute());
        let rpd = overrides
            .rpd
            .or(self.rpd)
            .unwrap_or(*ModelQuota::CONSERVATIVE.requests_per_day());

        ModelQuota::new(rpm, rpd).fallback_capable(overrides.fallback.unwrap_or(false))
    }
}

/// Configuration for a specific provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Name of the default tier for this provider
    pub default_tier: String,

    /// Map of tier name to tier configuration
    pub tiers: HashMap<String, TierConfig>,
}

/// Policy knobs for the request orchestrator.
///
/// ```toml
/// [orchestrator]
/// provider = "gemini"
/// fallback_chain = ["gemini-2.5-pro", "gemini-2.5-flash"]
/// default_cooldown_secs = 60
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    /// Provider whose quotas apply
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Tier to use (provider's default tier if unset)
    #[serde(default)]
    pub tier: Option<String>,

    /// Models tried in order when the preferred model is impaired
    #[serde(default)]
    pub fallback_chain: Vec<String>,

    /// Cooldown when a rate-limit error carries no retry delay
    #[serde(default = "default_cooldown_secs")]
    pub default_cooldown_secs: u64,

    /// Floor for any rate-limit cooldown
    #[serde(default = "default_min_rate_limit_delay_secs")]
    pub min_rate_limit_delay_secs: u64,

    /// Longest cooldown a request will sleep through before giving up
    #[serde(default = "default_max_cooldown_wait_secs")]
    pub max_cooldown_wait_secs: u64,

    /// Attempts allowed for rate-limited dispatches
    #[serde(default = "default_attempts")]
    pub rate_limit_max_attempts: u32,

    /// Attempts allowed for other failures
    #[serde(default = "default_attempts")]
    pub backoff_max_attempts: u32,

    /// Cap on a single exponential-backoff delay
    #[serde(default = "default_backoff_max_delay_secs")]
    pub backoff_max_delay_secs: u64,

    /// Outbound requests in flight at once for ordinary call sites
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,

    /// Outbound requests in flight at once for batched search tasks
    #[serde(default = "default_search_concurrency")]
    pub search_concurrency: usize,

    /// UTC offset (minutes) of the day boundary for daily quotas; local time if unset
    #[serde(default)]
    pub daily_reset_utc_offset_minutes: Option<i32>,
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_min_rate_limit_delay_secs() -> u64 {
    5
}

fn default_max_cooldown_wait_secs() -> u64 {
    90
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff_max_delay_secs() -> u64 {
    30
}

fn default_max_concurrent() -> usize {
    1
}

fn default_search_concurrency() -> usize {
    3
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            tier: None,
            fallback_chain: Vec::new(),
            default_cooldown_secs: default_cooldown_secs(),
            min_rate_limit_delay_secs: default_min_rate_limit_delay_secs(),
            max_cooldown_wait_secs: default_max_cooldown_wait_secs(),
            rate_limit_max_attempts: default_attempts(),
            backoff_max_attempts: default_attempts(),
            backoff_max_delay_secs: default_backoff_max_delay_secs(),
            max_concurrent_requests: default_max_concurrent(),
            search_concurrency: default_search_concurrency(),
            daily_reset_utc_offset_minutes: None,
        }
    }
}

impl OrchestratorConfig {
    /// Default cooldown as a duration.
    pub fn default_cooldown(&self) -> Duration {
        Duration::from_secs(self.default_cooldown_secs)
    }

    /// Minimum rate-limit delay as a duration.
    pub fn min_rate_limit_delay(&self) -> Duration {
        Duration::from_secs(self.min_rate_limit_delay_secs)
    }

    /// Maximum cooldown wait as a duration.
    pub fn max_cooldown_wait(&self) -> Duration {
        Duration::from_secs(self.max_cooldown_wait_secs)
    }

    /// Offset that decides when the daily counters roll over.
    pub fn daily_reset_offset(&self) -> FixedOffset {
        match self
            .daily_reset_utc_offset_minutes
            .and_then(|minutes| FixedOffset::east_opt(minutes.saturating_mul(60)))
        {
            Some(offset) => offset,
            None => *Utc::now().with_timezone(&Local).offset(),
        }
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: &str| {
            ConfigError::new(ConfigErrorKind::InvalidValue {
                field: field.to_string(),
                reason: reason.to_string(),
            })
        };

        if self.min_rate_limit_delay_secs < 5 {
            return Err(invalid(
                "min_rate_limit_delay_secs",
                "must be at least 5 seconds",
            ));
        }
        if self.rate_limit_max_attempts == 0 {
            return Err(invalid("rate_limit_max_attempts", "must be at least 1"));
        }
        if self.backoff_max_attempts == 0 {
            return Err(invalid("backoff_max_attempts", "must be at least 1"));
        }
        if self.max_concurrent_requests == 0 {
            return Err(invalid("max_concurrent_requests", "must be at least 1"));
        }
        if self.search_concurrency == 0 {
            return Err(invalid("search_concurrency", "must be at least 1"));
        }
        if let Some(minutes) = self.daily_reset_utc_offset_minutes
            && FixedOffset::east_opt(minutes.saturating_mul(60)).is_none()
        {
            return Err(invalid(
                "daily_reset_utc_offset_minutes",
                "must be within +/- 24 hours",
            ));
        }
        Ok(())
    }
}

/// Top-level Deepdraft configuration.
///
/// Loads configuration from TOML files with a precedence system:
/// 1. Bundled defaults (include_str! from deepdraft.toml)
/// 2. User override (~/.config/deepdraft/deepdraft.toml, then ./deepdraft.toml)
///
/// # Example
///
/// ```no_run
/// use deepdraft_rate_limit::DeepdraftConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = DeepdraftConfig::load()?;
/// let quotas = config.quota_registry()?;
/// let chain = config.fallback_chain(&quotas)?;
/// println!("Fallback chain: {:?}", chain.models());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct DeepdraftConfig {
    /// Map of provider name to provider configuration
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Orchestrator policy
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl DeepdraftConfig {
    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        debug!("Loading configuration from file");

        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                ConfigError::new(ConfigErrorKind::Load(format!(
                    "{}: {}",
                    path.as_ref().display(),
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| ConfigError::new(ConfigErrorKind::Parse(e.to_string())))
    }

    /// Parse configuration from a TOML string, with no other sources.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid configuration.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .map_err(|e| ConfigError::new(ConfigErrorKind::Load(e.to_string())))?
            .try_deserialize()
            .map_err(|e| ConfigError::new(ConfigErrorKind::Parse(e.to_string())))
    }

    /// Bundled defaults only, ignoring user files.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled file is malformed.
    pub fn bundled() -> Result<Self, ConfigError> {
        Self::from_toml_str(DEFAULT_CONFIG)
    }

    /// Load configuration with precedence: user override > bundled default.
    ///
    /// Configuration sources in order of precedence (later sources override earlier):
    /// 1. Bundled defaults (deepdraft.toml shipped with the library)
    /// 2. User config in home directory (~/.config/deepdraft/deepdraft.toml)
    /// 3. User config in current directory (./deepdraft.toml)
    ///
    /// User config files are optional and will be silently skipped if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if any present source cannot be parsed.
    #[instrument]
    pub fn load() -> Result<Self, ConfigError> {
        debug!("Loading configuration with precedence: current dir > home dir > bundled defaults");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/deepdraft/deepdraft.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("deepdraft").required(false));

        builder
            .build()
            .map_err(|e| ConfigError::new(ConfigErrorKind::Load(e.to_string())))?
            .try_deserialize()
            .map_err(|e| ConfigError::new(ConfigErrorKind::Parse(e.to_string())))
    }

    /// Get tier configuration for a provider.
    ///
    /// Uses the provider's default tier when `tier_name` is `None`.
    #[instrument(skip(self))]
    pub fn get_tier(&self, provider: &str, tier_name: Option<&str>) -> Option<TierConfig> {
        let provider_config = self.providers.get(provider)?;

        let tier = tier_name.unwrap_or(&provider_config.default_tier);

        debug!(provider, tier, "Looking up tier configuration");

        provider_config.tiers.get(tier).cloned()
    }

    /// Quota registry for the orchestrator's provider and tier.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider or tier is not configured.
    pub fn quota_registry(&self) -> Result<QuotaRegistry, ConfigError> {
        let provider = &self.orchestrator.provider;
        let provider_config = self
            .providers
            .get(provider)
            .ok_or_else(|| ConfigError::new(ConfigErrorKind::UnknownProvider(provider.clone())))?;

        let tier_name = self
            .orchestrator
            .tier
            .as_deref()
            .unwrap_or(&provider_config.default_tier);

        let tier = provider_config.tiers.get(tier_name).ok_or_else(|| {
            ConfigError::new(ConfigErrorKind::UnknownTier {
                provider: provider.clone(),
                tier: tier_name.to_string(),
            })
        })?;

        Ok(QuotaRegistry::from_tier(tier))
    }

    /// Validated fallback chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain is empty or names a model that is not
    /// classified as fallback-capable in `quotas`.
    pub fn fallback_chain(&self, quotas: &QuotaRegistry) -> Result<FallbackChain, ConfigError> {
        let chain = FallbackChain::new(self.orchestrator.fallback_chain.clone())?;

        if let Some(model) = chain
            .models()
            .iter()
            .find(|model| !quotas.is_fallback_capable(model))
        {
            warn!(model = %model, "Fallback chain entry is not fallback-capable");
            return Err(ConfigError::new(ConfigErrorKind::NotFallbackCapable(
                model.clone(),
            )));
        }

        Ok(chain)
    }
}

// Bundled default configuration
const DEFAULT_CONFIG: &str = include_str!("../../../deepdraft.toml");
