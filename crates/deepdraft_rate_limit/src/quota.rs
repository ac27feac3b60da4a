//! Static per-model request ceilings.

use crate::TierConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Request ceilings for one model.
///
/// # Example
///
/// ```
/// use deepdraft_rate_limit::ModelQuota;
///
/// let quota = ModelQuota::new(10, 250).fallback_capable(true);
/// assert_eq!(*quota.requests_per_minute(), 10);
/// assert_eq!(*quota.requests_per_day(), 250);
/// assert!(*quota.is_fallback_capable());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_getters::Getters,
)]
pub struct ModelQuota {
    /// Requests per minute
    requests_per_minute: u32,
    /// Requests per calendar day
    requests_per_day: u32,
    /// Whether the model may be picked as a fallback for another model
    #[getter(rename = "is_fallback_capable")]
    fallback_capable: bool,
}

impl ModelQuota {
    /// Limits applied to models the registry has never heard of.
    ///
    /// New models can appear before the table is updated, so lookups never
    /// fail; they get these deliberately low ceilings instead.
    pub const CONSERVATIVE: ModelQuota = ModelQuota {
        requests_per_minute: 2,
        requests_per_day: 50,
        fallback_capable: false,
    };

    /// Quota with the given ceilings, not fallback-capable.
    pub const fn new(requests_per_minute: u32, requests_per_day: u32) -> Self {
        Self {
            requests_per_minute,
            requests_per_day,
            fallback_capable: false,
        }
    }

    /// Set the fallback classification.
    pub const fn fallback_capable(mut self, capable: bool) -> Self {
        self.fallback_capable = capable;
        self
    }
}

impl Default for ModelQuota {
    fn default() -> Self {
        Self::CONSERVATIVE
    }
}

/// Lookup table from model identifier to [`ModelQuota`].
///
/// # Example
///
/// ```
/// use deepdraft_rate_limit::{ModelQuota, QuotaRegistry};
///
/// let registry = QuotaRegistry::default()
///     .with_model("gemini-2.5-flash", ModelQuota::new(10, 250).fallback_capable(true));
///
/// assert_eq!(*registry.limits("gemini-2.5-flash").requests_per_day(), 250);
/// // Unknown models get the conservative default
/// assert_eq!(registry.limits("gemini-9-ultra"), ModelQuota::CONSERVATIVE);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaRegistry {
    default: ModelQuota,
    models: HashMap<String, ModelQuota>,
}

impl QuotaRegistry {
    /// Empty registry with a custom default for unknown models.
    pub fn new(default: ModelQuota) -> Self {
        Self {
            default,
            models: HashMap::new(),
        }
    }

    /// Add or replace one model's quota.
    pub fn with_model(mut self, model: impl Into<String>, quota: ModelQuota) -> Self {
        self.models.insert(model.into(), quota);
        self
    }

    /// Build a registry from a configured tier.
    ///
    /// Tier-level `rpm`/`rpd` become the default for unknown models; each
    /// `models."<id>"` entry overrides them for that model.
    #[instrument(skip(tier), fields(tier = %tier.name))]
    pub fn from_tier(tier: &TierConfig) -> Self {
        let default = ModelQuota::new(
            tier.rpm
                .unwrap_or(*ModelQuota::CONSERVATIVE.requests_per_minute()),
            tier.rpd
                .unwrap_or(*ModelQuota::CONSERVATIVE.requests_per_day()),
        );

        let models: HashMap<String, ModelQuota> = tier
            .models
            .keys()
            .map(|model| (model.clone(), tier.quota_for(model)))
            .collect();

        debug!(models = models.len(), "Built quota registry from tier");

        Self { default, models }
    }

    /// Limits for a model, or the default for unknown models.
    pub fn limits(&self, model: &str) -> ModelQuota {
        self.models.get(model).copied().unwrap_or(self.default)
    }

    /// Whether the model is known and classified as fallback-capable.
    pub fn is_fallback_capable(&self, model: &str) -> bool {
        self.models
            .get(model)
            .is_some_and(|quota| quota.fallback_capable)
    }

    /// Identifiers of every model with an explicit entry, sorted.
    pub fn known_models(&self) -> Vec<String> {
        let mut models: Vec<String> = self.models.keys().cloned().collect();
        models.sort();
        models
    }
}
