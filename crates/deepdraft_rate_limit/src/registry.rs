//! Owner of all per-model rate-limit state.

use crate::{
    Clock, CooldownTracker, DeepdraftConfig, FallbackChain, Impairment, QuotaRegistry, Resolution,
    SystemClock, UnavailabilityRegistry, Usage, UsageTracker, select_fallback,
};
use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use deepdraft_error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, instrument};

const DEFAULT_EVENT_CAPACITY: usize = 64;

/// State change published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RegistryEvent {
    /// A request was counted against a model
    #[serde(rename_all = "camelCase")]
    RequestRecorded {
        /// Model
        model: String,
        /// Counts after recording
        usage: Usage,
    },
    /// A model entered (or extended) a cooldown
    #[serde(rename_all = "camelCase")]
    CooldownEntered {
        /// Model
        model: String,
        /// When the cooldown ends
        until: DateTime<Utc>,
    },
    /// A model was flagged unavailable for the session
    #[serde(rename_all = "camelCase")]
    MarkedUnavailable {
        /// Model
        model: String,
    },
}

/// Current value against its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    /// Requests counted
    pub current: u32,
    /// Ceiling
    pub limit: u32,
}

/// Per-minute and per-day counters for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    /// Requests per minute
    pub rpm: UsageCounter,
    /// Requests per day
    pub rpd: UsageCounter,
}

/// Snapshot of one model for the UI.
///
/// Serialises as
/// `{model, inCooldown, remainingSeconds, isExhausted, isUnavailable, usage: {rpm, rpd}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    /// Model identifier
    pub model: String,
    /// Cooling down, or minute window full
    pub in_cooldown: bool,
    /// Seconds until the model can be used again
    pub remaining_seconds: u64,
    /// Daily ceiling reached
    pub is_exhausted: bool,
    /// Flagged unavailable for the session
    pub is_unavailable: bool,
    /// Counters
    pub usage: UsageReport,
}

/// Builder for [`RateLimitRegistry`].
#[derive(Debug)]
pub struct RateLimitRegistryBuilder {
    quotas: QuotaRegistry,
    chain: FallbackChain,
    clock: Arc<dyn Clock>,
    reset_offset: Option<FixedOffset>,
    event_capacity: usize,
}

impl RateLimitRegistryBuilder {
    /// Use `clock` instead of the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Timezone whose midnight starts a new quota day (local time by default).
    pub fn reset_offset(mut self, offset: FixedOffset) -> Self {
        self.reset_offset = Some(offset);
        self
    }

    /// Buffered events per subscriber before the slowest one starts lagging.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Build the registry.
    pub fn build(self) -> RateLimitRegistry {
        let reset_offset = self
            .reset_offset
            .unwrap_or_else(|| *self.clock.now().with_timezone(&chrono::Local).offset());
        let (events, _) = broadcast::channel(self.event_capacity);

        RateLimitRegistry {
            usage: UsageTracker::new(self.quotas, Arc::clone(&self.clock), reset_offset),
            cooldowns: CooldownTracker::new(Arc::clone(&self.clock)),
            unavailable: UnavailabilityRegistry::new(),
            chain: self.chain,
            events,
            clock: self.clock,
        }
    }
}

/// Usage, cooldown and availability state for every model in one session.
///
/// The orchestrator holds the only `Arc<RateLimitRegistry>` and is the only
/// writer. Everything else gets a [`RegistryView`].
///
/// # Example
///
/// ```
/// use deepdraft_rate_limit::{FallbackChain, ManualClock, ModelQuota, QuotaRegistry, RateLimitRegistry};
/// use std::sync::Arc;
///
/// let quotas = QuotaRegistry::default()
///     .with_model("gemini-2.5-pro", ModelQuota::new(5, 100).fallback_capable(true))
///     .with_model("gemini-2.5-flash", ModelQuota::new(10, 250).fallback_capable(true));
/// let chain = FallbackChain::new(["gemini-2.5-pro", "gemini-2.5-flash"]).unwrap();
/// let registry = RateLimitRegistry::builder(quotas, chain)
///     .clock(Arc::new(ManualClock::at_millis(1_700_000_000_000)))
///     .build();
///
/// registry.mark_unavailable("gemini-2.5-pro");
/// let resolution = registry.resolve("gemini-2.5-pro").unwrap();
/// assert_eq!(resolution.model(), "gemini-2.5-flash");
/// ```
#[derive(Debug)]
pub struct RateLimitRegistry {
    usage: UsageTracker,
    cooldowns: CooldownTracker,
    unavailable: UnavailabilityRegistry,
    chain: FallbackChain,
    events: broadcast::Sender<RegistryEvent>,
    clock: Arc<dyn Clock>,
}

impl RateLimitRegistry {
    /// Start building a registry on the system clock.
    pub fn builder(quotas: QuotaRegistry, chain: FallbackChain) -> RateLimitRegistryBuilder {
        RateLimitRegistryBuilder {
            quotas,
            chain,
            clock: Arc::new(SystemClock),
            reset_offset: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Registry for the configured provider, tier and fallback chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider or tier is missing, or the chain is
    /// empty or names a model that is not fallback-capable.
    pub fn from_config(config: &DeepdraftConfig) -> Result<RateLimitRegistryBuilder, ConfigError> {
        config.orchestrator.validate()?;
        let quotas = config.quota_registry()?;
        let chain = config.fallback_chain(&quotas)?;
        Ok(Self::builder(quotas, chain).reset_offset(config.orchestrator.daily_reset_offset()))
    }

    /// Quota table.
    pub fn quotas(&self) -> &QuotaRegistry {
        self.usage.quotas()
    }

    /// Configured fallback chain.
    pub fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    /// Read-only handle for UI code.
    pub fn view(self: &Arc<Self>) -> RegistryView {
        RegistryView {
            registry: Arc::clone(self),
        }
    }

    /// Receive every subsequent state change.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: RegistryEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Count a request against `model`.
    pub fn record_request(&self, model: &str) -> Usage {
        let usage = self.usage.record_request(model);
        self.publish(RegistryEvent::RequestRecorded {
            model: model.to_string(),
            usage,
        });
        usage
    }

    /// Put `model` into cooldown; never shortens an existing one.
    #[instrument(skip(self))]
    pub fn enter_cooldown(&self, model: &str, duration: Duration) -> DateTime<Utc> {
        let until = self.cooldowns.enter_cooldown(model, duration);
        self.publish(RegistryEvent::CooldownEntered {
            model: model.to_string(),
            until,
        });
        until
    }

    /// Flag `model` unavailable for the rest of the session.
    pub fn mark_unavailable(&self, model: &str) {
        if self.unavailable.mark_unavailable(model) {
            self.publish(RegistryEvent::MarkedUnavailable {
                model: model.to_string(),
            });
        }
    }

    /// Current counts for `model`.
    pub fn current_usage(&self, model: &str) -> Usage {
        self.usage.current_usage(model)
    }

    /// Daily ceiling reached.
    pub fn is_exhausted(&self, model: &str) -> bool {
        self.usage.is_exhausted(model)
    }

    /// Minute window full.
    pub fn is_minute_saturated(&self, model: &str) -> bool {
        self.usage.is_minute_saturated(model)
    }

    /// In an explicit cooldown.
    pub fn is_in_cooldown(&self, model: &str) -> bool {
        self.cooldowns.is_in_cooldown(model)
    }

    /// Seconds left in the explicit cooldown.
    pub fn remaining_seconds(&self, model: &str) -> u64 {
        self.cooldowns.remaining_seconds(model)
    }

    /// Seconds before a request to `model` would not be throttled locally.
    ///
    /// The larger of the cooldown remainder and the wait for a minute slot.
    pub fn wait_seconds(&self, model: &str) -> u64 {
        self.remaining_seconds(model)
            .max(self.usage.seconds_until_minute_slot(model))
    }

    /// Instant after which `model` is no longer throttled locally, given the
    /// state right now.
    pub fn ready_at(&self, model: &str) -> DateTime<Utc> {
        let now = self.clock.now();
        i64::try_from(self.wait_seconds(model))
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|wait| now.checked_add_signed(wait))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Flagged unavailable.
    pub fn is_unavailable(&self, model: &str) -> bool {
        self.unavailable.is_unavailable(model)
    }

    /// Every model flagged unavailable, sorted.
    pub fn unavailable_models(&self) -> Vec<String> {
        self.unavailable.unavailable_models()
    }

    /// Everything that currently counts against `model`.
    pub fn impairment(&self, model: &str) -> Impairment {
        Impairment {
            exhausted: self.is_exhausted(model),
            cooling: self.is_in_cooldown(model) || self.is_minute_saturated(model),
            unavailable: self.is_unavailable(model),
        }
    }

    /// Least-impaired alternative to `preferred`; `None` only if every
    /// candidate is unavailable.
    pub fn fallback(&self, preferred: &str) -> Option<String> {
        select_fallback(&self.chain, preferred, |model| self.impairment(model))
    }

    /// Model a request for `preferred` should go to right now.
    #[instrument(skip(self))]
    pub fn resolve(&self, preferred: &str) -> Option<Resolution> {
        let resolution = self
            .chain
            .resolve(preferred, |model| self.impairment(model));
        debug!(?resolution, "Resolved model");
        resolution
    }

    /// UI snapshot of `model`.
    pub fn status(&self, model: &str) -> ModelStatus {
        let quota = self.quotas().limits(model);
        let usage = self.current_usage(model);
        let remaining_seconds = self.wait_seconds(model);

        ModelStatus {
            model: model.to_string(),
            in_cooldown: remaining_seconds > 0,
            remaining_seconds,
            is_exhausted: usage.day_count >= *quota.requests_per_day(),
            is_unavailable: self.is_unavailable(model),
            usage: UsageReport {
                rpm: UsageCounter {
                    current: usage.minute_count,
                    limit: *quota.requests_per_minute(),
                },
                rpd: UsageCounter {
                    current: usage.day_count,
                    limit: *quota.requests_per_day(),
                },
            },
        }
    }

    /// Snapshots of every configured, chained or referenced model.
    pub fn statuses(&self) -> BTreeMap<String, ModelStatus> {
        let models: BTreeSet<String> = self
            .quotas()
            .known_models()
            .into_iter()
            .chain(self.chain.models().iter().cloned())
            .chain(self.usage.tracked_models())
            .chain(self.unavailable_models())
            .collect();

        models
            .into_iter()
            .map(|model| {
                let status = self.status(&model);
                (model, status)
            })
            .collect()
    }
}

/// Read-only access to a [`RateLimitRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryView {
    registry: Arc<RateLimitRegistry>,
}

impl RegistryView {
    /// UI snapshot of `model`.
    pub fn status(&self, model: &str) -> ModelStatus {
        self.registry.status(model)
    }

    /// Snapshots keyed by model.
    pub fn statuses(&self) -> BTreeMap<String, ModelStatus> {
        self.registry.statuses()
    }

    /// Receive every subsequent state change.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.registry.subscribe()
    }

    /// Configured fallback chain.
    pub fn chain(&self) -> &FallbackChain {
        self.registry.chain()
    }

    /// Model a request for `preferred` would go to right now.
    pub fn resolve(&self, preferred: &str) -> Option<Resolution> {
        self.registry.resolve(preferred)
    }

    /// Every model flagged unavailable, sorted.
    pub fn unavailable_models(&self) -> Vec<String> {
        self.registry.unavailable_models()
    }
}
