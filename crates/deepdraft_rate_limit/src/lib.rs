//! Client-side quota tracking and model fallback.
//!
//! This crate keeps the per-model state that decides which language model a
//! request should go to:
//!
//! - [`QuotaRegistry`] - static requests-per-minute / requests-per-day ceilings
//! - [`UsageTracker`] - sliding minute window and calendar-day counter per model
//! - [`CooldownTracker`] - per-model cooldown entered after provider rate limits
//! - [`UnavailabilityRegistry`] - models the provider confirmed are gone
//! - [`FallbackChain`] and [`select_fallback`] - least-impaired alternative model
//! - [`classify`] - maps provider errors to rate-limit / unavailable / failure
//!
//! [`RateLimitRegistry`] owns all of the above for one application and is the
//! only place they are mutated. UI code gets a read-only [`RegistryView`].
//!
//! No background timers are used: minute windows, day rollover and cooldown
//! expiry are recomputed lazily whenever state is read.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod availability;
mod classifier;
mod clock;
mod config;
mod cooldown;
mod fallback;
mod quota;
mod registry;
mod usage;

pub use availability::UnavailabilityRegistry;
pub use classifier::{ErrorClass, classify, retry_after_from_headers, retry_after_from_message};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    DeepdraftConfig, ModelTierConfig, OrchestratorConfig, ProviderConfig, TierConfig,
};
pub use cooldown::CooldownTracker;
pub use fallback::{FallbackChain, Impairment, Resolution, select_fallback};
pub use quota::{ModelQuota, QuotaRegistry};
pub use registry::{
    ModelStatus, RateLimitRegistry, RateLimitRegistryBuilder, RegistryEvent, RegistryView,
    UsageCounter, UsageReport,
};
pub use usage::{Usage, UsageTracker};
