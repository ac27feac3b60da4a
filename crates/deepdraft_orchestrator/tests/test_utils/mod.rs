//! Test utilities for orchestrator tests.

use chrono::{FixedOffset, TimeZone, Utc};
use deepdraft_rate_limit::{FallbackChain, ManualClock, ModelQuota, QuotaRegistry, RateLimitRegistry};
use std::sync::Arc;

pub mod mock_provider;

#[allow(unused_imports)]
pub use mock_provider::{MockBehavior, MockProvider, MockResponse};

pub const PRO: &str = "gemini-2.5-pro";
pub const FLASH: &str = "gemini-2.5-flash";
pub const LITE: &str = "gemini-2.5-flash-lite";

/// Quotas used across the orchestrator tests.
pub fn test_quotas() -> QuotaRegistry {
    QuotaRegistry::default()
        .with_model(PRO, ModelQuota::new(100, 1000).fallback_capable(true))
        .with_model(FLASH, ModelQuota::new(100, 50).fallback_capable(true))
        .with_model(LITE, ModelQuota::new(100, 1000).fallback_capable(true))
}

/// Registry over `chain` on a frozen clock.
pub fn test_registry(chain: &[&str]) -> (ManualClock, Arc<RateLimitRegistry>) {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap());
    let registry = RateLimitRegistry::builder(
        test_quotas(),
        FallbackChain::new(chain.iter().copied()).expect("Non-empty test chain"),
    )
    .clock(Arc::new(clock.clone()))
    .reset_offset(FixedOffset::east_opt(0).unwrap())
    .build();
    (clock, Arc::new(registry))
}
