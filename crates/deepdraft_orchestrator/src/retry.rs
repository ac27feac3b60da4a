//! The two independent retry budgets.

use deepdraft_rate_limit::OrchestratorConfig;
use std::time::Duration;
use tokio_retry2::strategy::ExponentialBackoff;

/// Budget for rate-limited dispatches.
///
/// Each rate-limit signal puts the model into cooldown for the provider's
/// delay, or the default when none was given, never less than the minimum.
#[derive(Debug, Clone, PartialEq, Eq, derive_getters::Getters)]
pub struct RateLimitPolicy {
    max_attempts: u32,
    default_cooldown: Duration,
    min_delay: Duration,
}

impl RateLimitPolicy {
    /// Create a policy.
    pub fn new(max_attempts: u32, default_cooldown: Duration, min_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            default_cooldown,
            min_delay,
        }
    }

    /// Cooldown to apply for a rate-limit signal.
    pub fn cooldown_for(&self, retry_after: Option<Duration>) -> Duration {
        retry_after
            .unwrap_or(self.default_cooldown)
            .max(self.min_delay)
    }

    /// Whether another attempt is allowed after `failures` rate limits.
    pub fn allows(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(60), Duration::from_secs(5))
    }
}

/// Budget for other failures, waiting `2^n` seconds after the n-th.
#[derive(Debug, Clone, PartialEq, Eq, derive_getters::Getters)]
pub struct BackoffPolicy {
    max_attempts: u32,
    max_delay: Duration,
}

impl BackoffPolicy {
    /// Create a policy.
    pub fn new(max_attempts: u32, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            max_delay,
        }
    }

    /// Delays between attempts: 2s, 4s, 8s, ... capped at `max_delay`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        ExponentialBackoff::from_millis(2)
            .factor(1000)
            .max_delay(self.max_delay)
            .take(self.max_attempts.saturating_sub(1) as usize)
    }

    /// Whether another attempt is allowed after `failures` failures.
    pub fn allows(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(30))
    }
}

/// Rate-limit and backoff budgets, counted separately per request.
#[derive(Debug, Clone, Default, PartialEq, Eq, derive_getters::Getters)]
pub struct RetryPolicies {
    rate_limit: RateLimitPolicy,
    backoff: BackoffPolicy,
}

impl RetryPolicies {
    /// Combine two policies.
    pub fn new(rate_limit: RateLimitPolicy, backoff: BackoffPolicy) -> Self {
        Self {
            rate_limit,
            backoff,
        }
    }

    /// Policies from the `[orchestrator]` configuration section.
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(
            RateLimitPolicy::new(
                config.rate_limit_max_attempts,
                config.default_cooldown(),
                config.min_rate_limit_delay(),
            ),
            BackoffPolicy::new(
                config.backoff_max_attempts,
                Duration::from_secs(config.backoff_max_delay_secs),
            ),
        )
    }
}
