//! Per-model cooldown after provider rate-limit signals.

use crate::Clock;
use crate::usage::ceil_seconds;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Cooldown state per model.
///
/// A model is either idle (no entry) or cooling until an instant. Expiry is
/// checked against the clock on every read; an expired entry is removed then.
///
/// # Example
///
/// ```
/// use deepdraft_rate_limit::{CooldownTracker, ManualClock};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let clock = ManualClock::at_millis(1_700_000_000_000);
/// let cooldowns = CooldownTracker::new(Arc::new(clock.clone()));
///
/// cooldowns.enter_cooldown("gemini-2.5-pro", Duration::from_secs(30));
/// assert_eq!(cooldowns.remaining_seconds("gemini-2.5-pro"), 30);
///
/// clock.advance(Duration::from_secs(30));
/// assert!(!cooldowns.is_in_cooldown("gemini-2.5-pro"));
/// ```
#[derive(Debug)]
pub struct CooldownTracker {
    clock: Arc<dyn Clock>,
    active_until: DashMap<String, DateTime<Utc>>,
}

impl CooldownTracker {
    /// Create a tracker reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            active_until: DashMap::new(),
        }
    }

    /// Put `model` into cooldown for `duration` from now.
    ///
    /// An existing cooldown that ends later is left alone. Returns the
    /// instant the cooldown now ends.
    #[instrument(skip(self))]
    pub fn enter_cooldown(&self, model: &str, duration: Duration) -> DateTime<Utc> {
        let now = self.clock.now();
        let requested = TimeDelta::from_std(duration)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut entry = self
            .active_until
            .entry(model.to_string())
            .or_insert(requested);
        if *entry < requested {
            *entry = requested;
        }
        let until = *entry;

        debug!(until = %until, "Model cooling down");
        until
    }

    /// End of the active cooldown, if any.
    pub fn active_until(&self, model: &str) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        self.active_until.remove_if(model, |_, until| *until <= now);
        self.active_until.get(model).map(|until| *until)
    }

    /// Whether `model` is cooling down right now.
    pub fn is_in_cooldown(&self, model: &str) -> bool {
        self.active_until(model).is_some()
    }

    /// Whole seconds left in the cooldown, rounded up; zero when idle.
    pub fn remaining_seconds(&self, model: &str) -> u64 {
        match self.active_until(model) {
            Some(until) => ceil_seconds(until - self.clock.now()),
            None => 0,
        }
    }
}
