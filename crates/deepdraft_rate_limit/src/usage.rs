//! Per-model request counting over a sliding minute and a calendar day.

use crate::{Clock, QuotaRegistry};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Width of the per-minute window.
const MINUTE_MILLIS: i64 = 60_000;

fn minute() -> TimeDelta {
    TimeDelta::milliseconds(MINUTE_MILLIS)
}

/// Request counts for one model at the moment of the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Requests in the trailing 60 seconds
    pub minute_count: u32,
    /// Requests since the start of the current calendar day
    pub day_count: u32,
}

#[derive(Debug)]
struct UsageWindow {
    minute: VecDeque<DateTime<Utc>>,
    day: NaiveDate,
    day_count: u32,
}

impl UsageWindow {
    fn new(day: NaiveDate) -> Self {
        Self {
            minute: VecDeque::new(),
            day,
            day_count: 0,
        }
    }

    /// Drop expired minute entries and reset the day counter on a new date.
    fn refresh(&mut self, now: DateTime<Utc>, today: NaiveDate) {
        while let Some(oldest) = self.minute.front() {
            if now - *oldest >= minute() {
                self.minute.pop_front();
            } else {
                break;
            }
        }

        if today != self.day {
            debug!(previous = %self.day, today = %today, "Day rolled over, resetting daily count");
            self.day = today;
            self.day_count = 0;
        }
    }

    fn usage(&self) -> Usage {
        Usage {
            minute_count: u32::try_from(self.minute.len()).unwrap_or(u32::MAX),
            day_count: self.day_count,
        }
    }
}

/// Tracks how many requests each model has received.
///
/// State for a model is created the first time it is referenced. Nothing is
/// reset by a timer; expired minute entries and stale day counts are cleared
/// whenever the model is read or written.
///
/// # Example
///
/// ```
/// use deepdraft_rate_limit::{ManualClock, ModelQuota, QuotaRegistry, UsageTracker};
/// use chrono::FixedOffset;
/// use std::sync::Arc;
///
/// let quotas = QuotaRegistry::default().with_model("gemini-2.5-flash", ModelQuota::new(10, 2));
/// let clock = ManualClock::at_millis(1_700_000_000_000);
/// let offset = FixedOffset::east_opt(0).unwrap();
/// let tracker = UsageTracker::new(quotas, Arc::new(clock), offset);
///
/// tracker.record_request("gemini-2.5-flash");
/// tracker.record_request("gemini-2.5-flash");
/// assert!(tracker.is_exhausted("gemini-2.5-flash"));
/// ```
#[derive(Debug)]
pub struct UsageTracker {
    quotas: QuotaRegistry,
    clock: Arc<dyn Clock>,
    reset_offset: FixedOffset,
    windows: DashMap<String, UsageWindow>,
}

impl UsageTracker {
    /// Create a tracker.
    ///
    /// `reset_offset` is the timezone whose midnight starts a new quota day.
    pub fn new(quotas: QuotaRegistry, clock: Arc<dyn Clock>, reset_offset: FixedOffset) -> Self {
        Self {
            quotas,
            clock,
            reset_offset,
            windows: DashMap::new(),
        }
    }

    /// Quota table this tracker compares against.
    pub fn quotas(&self) -> &QuotaRegistry {
        &self.quotas
    }

    fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.reset_offset).date_naive()
    }

    /// Run `f` on the refreshed window for `model`, creating it if needed.
    fn with_window<R>(
        &self,
        model: &str,
        f: impl FnOnce(&mut UsageWindow, DateTime<Utc>) -> R,
    ) -> R {
        let now = self.clock.now();
        let today = self.today(now);
        let mut window = self
            .windows
            .entry(model.to_string())
            .or_insert_with(|| UsageWindow::new(today));
        window.refresh(now, today);
        f(&mut *window, now)
    }

    /// Count one request against `model` at the current time.
    #[instrument(skip(self))]
    pub fn record_request(&self, model: &str) -> Usage {
        let usage = self.with_window(model, |window, now| {
            window.minute.push_back(now);
            window.day_count = window.day_count.saturating_add(1);
            window.usage()
        });
        debug!(
            minute_count = usage.minute_count,
            day_count = usage.day_count,
            "Recorded request"
        );
        usage
    }

    /// Current counts for `model`.
    pub fn current_usage(&self, model: &str) -> Usage {
        self.with_window(model, |window, _| window.usage())
    }

    /// Models that have been referenced at least once.
    pub(crate) fn tracked_models(&self) -> Vec<String> {
        self.windows.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Whether the daily ceiling has been reached.
    pub fn is_exhausted(&self, model: &str) -> bool {
        let limit = *self.quotas.limits(model).requests_per_day();
        self.current_usage(model).day_count >= limit
    }

    /// Whether the per-minute ceiling has been reached.
    pub fn is_minute_saturated(&self, model: &str) -> bool {
        let limit = *self.quotas.limits(model).requests_per_minute();
        self.current_usage(model).minute_count >= limit
    }

    /// Seconds until the minute window has room for another request.
    ///
    /// Zero when the window is not saturated.
    pub fn seconds_until_minute_slot(&self, model: &str) -> u64 {
        let limit = *self.quotas.limits(model).requests_per_minute() as usize;
        self.with_window(model, |window, now| {
            if window.minute.len() < limit {
                return 0;
            }
            // The slot frees up when enough of the oldest entries have aged out.
            let freeing = window.minute.len() - limit;
            window
                .minute
                .get(freeing)
                .map(|ts| ceil_seconds(*ts + minute() - now))
                .unwrap_or(0)
        })
    }
}

/// Round a positive delta up to whole seconds; negative deltas are zero.
pub(crate) fn ceil_seconds(delta: TimeDelta) -> u64 {
    let micros = delta.num_microseconds().unwrap_or(i64::MAX);
    if micros <= 0 {
        return 0;
    }
    (micros as u64).div_ceil(1_000_000)
}
