//! Metrics for orchestrated requests.
//!
//! Counters go to the global OpenTelemetry meter provider. Without an
//! exporter installed they are no-ops.

use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram, Meter},
};
use std::sync::OnceLock;

static METRICS: OnceLock<OrchestratorMetrics> = OnceLock::new();

/// Counters for dispatches, fallbacks and failures, labelled by model.
#[derive(Clone)]
pub struct OrchestratorMetrics {
    /// Meter handle kept alive for metric instruments
    _meter: Meter,
    /// Requests sent to the provider
    pub dispatches: Counter<u64>,
    /// Rate-limit signals received
    pub rate_limits: Counter<u64>,
    /// Requests served by a model other than the preferred one
    pub fallbacks: Counter<u64>,
    /// Models flagged unavailable
    pub unavailable: Counter<u64>,
    /// Requests that ended in an error
    pub failures: Counter<u64>,
    /// Time from first resolve to result, in seconds
    pub duration: Histogram<f64>,
}

impl std::fmt::Debug for OrchestratorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorMetrics").finish_non_exhaustive()
    }
}

impl OrchestratorMetrics {
    fn init() -> Self {
        let meter = global::meter("deepdraft_orchestrator");

        Self {
            _meter: meter.clone(),
            dispatches: meter
                .u64_counter("deepdraft.dispatches")
                .with_description("Requests sent to the provider")
                .build(),
            rate_limits: meter
                .u64_counter("deepdraft.rate_limits")
                .with_description("Rate-limit signals received from the provider")
                .build(),
            fallbacks: meter
                .u64_counter("deepdraft.fallbacks")
                .with_description("Requests served by a fallback model")
                .build(),
            unavailable: meter
                .u64_counter("deepdraft.models_unavailable")
                .with_description("Models flagged unavailable")
                .build(),
            failures: meter
                .u64_counter("deepdraft.failures")
                .with_description("Requests that ended in an error")
                .build(),
            duration: meter
                .f64_histogram("deepdraft.request.duration")
                .with_unit("seconds")
                .with_description("Orchestrated request duration")
                .build(),
        }
    }

    /// Get the global orchestrator metrics instance.
    pub fn get() -> &'static Self {
        METRICS.get_or_init(Self::init)
    }

    /// Record a dispatch to `model`.
    pub fn record_dispatch(&self, model: &str) {
        self.dispatches
            .add(1, &[KeyValue::new("model", model.to_string())]);
    }

    /// Record a rate-limit signal for `model`.
    pub fn record_rate_limit(&self, model: &str) {
        self.rate_limits
            .add(1, &[KeyValue::new("model", model.to_string())]);
    }

    /// Record that `fallback` served a request for `preferred`.
    pub fn record_fallback(&self, preferred: &str, fallback: &str) {
        self.fallbacks.add(
            1,
            &[
                KeyValue::new("preferred", preferred.to_string()),
                KeyValue::new("model", fallback.to_string()),
            ],
        );
    }

    /// Record that `model` was flagged unavailable.
    pub fn record_unavailable(&self, model: &str) {
        self.unavailable
            .add(1, &[KeyValue::new("model", model.to_string())]);
    }

    /// Record a failed request.
    pub fn record_failure(&self, model: &str, error_type: &'static str) {
        self.failures.add(
            1,
            &[
                KeyValue::new("model", model.to_string()),
                KeyValue::new("error_type", error_type),
            ],
        );
    }

    /// Record how long a request took.
    pub fn record_duration(&self, model: &str, duration_secs: f64) {
        self.duration
            .record(duration_secs, &[KeyValue::new("model", model.to_string())]);
    }
}

impl Default for OrchestratorMetrics {
    fn default() -> Self {
        Self::get().clone()
    }
}
