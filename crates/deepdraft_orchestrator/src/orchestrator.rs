//! The request state machine: resolve, dispatch, react to errors.

use crate::{OrchestratorMetrics, RetryPolicies, WorkPermit, WorkQueue};
use chrono::{DateTime, Utc};
use deepdraft_core::{GenerateRequest, ModelRole, StreamChunk};
use deepdraft_error::{OrchestrationError, OrchestrationErrorKind, ProviderError};
use deepdraft_interface::{GenerationProvider, SettingsStore};
use deepdraft_rate_limit::{
    ErrorClass, OrchestratorConfig, RateLimitRegistry, RegistryView, classify,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Result of a completed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct Generation {
    /// Model that produced the output
    model: String,
    /// Concatenated text of every chunk
    text: String,
    /// Last grounding metadata the provider sent, unmodified
    grounding: Option<serde_json::Value>,
    /// Dispatches made, including failed ones
    attempts: u32,
    /// Whether `model` differs from the requested one
    fell_back: bool,
}

/// Outcome of resolving under a work permit.
#[derive(Debug)]
enum Readiness {
    /// Dispatch to this model now
    Ready(String),
    /// Sleep `wait` seconds, then resolve again
    Wait {
        model: String,
        wait: u64,
        ready_at: DateTime<Utc>,
    },
}

/// Per-request retry bookkeeping.
#[derive(Debug, Default)]
struct Attempts {
    total: u32,
    rate_limited: u32,
    backed_off: u32,
    rerouted: u32,
}

/// Routes generation requests through the rate-limit registry.
///
/// The orchestrator is the only writer of the registry: it records usage
/// before each dispatch, enters cooldowns on rate limits and flags models the
/// provider reports as gone.
///
/// # Example
///
/// ```no_run
/// use deepdraft_core::GenerateRequest;
/// use deepdraft_interface::GenerationProvider;
/// use deepdraft_orchestrator::Orchestrator;
/// use deepdraft_rate_limit::{DeepdraftConfig, RateLimitRegistry};
/// use std::sync::Arc;
///
/// # async fn run(provider: Arc<dyn GenerationProvider>) -> Result<(), Box<dyn std::error::Error>> {
/// let config = DeepdraftConfig::load()?;
/// let registry = Arc::new(RateLimitRegistry::from_config(&config)?.build());
/// let orchestrator = Orchestrator::new(provider, registry, &config.orchestrator);
///
/// let generation = orchestrator
///     .generate("gemini-2.5-pro", &GenerateRequest::new("Outline the article"))
///     .await?;
/// println!("{} answered: {}", generation.model(), generation.text());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Orchestrator {
    provider: Arc<dyn GenerationProvider>,
    registry: Arc<RateLimitRegistry>,
    queue: WorkQueue,
    policies: RetryPolicies,
    max_cooldown_wait: Duration,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider.provider_name())
            .field("queue", &self.queue)
            .field("policies", &self.policies)
            .field("max_cooldown_wait", &self.max_cooldown_wait)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator with policies from `config`.
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        registry: Arc<RateLimitRegistry>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            queue: WorkQueue::new(config.max_concurrent_requests),
            policies: RetryPolicies::from_config(config),
            max_cooldown_wait: config.max_cooldown_wait(),
        }
    }

    /// Same orchestrator drawing slots from `queue`.
    ///
    /// Clones share the registry, so a search-task orchestrator can use
    /// [`WorkQueue::search`] while the rest stays serial.
    pub fn with_queue(mut self, queue: WorkQueue) -> Self {
        self.queue = queue;
        self
    }

    /// Replace the retry policies.
    pub fn with_policies(mut self, policies: RetryPolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Read-only view of the registry this orchestrator writes to.
    pub fn view(&self) -> RegistryView {
        self.registry.view()
    }

    /// Work queue bounding concurrent dispatches.
    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Generate with `preferred`, or a fallback when it is impaired.
    ///
    /// # Errors
    ///
    /// See [`generate_streaming`](Self::generate_streaming).
    pub async fn generate(
        &self,
        preferred: &str,
        request: &GenerateRequest,
    ) -> Result<Generation, OrchestrationError> {
        self.generate_streaming(preferred, request, None).await
    }

    /// Generate with the model the settings assign to `role`.
    ///
    /// # Errors
    ///
    /// See [`generate_streaming`](Self::generate_streaming).
    pub async fn generate_for_role(
        &self,
        settings: &dyn SettingsStore,
        role: ModelRole,
        request: &GenerateRequest,
        sink: Option<mpsc::Sender<StreamChunk>>,
    ) -> Result<Generation, OrchestrationError> {
        let preferred = settings.model_for(role);
        self.generate_streaming(&preferred, request, sink).await
    }

    /// Generate, forwarding chunks to `sink` as they arrive.
    ///
    /// A closed sink does not stop the request; the text is still collected
    /// and usage is still recorded. When a dispatch fails after streaming
    /// some chunks, the next attempt streams from the start again.
    ///
    /// # Errors
    ///
    /// - `NoAvailableModel` if no model can take the request now
    /// - `QuotaExhausted` if the only usable model has hit its daily limit
    /// - `RateLimited` once the rate-limit budget is spent
    /// - `ModelUnavailable` if every reroute hit a retired model
    /// - `GenerationFailure` for other errors, after backoff retries
    #[instrument(skip(self, request, sink), fields(provider = self.provider.provider_name()))]
    pub async fn generate_streaming(
        &self,
        preferred: &str,
        request: &GenerateRequest,
        sink: Option<mpsc::Sender<StreamChunk>>,
    ) -> Result<Generation, OrchestrationError> {
        let started = Instant::now();
        let metrics = OrchestratorMetrics::get();
        let mut attempts = Attempts::default();
        let mut backoff_delays = self.policies.backoff().delays();
        let max_reroutes = u32::try_from(self.registry.chain().models().len())
            .unwrap_or(u32::MAX)
            .saturating_add(1);

        let mut waited: Option<(String, DateTime<Utc>)> = None;

        loop {
            // No await between resolving and recording usage while the permit is held.
            let permit = self.queue.acquire().await;
            let model = match self.resolve_ready(preferred, waited.as_ref())? {
                Readiness::Ready(model) => model,
                Readiness::Wait {
                    model,
                    wait,
                    ready_at,
                } => {
                    drop(permit);
                    debug!(model = %model, wait, "Waiting for cooldown");
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                    waited = Some((model, ready_at));
                    continue;
                }
            };
            waited = None;

            attempts.total += 1;
            let error = match self.dispatch(&model, request, sink.as_ref(), permit).await {
                Ok((text, grounding)) => {
                    let fell_back = model != preferred;
                    if fell_back {
                        metrics.record_fallback(preferred, &model);
                    }
                    metrics.record_duration(&model, started.elapsed().as_secs_f64());
                    info!(model = %model, attempts = attempts.total, fell_back, "Generation complete");
                    return Ok(Generation {
                        model,
                        text,
                        grounding,
                        attempts: attempts.total,
                        fell_back,
                    });
                }
                Err(error) => error,
            };

            match classify(&error) {
                ErrorClass::RateLimited { retry_after } => {
                    metrics.record_rate_limit(&model);
                    let cooldown = self.policies.rate_limit().cooldown_for(retry_after);
                    self.registry.enter_cooldown(&model, cooldown);
                    attempts.rate_limited += 1;

                    warn!(
                        model = %model,
                        cooldown_secs = cooldown.as_secs(),
                        attempt = attempts.rate_limited,
                        "Rate limited by provider"
                    );

                    if !self.policies.rate_limit().allows(attempts.rate_limited) {
                        metrics.record_failure(&model, "rate_limit");
                        return Err(OrchestrationError::new(
                            OrchestrationErrorKind::RateLimited {
                                wait_seconds: self.registry.remaining_seconds(&model),
                                model,
                            },
                        ));
                    }
                }
                ErrorClass::ModelUnavailable => {
                    warn!(model = %model, error = %error.message(), "Model unavailable, rerouting");
                    self.registry.mark_unavailable(&model);
                    metrics.record_unavailable(&model);
                    attempts.rerouted += 1;

                    if attempts.rerouted >= max_reroutes {
                        metrics.record_failure(&model, "unavailable");
                        return Err(OrchestrationError::new(
                            OrchestrationErrorKind::ModelUnavailable { model },
                        ));
                    }
                }
                ErrorClass::Retryable => {
                    attempts.backed_off += 1;

                    let delay = match backoff_delays.next() {
                        Some(delay) if self.policies.backoff().allows(attempts.backed_off) => delay,
                        _ => {
                            metrics.record_failure(&model, "generation");
                            return Err(generation_failure(model, attempts.total, &error));
                        }
                    };

                    warn!(
                        model = %model,
                        error = %error.message(),
                        attempt = attempts.backed_off,
                        delay_secs = delay.as_secs(),
                        "Generation failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                ErrorClass::Fatal => {
                    warn!(model = %model, error = %error.message(), "Non-retryable provider error");
                    metrics.record_failure(&model, "fatal");
                    return Err(generation_failure(model, attempts.total, &error));
                }
            }
        }
    }

    /// Resolve `preferred` against the registry as it is right now.
    ///
    /// A cooling model is reported as a wait, unless it is the model just
    /// waited for and its cooldown has not been extended since.
    fn resolve_ready(
        &self,
        preferred: &str,
        waited: Option<&(String, DateTime<Utc>)>,
    ) -> Result<Readiness, OrchestrationError> {
        let Some(resolution) = self.registry.resolve(preferred) else {
            warn!(preferred, "Every candidate model is unavailable");
            return Err(OrchestrationError::new(
                OrchestrationErrorKind::NoAvailableModel {
                    preferred: preferred.to_string(),
                    wait_seconds: None,
                },
            ));
        };

        let model = resolution.model().clone();
        let impairment = resolution.impairment();

        if impairment.exhausted {
            warn!(model = %model, "Daily quota exhausted for every candidate");
            return Err(OrchestrationError::new(
                OrchestrationErrorKind::QuotaExhausted { model },
            ));
        }

        if impairment.cooling {
            let ready_at = self.registry.ready_at(&model);
            let waited_out = waited.is_some_and(|(waited_model, deadline)| {
                *waited_model == model && ready_at <= *deadline
            });
            if waited_out {
                return Ok(Readiness::Ready(model));
            }

            let wait = self.registry.wait_seconds(&model);
            if Duration::from_secs(wait) > self.max_cooldown_wait {
                warn!(model = %model, wait, "Cooldown longer than allowed wait");
                return Err(OrchestrationError::new(
                    OrchestrationErrorKind::NoAvailableModel {
                        preferred: preferred.to_string(),
                        wait_seconds: Some(wait),
                    },
                ));
            }
            return Ok(Readiness::Wait {
                model,
                wait,
                ready_at,
            });
        }

        Ok(Readiness::Ready(model))
    }

    /// Send one request to `model` and collect its stream.
    async fn dispatch(
        &self,
        model: &str,
        request: &GenerateRequest,
        sink: Option<&mpsc::Sender<StreamChunk>>,
        _permit: WorkPermit,
    ) -> Result<(String, Option<serde_json::Value>), ProviderError> {
        self.registry.record_request(model);
        OrchestratorMetrics::get().record_dispatch(model);
        debug!(model, "Dispatching request");

        let mut stream = self.provider.stream(model, request).await?;
        let mut text = String::new();
        let mut grounding = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            text.push_str(&chunk.text);
            if chunk.grounding.is_some() {
                grounding.clone_from(&chunk.grounding);
            }
            if let Some(sink) = sink
                && sink.send(chunk).await.is_err()
            {
                debug!(model, "Chunk receiver dropped, continuing without it");
            }
        }

        Ok((text, grounding))
    }
}

fn generation_failure(model: String, attempts: u32, error: &ProviderError) -> OrchestrationError {
    OrchestrationError::new(OrchestrationErrorKind::GenerationFailure {
        model,
        attempts,
        cause: error.kind().to_string(),
    })
}
