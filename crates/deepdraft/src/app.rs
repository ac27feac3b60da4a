//! Composition root.

use deepdraft_core::{GenerateRequest, ModelRole, StreamChunk};
use deepdraft_error::DeepdraftResult;
use deepdraft_interface::{GenerationProvider, SettingsStore};
use deepdraft_orchestrator::{Generation, Orchestrator, WorkQueue};
use deepdraft_rate_limit::{Clock, DeepdraftConfig, RateLimitRegistry, RegistryView};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, instrument};

/// One application's rate-limit state and the orchestrators that write it.
///
/// Build one per process and hand [`view`](Self::view) to UI code. Both
/// orchestrators share the registry; the search one runs up to
/// `search_concurrency` requests at once, the other `max_concurrent_requests`.
#[derive(Debug, Clone)]
pub struct Deepdraft {
    config: DeepdraftConfig,
    registry: Arc<RateLimitRegistry>,
    orchestrator: Orchestrator,
    search: Orchestrator,
}

impl Deepdraft {
    /// Load layered configuration and build on the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or is invalid.
    pub fn load(provider: Arc<dyn GenerationProvider>) -> DeepdraftResult<Self> {
        Self::new(DeepdraftConfig::load()?, provider)
    }

    /// Build from an explicit configuration on the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: DeepdraftConfig,
        provider: Arc<dyn GenerationProvider>,
    ) -> DeepdraftResult<Self> {
        let registry = RateLimitRegistry::from_config(&config)?.build();
        Ok(Self::assemble(config, provider, registry))
    }

    /// Build with a custom time source.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_clock(
        config: DeepdraftConfig,
        provider: Arc<dyn GenerationProvider>,
        clock: Arc<dyn Clock>,
    ) -> DeepdraftResult<Self> {
        let registry = RateLimitRegistry::from_config(&config)?
            .clock(clock)
            .build();
        Ok(Self::assemble(config, provider, registry))
    }

    #[instrument(skip_all, fields(provider = provider.provider_name()))]
    fn assemble(
        config: DeepdraftConfig,
        provider: Arc<dyn GenerationProvider>,
        registry: RateLimitRegistry,
    ) -> Self {
        let registry = Arc::new(registry);
        let orchestrator =
            Orchestrator::new(provider, Arc::clone(&registry), &config.orchestrator);
        let search = orchestrator
            .clone()
            .with_queue(WorkQueue::new(config.orchestrator.search_concurrency));

        info!(
            chain = ?registry.chain().models(),
            "Deepdraft ready"
        );

        Self {
            config,
            registry,
            orchestrator,
            search,
        }
    }

    /// Configuration in effect.
    pub fn config(&self) -> &DeepdraftConfig {
        &self.config
    }

    /// Read-only registry handle for UI code.
    pub fn view(&self) -> RegistryView {
        self.registry.view()
    }

    /// Orchestrator for ordinary call sites.
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Orchestrator for batched search tasks.
    pub fn search_orchestrator(&self) -> &Orchestrator {
        &self.search
    }

    /// Generate with the model the settings assign to `role`.
    ///
    /// Networking requests go through the search queue.
    ///
    /// # Errors
    ///
    /// Returns an orchestration error when the request cannot be completed.
    pub async fn generate(
        &self,
        settings: &dyn SettingsStore,
        role: ModelRole,
        request: &GenerateRequest,
        sink: Option<mpsc::Sender<StreamChunk>>,
    ) -> DeepdraftResult<Generation> {
        let orchestrator = match role {
            ModelRole::Thinking => &self.orchestrator,
            ModelRole::Networking => &self.search,
        };
        Ok(orchestrator
            .generate_for_role(settings, role, request, sink)
            .await?)
    }
}
