//! Traits at the boundary between the core and its collaborators.

use async_trait::async_trait;
use deepdraft_core::{GenerateRequest, ModelRole, Settings, StreamChunk};
use deepdraft_error::ProviderError;
use futures_util::stream::Stream;
use std::pin::Pin;

/// Incremental output of one generation.
///
/// Yields text chunks and ends either cleanly or with a single error.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// A language-model provider client.
///
/// Implementations issue the request against `model` and return a stream of
/// chunks. Rejections carry an HTTP-like status and message so the core can
/// tell rate limits from retired models from everything else.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Start a streamed generation against a specific model.
    async fn stream(
        &self,
        model: &str,
        request: &GenerateRequest,
    ) -> Result<ChunkStream, ProviderError>;

    /// Provider name (e.g., "gemini").
    fn provider_name(&self) -> &'static str;
}

/// Read-only access to the user's configured preferences.
pub trait SettingsStore: Send + Sync {
    /// Preferred model for reasoning and drafting.
    fn thinking_model(&self) -> String;

    /// Preferred model for search-grounded research.
    fn networking_model(&self) -> String;

    /// Output language code.
    fn language(&self) -> String;

    /// Preferred model for a role.
    fn model_for(&self, role: ModelRole) -> String {
        match role {
            ModelRole::Thinking => self.thinking_model(),
            ModelRole::Networking => self.networking_model(),
        }
    }
}

impl SettingsStore for Settings {
    fn thinking_model(&self) -> String {
        self.thinking_model.clone()
    }

    fn networking_model(&self) -> String {
        self.networking_model.clone()
    }

    fn language(&self) -> String {
        self.language.clone()
    }
}
