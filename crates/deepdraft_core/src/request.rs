//! Generation request type.

use serde::{Deserialize, Serialize};

/// A single text-generation request, independent of which model serves it.
///
/// The model is chosen by the orchestrator, so it is deliberately not part of
/// the request.
///
/// # Examples
///
/// ```
/// use deepdraft_core::GenerateRequest;
///
/// let request = GenerateRequest::builder()
///     .prompt("Summarise the sources")
///     .temperature(0.2)
///     .use_search_grounding(true)
///     .build()
///     .unwrap();
///
/// assert_eq!(request.prompt(), "Summarise the sources");
/// assert_eq!(*request.temperature(), Some(0.2));
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Default,
    Serialize,
    Deserialize,
    derive_builder::Builder,
    derive_getters::Getters,
)]
#[builder(default)]
pub struct GenerateRequest {
    /// Prompt text sent to the model
    #[builder(setter(into))]
    prompt: String,

    /// Optional system instruction
    #[builder(setter(into, strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    system_instruction: Option<String>,

    /// Sampling temperature
    #[builder(setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    /// Maximum number of tokens to generate
    #[builder(setter(strip_option))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,

    /// Ask the provider to ground the answer with web search
    #[serde(default)]
    use_search_grounding: bool,
}

impl GenerateRequest {
    /// Request with just a prompt and provider defaults for everything else.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Creates a new request builder.
    pub fn builder() -> GenerateRequestBuilder {
        GenerateRequestBuilder::default()
    }
}
