//! Mock generation provider for testing.

use async_trait::async_trait;
use chrono::Utc;
use deepdraft_core::{GenerateRequest, StreamChunk};
use deepdraft_error::{ProviderError, ProviderErrorKind};
use deepdraft_interface::{ChunkStream, GenerationProvider};
use deepdraft_rate_limit::retry_after_from_headers;
use reqwest::header::HeaderMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Behavior configuration for mock responses.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Always stream the given text as one chunk
    Success(String),
    /// Always fail with the specified error
    Error(ProviderError),
    /// Fail N times with the error, then succeed with the text
    FailThenSucceed {
        fail_count: usize,
        error: ProviderError,
        success_text: String,
    },
    /// Return a sequence of responses (errors or success)
    Sequence(Vec<MockResponse>),
}

/// A single mock response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Stream the text as one chunk
    Success(String),
    /// Stream each chunk in turn
    Chunks(Vec<StreamChunk>),
    /// Reject before streaming
    Error(ProviderError),
    /// Stream some text, then fail
    FailMidStream(Vec<String>, ProviderError),
    /// Reject with a raw HTTP status, headers and body
    Http {
        status: u16,
        headers: HeaderMap,
        body: String,
    },
}

/// Mock provider with per-model behavior.
///
/// Models without their own behavior use the default one. Every call is
/// recorded so tests can check which models were dispatched to.
pub struct MockProvider {
    default: MockBehavior,
    per_model: HashMap<String, MockBehavior>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    /// Provider that answers every model with `text`.
    pub fn new_success(text: impl Into<String>) -> Self {
        Self::new_with_behavior(MockBehavior::Success(text.into()))
    }

    /// Provider that fails every call with `error`.
    pub fn new_error(error: ProviderError) -> Self {
        Self::new_with_behavior(MockBehavior::Error(error))
    }

    /// Provider with a custom default behavior.
    pub fn new_with_behavior(behavior: MockBehavior) -> Self {
        Self {
            default: behavior,
            per_model: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Override the behavior for one model.
    pub fn with_model(mut self, model: &str, behavior: MockBehavior) -> Self {
        self.per_model.insert(model.to_string(), behavior);
        self
    }

    /// Total number of calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of calls made against `model`.
    pub fn calls_for(&self, model: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.as_str() == model)
            .count()
    }

    /// Models called, in order.
    #[allow(dead_code)]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn next_response(&self, model: &str) -> MockResponse {
        let mut calls = self.calls.lock().unwrap();
        let (behavior, index) = match self.per_model.get(model) {
            Some(behavior) => (
                behavior,
                calls.iter().filter(|m| m.as_str() == model).count(),
            ),
            None => (
                &self.default,
                calls
                    .iter()
                    .filter(|m| !self.per_model.contains_key(m.as_str()))
                    .count(),
            ),
        };
        calls.push(model.to_string());

        match behavior {
            MockBehavior::Success(text) => MockResponse::Success(text.clone()),
            MockBehavior::Error(error) => MockResponse::Error(error.clone()),
            MockBehavior::FailThenSucceed {
                fail_count,
                error,
                success_text,
            } => {
                if index < *fail_count {
                    MockResponse::Error(error.clone())
                } else {
                    MockResponse::Success(success_text.clone())
                }
            }
            MockBehavior::Sequence(responses) => {
                responses.get(index).cloned().unwrap_or_else(|| {
                    MockResponse::Error(ProviderError::new(ProviderErrorKind::InvalidResponse(
                        format!(
                            "Mock sequence exhausted (call {} beyond {} responses)",
                            index + 1,
                            responses.len()
                        ),
                    )))
                })
            }
        }
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    async fn stream(
        &self,
        model: &str,
        _request: &GenerateRequest,
    ) -> Result<ChunkStream, ProviderError> {
        tokio::time::sleep(tokio::time::Duration::from_millis(1)).await;

        let items: Vec<Result<StreamChunk, ProviderError>> = match self.next_response(model) {
            MockResponse::Success(text) => vec![Ok(StreamChunk::text(text))],
            MockResponse::Chunks(chunks) => chunks.into_iter().map(Ok).collect(),
            MockResponse::Error(error) => return Err(error),
            MockResponse::Http {
                status,
                headers,
                body,
            } => {
                let error = ProviderError::http(status, body);
                return Err(match retry_after_from_headers(&headers, Utc::now()) {
                    Some(delay) => error.with_retry_after(delay),
                    None => error,
                });
            }
            MockResponse::FailMidStream(texts, error) => texts
                .into_iter()
                .map(|t| Ok(StreamChunk::text(t)))
                .chain(std::iter::once(Err(error)))
                .collect(),
        };

        let stream = async_stream::stream! {
            for item in items {
                yield item;
            }
        };
        Ok(Box::pin(stream))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
