//! Tests for the request orchestrator state machine.

mod test_utils;

use deepdraft_core::{GenerateRequest, ModelRole, Settings, StreamChunk};
use deepdraft_error::{OrchestrationErrorKind, ProviderError, ProviderErrorKind};
use deepdraft_orchestrator::{Orchestrator, WorkQueue};
use deepdraft_rate_limit::OrchestratorConfig;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{
    FLASH, LITE, MockBehavior, MockProvider, MockResponse, PRO, test_registry,
};
use tokio::sync::mpsc;

fn request() -> GenerateRequest {
    GenerateRequest::new("Write the opening paragraph")
}

fn not_found(model: &str) -> ProviderError {
    ProviderError::http(
        404,
        format!("models/{model} is not found for API version v1beta, or is not supported for generateContent."),
    )
}

fn orchestrator(
    provider: &Arc<MockProvider>,
    registry: &Arc<deepdraft_rate_limit::RateLimitRegistry>,
) -> Orchestrator {
    Orchestrator::new(
        provider.clone(),
        Arc::clone(registry),
        &OrchestratorConfig::default(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_success_on_preferred_model() {
    let (_clock, registry) = test_registry(&[PRO, FLASH, LITE]);
    let provider = Arc::new(MockProvider::new_success("Once upon a time"));
    let orchestrator = orchestrator(&provider, &registry);

    let generation = orchestrator.generate(PRO, &request()).await.unwrap();

    assert_eq!(generation.model(), PRO);
    assert_eq!(generation.text(), "Once upon a time");
    assert_eq!(*generation.attempts(), 1);
    assert!(!*generation.fell_back());
    assert_eq!(registry.current_usage(PRO).day_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_without_delay_uses_default_cooldown() {
    let (_clock, registry) = test_registry(&[PRO, FLASH, LITE]);
    let provider = Arc::new(
        MockProvider::new_success("from flash").with_model(
            PRO,
            MockBehavior::Error(ProviderError::http(429, "Resource has been exhausted")),
        ),
    );
    let orchestrator = orchestrator(&provider, &registry);

    let generation = orchestrator.generate(PRO, &request()).await.unwrap();

    let default = OrchestratorConfig::default().default_cooldown_secs;
    let remaining = registry.remaining_seconds(PRO);
    assert!(remaining <= default && remaining >= default - 5, "remaining {remaining}");

    assert_eq!(generation.model(), FLASH);
    assert!(*generation.fell_back());
    assert_eq!(*generation.attempts(), 2);
    // Usage is recorded for the failed dispatch too
    assert_eq!(registry.current_usage(PRO).day_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_provider_retry_delay_is_honoured_with_minimum() {
    let (_clock, registry) = test_registry(&[PRO, FLASH, LITE]);
    let provider = Arc::new(
        MockProvider::new_success("ok")
            .with_model(
                PRO,
                MockBehavior::Error(
                    ProviderError::http(429, "Quota exceeded")
                        .with_retry_after(Duration::from_secs(17)),
                ),
            )
            .with_model(
                FLASH,
                MockBehavior::Sequence(vec![
                    MockResponse::Error(ProviderError::http(
                        429,
                        r#"{"error":{"status":"RESOURCE_EXHAUSTED","details":[{"retryDelay": "1s"}]}}"#,
                    )),
                    MockResponse::Success("flash".to_string()),
                ]),
            ),
    );
    let orchestrator = orchestrator(&provider, &registry);

    let generation = orchestrator.generate(PRO, &request()).await.unwrap();

    assert_eq!(registry.remaining_seconds(PRO), 17);
    assert_eq!(registry.remaining_seconds(FLASH), 5);
    assert_eq!(generation.model(), LITE);
}

#[tokio::test(start_paused = true)]
async fn test_overload_is_treated_as_rate_limit() {
    let (_clock, registry) = test_registry(&[PRO, FLASH]);
    let provider = Arc::new(MockProvider::new_success("ok").with_model(
        PRO,
        MockBehavior::Error(ProviderError::http(503, "The model is overloaded.")),
    ));
    let orchestrator = orchestrator(&provider, &registry);

    let generation = orchestrator.generate(PRO, &request()).await.unwrap();

    assert!(registry.is_in_cooldown(PRO));
    assert!(!registry.is_unavailable(PRO));
    assert_eq!(generation.model(), FLASH);
}

#[tokio::test(start_paused = true)]
async fn test_model_not_found_marks_unavailable_and_reroutes() {
    let (_clock, registry) = test_registry(&[PRO, FLASH, LITE]);
    let provider = Arc::new(
        MockProvider::new_success("from flash")
            .with_model(PRO, MockBehavior::Error(not_found(PRO))),
    );
    let orchestrator = orchestrator(&provider, &registry);

    let first = orchestrator.generate(PRO, &request()).await.unwrap();
    assert!(registry.is_unavailable(PRO));
    assert_eq!(first.model(), FLASH);
    assert!(!registry.is_in_cooldown(PRO));

    // A later, unrelated request never goes back to the retired model
    let second = orchestrator
        .generate(PRO, &GenerateRequest::new("Another section"))
        .await
        .unwrap();
    assert_eq!(second.model(), FLASH);
    assert_eq!(provider.calls_for(PRO), 1);
    assert!(registry.is_unavailable(PRO));
}

#[tokio::test(start_paused = true)]
async fn test_fifty_first_request_falls_back_when_exhausted() {
    let (_clock, registry) = test_registry(&[PRO, FLASH, LITE]);
    let provider = Arc::new(MockProvider::new_success("ok"));
    let orchestrator = orchestrator(&provider, &registry);

    for _ in 0..50 {
        let generation = orchestrator.generate(FLASH, &request()).await.unwrap();
        assert_eq!(generation.model(), FLASH);
    }
    assert!(registry.is_exhausted(FLASH));

    let generation = orchestrator.generate(FLASH, &request()).await.unwrap();
    assert_eq!(generation.model(), PRO);
    assert!(*generation.fell_back());
    assert_eq!(provider.calls_for(FLASH), 50);
}

#[tokio::test(start_paused = true)]
async fn test_no_available_model_fails_fast() {
    let (_clock, registry) = test_registry(&[PRO, FLASH]);
    registry.mark_unavailable(PRO);
    registry.mark_unavailable(FLASH);
    let provider = Arc::new(MockProvider::new_success("unused"));
    let orchestrator = orchestrator(&provider, &registry);

    let err = orchestrator.generate(PRO, &request()).await.unwrap_err();

    assert_eq!(
        err.kind(),
        &OrchestrationErrorKind::NoAvailableModel {
            preferred: PRO.to_string(),
            wait_seconds: None
        }
    );
    assert!(err.user_message().contains("check your model settings"));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_long_cooldown_surfaces_countdown() {
    let (_clock, registry) = test_registry(&[PRO, FLASH]);
    registry.enter_cooldown(PRO, Duration::from_secs(300));
    registry.enter_cooldown(FLASH, Duration::from_secs(300));
    let provider = Arc::new(MockProvider::new_success("unused"));
    let orchestrator = orchestrator(&provider, &registry);

    let err = orchestrator.generate(PRO, &request()).await.unwrap_err();

    assert_eq!(err.wait_seconds(), Some(300));
    assert!(err.user_message().contains("wait 300 seconds"));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_short_cooldown_is_waited_out() {
    let (_clock, registry) = test_registry(&[PRO, FLASH]);
    registry.enter_cooldown(PRO, Duration::from_secs(10));
    registry.enter_cooldown(FLASH, Duration::from_secs(20));
    let provider = Arc::new(MockProvider::new_success("ok"));
    let orchestrator = orchestrator(&provider, &registry);

    let started = tokio::time::Instant::now();
    let generation = orchestrator.generate(PRO, &request()).await.unwrap();

    assert_eq!(generation.model(), FLASH);
    assert!(started.elapsed() >= Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_everywhere_reports_daily_quota() {
    let (_clock, registry) = test_registry(&[FLASH]);
    for _ in 0..50 {
        registry.record_request(FLASH);
    }
    let provider = Arc::new(MockProvider::new_success("unused"));
    let orchestrator = orchestrator(&provider, &registry);

    let err = orchestrator.generate(FLASH, &request()).await.unwrap_err();

    assert!(matches!(
        err.kind(),
        OrchestrationErrorKind::QuotaExhausted { model } if model == FLASH
    ));
    assert!(err.user_message().contains("resets tomorrow"));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_exhaustion_surfaces_generation_failure() {
    let (_clock, registry) = test_registry(&[PRO]);
    let provider = Arc::new(MockProvider::new_error(ProviderError::http(
        500,
        "Internal error encountered.",
    )));
    let orchestrator = orchestrator(&provider, &registry);

    let started = tokio::time::Instant::now();
    let err = orchestrator.generate(PRO, &request()).await.unwrap_err();

    match err.kind() {
        OrchestrationErrorKind::GenerationFailure {
            model,
            attempts,
            cause,
        } => {
            assert_eq!(model, PRO);
            assert_eq!(*attempts, 3);
            assert!(cause.contains("Internal error"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(provider.call_count(), 3);
    // 2s then 4s between the three attempts
    assert!(started.elapsed() >= Duration::from_secs(6));
    assert!(!registry.is_in_cooldown(PRO));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovers_after_backoff() {
    let (_clock, registry) = test_registry(&[PRO]);
    let provider = Arc::new(MockProvider::new_with_behavior(
        MockBehavior::FailThenSucceed {
            fail_count: 2,
            error: ProviderError::network("connection reset by peer"),
            success_text: "recovered".to_string(),
        },
    ));
    let orchestrator = orchestrator(&provider, &registry);

    let generation = orchestrator.generate(PRO, &request()).await.unwrap();

    assert_eq!(generation.text(), "recovered");
    assert_eq!(*generation.attempts(), 3);
    assert_eq!(registry.current_usage(PRO).day_count, 3);
}

#[tokio::test(start_paused = true)]
async fn test_client_error_is_not_retried() {
    let (_clock, registry) = test_registry(&[PRO, FLASH]);
    let provider = Arc::new(MockProvider::new_error(ProviderError::http(
        401,
        "API key not valid. Please pass a valid API key.",
    )));
    let orchestrator = orchestrator(&provider, &registry);

    let err = orchestrator.generate(PRO, &request()).await.unwrap_err();

    assert!(matches!(
        err.kind(),
        OrchestrationErrorKind::GenerationFailure { attempts: 1, .. }
    ));
    assert_eq!(provider.call_count(), 1);
    assert!(!registry.is_unavailable(PRO));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_budget_is_bounded() {
    let (_clock, registry) = test_registry(&[PRO, FLASH, LITE]);
    let provider = Arc::new(MockProvider::new_error(
        ProviderError::http(429, "Too many requests").with_retry_after(Duration::from_secs(1)),
    ));
    let orchestrator = orchestrator(&provider, &registry);

    let err = orchestrator.generate(PRO, &request()).await.unwrap_err();

    assert_eq!(
        err.kind(),
        &OrchestrationErrorKind::RateLimited {
            model: LITE.to_string(),
            wait_seconds: 5
        }
    );
    assert_eq!(provider.call_count(), 3);
    assert!(registry.is_in_cooldown(PRO));
    assert!(registry.is_in_cooldown(FLASH));
}

#[tokio::test(start_paused = true)]
async fn test_retry_budgets_are_independent() {
    let (_clock, registry) = test_registry(&[PRO]);
    let server_error = ProviderError::http(500, "Internal error encountered.");
    let provider = Arc::new(MockProvider::new_with_behavior(MockBehavior::Sequence(vec![
        MockResponse::Error(server_error.clone()),
        MockResponse::Error(
            ProviderError::http(429, "Quota exceeded").with_retry_after(Duration::from_secs(5)),
        ),
        MockResponse::Error(server_error),
        MockResponse::Success("finally".to_string()),
    ])));
    let orchestrator = orchestrator(&provider, &registry);

    let generation = orchestrator.generate(PRO, &request()).await.unwrap();

    assert_eq!(generation.text(), "finally");
    assert_eq!(*generation.attempts(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_chunks_are_forwarded_to_sink() {
    let (_clock, registry) = test_registry(&[PRO]);
    let grounding = json!({"groundingChunks": [{"web": {"uri": "https://example.org"}}]});
    let provider = Arc::new(MockProvider::new_with_behavior(MockBehavior::Sequence(vec![
        MockResponse::Chunks(vec![
            StreamChunk::text("Hello, "),
            StreamChunk::text("world").with_grounding(grounding.clone()),
        ]),
    ])));
    let orchestrator = orchestrator(&provider, &registry);
    let (tx, mut rx) = mpsc::channel(8);

    let generation = orchestrator
        .generate_streaming(PRO, &request(), Some(tx))
        .await
        .unwrap();

    assert_eq!(generation.text(), "Hello, world");
    assert_eq!(generation.grounding().as_ref(), Some(&grounding));

    let mut received = Vec::new();
    while let Some(chunk) = rx.recv().await {
        received.push(chunk.text);
    }
    assert_eq!(received, vec!["Hello, ", "world"]);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_sink_does_not_stop_bookkeeping() {
    let (_clock, registry) = test_registry(&[PRO]);
    let provider = Arc::new(MockProvider::new_with_behavior(MockBehavior::Sequence(vec![
        MockResponse::Chunks(vec![StreamChunk::text("a"), StreamChunk::text("b")]),
    ])));
    let orchestrator = orchestrator(&provider, &registry);
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let generation = orchestrator
        .generate_streaming(PRO, &request(), Some(tx))
        .await
        .unwrap();

    assert_eq!(generation.text(), "ab");
    assert_eq!(registry.current_usage(PRO).day_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_stream_restarts_text() {
    let (_clock, registry) = test_registry(&[PRO]);
    let provider = Arc::new(MockProvider::new_with_behavior(MockBehavior::Sequence(vec![
        MockResponse::FailMidStream(
            vec!["partial ".to_string()],
            ProviderError::new(ProviderErrorKind::StreamInterrupted(
                "connection closed".to_string(),
            )),
        ),
        MockResponse::Success("complete".to_string()),
    ])));
    let orchestrator = orchestrator(&provider, &registry);

    let generation = orchestrator.generate(PRO, &request()).await.unwrap();

    assert_eq!(generation.text(), "complete");
    assert_eq!(*generation.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_generate_for_role_uses_settings() {
    let (_clock, registry) = test_registry(&[PRO, FLASH]);
    let provider = Arc::new(MockProvider::new_success("researched"));
    let orchestrator = orchestrator(&provider, &registry);
    let settings = Settings::default();

    let generation = orchestrator
        .generate_for_role(&settings, ModelRole::Networking, &request(), None)
        .await
        .unwrap();

    assert_eq!(generation.model(), FLASH);
    assert_eq!(provider.calls(), vec![FLASH.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_search_queue_shares_registry() {
    let (_clock, registry) = test_registry(&[PRO, FLASH]);
    let provider = Arc::new(MockProvider::new_success("result"));
    let orchestrator = orchestrator(&provider, &registry).with_queue(WorkQueue::search());

    let request = request();
    let tasks = (0..6).map(|_| orchestrator.generate(FLASH, &request));
    let results = futures::future::join_all(tasks).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(orchestrator.queue().limit(), 3);
    assert_eq!(registry.current_usage(FLASH).day_count, 6);
}

#[tokio::test(start_paused = true)]
async fn test_queued_request_skips_model_retired_meanwhile() {
    let (_clock, registry) = test_registry(&[PRO, FLASH]);
    let provider = Arc::new(
        MockProvider::new_success("from flash")
            .with_model(PRO, MockBehavior::Error(not_found(PRO))),
    );
    let orchestrator = orchestrator(&provider, &registry);
    let request = request();

    let (first, second) = tokio::join!(
        orchestrator.generate(PRO, &request),
        orchestrator.generate(PRO, &request)
    );

    assert_eq!(first.unwrap().model(), FLASH);
    assert_eq!(second.unwrap().model(), FLASH);
    assert!(registry.is_unavailable(PRO));
    assert_eq!(provider.calls_for(PRO), 1);
}

#[tokio::test(start_paused = true)]
async fn test_queued_request_skips_model_cooling_meanwhile() {
    let (_clock, registry) = test_registry(&[PRO, FLASH]);
    let provider = Arc::new(MockProvider::new_success("from flash").with_model(
        PRO,
        MockBehavior::Error(ProviderError::http(429, "Resource has been exhausted")),
    ));
    let orchestrator = orchestrator(&provider, &registry);
    let request = request();

    let (first, second) = tokio::join!(
        orchestrator.generate(PRO, &request),
        orchestrator.generate(PRO, &request)
    );

    assert_eq!(first.unwrap().model(), FLASH);
    assert_eq!(second.unwrap().model(), FLASH);
    assert_eq!(
        registry.remaining_seconds(PRO),
        OrchestratorConfig::default().default_cooldown_secs
    );
    assert_eq!(provider.calls_for(PRO), 1);
}

#[tokio::test(start_paused = true)]
async fn test_queued_request_skips_model_exhausted_meanwhile() {
    let (_clock, registry) = test_registry(&[FLASH, PRO]);
    for _ in 0..49 {
        registry.record_request(FLASH);
    }
    let provider = Arc::new(MockProvider::new_success("ok"));
    let orchestrator = orchestrator(&provider, &registry);
    let request = request();

    let (first, second) = tokio::join!(
        orchestrator.generate(FLASH, &request),
        orchestrator.generate(FLASH, &request)
    );

    assert_eq!(first.unwrap().model(), FLASH);
    assert_eq!(second.unwrap().model(), PRO);
    assert_eq!(registry.current_usage(FLASH).day_count, 50);
    assert_eq!(provider.calls_for(FLASH), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_header_sets_cooldown() {
    let (_clock, registry) = test_registry(&[PRO, FLASH]);
    let mut headers = HeaderMap::new();
    headers.insert(RETRY_AFTER, HeaderValue::from_static("20"));
    let provider = Arc::new(MockProvider::new_success("from flash").with_model(
        PRO,
        MockBehavior::Sequence(vec![MockResponse::Http {
            status: 429,
            headers,
            body: "Too Many Requests".to_string(),
        }]),
    ));
    let orchestrator = orchestrator(&provider, &registry);

    let generation = orchestrator.generate(PRO, &request()).await.unwrap();

    assert_eq!(generation.model(), FLASH);
    assert_eq!(registry.remaining_seconds(PRO), 20);
}

#[tokio::test(start_paused = true)]
async fn test_view_reflects_orchestrator_writes() {
    let (_clock, registry) = test_registry(&[PRO, FLASH]);
    let provider = Arc::new(
        MockProvider::new_success("from flash")
            .with_model(PRO, MockBehavior::Error(not_found(PRO))),
    );
    let orchestrator = orchestrator(&provider, &registry);
    let view = orchestrator.view();

    orchestrator.generate(PRO, &request()).await.unwrap();

    assert!(view.status(PRO).is_unavailable);
    assert_eq!(view.status(FLASH).usage.rpm.current, 1);
    assert_eq!(view.unavailable_models(), vec![PRO.to_string()]);
}
