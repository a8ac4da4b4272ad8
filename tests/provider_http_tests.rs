//! Integration tests for the HTTP provider adapter against a mocked
//! OpenAI-compatible upstream.
//!
//! Covers:
//! - successful completion with reported usage
//! - non-2xx status mapped to `Unavailable`
//! - unparseable payload mapped to `MalformedResponse`
//! - slow upstream mapped to `Timeout`
//! - bearer token propagation
//! - full fallback chain across two mocked upstreams

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tokio_provider_router::classifier::SignatureClassifier;
use tokio_provider_router::provider::HttpProvider;
use tokio_provider_router::routing::{ProviderRegistration, RouteOutcome, RouterEngine};
use tokio_provider_router::{
    CallerId, FinishReason, ProviderAdapter, ProviderError, RequestContext,
};

// ============================================================================
// Helpers
// ============================================================================

fn completion_body(text: &str, total_tokens: u64) -> serde_json::Value {
    json!({
        "choices": [{"text": text, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 3, "completion_tokens": total_tokens - 3, "total_tokens": total_tokens}
    })
}

async fn mock_upstream(response: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(response)
        .mount(&server)
        .await;
    server
}

// ============================================================================
// Single adapter
// ============================================================================

#[tokio::test]
async fn test_successful_completion_is_normalized() {
    let server = mock_upstream(
        ResponseTemplate::new(200).set_body_json(completion_body("hello from upstream", 12)),
    )
    .await;

    let provider = HttpProvider::new(format!("{}/v1/completions", server.uri()), "test-model");
    let response = provider
        .invoke("hi", Duration::from_secs(2))
        .await
        .expect("test: invoke succeeds");

    assert_eq!(response.text, "hello from upstream");
    assert_eq!(response.finish_reason, FinishReason::Stop);
    assert_eq!(response.cost_units, 12);
}

#[tokio::test]
async fn test_http_500_is_unavailable() {
    let server = mock_upstream(ResponseTemplate::new(500).set_body_string("boom")).await;

    let provider = HttpProvider::new(format!("{}/v1/completions", server.uri()), "test-model");
    let err = provider
        .invoke("hi", Duration::from_secs(2))
        .await
        .expect_err("test: 500 must fail");

    match err {
        ProviderError::Unavailable(message) => {
            assert!(message.contains("500"), "message was: {message}");
        }
        other => panic!("expected Unavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_upstream_429_is_unavailable_not_retried() {
    let server = mock_upstream(ResponseTemplate::new(429).set_body_string("slow down")).await;

    let provider = HttpProvider::new(format!("{}/v1/completions", server.uri()), "test-model");
    let err = provider
        .invoke("hi", Duration::from_secs(2))
        .await
        .expect_err("test: 429 must fail");
    assert!(matches!(err, ProviderError::Unavailable(_)));

    // One invocation maps to exactly one upstream request.
    assert_eq!(server.received_requests().await.map_or(0, |r| r.len()), 1);
}

#[tokio::test]
async fn test_unparseable_payload_is_malformed_response() {
    let server = mock_upstream(ResponseTemplate::new(200).set_body_string("not json")).await;

    let provider = HttpProvider::new(format!("{}/v1/completions", server.uri()), "test-model");
    let err = provider
        .invoke("hi", Duration::from_secs(2))
        .await
        .expect_err("test: garbage must fail");
    assert!(matches!(err, ProviderError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_slow_upstream_is_timeout() {
    let server = mock_upstream(
        ResponseTemplate::new(200)
            .set_body_json(completion_body("too late", 5))
            .set_delay(Duration::from_secs(5)),
    )
    .await;

    let provider = HttpProvider::new(format!("{}/v1/completions", server.uri()), "test-model");
    let err = provider
        .invoke("hi", Duration::from_millis(100))
        .await
        .expect_err("test: slow upstream must fail");
    assert_eq!(err, ProviderError::Timeout);
}

#[tokio::test]
async fn test_bearer_token_sent_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .and(header("Authorization", "Bearer sk-test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("authed", 4)))
        .mount(&server)
        .await;

    let provider = HttpProvider::new(format!("{}/v1/completions", server.uri()), "test-model")
        .with_api_key("sk-test-token");
    let response = provider
        .invoke("hi", Duration::from_secs(2))
        .await
        .expect("test: authed invoke succeeds");
    assert_eq!(response.text, "authed");
}

// ============================================================================
// Through the router
// ============================================================================

#[tokio::test]
async fn test_failing_upstream_falls_back_to_healthy_one() {
    let broken = mock_upstream(ResponseTemplate::new(503).set_body_string("down")).await;
    let healthy = mock_upstream(
        ResponseTemplate::new(200).set_body_json(completion_body("backup answer", 7)),
    )
    .await;

    let engine = RouterEngine::new(
        vec![
            ProviderRegistration {
                name: "broken".into(),
                priority: 1,
                timeout: Duration::from_secs(2),
                adapter: Arc::new(HttpProvider::new(
                    format!("{}/v1/completions", broken.uri()),
                    "test-model",
                )),
            },
            ProviderRegistration {
                name: "healthy".into(),
                priority: 2,
                timeout: Duration::from_secs(2),
                adapter: Arc::new(HttpProvider::new(
                    format!("{}/v1/completions", healthy.uri()),
                    "test-model",
                )),
            },
        ],
        Arc::new(SignatureClassifier::new(["i can't"])),
    );

    let ctx = RequestContext::new(
        "a question",
        CallerId::new("alice"),
        "pro",
        Instant::now() + Duration::from_secs(10),
    );
    let result = engine.dispatch(&ctx).await;

    assert_eq!(result.outcome, RouteOutcome::Answered);
    assert_eq!(result.attempts.len(), 2);
    assert_eq!(
        result.response.expect("test: answered carries response").text,
        "backup answer"
    );
}

#[tokio::test]
async fn test_refusing_upstream_falls_back_to_willing_one() {
    let refusing = mock_upstream(
        ResponseTemplate::new(200)
            .set_body_json(completion_body("I can't assist with that request", 9)),
    )
    .await;
    let willing = mock_upstream(
        ResponseTemplate::new(200).set_body_json(completion_body("of course, here it is", 8)),
    )
    .await;

    let engine = RouterEngine::new(
        vec![
            ProviderRegistration {
                name: "refusing".into(),
                priority: 1,
                timeout: Duration::from_secs(2),
                adapter: Arc::new(HttpProvider::new(
                    format!("{}/v1/completions", refusing.uri()),
                    "test-model",
                )),
            },
            ProviderRegistration {
                name: "willing".into(),
                priority: 2,
                timeout: Duration::from_secs(2),
                adapter: Arc::new(HttpProvider::new(
                    format!("{}/v1/completions", willing.uri()),
                    "test-model",
                )),
            },
        ],
        Arc::new(SignatureClassifier::new(["i can't"])),
    );

    let ctx = RequestContext::new(
        "a question",
        CallerId::new("alice"),
        "pro",
        Instant::now() + Duration::from_secs(10),
    );
    let result = engine.dispatch(&ctx).await;

    assert_eq!(result.outcome, RouteOutcome::Answered);
    assert_eq!(result.attempts[1].provider, "willing");
}
