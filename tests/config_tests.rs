//! Configuration loading and service construction, end to end.
//!
//! Loads TOML from disk the way a deployment does, builds the runtime
//! service from it, and routes one request against a mocked upstream.

use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tokio_provider_router::config::validation::ConfigError;
use tokio_provider_router::config::{loader, RouterConfig};
use tokio_provider_router::{CallerId, RouterService};

fn write_temp_config(name: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(name);
    let mut file = std::fs::File::create(&path).expect("test: create temp config");
    file.write_all(content.as_bytes())
        .expect("test: write temp config");
    path
}

#[test]
fn test_load_full_config_from_disk() {
    let path = write_temp_config(
        "tokio-provider-router-config-test.toml",
        r#"
[router]
name = "integration"
version = "1.0"
description = "two-provider chain"

[[providers]]
name = "primary"
priority = 1
endpoint = "http://localhost:8080/v1/completions"
model = "big-model"
timeout_ms = 15000

[[providers]]
name = "secondary"
priority = 2
endpoint = "http://localhost:8000/v1/completions"

[classifier]
refusal_signatures = ["i can't", "i refuse"]

[tiers.free]
max_requests = 10
window_s = 86400

[tiers.pro]
unlimited = true

[observability]
log_format = "json"
"#,
    );

    let config = loader::load_from_file(&path).expect("test: config loads");
    assert_eq!(config.router.name, "integration");
    assert_eq!(config.providers.len(), 2);
    assert_eq!(config.providers[0].timeout(), Duration::from_secs(15));
    assert_eq!(config.classifier.refusal_signatures.len(), 2);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_invalid_config_reports_all_violations_at_once() {
    let result = loader::load_from_str(
        r#"
[router]
name = "broken"
version = "1.0"

[[providers]]
name = ""
priority = 1
endpoint = ""
timeout_ms = 0

[tiers.odd]
unlimited = true
max_requests = 5
window_s = 60
"#,
        "inline",
    );

    let err = match result {
        Err(ConfigError::Validation(message)) => message,
        other => panic!("expected validation failure, got {other:?}"),
    };
    assert!(err.contains("providers[0].name"));
    assert!(err.contains("providers[0].endpoint"));
    assert!(err.contains("providers[0].timeout_ms"));
    assert!(err.contains("tiers.odd"));
}

#[tokio::test]
async fn test_configured_service_routes_against_live_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"text": "configured answer", "finish_reason": "stop"}],
            "usage": {"total_tokens": 6}
        })))
        .mount(&server)
        .await;

    let toml_str = format!(
        r#"
[router]
name = "wired"
version = "1.0"

[[providers]]
name = "mocked"
priority = 1
endpoint = "{}/v1/completions"
timeout_ms = 2000

[tiers.free]
max_requests = 100
window_s = 60
"#,
        server.uri()
    );

    let config: RouterConfig =
        loader::load_from_str(&toml_str, "inline").expect("test: config loads");
    let service = RouterService::from_config(&config).expect("test: service builds");

    let result = service
        .route(
            "a question",
            CallerId::new("alice"),
            "free",
            Instant::now() + Duration::from_secs(5),
        )
        .await
        .expect("test: route succeeds");

    assert!(result.is_answered());
    assert_eq!(
        result.response.expect("test: answered carries response").text,
        "configured answer"
    );
    assert_eq!(result.attempts[0].provider, "mocked");
}
