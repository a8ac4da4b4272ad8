//! Provider adapter abstraction and in-process implementations.
//!
//! Each upstream text-generation backend is wrapped behind the
//! [`ProviderAdapter`] trait, which normalizes heterogeneous responses and
//! errors into one shape. Adapters must not retry internally — retry policy
//! belongs exclusively to the router so its attempt accounting stays
//! accurate.
//!
//! Implementations:
//! - [`EchoProvider`]: testing/demo adapter, replies with the prompt
//! - [`ScriptedProvider`]: deterministic fault injection for tests
//! - [`HttpProvider`](http::HttpProvider): OpenAI-compatible HTTP upstream

pub mod http;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpProvider;

/// Uniform contract for one upstream text-generation provider.
///
/// Implementations must be thread-safe (Send + Sync) for use across tasks.
/// The trait is object-safe to allow dynamic dispatch via
/// `Arc<dyn ProviderAdapter>`.
///
/// Input constraints (enforced by the caller, i.e. the router service):
/// the prompt is non-empty and `timeout` is greater than zero.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Invoke the upstream with the given prompt, bounded by `timeout`.
    ///
    /// The only side effect is the outbound call itself. Implementations
    /// must not retry: a single invocation maps to exactly one upstream
    /// request.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::Timeout`] when the upstream does not respond
    ///   within `timeout`.
    /// - [`ProviderError::Unavailable`] for connection, auth, or upstream
    ///   rate-limit failures.
    /// - [`ProviderError::MalformedResponse`] when the upstream payload
    ///   cannot be normalized.
    async fn invoke(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> Result<NormalizedResponse, ProviderError>;
}

/// A provider response normalized into one shape, regardless of upstream
/// wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    /// The generated text.
    pub text: String,
    /// Why generation stopped.
    pub finish_reason: FinishReason,
    /// Estimated cost of this response in provider-agnostic cost units
    /// (typically total tokens).
    pub cost_units: u64,
}

/// Why an upstream stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of generation.
    Stop,
    /// Token limit reached.
    Length,
    /// Upstream content filter intervened.
    ContentFilter,
    /// Upstream reported something this crate does not model.
    Unknown,
}

/// Transport-level provider failures.
///
/// All variants are recoverable at the router level: they trigger fallback
/// to the next provider and are never surfaced individually to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The upstream did not respond within the allotted timeout.
    #[error("provider timed out")]
    Timeout,

    /// Connection, auth, or upstream rate-limit failure.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The upstream payload could not be normalized.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Short tag for structured logging and attempt records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Unavailable(_) => "unavailable",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }
}

// ============================================================================
// Echo Provider (Testing)
// ============================================================================

/// Dummy echo provider for testing.
///
/// Replies with the prompt text after a simulated delay. Useful for routing
/// smoke tests without real upstream dependencies.
pub struct EchoProvider {
    /// Simulated upstream latency.
    pub delay_ms: u64,
}

impl EchoProvider {
    /// Create an echo provider with the default 10ms delay.
    pub fn new() -> Self {
        Self { delay_ms: 10 }
    }

    /// Create an echo provider with a specific simulated delay.
    pub fn with_delay(delay_ms: u64) -> Self {
        Self { delay_ms }
    }
}

impl Default for EchoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for EchoProvider {
    async fn invoke(
        &self,
        prompt: &str,
        _timeout: Duration,
    ) -> Result<NormalizedResponse, ProviderError> {
        // Simulate upstream latency
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;

        Ok(NormalizedResponse {
            text: prompt.to_string(),
            finish_reason: FinishReason::Stop,
            cost_units: prompt.split_whitespace().count() as u64,
        })
    }
}

// ============================================================================
// Scripted Provider (Testing / fault injection)
// ============================================================================

enum Step {
    Reply(NormalizedResponse),
    Fail(ProviderError),
    Hang,
}

/// Deterministic provider for tests: replays a fixed behavior (or a scripted
/// sequence of behaviors) and counts invocations, so tests can assert
/// short-circuit and ordering properties.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    invocations: AtomicUsize,
}

impl ScriptedProvider {
    fn with_fallback(fallback: Step) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            invocations: AtomicUsize::new(0),
        }
    }

    /// A provider that always answers with the given text.
    pub fn replying(text: impl Into<String>) -> Self {
        let text = text.into();
        let cost_units = text.split_whitespace().count() as u64;
        Self::with_fallback(Step::Reply(NormalizedResponse {
            text,
            finish_reason: FinishReason::Stop,
            cost_units,
        }))
    }

    /// A provider that always fails with the given error.
    pub fn failing(error: ProviderError) -> Self {
        Self::with_fallback(Step::Fail(error))
    }

    /// A provider that never responds; the router's timeout handling
    /// cancels the in-flight call.
    pub fn hanging() -> Self {
        Self::with_fallback(Step::Hang)
    }

    /// Queue a one-shot reply ahead of the fallback behavior.
    pub fn push_reply(&self, response: NormalizedResponse) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Step::Reply(response));
        }
    }

    /// Queue a one-shot failure ahead of the fallback behavior.
    pub fn push_failure(&self, error: ProviderError) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Step::Fail(error));
        }
    }

    /// Number of times this provider has been invoked.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        if let Ok(mut script) = self.script.lock() {
            if let Some(step) = script.pop_front() {
                return step;
            }
        }
        match &self.fallback {
            Step::Reply(r) => Step::Reply(r.clone()),
            Step::Fail(e) => Step::Fail(e.clone()),
            Step::Hang => Step::Hang,
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    async fn invoke(
        &self,
        _prompt: &str,
        _timeout: Duration,
    ) -> Result<NormalizedResponse, ProviderError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Step::Reply(r) => Ok(r),
            Step::Fail(e) => Err(e),
            Step::Hang => {
                // Far longer than any test deadline; the router cancels this.
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::Timeout)
            }
        }
    }
}
