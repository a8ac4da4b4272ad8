//! # tokio-provider-router
//!
//! A request-routing layer between a caller and several interchangeable
//! upstream text-generation providers.
//!
//! ## Architecture
//!
//! Explicit stage composition, one sequential state machine per call:
//! ```text
//! caller → RateLimiter (admit/deny) → RouterEngine → ProviderAdapter(s)
//!        → RefusalClassifier (per attempt) → UsageTracker (side channel)
//! ```
//!
//! Providers are tried in priority order; transport errors and refusal
//! verdicts both trigger fallback to the next provider. The caller always
//! receives a [`RoutingResult`] value — provider failures never propagate
//! as errors across the boundary.

// ── Lint policy (aerospace-grade) ─────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(missing_docs)]

use std::time::Instant;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod classifier;
pub mod config;
pub mod provider;
pub mod rate_limit;
pub mod routing;
pub mod service;
pub mod usage;

// Re-exports for convenience
pub use classifier::{RefusalClassifier, SignatureClassifier, Verdict};
pub use provider::{EchoProvider, FinishReason, NormalizedResponse, ProviderAdapter, ProviderError};
pub use rate_limit::{Admission, TierQuota, TieredRateLimiter};
pub use routing::{AttemptOutcome, AttemptRecord, RouteOutcome, RouterEngine, RoutingResult};
pub use service::RouterService;
pub use usage::UsageTracker;

/// Initialise the global tracing subscriber.
///
/// Reads the `LOG_FORMAT` environment variable to choose output format:
/// - `"json"` — structured JSON output for production log aggregators
/// - anything else (including unset) — human-readable pretty output
///   for local development
///
/// Filter level is controlled by `RUST_LOG` (e.g. `RUST_LOG=info`).
///
/// # Errors
///
/// Returns [`RouterError::Other`] if the global subscriber has already
/// been set (e.g. by a previous call or a test harness).
///
/// # Panics
///
/// This function never panics.
pub fn init_tracing() -> Result<(), RouterError> {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let result = match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .with_span_list(true)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };

    result.map_err(|e| RouterError::Other(format!("tracing init failed: {e}")))
}

/// Top-level router errors.
///
/// These cover construction-time and caller-input failures only. Provider
/// failures during routing are never surfaced here — they are folded into
/// the final [`RoutingResult`] outcome instead.
#[derive(Error, Debug)]
pub enum RouterError {
    /// The caller supplied an unusable request (e.g. an empty prompt).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A configuration value is missing or invalid (e.g. missing env var).
    ///
    /// This is returned at construction time so that misconfiguration
    /// surfaces immediately rather than at the first routing call.
    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not fit a specific variant.
    #[error("{0}")]
    Other(String),
}

/// Unique caller identifier used for rate-limit accounting and tracing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerId(
    /// The raw string ID, typically an API key hash or user-provided token.
    pub String,
);

impl CallerId {
    /// Create a new [`CallerId`] from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the caller ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Per-call context owned by the router for the duration of one routing
/// operation and discarded afterwards.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Caller this request belongs to.
    pub caller: CallerId,
    /// Subscription tier used for admission control (e.g. "free", "pro").
    pub tier: String,
    /// The raw prompt text to forward to providers.
    pub prompt: String,
    /// Correlation id for trace stitching across attempts.
    pub correlation_id: String,
    /// Absolute point in time by which the whole routing operation must
    /// terminate. Checked before and between provider attempts, and used
    /// to clamp the per-attempt timeout.
    pub deadline: Instant,
}

impl RequestContext {
    /// Create a new context with a fresh correlation id.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn new(
        prompt: impl Into<String>,
        caller: CallerId,
        tier: impl Into<String>,
        deadline: Instant,
    ) -> Self {
        Self {
            caller,
            tier: tier.into(),
            prompt: prompt.into(),
            correlation_id: uuid::Uuid::new_v4().to_string(),
            deadline,
        }
    }

    /// Time left before the deadline, zero if it has already passed.
    pub fn remaining_budget(&self) -> std::time::Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}
