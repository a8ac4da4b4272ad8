//! Fallback engine.
//!
//! The [`RouterEngine`] owns the priority-ordered provider table and runs
//! one sequential state machine per call:
//!
//! ```text
//! PENDING → TRYING(rank i) → { ACCEPTED | EXHAUSTED }
//! ```
//!
//! Provider-level failures are always recoverable here: a transport error
//! or refusal moves the machine to the next provider, never to the caller.
//! Only total exhaustion or pre-call deadline expiry terminate a call, and
//! both are values in [`RoutingResult`], not errors.

use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::classifier::{RefusalClassifier, Verdict};
use crate::provider::{NormalizedResponse, ProviderAdapter, ProviderError};
use crate::RequestContext;

use super::attempt::{AttemptOutcome, AttemptRecord};

/// One provider wired into the engine.
///
/// Connection details live inside the adapter; the engine only needs the
/// identity, rank, and time budget.
pub struct ProviderRegistration {
    /// Provider identity, echoed into every [`AttemptRecord`].
    pub name: String,
    /// Priority rank, lower is tried first. Ties keep registration order.
    pub priority: u32,
    /// Per-provider attempt timeout. Clamped to the call's remaining
    /// deadline budget at attempt time.
    pub timeout: Duration,
    /// The adapter performing the upstream call.
    pub adapter: Arc<dyn ProviderAdapter>,
}

impl std::fmt::Debug for ProviderRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistration")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Final outcome tag of a routing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A provider produced an accepted response.
    Answered,
    /// Every attempted provider refused; no hard failures occurred.
    AllRefused,
    /// At least one attempt ended in a transport error or timeout and no
    /// provider was accepted. Errors dominate refusals in this fold.
    AllFailed,
    /// Admission control rejected the call before any provider was
    /// contacted.
    RateLimited {
        /// How long the caller should wait before retrying.
        retry_after: Duration,
    },
    /// The deadline expired before the first provider could be attempted.
    DeadlineExceeded,
}

impl RouteOutcome {
    /// Short tag for structured logging and usage accounting.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::AllRefused => "all_refused",
            Self::AllFailed => "all_failed",
            Self::RateLimited { .. } => "rate_limited",
            Self::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

/// Everything a caller gets back from one routing call.
///
/// Not retained by the router beyond the call; durable accounting is the
/// usage tracker's concern.
#[derive(Debug, Clone)]
pub struct RoutingResult {
    /// Terminal outcome of the call.
    pub outcome: RouteOutcome,
    /// The winning response when `outcome` is [`RouteOutcome::Answered`].
    pub response: Option<NormalizedResponse>,
    /// Records for every provider attempted, in priority order. Every
    /// provider contacted appears here exactly once.
    pub attempts: Vec<AttemptRecord>,
    /// Correlation id copied from the request context.
    pub correlation_id: String,
}

impl RoutingResult {
    /// True when a provider produced an accepted response.
    pub fn is_answered(&self) -> bool {
        matches!(self.outcome, RouteOutcome::Answered)
    }

    pub(crate) fn rate_limited(ctx: &RequestContext, retry_after: Duration) -> Self {
        Self {
            outcome: RouteOutcome::RateLimited { retry_after },
            response: None,
            attempts: Vec::new(),
            correlation_id: ctx.correlation_id.clone(),
        }
    }

    fn deadline_exceeded(ctx: &RequestContext) -> Self {
        Self {
            outcome: RouteOutcome::DeadlineExceeded,
            response: None,
            attempts: Vec::new(),
            correlation_id: ctx.correlation_id.clone(),
        }
    }
}

/// Priority-fallback router over an ordered provider table.
///
/// Thread-safe: the provider table sits behind an interior `RwLock` and is
/// snapshotted (`Arc` clone) at call start, so a hot swap never affects
/// calls already in flight. The fallback loop itself is sequential per
/// call; concurrency exists only across calls.
pub struct RouterEngine {
    providers: RwLock<Arc<Vec<ProviderRegistration>>>,
    classifier: Arc<dyn RefusalClassifier>,
}

impl std::fmt::Debug for RouterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterEngine")
            .field("providers", &self.providers)
            .finish()
    }
}

impl RouterEngine {
    /// Create an engine over the given providers and classifier.
    ///
    /// Providers are sorted by ascending priority rank once here; the sort
    /// is stable so equal ranks keep their registration (configuration)
    /// order.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn new(
        mut providers: Vec<ProviderRegistration>,
        classifier: Arc<dyn RefusalClassifier>,
    ) -> Self {
        providers.sort_by_key(|p| p.priority);
        Self {
            providers: RwLock::new(Arc::new(providers)),
            classifier,
        }
    }

    /// Replace the provider table.
    ///
    /// Calls already in their fallback loop continue with the snapshot
    /// taken at their start; only subsequent calls see the new table.
    pub fn swap_providers(&self, mut providers: Vec<ProviderRegistration>) {
        providers.sort_by_key(|p| p.priority);
        let table = Arc::new(providers);
        match self.providers.write() {
            Ok(mut guard) => *guard = table,
            Err(poisoned) => *poisoned.into_inner() = table,
        }
    }

    /// Number of configured providers.
    pub fn provider_count(&self) -> usize {
        self.snapshot().len()
    }

    fn snapshot(&self) -> Arc<Vec<ProviderRegistration>> {
        match self.providers.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Run the fallback state machine for one call.
    ///
    /// Walks providers in priority order while deadline budget remains.
    /// Each attempt is bounded by `min(provider.timeout, remaining budget)`
    /// and appends exactly one [`AttemptRecord`]. When the deadline is
    /// reached mid-attempt the in-flight adapter call is cancelled, the
    /// attempt is recorded as `timeout`, and the machine goes straight to
    /// EXHAUSTED without starting another attempt.
    ///
    /// Cancellation: dropping the returned future cancels the in-flight
    /// adapter call and produces no further attempt records.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub async fn dispatch(&self, ctx: &RequestContext) -> RoutingResult {
        if ctx.remaining_budget().is_zero() {
            debug!(
                correlation_id = %ctx.correlation_id,
                "deadline already expired, no provider contacted"
            );
            return RoutingResult::deadline_exceeded(ctx);
        }

        let providers = self.snapshot();
        let mut attempts: Vec<AttemptRecord> = Vec::new();

        for registration in providers.iter() {
            let remaining = ctx.remaining_budget();
            if remaining.is_zero() {
                break;
            }
            // The attempt budget is the provider's own timeout, clamped to
            // what is left of the call deadline.
            let attempt_timeout = registration.timeout.min(remaining);
            let deadline_clamped = remaining < registration.timeout;

            debug!(
                provider = %registration.name,
                priority = registration.priority,
                timeout_ms = attempt_timeout.as_millis() as u64,
                correlation_id = %ctx.correlation_id,
                "attempting provider"
            );

            let started_at = SystemTime::now();
            let invoked = tokio::time::timeout(
                attempt_timeout,
                registration.adapter.invoke(&ctx.prompt, attempt_timeout),
            )
            .await;
            let finished_at = SystemTime::now();

            match invoked {
                Err(_) => {
                    warn!(
                        provider = %registration.name,
                        correlation_id = %ctx.correlation_id,
                        "provider attempt timed out"
                    );
                    attempts.push(AttemptRecord {
                        provider: registration.name.clone(),
                        started_at,
                        finished_at,
                        outcome: AttemptOutcome::Timeout,
                        error: Some(ProviderError::Timeout.to_string()),
                        cost_units: 0,
                    });
                    // Only an elapsed timer on a clamped budget means the
                    // call deadline itself was hit: straight to EXHAUSTED.
                    if deadline_clamped {
                        break;
                    }
                }
                Ok(Err(ProviderError::Timeout)) => {
                    // The adapter gave up early on its own; budget remains,
                    // so fallback continues like any other provider failure.
                    warn!(
                        provider = %registration.name,
                        correlation_id = %ctx.correlation_id,
                        "provider reported timeout, falling back"
                    );
                    attempts.push(AttemptRecord {
                        provider: registration.name.clone(),
                        started_at,
                        finished_at,
                        outcome: AttemptOutcome::Timeout,
                        error: Some(ProviderError::Timeout.to_string()),
                        cost_units: 0,
                    });
                }
                Ok(Err(err)) => {
                    warn!(
                        provider = %registration.name,
                        error_kind = err.kind(),
                        correlation_id = %ctx.correlation_id,
                        "provider attempt failed, falling back"
                    );
                    attempts.push(AttemptRecord {
                        provider: registration.name.clone(),
                        started_at,
                        finished_at,
                        outcome: AttemptOutcome::Error,
                        error: Some(err.to_string()),
                        cost_units: 0,
                    });
                }
                Ok(Ok(response)) => match self.classifier.classify(&response) {
                    Verdict::Accepted => {
                        attempts.push(AttemptRecord {
                            provider: registration.name.clone(),
                            started_at,
                            finished_at,
                            outcome: AttemptOutcome::Success,
                            error: None,
                            cost_units: response.cost_units,
                        });
                        info!(
                            provider = %registration.name,
                            attempts = attempts.len(),
                            correlation_id = %ctx.correlation_id,
                            "request answered"
                        );
                        return RoutingResult {
                            outcome: RouteOutcome::Answered,
                            response: Some(response),
                            attempts,
                            correlation_id: ctx.correlation_id.clone(),
                        };
                    }
                    Verdict::Refused => {
                        debug!(
                            provider = %registration.name,
                            correlation_id = %ctx.correlation_id,
                            "provider refused, falling back"
                        );
                        attempts.push(AttemptRecord {
                            provider: registration.name.clone(),
                            started_at,
                            finished_at,
                            outcome: AttemptOutcome::Refusal,
                            error: None,
                            cost_units: response.cost_units,
                        });
                    }
                },
            }
        }

        let outcome = if attempts.is_empty() {
            if providers.is_empty() {
                // An empty table can only happen before configuration
                // validation; treat it as total failure, not a deadline.
                RouteOutcome::AllFailed
            } else {
                RouteOutcome::DeadlineExceeded
            }
        } else if attempts.iter().any(|a| a.outcome.is_hard_failure()) {
            RouteOutcome::AllFailed
        } else {
            RouteOutcome::AllRefused
        };

        info!(
            outcome = outcome.as_str(),
            attempts = attempts.len(),
            correlation_id = %ctx.correlation_id,
            "providers exhausted"
        );

        RoutingResult {
            outcome,
            response: None,
            attempts,
            correlation_id: ctx.correlation_id.clone(),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
