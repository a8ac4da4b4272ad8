//! Inbound call contract and stage composition.
//!
//! [`RouterService`] wires the pipeline the crate exposes to callers:
//!
//! ```text
//! route() → RateLimiter.admit → RouterEngine.dispatch → UsageTracker.record
//! ```
//!
//! Admission is a discrete stage invoked before the router, composed as a
//! plain function call. The usage tracker is a side channel: its failure
//! can never change the [`RoutingResult`] handed back to the caller.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::classifier::SignatureClassifier;
use crate::config::RouterConfig;
use crate::provider::HttpProvider;
use crate::rate_limit::{Admission, TieredRateLimiter};
use crate::routing::{ProviderRegistration, RouterEngine, RoutingResult};
use crate::usage::UsageTracker;
use crate::{CallerId, RequestContext, RouterError};

/// Default usage-tracker queue capacity.
const USAGE_QUEUE_CAPACITY: usize = 1_024;

/// The caller-facing routing service.
pub struct RouterService {
    limiter: TieredRateLimiter,
    engine: RouterEngine,
    tracker: UsageTracker,
}

impl std::fmt::Debug for RouterService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterService")
            .field("limiter", &self.limiter)
            .field("engine", &self.engine)
            .finish()
    }
}

impl RouterService {
    /// Assemble a service from explicitly constructed stages.
    ///
    /// This is the injection point for tests: hand in an engine over fake
    /// providers and the whole pipeline runs deterministically.
    pub fn new(engine: RouterEngine, limiter: TieredRateLimiter, tracker: UsageTracker) -> Self {
        Self {
            limiter,
            engine,
            tracker,
        }
    }

    /// Build a service from a validated [`RouterConfig`], constructing one
    /// HTTP adapter per configured provider.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Config`] when a provider's credential env var
    /// is not set.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime (the usage tracker spawns
    /// its aggregator task).
    pub fn from_config(config: &RouterConfig) -> Result<Self, RouterError> {
        let mut registrations = Vec::with_capacity(config.providers.len());
        for provider in &config.providers {
            let adapter = HttpProvider::from_config(provider)?;
            registrations.push(ProviderRegistration {
                name: provider.name.clone(),
                priority: provider.priority,
                timeout: provider.timeout(),
                adapter: Arc::new(adapter),
            });
        }

        let classifier = Arc::new(SignatureClassifier::new(
            config.classifier.refusal_signatures.iter().cloned(),
        ));

        let limiter = TieredRateLimiter::new(
            config
                .tiers
                .iter()
                .filter_map(|(name, tier)| tier.quota().map(|q| (name.clone(), q))),
        );

        Ok(Self::new(
            RouterEngine::new(registrations, classifier),
            limiter,
            UsageTracker::new(USAGE_QUEUE_CAPACITY),
        ))
    }

    /// Route one prompt through the pipeline.
    ///
    /// The returned [`RoutingResult`] carries the terminal outcome as a
    /// value; provider failures, refusals, quota denials, and deadline
    /// expiry all land there. `Err` is reserved for caller mistakes caught
    /// before the pipeline runs.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidRequest`] when the prompt is empty.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub async fn route(
        &self,
        prompt: &str,
        caller: CallerId,
        tier: &str,
        deadline: Instant,
    ) -> Result<RoutingResult, RouterError> {
        if prompt.trim().is_empty() {
            return Err(RouterError::InvalidRequest("prompt is empty".into()));
        }

        let ctx = RequestContext::new(prompt, caller, tier, deadline);

        if let Admission::Denied { retry_after } = self.limiter.admit(&ctx.caller, &ctx.tier) {
            info!(
                caller = ctx.caller.as_str(),
                tier = %ctx.tier,
                retry_after_ms = retry_after.as_millis() as u64,
                correlation_id = %ctx.correlation_id,
                "call rate limited"
            );
            let result = RoutingResult::rate_limited(&ctx, retry_after);
            self.tracker.record(&ctx, &result.attempts);
            return Ok(result);
        }

        let result = self.engine.dispatch(&ctx).await;
        self.tracker.record(&ctx, &result.attempts);
        Ok(result)
    }

    /// The underlying engine, for hot-swapping the provider table.
    pub fn engine(&self) -> &RouterEngine {
        &self.engine
    }

    /// Aggregated usage snapshot.
    pub fn usage(&self) -> crate::usage::UsageSnapshot {
        self.tracker.snapshot()
    }
}
