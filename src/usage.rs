//! Usage and cost accounting.
//!
//! The router hands each call's attempt records to the tracker as a
//! fire-and-forget side channel: `record` never blocks the caller's
//! response, and a tracker failure is logged rather than propagated or
//! retried inline. Records flow over a bounded channel into a background
//! aggregator; under load spikes the channel sheds rather than delays.
//!
//! Aggregation is lock-free: all counters are atomics, and costs are kept
//! in integer micro-units to avoid floating-point drift in long-running
//! aggregations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::routing::{AttemptOutcome, AttemptRecord};
use crate::RequestContext;

/// One recorded routing call, queued for aggregation.
#[derive(Debug)]
struct UsageEvent {
    caller: String,
    correlation_id: String,
    attempts: Vec<AttemptRecord>,
}

#[derive(Debug, Default)]
struct UsageCounters {
    calls: AtomicU64,
    attempts: AtomicU64,
    successes: AtomicU64,
    refusals: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
    cost_units: AtomicU64,
    attempt_latency_micros: AtomicU64,
    shed: AtomicU64,
}

/// Fire-and-forget usage/cost tracker.
///
/// Cheap to clone; all clones feed the same aggregator and share the same
/// counters.
#[derive(Clone)]
pub struct UsageTracker {
    tx: mpsc::Sender<UsageEvent>,
    counters: Arc<UsageCounters>,
}

impl std::fmt::Debug for UsageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageTracker")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl UsageTracker {
    /// Create a tracker with the given queue capacity and spawn its
    /// background aggregator task.
    ///
    /// The aggregator exits when every tracker clone has been dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime (the aggregator task must
    /// be spawned somewhere).
    pub fn new(capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<UsageEvent>(capacity.max(1));
        let counters = Arc::new(UsageCounters::default());

        let fold_into = Arc::clone(&counters);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                fold(&fold_into, &event);
            }
        });

        Self { tx, counters }
    }

    /// Queue one call's attempt records for aggregation.
    ///
    /// Strategy: `try_send` → if the queue is full, log and drop this
    /// record (the queue keeps its existing contents). The router's
    /// response to the caller is unaffected either way.
    pub fn record(&self, ctx: &RequestContext, attempts: &[AttemptRecord]) {
        let event = UsageEvent {
            caller: ctx.caller.as_str().to_string(),
            correlation_id: ctx.correlation_id.clone(),
            attempts: attempts.to_vec(),
        };

        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.shed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    caller = ctx.caller.as_str(),
                    correlation_id = %ctx.correlation_id,
                    "usage queue full, shedding record"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(
                    caller = ctx.caller.as_str(),
                    correlation_id = %ctx.correlation_id,
                    "usage aggregator stopped, record lost"
                );
            }
        }
    }

    /// Point-in-time snapshot of aggregated usage.
    pub fn snapshot(&self) -> UsageSnapshot {
        let c = &self.counters;
        let attempts = c.attempts.load(Ordering::Relaxed);
        let latency_micros = c.attempt_latency_micros.load(Ordering::Relaxed);

        UsageSnapshot {
            calls: c.calls.load(Ordering::Relaxed),
            attempts,
            successes: c.successes.load(Ordering::Relaxed),
            refusals: c.refusals.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
            cost_units: c.cost_units.load(Ordering::Relaxed),
            shed_records: c.shed.load(Ordering::Relaxed),
            mean_attempt_latency_ms: if attempts > 0 {
                (latency_micros as f64 / attempts as f64) / 1_000.0
            } else {
                0.0
            },
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        let c = &self.counters;
        c.calls.store(0, Ordering::Relaxed);
        c.attempts.store(0, Ordering::Relaxed);
        c.successes.store(0, Ordering::Relaxed);
        c.refusals.store(0, Ordering::Relaxed);
        c.errors.store(0, Ordering::Relaxed);
        c.timeouts.store(0, Ordering::Relaxed);
        c.cost_units.store(0, Ordering::Relaxed);
        c.attempt_latency_micros.store(0, Ordering::Relaxed);
        c.shed.store(0, Ordering::Relaxed);
    }
}

fn fold(counters: &UsageCounters, event: &UsageEvent) {
    counters.calls.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(
        caller = %event.caller,
        correlation_id = %event.correlation_id,
        attempts = event.attempts.len(),
        "usage recorded"
    );

    for attempt in &event.attempts {
        counters.attempts.fetch_add(1, Ordering::Relaxed);
        counters
            .cost_units
            .fetch_add(attempt.cost_units, Ordering::Relaxed);
        counters.attempt_latency_micros.fetch_add(
            attempt.latency().as_micros() as u64,
            Ordering::Relaxed,
        );
        let bucket = match attempt.outcome {
            AttemptOutcome::Success => &counters.successes,
            AttemptOutcome::Refusal => &counters.refusals,
            AttemptOutcome::Error => &counters.errors,
            AttemptOutcome::Timeout => &counters.timeouts,
        };
        bucket.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time snapshot of usage aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageSnapshot {
    /// Routing calls recorded.
    pub calls: u64,
    /// Provider attempts across all recorded calls.
    pub attempts: u64,
    /// Attempts that ended in an accepted response.
    pub successes: u64,
    /// Attempts classified as refusals.
    pub refusals: u64,
    /// Attempts that failed at the transport level.
    pub errors: u64,
    /// Attempts that timed out.
    pub timeouts: u64,
    /// Total estimated cost units across all attempts.
    pub cost_units: u64,
    /// Records dropped because the queue was full.
    pub shed_records: u64,
    /// Mean attempt latency in milliseconds.
    pub mean_attempt_latency_ms: f64,
}
