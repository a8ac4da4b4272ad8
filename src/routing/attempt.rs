//! Per-attempt accounting.
//!
//! One [`AttemptRecord`] is appended for every provider the router actually
//! contacts — never zero, never more than one per provider per call. Records
//! are immutable once written and ordered by provider priority rank, which
//! matches real invocation order because the fallback loop is sequential.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Terminal outcome of one provider attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The provider answered and the classifier accepted the response.
    Success,
    /// The provider answered but the classifier judged it a refusal.
    Refusal,
    /// The provider failed at the transport level (unavailable, malformed).
    Error,
    /// The provider did not respond within the attempt's time budget.
    Timeout,
}

impl AttemptOutcome {
    /// True for transport-level failures (`error`/`timeout`).
    ///
    /// Hard failures dominate refusals when folding attempts into the final
    /// call outcome.
    pub fn is_hard_failure(self) -> bool {
        matches!(self, Self::Error | Self::Timeout)
    }
}

/// Immutable record of one provider attempt within a single routing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Name of the provider attempted.
    pub provider: String,
    /// Wall-clock time the attempt started.
    pub started_at: SystemTime,
    /// Wall-clock time the attempt finished.
    pub finished_at: SystemTime,
    /// How the attempt ended.
    pub outcome: AttemptOutcome,
    /// Raw error detail for `error`/`timeout` outcomes.
    pub error: Option<String>,
    /// Estimated cost of the attempt in provider cost units (zero for
    /// failed attempts).
    pub cost_units: u64,
}

impl AttemptRecord {
    /// Attempt latency, zero if the clock moved backwards between stamps.
    pub fn latency(&self) -> Duration {
        self.finished_at
            .duration_since(self.started_at)
            .unwrap_or_default()
    }
}
