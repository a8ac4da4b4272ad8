//! Tiered admission control.
//!
//! Fixed-window counters keyed by caller and tier, with a quota per
//! subscription tier. Admission is a discrete pipeline stage invoked before the router,
//! not a cross-cutting annotation.
//!
//! ## Usage
//!
//! ```no_run
//! use tokio_provider_router::rate_limit::{Admission, TieredRateLimiter, TierQuota};
//! use tokio_provider_router::CallerId;
//! use std::time::Duration;
//!
//! let limiter = TieredRateLimiter::new([
//!     ("free".to_string(), TierQuota::limited(10, Duration::from_secs(86_400))),
//!     ("pro".to_string(), TierQuota::Unlimited),
//! ]);
//!
//! match limiter.admit(&CallerId::new("user-123"), "free") {
//!     Admission::Allowed => { /* forward to the router */ }
//!     Admission::Denied { retry_after } => { /* reject with retry_after */ }
//! }
//! ```
//!
//! The check-and-increment is one operation under the counter entry's
//! shard lock, so concurrent callers sharing a caller id cannot exceed
//! quota through a check-then-increment race.

#[cfg(feature = "rate-limiting")]
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
#[cfg(feature = "rate-limiting")]
use std::num::NonZeroU32;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::CallerId;

/// Quota attached to one subscription tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierQuota {
    /// The admission check is skipped entirely for this tier. This is a
    /// real bypass, not a very large limit, so no counter state accrues.
    Unlimited,
    /// At most `max_requests` per rolling fixed window of `window` length.
    Limited {
        /// Requests allowed per window.
        max_requests: u32,
        /// Window length.
        window: Duration,
    },
}

impl TierQuota {
    /// Convenience constructor for the limited variant.
    pub fn limited(max_requests: u32, window: Duration) -> Self {
        Self::Limited {
            max_requests,
            window,
        }
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The request may proceed to the router.
    Allowed,
    /// The request is rejected before any provider is contacted.
    Denied {
        /// Time until the caller's window rolls over.
        retry_after: Duration,
    },
}

struct WindowCounter {
    window_start: Instant,
    count: u32,
}

/// Per-caller, per-tier admission control.
///
/// Counter state is keyed by `(caller, tier)` so one caller presenting two
/// limited tiers gets an independent window for each.
pub struct TieredRateLimiter {
    tiers: HashMap<String, TierQuota>,
    counters: DashMap<(String, String), WindowCounter>,
    #[cfg(feature = "rate-limiting")]
    buckets: DashMap<(String, String), GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl std::fmt::Debug for TieredRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredRateLimiter")
            .field("tiers", &self.tiers)
            .finish()
    }
}

impl TieredRateLimiter {
    /// Create a limiter from a tier-to-quota table.
    pub fn new(tiers: impl IntoIterator<Item = (String, TierQuota)>) -> Self {
        Self {
            tiers: tiers.into_iter().collect(),
            counters: DashMap::new(),
            #[cfg(feature = "rate-limiting")]
            buckets: DashMap::new(),
        }
    }

    /// Check and consume one admission slot for `caller` under `tier`.
    ///
    /// Unknown tiers are denied outright (with zero retry-after) so a typo
    /// in a caller's tier claim fails closed instead of open.
    pub fn admit(&self, caller: &CallerId, tier: &str) -> Admission {
        let quota = match self.tiers.get(tier) {
            Some(q) => q,
            None => {
                warn!(caller = caller.as_str(), tier = tier, "unknown tier, denying");
                return Admission::Denied {
                    retry_after: Duration::ZERO,
                };
            }
        };

        match quota {
            TierQuota::Unlimited => Admission::Allowed,
            TierQuota::Limited {
                max_requests,
                window,
            } => self.admit_limited(caller, tier, *max_requests, *window),
        }
    }

    fn admit_limited(
        &self,
        caller: &CallerId,
        tier: &str,
        max_requests: u32,
        window: Duration,
    ) -> Admission {
        let now = Instant::now();

        // The entry guard holds the shard lock for the whole
        // check-and-increment, which is what makes admission atomic.
        let mut entry = self
            .counters
            .entry((caller.as_str().to_string(), tier.to_string()))
            .or_insert(WindowCounter {
                window_start: now,
                count: 0,
            });

        // Window rollover
        if now.duration_since(entry.window_start) >= window {
            entry.window_start = now;
            entry.count = 0;
        }

        if entry.count >= max_requests {
            let elapsed = now.duration_since(entry.window_start);
            let retry_after = window.saturating_sub(elapsed);
            warn!(
                caller = caller.as_str(),
                tier = tier,
                count = entry.count,
                limit = max_requests,
                "admission denied"
            );
            return Admission::Denied { retry_after };
        }

        entry.count += 1;
        debug!(
            caller = caller.as_str(),
            tier = tier,
            count = entry.count,
            limit = max_requests,
            "admission granted"
        );
        Admission::Allowed
    }

    /// Current usage in the caller's window for one tier, if any counter
    /// exists.
    pub fn usage(&self, caller: &CallerId, tier: &str) -> Option<RateLimitUsage> {
        self.counters
            .get(&(caller.as_str().to_string(), tier.to_string()))
            .map(|entry| RateLimitUsage {
                used: entry.count,
                window_started: entry.window_start,
            })
    }

    /// Drop the caller's counter for one tier, restoring a full window.
    pub fn reset(&self, caller: &CallerId, tier: &str) {
        self.counters
            .remove(&(caller.as_str().to_string(), tier.to_string()));
        debug!(caller = caller.as_str(), tier = tier, "rate limit reset");
    }

    /// Token-bucket admission through `governor`, keyed per caller.
    ///
    /// Smooths bursts instead of hard window edges; the bucket refills at
    /// `max_requests` per `window`. Unlimited tiers bypass this path too.
    #[cfg(feature = "rate-limiting")]
    pub fn admit_bucketed(&self, caller: &CallerId, tier: &str) -> Admission {
        let quota = match self.tiers.get(tier) {
            Some(TierQuota::Unlimited) => return Admission::Allowed,
            Some(TierQuota::Limited {
                max_requests,
                window,
            }) => {
                let max = match NonZeroU32::new(*max_requests) {
                    Some(m) => m,
                    None => {
                        return Admission::Denied {
                            retry_after: *window,
                        }
                    }
                };
                let period = *window / max.get();
                match Quota::with_period(period) {
                    Some(q) => q.allow_burst(max),
                    None => {
                        return Admission::Denied {
                            retry_after: *window,
                        }
                    }
                }
            }
            None => {
                return Admission::Denied {
                    retry_after: Duration::ZERO,
                }
            }
        };

        let bucket = self
            .buckets
            .entry((caller.as_str().to_string(), tier.to_string()))
            .or_insert_with(|| GovernorRateLimiter::direct(quota));

        match bucket.check() {
            Ok(_) => Admission::Allowed,
            Err(not_until) => Admission::Denied {
                retry_after: not_until.wait_time_from(DefaultClock::default().now()),
            },
        }
    }
}

/// Usage introspection for one caller's current window.
#[derive(Debug, Clone)]
pub struct RateLimitUsage {
    /// Requests consumed in the current window.
    pub used: u32,
    /// When the current window opened.
    pub window_started: Instant,
}
