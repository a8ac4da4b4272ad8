//! # Stage: Declarative Router Configuration
//!
//! ## Responsibility
//! Parse and validate TOML router configuration files: the ordered provider
//! table, the refusal-signature list, and per-tier quotas. Loaded once at
//! startup into an immutable [`RouterConfig`] that is passed explicitly into
//! the service — never ambient global state — so tests can inject fake
//! providers deterministically.
//!
//! ## Guarantees
//! - Deterministic: same TOML input always produces the same `RouterConfig`
//! - Validated: all semantic constraints are checked before a config is accepted
//! - Type-safe: invalid field combinations are caught at parse time via serde
//! - Schema-exportable: JSON Schema output enables IDE autocomplete
//!
//! ## NOT Responsible For
//! - Building the runtime router from config (that belongs to `service`)
//! - Admission bookkeeping (that belongs to `rate_limit`)
//! - Provider connections (that belongs to `provider`)

pub mod loader;
pub mod validation;

use std::collections::BTreeMap;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::rate_limit::TierQuota;

// ── Default value functions ──────────────────────────────────────────────

/// Default per-provider attempt timeout: 10 000ms.
fn default_provider_timeout_ms() -> u64 {
    10_000
}

/// Default refusal-signature list.
///
/// A conservative starter set; deployments extend it in configuration, not
/// code.
fn default_refusal_signatures() -> Vec<String> {
    [
        "i can't",
        "i cannot",
        "i'm sorry",
        "i am sorry",
        "i am unable",
        "i won't",
        "as an ai",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

// ── Top-level config ─────────────────────────────────────────────────────

/// Root configuration for a router instance.
///
/// Deserialized from a TOML file and validated before use. Immutable after
/// load.
///
/// # Example
///
/// ```toml
/// [router]
/// name = "production"
/// version = "1.0"
///
/// [[providers]]
/// name = "primary"
/// priority = 1
/// endpoint = "https://api.openai.com/v1/completions"
/// credential_env = "PRIMARY_API_KEY"
///
/// [tiers.free]
/// max_requests = 10
/// window_s = 86400
///
/// [tiers.pro]
/// unlimited = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RouterConfig {
    /// Router identity and version metadata.
    pub router: RouterSection,
    /// Ordered provider table. Order is the tie-break for equal priorities.
    pub providers: Vec<ProviderConfig>,
    /// Refusal classifier settings.
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Per-tier admission quotas, keyed by tier name.
    pub tiers: BTreeMap<String, TierConfig>,
    /// Observability: log output format.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ── Router identity ──────────────────────────────────────────────────────

/// Router identity and version metadata.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RouterSection {
    /// Human-readable instance name (e.g., "production", "staging").
    pub name: String,
    /// Semantic version of this configuration (e.g., "1.0").
    pub version: String,
    /// Optional description for documentation purposes.
    pub description: Option<String>,
}

// ── Providers ────────────────────────────────────────────────────────────

/// One upstream provider entry.
///
/// Identity, priority rank, connection parameters, and time budget.
/// Credentials are referenced by environment variable name, never stored
/// inline.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ProviderConfig {
    /// Provider identity, echoed into attempt records.
    pub name: String,
    /// Priority rank; lower is tried first.
    pub priority: u32,
    /// Upstream endpoint URL.
    pub endpoint: String,
    /// Name of the environment variable holding the bearer token. `None`
    /// for unauthenticated upstreams (local servers, test fixtures).
    pub credential_env: Option<String>,
    /// Model identifier to request from the upstream.
    pub model: Option<String>,
    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

impl ProviderConfig {
    /// The per-attempt timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ── Classifier ───────────────────────────────────────────────────────────

/// Refusal classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ClassifierConfig {
    /// Case-insensitive substrings marking a response as a refusal.
    #[serde(default = "default_refusal_signatures")]
    pub refusal_signatures: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            refusal_signatures: default_refusal_signatures(),
        }
    }
}

// ── Tiers ────────────────────────────────────────────────────────────────

/// Quota for one subscription tier.
///
/// Either `unlimited = true`, or both `max_requests` and `window_s` —
/// validation rejects every other combination.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TierConfig {
    /// Skip the admission check entirely for this tier.
    #[serde(default)]
    pub unlimited: bool,
    /// Requests allowed per window.
    pub max_requests: Option<u32>,
    /// Window length in seconds.
    pub window_s: Option<u64>,
}

impl TierConfig {
    /// The runtime quota, `None` when the combination is incoherent
    /// (validation reports those before this is ever called).
    pub fn quota(&self) -> Option<TierQuota> {
        if self.unlimited {
            return Some(TierQuota::Unlimited);
        }
        match (self.max_requests, self.window_s) {
            (Some(max_requests), Some(window_s)) => Some(TierQuota::Limited {
                max_requests,
                window: Duration::from_secs(window_s),
            }),
            _ => None,
        }
    }
}

// ── Observability ────────────────────────────────────────────────────────

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ObservabilityConfig {
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, colorized log output.
    Pretty,
    /// Structured JSON log output for machine consumption.
    Json,
}

/// Export the JSON Schema for `RouterConfig`.
///
/// This enables IDE autocomplete when editing TOML config files.
///
/// # Errors
///
/// Returns `serde_json::Error` if schema serialization fails (should not
/// happen with well-formed derive macros).
pub fn export_schema() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(RouterConfig);
    serde_json::to_string_pretty(&schema)
}
