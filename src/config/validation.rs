//! Configuration validation engine.
//!
//! ## Responsibility
//! Validate semantic constraints on a parsed [`RouterConfig`] that cannot
//! be expressed through the type system alone (e.g., range checks,
//! cross-field invariants like the unlimited/limited tier split).
//!
//! ## Guarantees
//! - Every validation rule has at least one test that triggers it
//! - Validation collects *all* errors before returning (no short-circuit)
//! - Error messages include the field path and the invalid value
//!
//! ## NOT Responsible For
//! - Parsing TOML (that belongs to `loader`)
//! - File I/O (that belongs to `loader`)

use std::collections::HashSet;

use super::RouterConfig;

/// Errors arising from configuration parsing, validation, or I/O.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parsing failed.
    #[error("Parse error in {file}: {source}")]
    Parse {
        /// Path of the file that failed to parse.
        file: String,
        /// Underlying TOML deserialization error.
        #[source]
        source: toml::de::Error,
    },

    /// One or more semantic validation rules failed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A specific field has an out-of-range or contradictory value.
    #[error("Field '{field}' has invalid value {value}: {reason}")]
    InvalidField {
        /// Dot-separated field path (e.g., "providers[0].timeout_ms").
        field: String,
        /// String representation of the invalid value.
        value: String,
        /// Human-readable explanation of the constraint.
        reason: String,
    },

    /// File I/O error.
    #[error("IO error reading {file}: {source}")]
    Io {
        /// Path of the file that could not be read.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Validate all semantic constraints on a [`RouterConfig`].
///
/// Collects every violation before returning so the caller sees the full
/// scope of issues at once.
///
/// # Arguments
///
/// * `config` — The parsed config to validate.
///
/// # Returns
///
/// - `Ok(())` if all constraints pass.
/// - `Err(Vec<ConfigError>)` with every violation found.
///
/// # Panics
///
/// This function never panics.
pub fn validate(config: &RouterConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // ── Providers ────────────────────────────────────────────────────
    if config.providers.is_empty() {
        errors.push(ConfigError::InvalidField {
            field: "providers".into(),
            value: "[]".into(),
            reason: "at least one provider is required".into(),
        });
    }

    let mut seen_names = HashSet::new();
    for (idx, provider) in config.providers.iter().enumerate() {
        if provider.name.is_empty() {
            errors.push(ConfigError::InvalidField {
                field: format!("providers[{idx}].name"),
                value: "\"\"".into(),
                reason: "must be non-empty".into(),
            });
        }

        if !seen_names.insert(provider.name.clone()) {
            errors.push(ConfigError::InvalidField {
                field: format!("providers[{idx}].name"),
                value: provider.name.clone(),
                reason: "provider names must be unique".into(),
            });
        }

        if provider.endpoint.is_empty() {
            errors.push(ConfigError::InvalidField {
                field: format!("providers[{idx}].endpoint"),
                value: "\"\"".into(),
                reason: "must be non-empty".into(),
            });
        }

        if provider.timeout_ms == 0 {
            errors.push(ConfigError::InvalidField {
                field: format!("providers[{idx}].timeout_ms"),
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }
    }

    // ── Tiers ────────────────────────────────────────────────────────
    if config.tiers.is_empty() {
        errors.push(ConfigError::InvalidField {
            field: "tiers".into(),
            value: "{}".into(),
            reason: "at least one tier is required".into(),
        });
    }

    for (name, tier) in &config.tiers {
        if tier.unlimited && (tier.max_requests.is_some() || tier.window_s.is_some()) {
            errors.push(ConfigError::InvalidField {
                field: format!("tiers.{name}"),
                value: "unlimited + quota fields".into(),
                reason: "an unlimited tier must not set max_requests or window_s".into(),
            });
        }

        if !tier.unlimited && (tier.max_requests.is_none() || tier.window_s.is_none()) {
            errors.push(ConfigError::InvalidField {
                field: format!("tiers.{name}"),
                value: format!(
                    "max_requests={:?}, window_s={:?}",
                    tier.max_requests, tier.window_s
                ),
                reason: "a limited tier must set both max_requests and window_s".into(),
            });
        }

        if tier.window_s == Some(0) {
            errors.push(ConfigError::InvalidField {
                field: format!("tiers.{name}.window_s"),
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
