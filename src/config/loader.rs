//! Configuration file loading.
//!
//! ## Responsibility
//! Read a TOML file from disk, parse it into a [`RouterConfig`], and run
//! validation before returning. This is the primary entry point for loading
//! router configuration at startup.
//!
//! ## Guarantees
//! - A successfully loaded config is always validated
//! - I/O errors and parse errors are distinguished in the error type
//! - File path is included in every error message
//!
//! ## NOT Responsible For
//! - Defining the config schema (that belongs to `mod.rs`)
//! - Constructing the runtime service (that belongs to `service`)

use std::path::Path;

use super::validation::{self, ConfigError};
use super::RouterConfig;

/// Load a [`RouterConfig`] from a TOML file.
///
/// Reads the file, parses it as TOML, and validates all semantic
/// constraints.
///
/// # Arguments
///
/// * `path` — Path to the TOML configuration file.
///
/// # Returns
///
/// - `Ok(RouterConfig)` if the file is readable, well-formed, and valid.
/// - `Err(ConfigError::Io)` if the file cannot be read.
/// - `Err(ConfigError::Parse)` if the TOML is malformed.
/// - `Err(ConfigError::Validation)` if semantic constraints are violated.
///
/// # Panics
///
/// This function never panics.
pub fn load_from_file(path: &Path) -> Result<RouterConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        file: path.display().to_string(),
        source: e,
    })?;

    load_from_str(&content, &path.display().to_string())
}

/// Load a [`RouterConfig`] from a TOML string.
///
/// Useful for testing or embedding configs without file I/O.
///
/// # Arguments
///
/// * `content` — TOML content as a string.
/// * `source_name` — Identifier for the source (used in error messages).
///
/// # Returns
///
/// - `Ok(RouterConfig)` if the TOML is well-formed and valid.
/// - `Err(ConfigError::Parse)` if the TOML is malformed.
/// - `Err(ConfigError::Validation)` if semantic constraints are violated.
///
/// # Panics
///
/// This function never panics.
pub fn load_from_str(content: &str, source_name: &str) -> Result<RouterConfig, ConfigError> {
    let config: RouterConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
        file: source_name.to_string(),
        source: e,
    })?;

    validation::validate(&config).map_err(|errors| {
        ConfigError::Validation(
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    })?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID_TOML: &str = r#"
[router]
name = "test"
version = "1.0"

[[providers]]
name = "primary"
priority = 1
endpoint = "http://localhost:8080/v1/completions"
timeout_ms = 5000

[[providers]]
name = "secondary"
priority = 2
endpoint = "http://localhost:8000/v1/completions"

[tiers.free]
max_requests = 10
window_s = 86400

[tiers.pro]
unlimited = true
"#;

    #[test]
    fn test_load_from_str_valid_toml_succeeds() {
        let config = load_from_str(VALID_TOML, "inline").expect("test: valid TOML loads");
        assert_eq!(config.router.name, "test");
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.tiers.len(), 2);
    }

    #[test]
    fn test_load_from_str_malformed_toml_is_parse_error() {
        let result = load_from_str("not [ valid toml", "inline");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_from_str_parse_error_names_source() {
        let err = load_from_str("???", "my-config.toml").unwrap_err();
        assert!(err.to_string().contains("my-config.toml"));
    }

    #[test]
    fn test_load_from_str_invalid_semantics_is_validation_error() {
        let toml_str = r#"
[router]
name = "test"
version = "1.0"

[[providers]]
name = "primary"
priority = 1
endpoint = "http://localhost:8080"
timeout_ms = 0

[tiers.free]
max_requests = 10
window_s = 86400
"#;
        let result = load_from_str(toml_str, "inline");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_load_from_file_missing_file_is_io_error() {
        let result = load_from_file(Path::new("/nonexistent/router.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_from_file_valid_file_succeeds() {
        let dir = std::env::temp_dir();
        let path = dir.join("tokio-provider-router-loader-test.toml");
        {
            let mut file = std::fs::File::create(&path).expect("test: create temp file");
            file.write_all(VALID_TOML.as_bytes())
                .expect("test: write temp file");
        }

        let config = load_from_file(&path).expect("test: load temp file");
        assert_eq!(config.providers[0].name, "primary");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_validation_error_reports_every_violation() {
        let toml_str = r#"
[router]
name = "test"
version = "1.0"

[[providers]]
name = ""
priority = 1
endpoint = ""

[tiers.bad]
max_requests = 5
"#;
        let err = load_from_str(toml_str, "inline").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("providers[0].name"));
        assert!(message.contains("providers[0].endpoint"));
        assert!(message.contains("tiers.bad"));
    }
}
