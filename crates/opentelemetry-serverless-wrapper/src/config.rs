//! Wrapper configuration.
//!
//! Loaded with figment from (later sources win):
//! 1. Default values (compiled in)
//! 2. Config file: `/etc/otel/serverless-wrapper.toml` (optional)
//! 3. Standard environment variables
//! 4. Wrapper-specific environment variables (`OTEL_WRAPPER_*`)
//!
//! | Variable | Config Path | Description |
//! |----------|-------------|-------------|
//! | `OTEL_TRACING_CONTENT` | `content_tracing` | `true` captures body values, not only sizes |
//! | `OTEL_ENABLED_PROFILES` | `enabled_profiles` | Comma-separated profile names |
//! | `OTEL_TRACES_EXPORTER` | `tracing_enabled` | `none` disables spans |
//! | `OTEL_METRICS_EXPORTER` | `metrics_enabled` | `none` disables metrics |
//! | `OTEL_SDK_DISABLED` | both | `true` disables spans and metrics |
//!
//! Boolean variables are compared case-insensitively against `true`.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/otel/serverless-wrapper.toml";
/// Profile enabled when none is configured.
pub const DEFAULT_PROFILE: &str = "http";

const ENV_PREFIX: &str = "OTEL_WRAPPER_";
const CONTENT_TRACING_VAR: &str = "OTEL_TRACING_CONTENT";
const ENABLED_PROFILES_VAR: &str = "OTEL_ENABLED_PROFILES";

/// Settings read by the initializer and the profile processors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapperConfig {
    /// Capture request and response body values as attributes.
    pub content_tracing: bool,
    /// Enabled profile names, in registration order.
    pub enabled_profiles: Vec<String>,
    /// Whether invocation spans are produced.
    pub tracing_enabled: bool,
    /// Whether invocation metrics are recorded.
    pub metrics_enabled: bool,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            content_tracing: false,
            enabled_profiles: vec![DEFAULT_PROFILE.to_string()],
            tracing_enabled: true,
            metrics_enabled: true,
        }
    }
}

impl WrapperConfig {
    /// Loads configuration from the default file location and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    #[allow(clippy::result_large_err)]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration from a custom config file path and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    #[allow(clippy::result_large_err)]
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(WrapperConfig::default()));

        if config_path.as_ref().exists() {
            figment = figment.merge(Toml::file(config_path));
        }

        figment = figment.merge(standard_env());
        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        let mut config: WrapperConfig = figment.extract()?;
        config.enabled_profiles = normalize_profiles(config.enabled_profiles);
        Ok(config)
    }
}

/// Returns the enabled profile names from `OTEL_ENABLED_PROFILES`.
///
/// Unset or empty yields `["http"]`.
pub fn get_profiles() -> Vec<String> {
    parse_profiles(std::env::var(ENABLED_PROFILES_VAR).ok().as_deref())
}

fn parse_profiles(value: Option<&str>) -> Vec<String> {
    let names = value
        .map(|v| v.split(',').map(str::to_string).collect())
        .unwrap_or_default();
    normalize_profiles(names)
}

fn normalize_profiles(names: Vec<String>) -> Vec<String> {
    let names: Vec<String> = names
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();

    if names.is_empty() {
        vec![DEFAULT_PROFILE.to_string()]
    } else {
        names
    }
}

fn is_true(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

#[derive(Debug, Default, Serialize)]
struct PartialConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    content_tracing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enabled_profiles: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tracing_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics_enabled: Option<bool>,
}

fn standard_env() -> Serialized<PartialConfig> {
    let mut config = PartialConfig::default();

    if let Ok(value) = std::env::var(CONTENT_TRACING_VAR) {
        config.content_tracing = Some(is_true(&value));
    }

    if let Ok(value) = std::env::var(ENABLED_PROFILES_VAR) {
        config.enabled_profiles = Some(parse_profiles(Some(&value)));
    }

    if let Ok(exporter) = std::env::var("OTEL_TRACES_EXPORTER") {
        config.tracing_enabled = Some(!exporter.trim().eq_ignore_ascii_case("none"));
    }

    if let Ok(exporter) = std::env::var("OTEL_METRICS_EXPORTER") {
        config.metrics_enabled = Some(!exporter.trim().eq_ignore_ascii_case("none"));
    }

    if std::env::var("OTEL_SDK_DISABLED")
        .map(|v| is_true(&v))
        .unwrap_or(false)
    {
        config.tracing_enabled = Some(false);
        config.metrics_enabled = Some(false);
    }

    Serialized::defaults(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ALL_VARS: [&str; 5] = [
        "OTEL_TRACING_CONTENT",
        "OTEL_ENABLED_PROFILES",
        "OTEL_TRACES_EXPORTER",
        "OTEL_METRICS_EXPORTER",
        "OTEL_SDK_DISABLED",
    ];

    fn cleared() -> Vec<(&'static str, Option<&'static str>)> {
        ALL_VARS.iter().map(|v| (*v, None)).collect()
    }

    #[test]
    fn test_default_config() {
        let config = WrapperConfig::default();

        assert!(!config.content_tracing);
        assert_eq!(config.enabled_profiles, vec!["http"]);
        assert!(config.tracing_enabled);
        assert!(config.metrics_enabled);
    }

    #[test]
    #[serial]
    fn test_get_profiles_unset_returns_default() {
        temp_env::with_var_unset("OTEL_ENABLED_PROFILES", || {
            assert_eq!(get_profiles(), vec!["http"]);
        });
    }

    #[test]
    #[serial]
    fn test_get_profiles_empty_returns_default() {
        temp_env::with_var("OTEL_ENABLED_PROFILES", Some(""), || {
            assert_eq!(get_profiles(), vec!["http"]);
        });
    }

    #[test]
    #[serial]
    fn test_get_profiles_splits_list() {
        temp_env::with_var("OTEL_ENABLED_PROFILES", Some("http,custom"), || {
            assert_eq!(get_profiles(), vec!["http", "custom"]);
        });
    }

    #[test]
    fn test_parse_profiles_trims_and_drops_empty_entries() {
        assert_eq!(
            parse_profiles(Some(" http , ,grpc ")),
            vec!["http".to_string(), "grpc".to_string()]
        );
        assert_eq!(parse_profiles(Some(" , ")), vec!["http"]);
        assert_eq!(parse_profiles(None), vec!["http"]);
    }

    #[test]
    #[serial]
    fn test_content_tracing_is_case_insensitive() {
        let mut vars = cleared();
        vars.push(("OTEL_TRACING_CONTENT", Some("TRUE")));
        temp_env::with_vars(vars, || {
            let config = WrapperConfig::load_from_path("/nonexistent/wrapper.toml").unwrap();
            assert!(config.content_tracing);
        });

        let mut vars = cleared();
        vars.push(("OTEL_TRACING_CONTENT", Some("yes")));
        temp_env::with_vars(vars, || {
            let config = WrapperConfig::load_from_path("/nonexistent/wrapper.toml").unwrap();
            assert!(!config.content_tracing);
        });
    }

    #[test]
    #[serial]
    fn test_exporter_none_disables_signal() {
        let mut vars = cleared();
        vars.push(("OTEL_TRACES_EXPORTER", Some("none")));
        vars.push(("OTEL_METRICS_EXPORTER", Some("otlp")));
        temp_env::with_vars(vars, || {
            let config = WrapperConfig::load_from_path("/nonexistent/wrapper.toml").unwrap();
            assert!(!config.tracing_enabled);
            assert!(config.metrics_enabled);
        });
    }

    #[test]
    #[serial]
    fn test_sdk_disabled_disables_both_signals() {
        let mut vars = cleared();
        vars.push(("OTEL_SDK_DISABLED", Some("true")));
        temp_env::with_vars(vars, || {
            let config = WrapperConfig::load_from_path("/nonexistent/wrapper.toml").unwrap();
            assert!(!config.tracing_enabled);
            assert!(!config.metrics_enabled);
        });
    }

    #[test]
    #[serial]
    fn test_load_from_file_then_env() {
        let toml_content = r#"
content_tracing = true
enabled_profiles = ["http", "queue"]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let mut vars = cleared();
        vars.push(("OTEL_METRICS_EXPORTER", Some("none")));
        temp_env::with_vars(vars, || {
            let config = WrapperConfig::load_from_path(temp_file.path()).unwrap();

            assert!(config.content_tracing);
            assert_eq!(config.enabled_profiles, vec!["http", "queue"]);
            assert!(config.tracing_enabled);
            assert!(!config.metrics_enabled);
        });
    }

    #[test]
    #[serial]
    fn test_env_overrides_file_profiles() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"enabled_profiles = [\"queue\"]\n")
            .unwrap();

        let mut vars = cleared();
        vars.push(("OTEL_ENABLED_PROFILES", Some("http")));
        temp_env::with_vars(vars, || {
            let config = WrapperConfig::load_from_path(temp_file.path()).unwrap();
            assert_eq!(config.enabled_profiles, vec!["http"]);
        });
    }

    #[test]
    #[serial]
    fn test_prefixed_env_overrides() {
        let mut vars = cleared();
        vars.push(("OTEL_WRAPPER_CONTENT_TRACING", Some("true")));
        temp_env::with_vars(vars, || {
            let config = WrapperConfig::load_from_path("/nonexistent/wrapper.toml").unwrap();
            assert!(config.content_tracing);
        });
    }
}
