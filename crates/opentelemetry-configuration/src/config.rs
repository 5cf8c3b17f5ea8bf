//! Configuration types for the OpenTelemetry SDK.
//!
//! The configuration is assembled by [`OtelSdkBuilder`](crate::OtelSdkBuilder)
//! from layered sources using figment:
//! 1. Compiled-in defaults
//! 2. An optional TOML file
//! 3. Standard OpenTelemetry environment variables (`OTEL_*`)
//! 4. Programmatic overrides
//!
//! # Supported Standard Environment Variables
//!
//! | Variable | Config Path | Description |
//! |----------|-------------|-------------|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | `endpoint.url` | OTLP endpoint URL |
//! | `OTEL_EXPORTER_OTLP_PROTOCOL` | `endpoint.protocol` | `grpc`, `http/protobuf` or `http/json` |
//! | `OTEL_EXPORTER_OTLP_HEADERS` | `endpoint.headers` | Comma-separated key=value pairs |
//! | `OTEL_EXPORTER_OTLP_TIMEOUT` | `endpoint.timeout` | Export timeout in milliseconds |
//! | `OTEL_SERVICE_NAME` | `resource.service_name` | `service.name` resource attribute |
//! | `OTEL_RESOURCE_ATTRIBUTES` | `resource.attributes` | Comma-separated key=value pairs |
//! | `OTEL_TRACES_EXPORTER` | `traces.enabled` | `none` disables traces |
//! | `OTEL_METRICS_EXPORTER` | `metrics.enabled` | `none` disables metrics |
//! | `OTEL_PROPAGATORS` | `propagators` | Comma-separated propagator names |
//! | `OTEL_SDK_DISABLED` | `traces.enabled`, `metrics.enabled` | `true` disables both signals |

use figment::providers::Serialized;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_GRPC_ENDPOINT: &str = "http://localhost:4317";
const DEFAULT_HTTP_ENDPOINT: &str = "http://localhost:4318";

/// OTLP transport protocol.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Protocol {
    /// gRPC (port 4317).
    #[serde(rename = "grpc")]
    Grpc,
    /// HTTP with protobuf payloads (port 4318).
    #[default]
    #[serde(rename = "http/protobuf")]
    HttpBinary,
    /// HTTP with JSON payloads (port 4318).
    #[serde(rename = "http/json")]
    HttpJson,
}

impl Protocol {
    /// Parses the value of `OTEL_EXPORTER_OTLP_PROTOCOL`.
    ///
    /// Returns `None` for unrecognised values so the configured default wins.
    pub fn from_env_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "grpc" => Some(Self::Grpc),
            "http/protobuf" | "http" => Some(Self::HttpBinary),
            "http/json" => Some(Self::HttpJson),
            _ => None,
        }
    }
}

/// Complete SDK configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtelSdkConfig {
    /// Exporter endpoint settings shared by all signals.
    pub endpoint: EndpointConfig,
    /// Resource attributes describing the function.
    pub resource: ResourceConfig,
    /// Trace signal settings.
    pub traces: SignalConfig,
    /// Metric signal settings.
    pub metrics: SignalConfig,
    /// Text map propagators to install globally.
    pub propagators: Vec<String>,
    /// Whether to install a `tracing` subscriber bridged to OpenTelemetry.
    pub init_tracing_subscriber: bool,
}

impl Default for OtelSdkConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            resource: ResourceConfig::default(),
            traces: SignalConfig::default(),
            metrics: SignalConfig {
                enabled: true,
                batch: BatchConfig {
                    scheduled_delay: Duration::from_secs(60),
                    ..BatchConfig::default()
                },
            },
            propagators: vec!["tracecontext".to_string(), "baggage".to_string()],
            init_tracing_subscriber: true,
        }
    }
}

impl OtelSdkConfig {
    /// Returns the configured endpoint, or the protocol's default.
    pub fn effective_endpoint(&self) -> String {
        match &self.endpoint.url {
            Some(url) => url.clone(),
            None => match self.endpoint.protocol {
                Protocol::Grpc => DEFAULT_GRPC_ENDPOINT.to_string(),
                Protocol::HttpBinary | Protocol::HttpJson => DEFAULT_HTTP_ENDPOINT.to_string(),
            },
        }
    }

    /// Returns the per-signal HTTP endpoint, e.g. `http://host:4318/v1/traces`.
    pub fn signal_endpoint(&self, path: &str) -> String {
        format!("{}{}", self.effective_endpoint().trim_end_matches('/'), path)
    }
}

/// Exporter endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base OTLP endpoint URL. Defaults depend on the protocol.
    pub url: Option<String>,
    /// Transport protocol.
    pub protocol: Protocol,
    /// Export timeout in milliseconds.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Headers (HTTP) or metadata (gRPC) sent with each export.
    pub headers: HashMap<String, String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: None,
            protocol: Protocol::default(),
            timeout: Duration::from_secs(10),
            headers: HashMap::new(),
        }
    }
}

/// Resource configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// `service.name`.
    pub service_name: Option<String>,
    /// `service.version`.
    pub service_version: Option<String>,
    /// `deployment.environment.name`.
    pub deployment_environment: Option<String>,
    /// Additional resource attributes.
    pub attributes: HashMap<String, String>,
}

/// Per-signal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Whether the signal is exported at all.
    pub enabled: bool,
    /// Batching behaviour.
    pub batch: BatchConfig,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch: BatchConfig::default(),
        }
    }
}

/// Batch export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum queued items before new ones are dropped.
    pub max_queue_size: usize,
    /// Maximum items per export request.
    pub max_export_batch_size: usize,
    /// Delay between scheduled exports (metrics: the reader interval), in milliseconds.
    #[serde(with = "duration_ms")]
    pub scheduled_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 2048,
            max_export_batch_size: 512,
            scheduled_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct PartialEndpointConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    protocol: Option<Protocol>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    headers: HashMap<String, String>,
}

#[derive(Debug, Default, Serialize)]
struct PartialResourceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    service_name: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    attributes: HashMap<String, String>,
}

#[derive(Debug, Default, Serialize)]
struct PartialSignalConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    enabled: Option<bool>,
}

/// Partial config for standard OTEL env var overrides.
///
/// Only the values actually present in the environment are serialised, so
/// merging it never clobbers file or default values with empties.
#[derive(Debug, Default, Serialize)]
pub(crate) struct PartialConfig {
    endpoint: PartialEndpointConfig,
    resource: PartialResourceConfig,
    traces: PartialSignalConfig,
    metrics: PartialSignalConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    propagators: Option<Vec<String>>,
}

pub(crate) fn standard_otel_env() -> Serialized<PartialConfig> {
    let mut config = PartialConfig::default();

    if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        && !endpoint.trim().is_empty()
    {
        config.endpoint.url = Some(endpoint.trim().to_string());
    }

    if let Ok(protocol) = std::env::var("OTEL_EXPORTER_OTLP_PROTOCOL") {
        config.endpoint.protocol = Protocol::from_env_value(&protocol);
    }

    if let Ok(timeout) = std::env::var("OTEL_EXPORTER_OTLP_TIMEOUT") {
        config.endpoint.timeout = timeout.trim().parse().ok();
    }

    if let Ok(headers) = std::env::var("OTEL_EXPORTER_OTLP_HEADERS") {
        config.endpoint.headers = parse_key_value_list(&headers);
    }

    if let Ok(name) = std::env::var("OTEL_SERVICE_NAME")
        && !name.trim().is_empty()
    {
        config.resource.service_name = Some(name.trim().to_string());
    }

    if let Ok(attributes) = std::env::var("OTEL_RESOURCE_ATTRIBUTES") {
        config.resource.attributes = parse_key_value_list(&attributes);
    }

    if let Ok(exporter) = std::env::var("OTEL_TRACES_EXPORTER") {
        config.traces.enabled = Some(!is_none_exporter(&exporter));
    }

    if let Ok(exporter) = std::env::var("OTEL_METRICS_EXPORTER") {
        config.metrics.enabled = Some(!is_none_exporter(&exporter));
    }

    if let Ok(propagators) = std::env::var("OTEL_PROPAGATORS") {
        let names: Vec<String> = propagators
            .split(',')
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        if !names.is_empty() {
            config.propagators = Some(names);
        }
    }

    if std::env::var("OTEL_SDK_DISABLED")
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        config.traces.enabled = Some(false);
        config.metrics.enabled = Some(false);
    }

    Serialized::defaults(config)
}

fn is_none_exporter(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("none")
}

fn parse_key_value_list(value: &str) -> HashMap<String, String> {
    value
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OtelSdkConfig::default();

        assert!(config.endpoint.url.is_none());
        assert_eq!(config.endpoint.protocol, Protocol::HttpBinary);
        assert!(config.traces.enabled);
        assert!(config.metrics.enabled);
        assert_eq!(config.propagators, vec!["tracecontext", "baggage"]);
        assert!(config.init_tracing_subscriber);
    }

    #[test]
    fn test_effective_endpoint_defaults_by_protocol() {
        let mut config = OtelSdkConfig::default();
        assert_eq!(config.effective_endpoint(), "http://localhost:4318");

        config.endpoint.protocol = Protocol::Grpc;
        assert_eq!(config.effective_endpoint(), "http://localhost:4317");

        config.endpoint.url = Some("http://collector:4317".to_string());
        assert_eq!(config.effective_endpoint(), "http://collector:4317");
    }

    #[test]
    fn test_signal_endpoint_trims_trailing_slash() {
        let mut config = OtelSdkConfig::default();
        config.endpoint.url = Some("http://collector:4318/".to_string());

        assert_eq!(
            config.signal_endpoint("/v1/traces"),
            "http://collector:4318/v1/traces"
        );
    }

    #[test]
    fn test_protocol_from_env_value() {
        assert_eq!(Protocol::from_env_value("grpc"), Some(Protocol::Grpc));
        assert_eq!(Protocol::from_env_value("GRPC"), Some(Protocol::Grpc));
        assert_eq!(
            Protocol::from_env_value("http/protobuf"),
            Some(Protocol::HttpBinary)
        );
        assert_eq!(
            Protocol::from_env_value("http/json"),
            Some(Protocol::HttpJson)
        );
        assert_eq!(Protocol::from_env_value("carrier-pigeon"), None);
    }

    #[test]
    fn test_protocol_serialization() {
        assert_eq!(serde_json::to_string(&Protocol::Grpc).unwrap(), "\"grpc\"");
        assert_eq!(
            serde_json::to_string(&Protocol::HttpBinary).unwrap(),
            "\"http/protobuf\""
        );
        assert_eq!(
            serde_json::to_string(&Protocol::HttpJson).unwrap(),
            "\"http/json\""
        );
    }

    #[test]
    fn test_parse_key_value_list() {
        let parsed = parse_key_value_list("api-key=secret, team = core,broken,=empty");

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["api-key"], "secret");
        assert_eq!(parsed["team"], "core");
    }
}
