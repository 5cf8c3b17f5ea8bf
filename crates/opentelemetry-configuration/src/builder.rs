//! Builder for layered SDK configuration.

use crate::config::{OtelSdkConfig, Protocol, standard_otel_env};
use crate::error::SdkError;
use crate::guard::OtelGuard;
use figment::Figment;
use figment::providers::{Format, Serialized, Toml};
use opentelemetry_sdk::Resource;
use serde::Serialize;
use std::path::Path;

/// Builds an [`OtelGuard`] from layered configuration.
///
/// Sources are merged in the order the builder methods are called; later
/// sources override earlier ones.
///
/// # Example
///
/// ```no_run
/// use opentelemetry_configuration::{OtelSdkBuilder, Protocol, SdkError};
///
/// fn main() -> Result<(), SdkError> {
///     let _guard = OtelSdkBuilder::new()
///         .with_file("/etc/otel/sdk.toml")
///         .with_standard_env()
///         .protocol(Protocol::Grpc)
///         .service_name("my-function")
///         .build()?;
///     Ok(())
/// }
/// ```
#[must_use = "builders do nothing unless .build() is called"]
pub struct OtelSdkBuilder {
    figment: Figment,
    custom_resource: Option<Resource>,
}

impl OtelSdkBuilder {
    /// Creates a builder seeded with the default configuration.
    pub fn new() -> Self {
        Self {
            figment: Figment::from(Serialized::defaults(OtelSdkConfig::default())),
            custom_resource: None,
        }
    }

    /// Merges a TOML file, if it exists.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        if path.as_ref().exists() {
            self.figment = self.figment.merge(Toml::file(path));
        }
        self
    }

    /// Merges the standard `OTEL_*` environment variables.
    pub fn with_standard_env(mut self) -> Self {
        self.figment = self.figment.merge(standard_otel_env());
        self
    }

    /// Overrides the OTLP endpoint.
    pub fn endpoint(self, url: impl Into<String>) -> Self {
        self.set("endpoint.url", url.into())
    }

    /// Overrides the OTLP protocol.
    pub fn protocol(self, protocol: Protocol) -> Self {
        self.set("endpoint.protocol", protocol)
    }

    /// Sets `service.name`.
    pub fn service_name(self, name: impl Into<String>) -> Self {
        self.set("resource.service_name", name.into())
    }

    /// Sets `service.version`.
    pub fn service_version(self, version: impl Into<String>) -> Self {
        self.set("resource.service_version", version.into())
    }

    /// Sets `deployment.environment.name`.
    pub fn deployment_environment(self, environment: impl Into<String>) -> Self {
        self.set("resource.deployment_environment", environment.into())
    }

    /// Enables or disables trace export.
    pub fn traces(self, enabled: bool) -> Self {
        self.set("traces.enabled", enabled)
    }

    /// Enables or disables metric export.
    pub fn metrics(self, enabled: bool) -> Self {
        self.set("metrics.enabled", enabled)
    }

    /// Replaces the propagator list (`tracecontext`, `baggage`, `none`).
    pub fn propagators<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        self.set("propagators", names)
    }

    /// Controls whether a `tracing` subscriber is installed on build.
    pub fn init_tracing_subscriber(self, init: bool) -> Self {
        self.set("init_tracing_subscriber", init)
    }

    /// Uses a pre-built resource instead of the configured attributes.
    pub fn resource(mut self, resource: Resource) -> Self {
        self.custom_resource = Some(resource);
        self
    }

    /// Extracts the merged configuration without building any providers.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed into [`OtelSdkConfig`].
    pub fn extract_config(&self) -> Result<OtelSdkConfig, SdkError> {
        Ok(self.figment.extract()?)
    }

    /// Builds the providers, installs them globally and returns their guard.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration extraction, exporter construction or
    /// subscriber initialisation fails.
    pub fn build(self) -> Result<OtelGuard, SdkError> {
        let config = self.extract_config()?;
        OtelGuard::from_config(config, self.custom_resource)
    }

    fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.figment = self.figment.merge(Serialized::default(key, value));
        self
    }
}

impl Default for OtelSdkBuilder {
    fn default() -> Self {
        Self::new()
    }
}
