//! Provider lifecycle for a function instance.
//!
//! An [`OtelGuard`] owns the tracer and meter providers created at
//! initialisation. Dropping it flushes pending telemetry and shuts the
//! providers down.

use crate::config::{OtelSdkConfig, Protocol};
use crate::error::SdkError;
use opentelemetry::KeyValue;
use opentelemetry::propagation::{TextMapCompositePropagator, TextMapPropagator};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{WithExportConfig, WithHttpConfig, WithTonicConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::{BatchConfigBuilder, BatchSpanProcessor, SdkTracerProvider};
use std::collections::HashMap;
use tonic::metadata::{MetadataKey, MetadataMap, MetadataValue};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const SUBSCRIBER_TRACER_NAME: &str = "opentelemetry-serverless-wrapper";

/// Owns the SDK providers for the lifetime of a function instance.
///
/// # Example
///
/// ```no_run
/// use opentelemetry_configuration::{OtelSdkBuilder, SdkError};
///
/// fn main() -> Result<(), SdkError> {
///     let guard = OtelSdkBuilder::new()
///         .service_name("my-function")
///         .build()?;
///
///     // ... handle invocations ...
///
///     guard.flush();
///     Ok(())
/// }
/// ```
pub struct OtelGuard {
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl std::fmt::Debug for OtelGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtelGuard")
            .field("tracer_provider", &self.tracer_provider.is_some())
            .field("meter_provider", &self.meter_provider.is_some())
            .finish()
    }
}

impl OtelGuard {
    pub(crate) fn from_config(
        config: OtelSdkConfig,
        custom_resource: Option<Resource>,
    ) -> Result<Self, SdkError> {
        let resource = custom_resource.unwrap_or_else(|| build_resource(&config));

        let tracer_provider = if config.traces.enabled {
            Some(build_tracer_provider(&config, resource.clone())?)
        } else {
            None
        };

        let meter_provider = if config.metrics.enabled {
            Some(build_meter_provider(&config, resource)?)
        } else {
            None
        };

        install_propagators(&config.propagators);

        if config.init_tracing_subscriber {
            init_subscriber(tracer_provider.as_ref())?;
        }

        Ok(Self::from_providers(tracer_provider, meter_provider))
    }

    /// Wraps providers built elsewhere and installs them as the global
    /// providers.
    ///
    /// Used by tests and by hosts that assemble their own exporter pipeline.
    pub fn from_providers(
        tracer_provider: Option<SdkTracerProvider>,
        meter_provider: Option<SdkMeterProvider>,
    ) -> Self {
        if let Some(provider) = &tracer_provider {
            opentelemetry::global::set_tracer_provider(provider.clone());
        }
        if let Some(provider) = &meter_provider {
            opentelemetry::global::set_meter_provider(provider.clone());
        }

        Self {
            tracer_provider,
            meter_provider,
        }
    }

    /// Returns the tracer provider if tracing is enabled.
    pub fn tracer_provider(&self) -> Option<&SdkTracerProvider> {
        self.tracer_provider.as_ref()
    }

    /// Returns the meter provider if metrics are enabled.
    pub fn meter_provider(&self) -> Option<&SdkMeterProvider> {
        self.meter_provider.as_ref()
    }

    /// Flushes all configured providers.
    ///
    /// Failures are logged with target `otel_lifecycle` and otherwise ignored.
    pub fn flush(&self) {
        if let Some(provider) = &self.tracer_provider
            && let Err(e) = provider.force_flush()
        {
            tracing::warn!(target: "otel_lifecycle", error = %e, "Failed to flush tracer provider");
        }

        if let Some(provider) = &self.meter_provider
            && let Err(e) = provider.force_flush()
        {
            tracing::warn!(target: "otel_lifecycle", error = %e, "Failed to flush meter provider");
        }
    }

    /// Flushes and shuts down all providers.
    ///
    /// # Errors
    ///
    /// Returns the first flush or shutdown error encountered.
    pub fn shutdown(mut self) -> Result<(), SdkError> {
        if let Some(provider) = self.tracer_provider.take() {
            provider.force_flush().map_err(SdkError::Flush)?;
            provider.shutdown().map_err(SdkError::Shutdown)?;
        }

        if let Some(provider) = self.meter_provider.take() {
            provider.force_flush().map_err(SdkError::Flush)?;
            provider.shutdown().map_err(SdkError::Shutdown)?;
        }

        Ok(())
    }
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take() {
            let _ = provider.force_flush();
            if let Err(e) = provider.shutdown() {
                eprintln!("Error shutting down tracer provider: {e}");
            }
        }

        if let Some(provider) = self.meter_provider.take() {
            let _ = provider.force_flush();
            if let Err(e) = provider.shutdown() {
                eprintln!("Error shutting down meter provider: {e}");
            }
        }
    }
}

fn build_resource(config: &OtelSdkConfig) -> Resource {
    let mut attributes: Vec<KeyValue> = config
        .resource
        .attributes
        .iter()
        .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
        .collect();

    if let Some(name) = &config.resource.service_name {
        attributes.push(KeyValue::new("service.name", name.clone()));
    }

    if let Some(version) = &config.resource.service_version {
        attributes.push(KeyValue::new("service.version", version.clone()));
    }

    if let Some(env) = &config.resource.deployment_environment {
        attributes.push(KeyValue::new("deployment.environment.name", env.clone()));
    }

    Resource::builder().with_attributes(attributes).build()
}

fn grpc_metadata(headers: &HashMap<String, String>) -> MetadataMap {
    let mut metadata = MetadataMap::new();
    for (key, value) in headers {
        if let (Ok(k), Ok(v)) = (
            key.parse::<MetadataKey<_>>(),
            value.parse::<MetadataValue<_>>(),
        ) {
            metadata.insert(k, v);
        }
    }
    metadata
}

fn http_protocol(protocol: Protocol) -> opentelemetry_otlp::Protocol {
    match protocol {
        Protocol::HttpJson => opentelemetry_otlp::Protocol::HttpJson,
        _ => opentelemetry_otlp::Protocol::HttpBinary,
    }
}

fn build_tracer_provider(
    config: &OtelSdkConfig,
    resource: Resource,
) -> Result<SdkTracerProvider, SdkError> {
    let exporter = match config.endpoint.protocol {
        Protocol::Grpc => opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(config.effective_endpoint())
            .with_timeout(config.endpoint.timeout)
            .with_metadata(grpc_metadata(&config.endpoint.headers))
            .build(),
        protocol => opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(config.signal_endpoint("/v1/traces"))
            .with_timeout(config.endpoint.timeout)
            .with_protocol(http_protocol(protocol))
            .with_headers(config.endpoint.headers.clone())
            .build(),
    }
    .map_err(SdkError::TraceExporter)?;

    let batch_config = BatchConfigBuilder::default()
        .with_max_queue_size(config.traces.batch.max_queue_size)
        .with_max_export_batch_size(config.traces.batch.max_export_batch_size)
        .with_scheduled_delay(config.traces.batch.scheduled_delay)
        .build();

    let span_processor = BatchSpanProcessor::builder(exporter)
        .with_batch_config(batch_config)
        .build();

    Ok(SdkTracerProvider::builder()
        .with_span_processor(span_processor)
        .with_resource(resource)
        .build())
}

fn build_meter_provider(
    config: &OtelSdkConfig,
    resource: Resource,
) -> Result<SdkMeterProvider, SdkError> {
    let exporter = match config.endpoint.protocol {
        Protocol::Grpc => opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(config.effective_endpoint())
            .with_timeout(config.endpoint.timeout)
            .with_metadata(grpc_metadata(&config.endpoint.headers))
            .build(),
        protocol => opentelemetry_otlp::MetricExporter::builder()
            .with_http()
            .with_endpoint(config.signal_endpoint("/v1/metrics"))
            .with_timeout(config.endpoint.timeout)
            .with_protocol(http_protocol(protocol))
            .with_headers(config.endpoint.headers.clone())
            .build(),
    }
    .map_err(SdkError::MetricExporter)?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(config.metrics.batch.scheduled_delay)
        .build();

    Ok(SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build())
}

/// Installs the named propagators as the global text map propagator.
///
/// Recognised names are `tracecontext` and `baggage`. `none` (or an empty
/// list) leaves the global propagator untouched.
pub(crate) fn install_propagators(names: &[String]) {
    let mut propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>> = Vec::new();

    for name in names {
        match name.as_str() {
            "tracecontext" => propagators.push(Box::new(TraceContextPropagator::new())),
            "baggage" => propagators.push(Box::new(BaggagePropagator::new())),
            "none" => return,
            other => {
                tracing::debug!(target: "otel_lifecycle", propagator = other, "Ignoring unsupported propagator");
            }
        }
    }

    if propagators.is_empty() {
        return;
    }

    opentelemetry::global::set_text_map_propagator(TextMapCompositePropagator::new(propagators));
}

fn init_subscriber(tracer_provider: Option<&SdkTracerProvider>) -> Result<(), SdkError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .without_time();

    let registry = tracing_subscriber::registry().with(filter).with(fmt_layer);

    match tracer_provider {
        Some(tp) => {
            let tracer = tp.tracer(SUBSCRIBER_TRACER_NAME);
            let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
            registry.with(telemetry_layer).try_init()?;
        }
        None => registry.try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::propagation::Extractor;
    use opentelemetry::trace::TraceContextExt;
    use opentelemetry_sdk::trace::InMemorySpanExporter;
    use serial_test::serial;

    struct MapExtractor(HashMap<&'static str, &'static str>);

    impl Extractor for MapExtractor {
        fn get(&self, key: &str) -> Option<&str> {
            self.0.get(key).copied()
        }

        fn keys(&self) -> Vec<&str> {
            self.0.keys().copied().collect()
        }
    }

    #[test]
    fn test_build_resource_includes_service_fields() {
        let mut config = OtelSdkConfig::default();
        config.resource.service_name = Some("checkout".to_string());
        config.resource.service_version = Some("2.0.0".to_string());
        config
            .resource
            .attributes
            .insert("team".to_string(), "payments".to_string());

        let resource = build_resource(&config);

        assert_eq!(
            resource
                .get(&opentelemetry::Key::from_static_str("service.name"))
                .map(|v| v.to_string()),
            Some("checkout".to_string())
        );
        assert_eq!(
            resource
                .get(&opentelemetry::Key::from_static_str("service.version"))
                .map(|v| v.to_string()),
            Some("2.0.0".to_string())
        );
        assert_eq!(
            resource
                .get(&opentelemetry::Key::from_static_str("team"))
                .map(|v| v.to_string()),
            Some("payments".to_string())
        );
    }

    #[test]
    fn test_grpc_metadata_skips_invalid_keys() {
        let mut headers = HashMap::new();
        headers.insert("x-api-key".to_string(), "secret".to_string());
        headers.insert("bad key".to_string(), "value".to_string());

        let metadata = grpc_metadata(&headers);

        assert_eq!(metadata.len(), 1);
        assert!(metadata.get("x-api-key").is_some());
    }

    #[test]
    #[serial]
    fn test_from_providers_exposes_providers() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();

        let guard = OtelGuard::from_providers(Some(provider), None);

        assert!(guard.tracer_provider().is_some());
        assert!(guard.meter_provider().is_none());
        guard.shutdown().unwrap();
    }

    #[test]
    #[serial]
    fn test_install_propagators_tracecontext() {
        install_propagators(&["tracecontext".to_string(), "bogus".to_string()]);

        let carrier = MapExtractor(HashMap::from([(
            "traceparent",
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
        )]));
        let context = opentelemetry::global::get_text_map_propagator(|p| p.extract(&carrier));

        assert_eq!(
            context.span().span_context().trace_id().to_string(),
            "0af7651916cd43dd8448eb211c80319c"
        );
    }
}
