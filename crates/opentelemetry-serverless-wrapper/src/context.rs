//! Process-wide execution context.
//!
//! An [`ExecutionContext`] is assembled by an [`ExecutionContextBuilder`]:
//! every enabled profile is initialised against the builder, and only then
//! is the immutable context produced. Invocations only ever see the finished
//! type.

use crate::config::WrapperConfig;
use crate::profiles::{ProfileProcessor, ProfileRegistry};
use opentelemetry::global::BoxedTracer;
use opentelemetry::metrics::{Histogram, Meter, UpDownCounter};
use opentelemetry_configuration::OtelGuard;
use std::fmt;

/// Default name for the tracer and meter when no run identifier is known.
pub const DEFAULT_INSTRUMENTATION_NAME: &str = "serverless-function";

/// Metric instruments registered by profile processors.
#[derive(Debug, Clone, Default)]
pub struct Instruments {
    /// `http.server.request.duration`, seconds.
    pub request_duration: Option<Histogram<f64>>,
    /// `http.server.active_requests`.
    pub active_requests: Option<UpDownCounter<i64>>,
    /// `http.server.request.body.size`, bytes.
    pub request_body_size: Option<Histogram<u64>>,
    /// `http.server.response.body.size`, bytes.
    pub response_body_size: Option<Histogram<u64>>,
}

/// Builder handed to [`ProfileProcessor::initialize`].
#[must_use = "builders do nothing unless .build() is called"]
pub struct ExecutionContextBuilder {
    name: String,
    tracer: Option<BoxedTracer>,
    meter: Option<Meter>,
    config: WrapperConfig,
    registry: ProfileRegistry,
    content_tracing_enabled: bool,
    instruments: Instruments,
    guard: Option<OtelGuard>,
}

impl ExecutionContextBuilder {
    /// Creates a builder with no tracer, no meter and the default registry.
    pub fn new(config: WrapperConfig) -> Self {
        Self {
            name: DEFAULT_INSTRUMENTATION_NAME.to_string(),
            tracer: None,
            meter: None,
            config,
            registry: ProfileRegistry::default(),
            content_tracing_enabled: false,
            instruments: Instruments::default(),
            guard: None,
        }
    }

    /// Sets the instrumentation name the tracer and meter were obtained under.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the tracer used for invocation spans.
    pub fn with_tracer(mut self, tracer: BoxedTracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Sets the meter profiles create their instruments from.
    pub fn with_meter(mut self, meter: Meter) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Replaces the profile registry.
    pub fn with_registry(mut self, registry: ProfileRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Attaches the provider guard so that it lives as long as the context.
    pub fn with_guard(mut self, guard: OtelGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Wrapper configuration.
    pub fn config(&self) -> &WrapperConfig {
        &self.config
    }

    /// The meter, if metrics are enabled.
    pub fn meter(&self) -> Option<&Meter> {
        self.meter.as_ref()
    }

    /// Sets whether body values are captured.
    pub fn set_content_tracing_enabled(&mut self, enabled: bool) {
        self.content_tracing_enabled = enabled;
    }

    /// Instruments shared with the finished context.
    pub fn instruments_mut(&mut self) -> &mut Instruments {
        &mut self.instruments
    }

    /// Initialises every enabled profile and produces the context.
    ///
    /// Signals disabled in the configuration are dropped before any profile
    /// runs, so no instrument is created for a disabled meter. Unknown
    /// profile names are skipped, and a repeated name only produces one
    /// processor.
    pub fn build(mut self) -> ExecutionContext {
        if !self.config.tracing_enabled {
            self.tracer = None;
        }
        if !self.config.metrics_enabled {
            self.meter = None;
        }

        let mut processors: Vec<Box<dyn ProfileProcessor>> = Vec::new();
        let mut seen: Vec<&str> = Vec::new();
        for name in &self.config.enabled_profiles {
            if seen.contains(&name.as_str()) {
                tracing::debug!(target: "otel_lifecycle", profile = %name, "Skipping duplicate profile");
                continue;
            }
            seen.push(name);

            match self.registry.create(name) {
                Some(processor) => processors.push(processor),
                None => {
                    tracing::debug!(target: "otel_lifecycle", profile = %name, "Skipping unknown profile");
                }
            }
        }

        for processor in &mut processors {
            processor.initialize(&mut self);
        }

        ExecutionContext {
            name: self.name,
            tracer: self.tracer,
            meter: self.meter,
            processors,
            content_tracing_enabled: self.content_tracing_enabled,
            instruments: self.instruments,
            config: self.config,
            guard: self.guard,
        }
    }
}

/// Process-wide state shared by every invocation.
pub struct ExecutionContext {
    name: String,
    tracer: Option<BoxedTracer>,
    meter: Option<Meter>,
    processors: Vec<Box<dyn ProfileProcessor>>,
    content_tracing_enabled: bool,
    instruments: Instruments,
    config: WrapperConfig,
    guard: Option<OtelGuard>,
}

impl ExecutionContext {
    /// Creates a builder.
    pub fn builder(config: WrapperConfig) -> ExecutionContextBuilder {
        ExecutionContextBuilder::new(config)
    }

    /// A context with no tracer, no meter and no profiles.
    ///
    /// Executing through it calls the handler directly.
    pub fn disabled() -> Self {
        ExecutionContextBuilder::new(WrapperConfig {
            enabled_profiles: Vec::new(),
            ..WrapperConfig::default()
        })
        .with_registry(ProfileRegistry::empty())
        .build()
    }

    /// Instrumentation name of the tracer and meter.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tracer, if tracing is enabled.
    pub fn tracer(&self) -> Option<&BoxedTracer> {
        self.tracer.as_ref()
    }

    /// The meter, if metrics are enabled.
    pub fn meter(&self) -> Option<&Meter> {
        self.meter.as_ref()
    }

    /// Initialised profile processors, in configuration order.
    pub fn processors(&self) -> &[Box<dyn ProfileProcessor>] {
        &self.processors
    }

    /// Whether body values are captured.
    pub fn content_tracing_enabled(&self) -> bool {
        self.content_tracing_enabled
    }

    /// Registered metric instruments.
    pub fn instruments(&self) -> &Instruments {
        &self.instruments
    }

    /// Wrapper configuration the context was built from.
    pub fn config(&self) -> &WrapperConfig {
        &self.config
    }

    /// Provider guard, when the context owns the SDK providers.
    pub fn guard(&self) -> Option<&OtelGuard> {
        self.guard.as_ref()
    }

    /// Flushes the owned providers, if any.
    pub fn flush(&self) {
        if let Some(guard) = &self.guard {
            guard.flush();
        }
    }

    pub(crate) fn is_passthrough(&self) -> bool {
        self.tracer.is_none() && self.meter.is_none()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("name", &self.name)
            .field("tracer", &self.tracer.is_some())
            .field("meter", &self.meter.is_some())
            .field("processors", &self.processors)
            .field("content_tracing_enabled", &self.content_tracing_enabled)
            .field("instruments", &self.instruments)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttributeSet;
    use crate::event::{FunctionEvent, ResponseView};
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use std::time::Instant;

    #[derive(Debug, Default)]
    struct RecordingProfile {
        saw_meter: bool,
    }

    impl ProfileProcessor for RecordingProfile {
        fn name(&self) -> &str {
            "recording"
        }

        fn initialize(&mut self, context: &mut ExecutionContextBuilder) {
            self.saw_meter = context.meter().is_some();
            context.set_content_tracing_enabled(true);
        }

        fn process_request(
            &self,
            _event: &FunctionEvent,
            _context: &ExecutionContext,
            _attributes: &mut AttributeSet,
        ) {
        }

        fn process_response(
            &self,
            _response: &ResponseView<'_>,
            _start: Instant,
            _end: Instant,
            _context: &ExecutionContext,
            _attributes: &mut AttributeSet,
        ) {
        }
    }

    fn registry() -> ProfileRegistry {
        let mut registry = ProfileRegistry::default();
        registry.register("recording", || Box::new(RecordingProfile::default()));
        registry
    }

    #[test]
    fn test_disabled_context_is_passthrough() {
        let context = ExecutionContext::disabled();

        assert!(context.is_passthrough());
        assert!(context.processors().is_empty());
        assert!(!context.content_tracing_enabled());
    }

    #[test]
    fn test_unknown_profiles_are_skipped() {
        let config = WrapperConfig {
            enabled_profiles: vec!["custom".into(), "recording".into(), "http".into()],
            ..WrapperConfig::default()
        };

        let context = ExecutionContext::builder(config)
            .with_registry(registry())
            .build();

        let names: Vec<&str> = context.processors().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["recording", "http"]);
        assert!(context.content_tracing_enabled());
    }

    #[test]
    fn test_repeated_profile_creates_one_processor() {
        let config = WrapperConfig {
            enabled_profiles: vec!["http".into(), "recording".into(), "http".into()],
            ..WrapperConfig::default()
        };

        let context = ExecutionContext::builder(config)
            .with_registry(registry())
            .build();

        let names: Vec<&str> = context.processors().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["http", "recording"]);
    }

    #[test]
    fn test_metrics_disabled_drops_meter_before_profiles_run() {
        let provider = SdkMeterProvider::builder().build();
        let config = WrapperConfig {
            metrics_enabled: false,
            ..WrapperConfig::default()
        };

        let context = ExecutionContext::builder(config)
            .with_meter(provider.meter("test"))
            .build();

        assert!(context.meter().is_none());
        assert!(context.instruments().request_duration.is_none());
        assert!(context.instruments().active_requests.is_none());
    }

    #[test]
    fn test_meter_present_registers_http_instruments() {
        let provider = SdkMeterProvider::builder().build();

        let context = ExecutionContext::builder(WrapperConfig::default())
            .with_meter(provider.meter("test"))
            .build();

        let instruments = context.instruments();
        assert!(instruments.request_duration.is_some());
        assert!(instruments.active_requests.is_some());
        assert!(instruments.request_body_size.is_some());
        assert!(instruments.response_body_size.is_some());
    }
}
