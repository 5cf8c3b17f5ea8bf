//! Cold-start initialisation and context publication.
//!
//! [`initialize`] configures the SDK, builds a complete
//! [`ExecutionContext`] and publishes it process-wide. Re-initialisation
//! builds a new context and swaps it in; the previous one, and the providers
//! it owns, are released once the last in-flight invocation drops it.

use crate::config::WrapperConfig;
use crate::context::{DEFAULT_INSTRUMENTATION_NAME, ExecutionContext};
use crate::error::Result;
use crate::profiles::ProfileRegistry;
use arc_swap::ArcSwapOption;
use opentelemetry::InstrumentationScope;
use opentelemetry::global::BoxedTracer;
use opentelemetry::metrics::MeterProvider as _;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_configuration::{OtelGuard, OtelSdkBuilder};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

static CONTEXT: ArcSwapOption<ExecutionContext> = ArcSwapOption::const_empty();

static SUBSCRIBER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Identity of the function instance being initialised.
#[derive(Debug, Clone, Default)]
pub struct FunctionInfo {
    /// Human-readable run or service identifier.
    pub run_id: Option<String>,
}

impl FunctionInfo {
    /// Creates info for the given run identifier.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: Some(run_id.into()),
        }
    }

    /// Name the tracer and meter are obtained under.
    pub fn instrumentation_name(&self) -> &str {
        self.run_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_INSTRUMENTATION_NAME)
    }
}

/// Configures the SDK from the environment and publishes a new context.
///
/// Reads [`WrapperConfig`] from its default sources and the standard
/// `OTEL_*` variables. The `tracing` subscriber is installed by the first
/// call that succeeds.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded or the exporters
/// cannot be built. The previously published context stays in place.
pub fn initialize(info: &FunctionInfo) -> Result<Arc<ExecutionContext>> {
    let config = WrapperConfig::load()?;
    let install_subscriber = !SUBSCRIBER_INSTALLED.load(Ordering::SeqCst);

    let sdk = OtelSdkBuilder::new()
        .service_name(info.instrumentation_name())
        .with_standard_env()
        .init_tracing_subscriber(install_subscriber);

    let context = initialize_with(info, config, sdk, ProfileRegistry::default())?;

    // Only a successful build has installed the subscriber.
    if install_subscriber {
        SUBSCRIBER_INSTALLED.store(true, Ordering::SeqCst);
    }

    Ok(context)
}

/// Like [`initialize`], with explicit configuration, SDK builder and
/// profile registry.
///
/// # Errors
///
/// Returns an error if the SDK cannot be built.
pub fn initialize_with(
    info: &FunctionInfo,
    config: WrapperConfig,
    sdk: OtelSdkBuilder,
    registry: ProfileRegistry,
) -> Result<Arc<ExecutionContext>> {
    let guard = sdk.build()?;
    let context = context_from_guard(info, config, guard, registry);
    Ok(publish(context))
}

/// Builds a context whose tracer and meter come from `guard`'s providers.
///
/// The guard is moved into the context and shuts the providers down when
/// the context is dropped.
pub fn context_from_guard(
    info: &FunctionInfo,
    config: WrapperConfig,
    guard: OtelGuard,
    registry: ProfileRegistry,
) -> ExecutionContext {
    let name = info.instrumentation_name().to_string();
    let scope = InstrumentationScope::builder(name.clone()).build();

    let mut builder = ExecutionContext::builder(config)
        .with_name(name)
        .with_registry(registry);

    if let Some(provider) = guard.tracer_provider() {
        let tracer = provider.tracer_with_scope(scope.clone());
        builder = builder.with_tracer(BoxedTracer::new(Box::new(tracer)));
    }

    if let Some(provider) = guard.meter_provider() {
        builder = builder.with_meter(provider.meter_with_scope(scope));
    }

    builder.with_guard(guard).build()
}

/// Publishes a fully built context, replacing any previous one.
pub fn publish(context: ExecutionContext) -> Arc<ExecutionContext> {
    let context = Arc::new(context);

    let profiles: Vec<&str> = context.processors().iter().map(|p| p.name()).collect();
    tracing::info!(
        target: "otel_lifecycle",
        name = context.name(),
        profiles = ?profiles,
        tracer = context.tracer().is_some(),
        meter = context.meter().is_some(),
        content_tracing = context.content_tracing_enabled(),
        "OpenTelemetry initialized."
    );

    CONTEXT.store(Some(Arc::clone(&context)));
    context
}

/// Returns the published context.
pub fn current() -> Option<Arc<ExecutionContext>> {
    CONTEXT.load_full()
}

/// Clears the published context.
pub fn reset() {
    CONTEXT.store(None);
}
