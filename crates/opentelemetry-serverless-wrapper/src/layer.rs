//! Tower Layer implementation for observed handlers.

use crate::context::ExecutionContext;
use crate::service::ObservableService;
use std::sync::Arc;
use tower::Layer;

/// Tower layer that observes async handler services.
///
/// By default the layer resolves the published execution context on every
/// call, so it can be built before [`initialize`](crate::initialize) runs.
///
/// # Example
///
/// ```
/// use opentelemetry_serverless_wrapper::{FunctionEvent, FunctionResponse, ObservableLayer};
/// use tower::ServiceBuilder;
///
/// let service = ServiceBuilder::new()
///     .layer(ObservableLayer::new())
///     .service_fn(|event: FunctionEvent| async move {
///         Ok::<_, std::convert::Infallible>(FunctionResponse::new(200).with_body(event.method))
///     });
/// # drop(service);
/// ```
#[derive(Clone, Default)]
pub struct ObservableLayer {
    context: Option<Arc<ExecutionContext>>,
    flush_on_end: bool,
}

impl ObservableLayer {
    /// Creates a layer that uses the published context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for more detailed configuration.
    pub fn builder() -> ObservableLayerBuilder {
        ObservableLayerBuilder::new()
    }
}

impl<S> Layer<S> for ObservableLayer {
    type Service = ObservableService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ObservableService::new(inner, self.context.clone(), self.flush_on_end)
    }
}

/// Builder for configuring an [`ObservableLayer`].
///
/// # Example
///
/// ```
/// use opentelemetry_serverless_wrapper::{ExecutionContext, ObservableLayer};
/// use std::sync::Arc;
///
/// let layer = ObservableLayer::builder()
///     .context(Arc::new(ExecutionContext::disabled()))
///     .flush_on_end(true)
///     .build();
/// # drop(layer);
/// ```
#[must_use = "builders do nothing unless .build() is called"]
#[derive(Default)]
pub struct ObservableLayerBuilder {
    context: Option<Arc<ExecutionContext>>,
    flush_on_end: bool,
}

impl ObservableLayerBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `context` instead of the published one.
    pub fn context(mut self, context: Arc<ExecutionContext>) -> Self {
        self.context = Some(context);
        self
    }

    /// Flushes the context's providers after each invocation.
    ///
    /// The flush blocks the polling thread. Defaults to `false`.
    pub fn flush_on_end(mut self, flush: bool) -> Self {
        self.flush_on_end = flush;
        self
    }

    /// Builds the layer.
    pub fn build(self) -> ObservableLayer {
        ObservableLayer {
            context: self.context,
            flush_on_end: self.flush_on_end,
        }
    }
}
