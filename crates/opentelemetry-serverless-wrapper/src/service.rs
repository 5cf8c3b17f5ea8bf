//! Tower Service implementation for observed handlers.

use crate::context::ExecutionContext;
use crate::event::{AsResponseView, FunctionEvent};
use crate::executor::Invocation;
use crate::future::ObservableFuture;
use std::fmt::Display;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// Tower service that wraps a handler service with invocation spans and
/// metrics.
///
/// Each call:
/// 1. Resolves the execution context (the layer's, or the published one)
/// 2. Starts the span and runs the request side of every profile
/// 3. Calls the inner service with the span current
/// 4. Returns an [`ObservableFuture`] that closes the invocation
///
/// Without a tracer and a meter the inner future is returned unobserved.
#[derive(Clone)]
pub struct ObservableService<S> {
    inner: S,
    context: Option<Arc<ExecutionContext>>,
    flush_on_end: bool,
}

impl<S> ObservableService<S> {
    pub(crate) fn new(
        inner: S,
        context: Option<Arc<ExecutionContext>>,
        flush_on_end: bool,
    ) -> Self {
        Self {
            inner,
            context,
            flush_on_end,
        }
    }
}

impl<S> Service<FunctionEvent> for ObservableService<S>
where
    S: Service<FunctionEvent>,
    S::Response: AsResponseView,
    S::Error: Display,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ObservableFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, event: FunctionEvent) -> Self::Future {
        let context = self
            .context
            .clone()
            .or_else(crate::init::current)
            .filter(|context| !context.is_passthrough());

        let Some(context) = context else {
            return ObservableFuture::passthrough(self.inner.call(event));
        };

        let mut invocation = Invocation::begin(&context, Some(&event));
        invocation.start_clock(&context);

        let future = {
            let _guard = invocation.attach();
            self.inner.call(event)
        };

        ObservableFuture::new(future, context, invocation, self.flush_on_end)
    }
}
