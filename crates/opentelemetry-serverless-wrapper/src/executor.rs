//! Per-invocation span and metric orchestration.
//!
//! For each invocation the wrapper:
//! 1. Starts a `handler` span (server kind) under the context propagated in
//!    the event headers, when a tracer is present
//! 2. Runs every profile's `process_request`
//! 3. Times the handler and runs every profile's `process_response`, when a
//!    meter is present. Failures are reported as a synthetic 500 response
//! 4. Marks the span as failed on error or panic
//! 5. Commits the collected attributes to the span and ends it
//!
//! The handler's result, error or panic reaches the caller unchanged.

use crate::attributes::AttributeSet;
use crate::context::ExecutionContext;
use crate::event::{AsResponseView, FunctionEvent, FunctionResponse, ResponseView};
use crate::propagation::extract_parent;
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, ContextGuard, KeyValue};
use opentelemetry_semantic_conventions::attribute::{EXCEPTION_MESSAGE, EXCEPTION_TYPE};
use std::any::Any;
use std::fmt::Display;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::time::Instant;

/// Name of the span wrapping each invocation.
pub const SPAN_NAME: &str = "handler";

/// Status code reported to profiles when the handler fails.
pub const FAILURE_STATUS_CODE: u16 = 500;

const PANIC_DESCRIPTION: &str = "handler panicked";

/// How an invocation ended without producing a result.
pub(crate) struct Failure {
    pub(crate) message: String,
    pub(crate) kind: &'static str,
}

impl Failure {
    pub(crate) fn from_error<E: Display>(error: &E) -> Self {
        Self {
            message: error.to_string(),
            kind: std::any::type_name::<E>(),
        }
    }

    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| PANIC_DESCRIPTION.to_string());

        Self {
            message,
            kind: "panic",
        }
    }
}

/// State carried from the start of an invocation to its end.
pub(crate) struct Invocation {
    span_cx: Option<Context>,
    attributes: AttributeSet,
    start: Option<Instant>,
}

impl Invocation {
    /// Starts the span and runs the request side of every profile.
    pub(crate) fn begin(context: &ExecutionContext, event: Option<&FunctionEvent>) -> Self {
        let span_cx = context.tracer().map(|tracer| {
            let parent = extract_parent(event);
            let span = tracer
                .span_builder(SPAN_NAME)
                .with_kind(SpanKind::Server)
                .start_with_context(tracer, &parent);
            parent.with_span(span)
        });

        let mut attributes = AttributeSet::new();
        if let Some(event) = event {
            for processor in context.processors() {
                processor.process_request(event, context, &mut attributes);
            }
        }

        Self {
            span_cx,
            attributes,
            start: None,
        }
    }

    /// Makes the invocation span current until the guard is dropped.
    pub(crate) fn attach(&self) -> Option<ContextGuard> {
        self.span_cx.as_ref().map(|cx| cx.clone().attach())
    }

    pub(crate) fn attributes_mut(&mut self) -> &mut AttributeSet {
        &mut self.attributes
    }

    /// Starts the handler clock when metrics are enabled.
    pub(crate) fn start_clock(&mut self, context: &ExecutionContext) {
        if context.meter().is_some() {
            self.start = Some(Instant::now());
        }
    }

    /// Runs the response side of every profile, once.
    pub(crate) fn record_response(
        &mut self,
        context: &ExecutionContext,
        response: &ResponseView<'_>,
    ) {
        if let Some(start) = self.start.take() {
            let end = Instant::now();
            process_response(context, response, start, end, &mut self.attributes);
        }
    }

    /// Commits the attributes and ends the span, marking it failed if
    /// `failure` is set.
    pub(crate) fn finish(self, status_description: &str, failure: Option<Failure>) {
        let Some(cx) = self.span_cx else {
            return;
        };
        let span = cx.span();

        if let Some(failure) = failure {
            span.set_status(Status::error(status_description.to_string()));
            span.add_event(
                "exception",
                vec![
                    KeyValue::new(EXCEPTION_MESSAGE, failure.message),
                    KeyValue::new(EXCEPTION_TYPE, failure.kind),
                ],
            );
        }

        span.set_attributes(self.attributes.into_key_values());
        span.end();
    }
}

pub(crate) fn failure_response() -> FunctionResponse {
    FunctionResponse::new(FAILURE_STATUS_CODE)
}

fn process_response(
    context: &ExecutionContext,
    response: &ResponseView<'_>,
    start: Instant,
    end: Instant,
    attributes: &mut AttributeSet,
) {
    for processor in context.processors() {
        processor.process_response(response, start, end, context, attributes);
    }
}

/// Calls `handler`, catching a panic so the response side still runs.
fn measure<R, E, F>(
    context: &ExecutionContext,
    attributes: &mut AttributeSet,
    handler: F,
) -> std::thread::Result<Result<R, E>>
where
    F: FnOnce() -> Result<R, E>,
    R: AsResponseView,
{
    if context.meter().is_none() {
        return catch_unwind(AssertUnwindSafe(handler));
    }

    let start = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(handler));
    let end = Instant::now();

    match &outcome {
        Ok(Ok(response)) => {
            process_response(context, &response.as_response_view(), start, end, attributes);
        }
        Ok(Err(_)) | Err(_) => {
            let response = failure_response();
            process_response(context, &response.as_response_view(), start, end, attributes);
        }
    }

    outcome
}

impl ExecutionContext {
    /// Runs `handler` for `event` inside an invocation span.
    ///
    /// Returns exactly what the handler returns. A panic inside the handler
    /// is resumed after the span and metrics are closed.
    ///
    /// Request-side profile processing runs whenever a tracer or a meter is
    /// present. Without a tracer, metrics therefore still carry the request
    /// tags (method, scheme, route, server address and port).
    ///
    /// # Example
    ///
    /// ```
    /// use opentelemetry_serverless_wrapper::{ExecutionContext, FunctionEvent, FunctionResponse};
    ///
    /// let context = ExecutionContext::disabled();
    /// let event = FunctionEvent::new("GET").with_path("/health");
    ///
    /// let response = context.execute(&event, |event| {
    ///     Ok::<_, String>(FunctionResponse::new(200).with_body(event.method.clone()))
    /// });
    ///
    /// assert_eq!(response.unwrap().status_code, 200);
    /// ```
    pub fn execute<R, E, F>(&self, event: &FunctionEvent, handler: F) -> Result<R, E>
    where
        F: FnOnce(&FunctionEvent) -> Result<R, E>,
        R: AsResponseView,
        E: Display,
    {
        self.run(Some(event), || handler(event))
    }

    /// Runs a handler that receives no event.
    ///
    /// No request attributes are derived and the active-requests counter is
    /// left untouched.
    pub fn execute_without_event<R, E, F>(&self, handler: F) -> Result<R, E>
    where
        F: FnOnce() -> Result<R, E>,
        R: AsResponseView,
        E: Display,
    {
        self.run(None, handler)
    }

    /// Times `handler` and runs the response side of every profile into
    /// `attributes`.
    ///
    /// Without a meter the handler is called directly. A failed handler is
    /// reported to the profiles as a 500 response and its error returned
    /// unchanged.
    pub fn execute_measured<R, E, F>(
        &self,
        attributes: &mut AttributeSet,
        handler: F,
    ) -> Result<R, E>
    where
        F: FnOnce() -> Result<R, E>,
        R: AsResponseView,
    {
        if self.meter().is_none() {
            return handler();
        }

        match measure(self, attributes, handler) {
            Ok(result) => result,
            Err(payload) => resume_unwind(payload),
        }
    }

    fn run<R, E, F>(&self, event: Option<&FunctionEvent>, handler: F) -> Result<R, E>
    where
        F: FnOnce() -> Result<R, E>,
        R: AsResponseView,
        E: Display,
    {
        if self.is_passthrough() {
            return handler();
        }

        let mut invocation = Invocation::begin(self, event);

        let outcome = {
            let _guard = invocation.attach();
            measure(self, invocation.attributes_mut(), handler)
        };

        match outcome {
            Ok(Ok(response)) => {
                invocation.finish("", None);
                Ok(response)
            }
            Ok(Err(error)) => {
                let failure = Failure::from_error(&error);
                let description = failure.message.clone();
                invocation.finish(&description, Some(failure));
                Err(error)
            }
            Err(payload) => {
                let failure = Failure::from_panic(payload.as_ref());
                invocation.finish(PANIC_DESCRIPTION, Some(failure));
                resume_unwind(payload)
            }
        }
    }
}

/// Runs `handler` through the published execution context.
///
/// Calls the handler directly when [`initialize`](crate::initialize) has not
/// run.
pub fn execute<R, E, F>(event: &FunctionEvent, handler: F) -> Result<R, E>
where
    F: FnOnce(&FunctionEvent) -> Result<R, E>,
    R: AsResponseView,
    E: Display,
{
    match crate::init::current() {
        Some(context) => context.execute(event, handler),
        None => handler(event),
    }
}
