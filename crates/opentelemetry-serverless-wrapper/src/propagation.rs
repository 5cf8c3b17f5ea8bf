//! Parent context extraction from request headers.

use crate::event::FunctionEvent;
use http::HeaderMap;
use opentelemetry::Context;
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::TraceContextExt;

/// Adapts an [`http::HeaderMap`] to the propagator [`Extractor`] interface.
pub(crate) struct HeaderMapExtractor<'a>(pub(crate) &'a HeaderMap);

impl Extractor for HeaderMapExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// Returns the parent context for an invocation span.
///
/// Uses the globally installed text map propagator on the event's headers.
/// Falls back to the current context when the headers carry no valid span
/// context.
pub(crate) fn extract_parent(event: Option<&FunctionEvent>) -> Context {
    if let Some(headers) = event.and_then(|e| e.headers.as_ref()) {
        let extractor = HeaderMapExtractor(headers);
        let ctx = opentelemetry::global::get_text_map_propagator(|propagator| {
            propagator.extract(&extractor)
        });

        if ctx.span().span_context().is_valid() {
            return ctx;
        }
    }

    Context::current()
}
