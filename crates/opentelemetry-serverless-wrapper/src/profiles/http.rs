//! HTTP profile.
//!
//! Derives HTTP server semantic-convention attributes from a
//! [`FunctionEvent`] and the handler's response, and maintains the HTTP
//! server metrics:
//!
//! | Metric | Instrument | Unit |
//! |--------|------------|------|
//! | `http.server.request.duration` | histogram | `s` |
//! | `http.server.active_requests` | up/down counter | `{request}` |
//! | `http.server.request.body.size` | histogram | `By` |
//! | `http.server.response.body.size` | histogram | `By` |

use super::ProfileProcessor;
use crate::attributes::{
    AttributeSet, HTTP_REQUEST_BODY_SIZE, HTTP_REQUEST_BODY_VALUE, HTTP_REQUEST_HEADER_PREFIX,
    HTTP_REQUEST_SIZE, HTTP_RESPONSE_BODY_SIZE, HTTP_RESPONSE_BODY_VALUE,
    HTTP_RESPONSE_HEADER_PREFIX, HTTP_RESPONSE_SIZE, filter_attributes, header_attribute,
};
use crate::context::{ExecutionContext, ExecutionContextBuilder};
use crate::event::{FunctionEvent, ResponseView};
use bytes::Bytes;
use http::HeaderMap;
use opentelemetry::Value;
use opentelemetry_semantic_conventions::attribute::{
    CLIENT_ADDRESS, HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, HTTP_ROUTE,
    NETWORK_PEER_ADDRESS, NETWORK_PEER_PORT, NETWORK_PROTOCOL_VERSION, SERVER_ADDRESS,
    SERVER_PORT, URL_FULL, URL_PATH, URL_QUERY, URL_SCHEME, USER_AGENT_ORIGINAL,
};
use std::time::Instant;
use url::{Host, Url};

/// `http.server.request.duration`
pub const HTTP_SERVER_REQUEST_DURATION: &str = "http.server.request.duration";
/// `http.server.active_requests`
pub const HTTP_SERVER_ACTIVE_REQUESTS: &str = "http.server.active_requests";
/// `http.server.request.body.size`
pub const HTTP_SERVER_REQUEST_BODY_SIZE: &str = "http.server.request.body.size";
/// `http.server.response.body.size`
pub const HTTP_SERVER_RESPONSE_BODY_SIZE: &str = "http.server.response.body.size";

const DURATION_BOUNDARIES: [f64; 14] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

const DEFAULT_SCHEME: &str = "http";

/// Tags on the active-requests counter.
const ACTIVE_REQUESTS_ATTRIBUTES: [&str; 4] =
    [HTTP_REQUEST_METHOD, URL_SCHEME, SERVER_ADDRESS, SERVER_PORT];

/// Tags on the duration and body-size histograms.
const DURATION_ATTRIBUTES: [&str; 6] = [
    HTTP_REQUEST_METHOD,
    URL_SCHEME,
    HTTP_ROUTE,
    SERVER_ADDRESS,
    SERVER_PORT,
    HTTP_RESPONSE_STATUS_CODE,
];

/// Profile processor for HTTP-shaped events.
#[derive(Debug, Default, Clone)]
pub struct HttpProfileProcessor;

impl HttpProfileProcessor {
    /// Profile name.
    pub const NAME: &'static str = "http";

    /// Creates the processor.
    pub fn new() -> Self {
        Self
    }
}

impl ProfileProcessor for HttpProfileProcessor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn initialize(&mut self, context: &mut ExecutionContextBuilder) {
        let content_tracing = context.config().content_tracing;
        context.set_content_tracing_enabled(content_tracing);

        let Some(meter) = context.meter().cloned() else {
            return;
        };

        let instruments = context.instruments_mut();

        instruments.request_duration = Some(
            meter
                .f64_histogram(HTTP_SERVER_REQUEST_DURATION)
                .with_description("Duration of HTTP server requests.")
                .with_unit("s")
                .with_boundaries(DURATION_BOUNDARIES.to_vec())
                .build(),
        );

        instruments.active_requests = Some(
            meter
                .i64_up_down_counter(HTTP_SERVER_ACTIVE_REQUESTS)
                .with_description("Number of active HTTP server requests.")
                .with_unit("{request}")
                .build(),
        );

        instruments.request_body_size = Some(
            meter
                .u64_histogram(HTTP_SERVER_REQUEST_BODY_SIZE)
                .with_description("Size of HTTP server request bodies.")
                .with_unit("By")
                .build(),
        );

        instruments.response_body_size = Some(
            meter
                .u64_histogram(HTTP_SERVER_RESPONSE_BODY_SIZE)
                .with_description("Size of HTTP server response bodies.")
                .with_unit("By")
                .build(),
        );
    }

    fn process_request(
        &self,
        event: &FunctionEvent,
        context: &ExecutionContext,
        attributes: &mut AttributeSet,
    ) {
        let route = event.path.clone().unwrap_or_default();

        attributes.set(HTTP_REQUEST_METHOD, event.method.clone());

        match event.url.as_deref() {
            Some(url) => record_url(url, attributes),
            None => record_missing_url(&route, attributes),
        }
        if let Some(url) = &event.url {
            attributes.set(URL_FULL, url.clone());
        }

        attributes.set(HTTP_ROUTE, route);

        if let Some(headers) = &event.headers {
            record_headers(HTTP_REQUEST_HEADER_PREFIX, headers, attributes);
        }

        if let Some(size) = event.size {
            attributes.set(HTTP_REQUEST_SIZE, size_value(size));
        }

        record_body(
            event.body.as_ref(),
            context.content_tracing_enabled(),
            HTTP_REQUEST_BODY_SIZE,
            HTTP_REQUEST_BODY_VALUE,
            attributes,
        );

        if let Some(headers) = &event.headers {
            record_forwarding_headers(headers, attributes);
        }

        if let Some(counter) = &context.instruments().active_requests {
            counter.add(1, &filter_attributes(attributes, &ACTIVE_REQUESTS_ATTRIBUTES));
        }
    }

    fn process_response(
        &self,
        response: &ResponseView<'_>,
        start: Instant,
        end: Instant,
        context: &ExecutionContext,
        attributes: &mut AttributeSet,
    ) {
        match response {
            ResponseView::Structured(response) => {
                attributes.set(HTTP_RESPONSE_STATUS_CODE, i64::from(response.status_code));
                record_headers(HTTP_RESPONSE_HEADER_PREFIX, &response.headers, attributes);
                if let Some(size) = response.size {
                    attributes.set(HTTP_RESPONSE_SIZE, size_value(size));
                }
                record_body(
                    response.body.as_ref(),
                    context.content_tracing_enabled(),
                    HTTP_RESPONSE_BODY_SIZE,
                    HTTP_RESPONSE_BODY_VALUE,
                    attributes,
                );
            }
            ResponseView::Raw(raw) => {
                attributes.set(HTTP_RESPONSE_STATUS_CODE, 200_i64);
                attributes.set(HTTP_RESPONSE_BODY_SIZE, size_value(raw.len()));
                if context.content_tracing_enabled() {
                    attributes.set(
                        HTTP_RESPONSE_BODY_VALUE,
                        String::from_utf8_lossy(raw).into_owned(),
                    );
                }
            }
        }

        let instruments = context.instruments();

        // Only invocations whose request side ran were counted up.
        if attributes.contains(HTTP_REQUEST_METHOD)
            && let Some(counter) = &instruments.active_requests
        {
            counter.add(-1, &filter_attributes(attributes, &ACTIVE_REQUESTS_ATTRIBUTES));
        }

        let duration_attributes = filter_attributes(attributes, &DURATION_ATTRIBUTES);

        if let Some(histogram) = &instruments.request_duration {
            let elapsed = end.saturating_duration_since(start);
            histogram.record(elapsed.as_secs_f64(), &duration_attributes);
        }

        if let Some(histogram) = &instruments.request_body_size
            && let Some(size) = attributes.get(HTTP_REQUEST_BODY_SIZE).and_then(as_u64)
        {
            histogram.record(size, &duration_attributes);
        }

        if let Some(histogram) = &instruments.response_body_size
            && let Some(size) = attributes.get(HTTP_RESPONSE_BODY_SIZE).and_then(as_u64)
        {
            histogram.record(size, &duration_attributes);
        }
    }
}

/// Records the parts of a URL string as written.
///
/// The `url` crate validates the string and supplies scheme, host and
/// explicit port. Path and query are sliced from the raw string so that they
/// are not re-encoded. Parts that cannot be derived are omitted.
fn record_url(raw: &str, attributes: &mut AttributeSet) {
    let parsed = Url::parse(raw).ok();
    let (path, query) = split_path_and_query(raw);

    match (&parsed, raw.contains("://")) {
        (Some(url), false) => attributes.set(URL_PATH, url.path().to_string()),
        _ => attributes.set(URL_PATH, path.to_string()),
    }

    match &parsed {
        Some(url) => {
            attributes.set(URL_SCHEME, url.scheme().to_string());
            if let Some(host) = url.host() {
                attributes.set(SERVER_ADDRESS, host_name(host));
            }
            if let Some(port) = url.port() {
                attributes.set(SERVER_PORT, i64::from(port));
            }
        }
        None => {
            if let Some((scheme, _)) = raw.split_once("://")
                && !scheme.is_empty()
            {
                attributes.set(URL_SCHEME, scheme.to_ascii_lowercase());
            }
        }
    }

    if let Some(query) = query.filter(|q| !q.is_empty()) {
        attributes.set(URL_QUERY, query.to_string());
    }
}

/// Splits `raw` into path and query, dropping any fragment. For strings with
/// an authority the path starts at the first `/` after it, and is empty when
/// there is none.
fn split_path_and_query(raw: &str) -> (&str, Option<&str>) {
    let raw = raw.split_once('#').map_or(raw, |(before, _)| before);
    let (before_query, query) = match raw.split_once('?') {
        Some((before, query)) => (before, Some(query)),
        None => (raw, None),
    };

    let path = match before_query.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("", |start| &rest[start..]),
        None => before_query,
    };

    (path, query)
}

fn host_name(host: Host<&str>) -> String {
    match host {
        Host::Domain(domain) => domain.to_string(),
        Host::Ipv4(addr) => addr.to_string(),
        Host::Ipv6(addr) => addr.to_string(),
    }
}

fn record_missing_url(route: &str, attributes: &mut AttributeSet) {
    attributes.set(URL_PATH, route.to_string());
    attributes.set(URL_SCHEME, DEFAULT_SCHEME);
    attributes.set(URL_FULL, "");
}

/// One attribute per distinct header name; repeated headers keep their first
/// value and values that are not visible ASCII are skipped.
fn record_headers(prefix: &str, headers: &HeaderMap, attributes: &mut AttributeSet) {
    for name in headers.keys() {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            attributes.set(header_attribute(prefix, name.as_str()), value.to_string());
        }
    }
}

/// Empty bodies are treated as absent.
fn record_body(
    body: Option<&Bytes>,
    content_tracing: bool,
    size_key: &'static str,
    value_key: &'static str,
    attributes: &mut AttributeSet,
) {
    let Some(body) = body.filter(|b| !b.is_empty()) else {
        return;
    };

    attributes.set(size_key, size_value(body.len()));
    if content_tracing {
        attributes.set(value_key, String::from_utf8_lossy(body).into_owned());
    }
}

fn record_forwarding_headers(headers: &HeaderMap, attributes: &mut AttributeSet) {
    if let Some(user_agent) = header_str(headers, "user-agent") {
        attributes.set(USER_AGENT_ORIGINAL, user_agent.to_string());
    }

    let client = header_str(headers, "x-forwarded-for")
        .or_else(|| header_str(headers, "x-real-ip"))
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(client) = client {
        attributes.set(CLIENT_ADDRESS, client.to_string());
        attributes.set(NETWORK_PEER_ADDRESS, client.to_string());
    }

    if let Some(proto) = header_str(headers, "x-forwarded-proto") {
        attributes.set(NETWORK_PROTOCOL_VERSION, proto.to_string());
    }

    if let Some(port) =
        header_str(headers, "x-forwarded-port").and_then(|v| v.trim().parse::<i64>().ok())
    {
        attributes.set(NETWORK_PEER_PORT, port);
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn size_value<N: TryInto<i64>>(size: N) -> i64 {
    size.try_into().unwrap_or(i64::MAX)
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::I64(n) => u64::try_from(*n).ok(),
        _ => None,
    }
}
