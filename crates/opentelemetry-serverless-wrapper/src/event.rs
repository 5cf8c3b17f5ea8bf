//! Invocation request and response shapes.
//!
//! [`FunctionEvent`] is the request view the hosting runtime hands to a
//! handler. Handler output is observed through [`AsResponseView`], which
//! distinguishes a structured [`FunctionResponse`] from any other value.

use bytes::Bytes;
use http::header::IntoHeaderName;
use http::{HeaderMap, HeaderValue};
use std::borrow::Cow;

/// Request view for a single invocation.
#[derive(Debug, Clone, Default)]
pub struct FunctionEvent {
    /// HTTP method, e.g. `GET`.
    pub method: String,
    /// Request URL, absolute or a path-and-query request target.
    pub url: Option<String>,
    /// Routed path.
    pub path: Option<String>,
    /// Request headers.
    pub headers: Option<HeaderMap>,
    /// Declared request size in bytes.
    pub size: Option<u64>,
    /// Request body.
    pub body: Option<Bytes>,
}

impl FunctionEvent {
    /// Creates an event with the given method and no other fields.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Self::default()
        }
    }

    /// Sets the request URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the routed path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers
            .get_or_insert_with(HeaderMap::new)
            .append(name, value);
        self
    }

    /// Sets the declared request size.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Structured response returned by a handler.
#[derive(Debug, Clone)]
pub struct FunctionResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Declared response size in bytes.
    pub size: Option<u64>,
    /// Response body.
    pub body: Option<Bytes>,
}

impl FunctionResponse {
    /// Creates a response with the given status and no headers or body.
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: HeaderMap::new(),
            size: None,
            body: None,
        }
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the declared response size.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets the response body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

impl Default for FunctionResponse {
    fn default() -> Self {
        Self::new(200)
    }
}

/// A handler's output as seen by profile processors.
#[derive(Debug, Clone)]
pub enum ResponseView<'a> {
    /// A structured response with status, headers and body.
    Structured(&'a FunctionResponse),
    /// Any other value, observed through its string or byte form.
    Raw(Cow<'a, [u8]>),
}

/// Conversion of handler output into a [`ResponseView`].
///
/// Implement this for custom response types that should be reported with
/// their own status code and headers.
pub trait AsResponseView {
    /// Returns the view of this value.
    fn as_response_view(&self) -> ResponseView<'_>;
}

impl AsResponseView for FunctionResponse {
    fn as_response_view(&self) -> ResponseView<'_> {
        ResponseView::Structured(self)
    }
}

impl AsResponseView for str {
    fn as_response_view(&self) -> ResponseView<'_> {
        ResponseView::Raw(Cow::Borrowed(self.as_bytes()))
    }
}

impl AsResponseView for String {
    fn as_response_view(&self) -> ResponseView<'_> {
        self.as_str().as_response_view()
    }
}

impl AsResponseView for [u8] {
    fn as_response_view(&self) -> ResponseView<'_> {
        ResponseView::Raw(Cow::Borrowed(self))
    }
}

impl AsResponseView for Vec<u8> {
    fn as_response_view(&self) -> ResponseView<'_> {
        self.as_slice().as_response_view()
    }
}

impl AsResponseView for Bytes {
    fn as_response_view(&self) -> ResponseView<'_> {
        ResponseView::Raw(Cow::Borrowed(self.as_ref()))
    }
}

impl AsResponseView for serde_json::Value {
    fn as_response_view(&self) -> ResponseView<'_> {
        match self {
            serde_json::Value::String(s) => s.as_response_view(),
            other => ResponseView::Raw(Cow::Owned(other.to_string().into_bytes())),
        }
    }
}

impl AsResponseView for () {
    fn as_response_view(&self) -> ResponseView<'_> {
        ResponseView::Raw(Cow::Borrowed(&[]))
    }
}

impl<T: AsResponseView + ?Sized> AsResponseView for &T {
    fn as_response_view(&self) -> ResponseView<'_> {
        (**self).as_response_view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_bytes(view: ResponseView<'_>) -> Vec<u8> {
        match view {
            ResponseView::Raw(bytes) => bytes.into_owned(),
            ResponseView::Structured(_) => panic!("expected raw view"),
        }
    }

    #[test]
    fn test_event_builder() {
        let event = FunctionEvent::new("POST")
            .with_url("/orders?id=7")
            .with_path("/orders")
            .with_header("content-type", HeaderValue::from_static("application/json"))
            .with_body("test body");

        assert_eq!(event.method, "POST");
        assert_eq!(event.url.as_deref(), Some("/orders?id=7"));
        assert_eq!(event.path.as_deref(), Some("/orders"));
        assert_eq!(
            event.headers.as_ref().and_then(|h| h.get("content-type")),
            Some(&HeaderValue::from_static("application/json"))
        );
        assert_eq!(event.body.as_deref(), Some(&b"test body"[..]));
    }

    #[test]
    fn test_structured_response_view() {
        let response = FunctionResponse::new(201).with_body("{}");

        match response.as_response_view() {
            ResponseView::Structured(r) => assert_eq!(r.status_code, 201),
            ResponseView::Raw(_) => panic!("expected structured view"),
        }
    }

    #[test]
    fn test_raw_views() {
        assert_eq!(raw_bytes("hello".as_response_view()), b"hello");
        assert_eq!(raw_bytes(String::from("hi").as_response_view()), b"hi");
        assert_eq!(raw_bytes(vec![1_u8, 2, 3].as_response_view()), vec![1, 2, 3]);
        assert_eq!(raw_bytes(Bytes::from_static(b"ok").as_response_view()), b"ok");
        assert!(raw_bytes(().as_response_view()).is_empty());
    }

    #[test]
    fn test_json_views() {
        assert_eq!(raw_bytes(json!("plain").as_response_view()), b"plain");
        assert_eq!(
            raw_bytes(json!({"key": "value"}).as_response_view()),
            br#"{"key":"value"}"#
        );
    }
}
