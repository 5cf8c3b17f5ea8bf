//! Transparent OpenTelemetry instrumentation for serverless function handlers.
//!
//! This crate sits between a function runtime and the handler it invokes.
//! Every invocation gets a `handler` span and HTTP server metrics, with
//! attributes derived from the request event and the handler's response. The
//! handler itself contains no observability code.
//!
//! # Architecture
//!
//! - [`initialize`] runs once at cold start. It configures the SDK through
//!   `opentelemetry-configuration`, builds an [`ExecutionContext`] holding
//!   the tracer, the meter and the enabled [`ProfileProcessor`]s, and
//!   publishes it process-wide.
//! - [`execute`] (or [`ExecutionContext::execute`]) wraps one synchronous
//!   handler call. [`ObservableLayer`] does the same for async handlers
//!   written as Tower services.
//! - Profiles map a protocol onto attributes. The `http` profile
//!   ([`HttpProfileProcessor`]) is enabled by default.
//!
//! Without a tracer or a meter the handler is called directly and its result
//! returned unmodified.
//!
//! # Usage
//!
//! ```no_run
//! use opentelemetry_serverless_wrapper::{
//!     FunctionEvent, FunctionInfo, FunctionResponse, WrapperError, execute, initialize,
//! };
//!
//! fn handler(event: &FunctionEvent) -> Result<FunctionResponse, String> {
//!     Ok(FunctionResponse::new(200).with_body(format!("hello {}", event.method)))
//! }
//!
//! fn main() -> Result<(), WrapperError> {
//!     initialize(&FunctionInfo::new("orders-api"))?;
//!
//!     let event = FunctionEvent::new("GET").with_url("/orders?id=7").with_path("/orders");
//!     let response = execute(&event, handler);
//!
//!     assert!(response.is_ok());
//!     Ok(())
//! }
//! ```
//!
//! # Environment
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `OTEL_TRACING_CONTENT` | `true` captures body values as attributes |
//! | `OTEL_ENABLED_PROFILES` | Comma-separated profile names, default `http` |
//! | `OTEL_TRACES_EXPORTER`, `OTEL_METRICS_EXPORTER` | `none` disables the signal |
//! | `OTEL_SDK_DISABLED` | `true` disables both signals |
//!
//! Exporter settings (`OTEL_EXPORTER_OTLP_*`, `OTEL_SERVICE_NAME`,
//! `OTEL_PROPAGATORS`) are read by `opentelemetry-configuration`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod error;
mod event;
mod executor;
mod future;
mod init;
mod layer;
mod propagation;
mod service;

pub mod attributes;
pub mod profiles;

pub use attributes::{AttributeSet, filter_attributes};
pub use config::{DEFAULT_CONFIG_PATH, DEFAULT_PROFILE, WrapperConfig, get_profiles};
pub use context::{
    DEFAULT_INSTRUMENTATION_NAME, ExecutionContext, ExecutionContextBuilder, Instruments,
};
pub use error::{Result, WrapperError};
pub use event::{AsResponseView, FunctionEvent, FunctionResponse, ResponseView};
pub use executor::{FAILURE_STATUS_CODE, SPAN_NAME, execute};
pub use future::ObservableFuture;
pub use init::{
    FunctionInfo, context_from_guard, current, initialize, initialize_with, publish, reset,
};
pub use layer::{ObservableLayer, ObservableLayerBuilder};
pub use profiles::{HttpProfileProcessor, ProfileProcessor, ProfileRegistry};
pub use service::ObservableService;

pub use opentelemetry_configuration;
