//! OpenTelemetry SDK configuration and lifecycle for serverless functions.
//!
//! This crate builds the tracer and meter providers a function instance
//! exports through, installs the global text map propagator, and optionally
//! bridges the `tracing` crate into OpenTelemetry.
//!
//! # Features
//!
//! - **Layered configuration** - defaults, a TOML file, standard `OTEL_*`
//!   environment variables and programmatic overrides, merged with
//!   [figment](https://docs.rs/figment)
//! - **Per-signal switches** - `OTEL_TRACES_EXPORTER=none` and
//!   `OTEL_METRICS_EXPORTER=none` leave the corresponding provider unbuilt
//! - **Drop-based lifecycle** - providers are flushed and shut down when the
//!   [`OtelGuard`] goes out of scope
//!
//! # Example
//!
//! ```no_run
//! use opentelemetry_configuration::{OtelSdkBuilder, Protocol, SdkError};
//!
//! fn main() -> Result<(), SdkError> {
//!     let _guard = OtelSdkBuilder::new()
//!         .with_file("/etc/otel/sdk.toml")
//!         .with_standard_env()
//!         .protocol(Protocol::HttpBinary)
//!         .service_name("my-function")
//!         .build()?;
//!
//!     tracing::info!("Function running");
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod config;
mod error;
mod guard;

pub use builder::OtelSdkBuilder;
pub use config::{
    BatchConfig, EndpointConfig, OtelSdkConfig, Protocol, ResourceConfig, SignalConfig,
};
pub use error::SdkError;
pub use guard::OtelGuard;

pub use figment;
