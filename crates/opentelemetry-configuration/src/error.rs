//! Error types for SDK configuration and lifecycle.

use opentelemetry_otlp::ExporterBuildError;
use opentelemetry_sdk::error::OTelSdkError;
use thiserror::Error;

/// Errors raised while building or shutting down the SDK.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SdkError {
    /// Configuration could not be extracted from its sources.
    #[error("configuration error")]
    Config(#[source] Box<figment::Error>),

    /// The span exporter could not be built.
    #[error("failed to build span exporter")]
    TraceExporter(#[source] ExporterBuildError),

    /// The metric exporter could not be built.
    #[error("failed to build metric exporter")]
    MetricExporter(#[source] ExporterBuildError),

    /// A provider failed to flush.
    #[error("failed to flush provider")]
    Flush(#[source] OTelSdkError),

    /// A provider failed to shut down.
    #[error("failed to shut down provider")]
    Shutdown(#[source] OTelSdkError),

    /// Tracing subscriber initialisation failed.
    #[error("failed to initialise tracing subscriber")]
    Tracing(#[from] tracing_subscriber::util::TryInitError),
}

impl From<figment::Error> for SdkError {
    fn from(err: figment::Error) -> Self {
        SdkError::Config(Box::new(err))
    }
}
