//! Error types for wrapper initialisation.
//!
//! Handler failures never pass through these types: the wrapper returns the
//! handler's own `Result` untouched.

use opentelemetry_configuration::SdkError;
use thiserror::Error;

/// A specialised Result type for wrapper operations.
pub type Result<T> = std::result::Result<T, WrapperError>;

/// Errors that can occur while initialising the wrapper.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum WrapperError {
    /// Wrapper configuration could not be loaded.
    #[error("configuration error")]
    Config(#[source] Box<figment::Error>),

    /// The OpenTelemetry SDK could not be configured.
    #[error(transparent)]
    Sdk(#[from] SdkError),
}

impl From<figment::Error> for WrapperError {
    fn from(err: figment::Error) -> Self {
        WrapperError::Config(Box::new(err))
    }
}
