//! Serverless OTel Workspace - integration tests for the instrumented function wrapper.
//!
//! This is a virtual package that provides workspace-level integration tests.
//! The actual functionality is provided by the workspace member crates:
//!
//! - `opentelemetry-configuration`: builds tracer and meter providers from `OTEL_*` settings
//! - `opentelemetry-serverless-wrapper`: wraps function handlers with spans and HTTP server metrics
