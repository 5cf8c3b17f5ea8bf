//! Protocol profiles.
//!
//! A profile maps one request/response shape onto attributes and metric
//! updates. Profiles are looked up by name in a [`ProfileRegistry`]; the
//! default registry knows:
//!
//! - `http` - [`HttpProfileProcessor`]

pub mod http;

pub use self::http::HttpProfileProcessor;

use crate::attributes::AttributeSet;
use crate::context::{ExecutionContext, ExecutionContextBuilder};
use crate::event::{FunctionEvent, ResponseView};
use std::fmt;
use std::time::Instant;

/// Derives attributes and metric updates for one protocol.
///
/// A processor is initialised once, while the execution context is being
/// built, and is shared read-only by every invocation afterwards.
///
/// # Example
///
/// ```
/// use opentelemetry_serverless_wrapper::{
///     AttributeSet, ExecutionContext, ExecutionContextBuilder, FunctionEvent,
///     ProfileProcessor, ResponseView,
/// };
/// use std::time::Instant;
///
/// #[derive(Debug)]
/// struct TenantProfile;
///
/// impl ProfileProcessor for TenantProfile {
///     fn name(&self) -> &str {
///         "tenant"
///     }
///
///     fn initialize(&mut self, _context: &mut ExecutionContextBuilder) {}
///
///     fn process_request(
///         &self,
///         event: &FunctionEvent,
///         _context: &ExecutionContext,
///         attributes: &mut AttributeSet,
///     ) {
///         if let Some(tenant) = event
///             .headers
///             .as_ref()
///             .and_then(|h| h.get("x-tenant"))
///             .and_then(|v| v.to_str().ok())
///         {
///             attributes.set("tenant.id", tenant.to_string());
///         }
///     }
///
///     fn process_response(
///         &self,
///         _response: &ResponseView<'_>,
///         _start: Instant,
///         _end: Instant,
///         _context: &ExecutionContext,
///         _attributes: &mut AttributeSet,
///     ) {
///     }
/// }
/// ```
pub trait ProfileProcessor: Send + Sync + fmt::Debug {
    /// Name the profile is enabled under.
    fn name(&self) -> &str;

    /// Reads configuration and registers instruments on the context under
    /// construction.
    fn initialize(&mut self, context: &mut ExecutionContextBuilder);

    /// Populates request-side attributes. Must not fail: values that cannot
    /// be derived are skipped.
    fn process_request(
        &self,
        event: &FunctionEvent,
        context: &ExecutionContext,
        attributes: &mut AttributeSet,
    );

    /// Populates response-side attributes and records metrics for the
    /// invocation that ran from `start` to `end`.
    fn process_response(
        &self,
        response: &ResponseView<'_>,
        start: Instant,
        end: Instant,
        context: &ExecutionContext,
        attributes: &mut AttributeSet,
    );
}

type ProfileFactory = Box<dyn Fn() -> Box<dyn ProfileProcessor> + Send + Sync>;

/// Maps profile names to processor constructors.
pub struct ProfileRegistry {
    factories: Vec<(String, ProfileFactory)>,
}

impl ProfileRegistry {
    /// Creates a registry with no profiles.
    pub fn empty() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// Registers a profile, replacing any existing one with the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn ProfileProcessor> + Send + Sync + 'static,
    {
        let name = name.into();
        self.factories.retain(|(existing, _)| *existing != name);
        self.factories.push((name, Box::new(factory)));
        self
    }

    /// Returns `true` if a profile is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.iter().any(|(n, _)| n == name)
    }

    /// Registered profile names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.iter().map(|(n, _)| n.as_str())
    }

    /// Constructs a fresh processor for `name`.
    pub fn create(&self, name: &str) -> Option<Box<dyn ProfileProcessor>> {
        self.factories
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, factory)| factory())
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(HttpProfileProcessor::NAME, || {
            Box::new(HttpProfileProcessor::new())
        });
        registry
    }
}

impl fmt::Debug for ProfileRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NamedProfile(&'static str);

    impl ProfileProcessor for NamedProfile {
        fn name(&self) -> &str {
            self.0
        }

        fn initialize(&mut self, _context: &mut ExecutionContextBuilder) {}

        fn process_request(
            &self,
            _event: &FunctionEvent,
            _context: &ExecutionContext,
            _attributes: &mut AttributeSet,
        ) {
        }

        fn process_response(
            &self,
            _response: &ResponseView<'_>,
            _start: Instant,
            _end: Instant,
            _context: &ExecutionContext,
            _attributes: &mut AttributeSet,
        ) {
        }
    }

    #[test]
    fn test_default_registry_knows_http() {
        let registry = ProfileRegistry::default();

        assert!(registry.contains("http"));
        assert_eq!(
            registry.create("http").map(|p| p.name().to_string()).as_deref(),
            Some("http")
        );
        assert!(registry.create("custom").is_none());
    }

    #[test]
    fn test_register_replaces_existing_profile() {
        let mut registry = ProfileRegistry::default();
        registry
            .register("custom", || Box::new(NamedProfile("custom")))
            .register("http", || Box::new(NamedProfile("replacement")));

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["custom", "http"]);
        assert_eq!(
            registry.create("http").map(|p| p.name().to_string()).as_deref(),
            Some("replacement")
        );
    }
}
