//! Per-invocation attribute collection.
//!
//! Stable attribute names come from `opentelemetry-semantic-conventions`.
//! The constants below cover names outside the stable set that downstream
//! consumers still match byte-for-byte.

use opentelemetry::{Key, KeyValue, Value};

/// `http.request.size`
pub const HTTP_REQUEST_SIZE: &str = "http.request.size";
/// `http.request.body.size`
pub const HTTP_REQUEST_BODY_SIZE: &str = "http.request.body.size";
/// `http.request.body.value`
pub const HTTP_REQUEST_BODY_VALUE: &str = "http.request.body.value";
/// `http.response.size`
pub const HTTP_RESPONSE_SIZE: &str = "http.response.size";
/// `http.response.body.size`
pub const HTTP_RESPONSE_BODY_SIZE: &str = "http.response.body.size";
/// `http.response.body.value`
pub const HTTP_RESPONSE_BODY_VALUE: &str = "http.response.body.value";
/// Prefix for request header attributes; the lower-cased header name follows.
pub const HTTP_REQUEST_HEADER_PREFIX: &str = "http.request.header";
/// Prefix for response header attributes; the lower-cased header name follows.
pub const HTTP_RESPONSE_HEADER_PREFIX: &str = "http.response.header";

/// Builds the attribute name for a header, e.g. `http.request.header.accept`.
pub fn header_attribute(prefix: &str, header_name: &str) -> Key {
    Key::new(format!("{prefix}.{}", header_name.to_ascii_lowercase()))
}

/// Ordered attribute mapping owned by a single invocation.
///
/// Keys are unique: setting an existing key replaces its value in place, so
/// insertion order is the order in which each key was first written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet {
    entries: Vec<KeyValue>,
}

impl AttributeSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<Key>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();

        match self.entries.iter_mut().find(|kv| kv.key == key) {
            Some(existing) => existing.value = value,
            None => self.entries.push(KeyValue::new(key, value)),
        }
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }

    /// Returns `true` if `key` has been set.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no attribute has been set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the set, returning its entries in insertion order.
    pub fn into_key_values(self) -> Vec<KeyValue> {
        self.entries
    }
}

impl FromIterator<KeyValue> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = KeyValue>>(iter: I) -> Self {
        let mut set = AttributeSet::new();
        for kv in iter {
            set.set(kv.key, kv.value);
        }
        set
    }
}

/// Projects `attributes` onto `names`.
///
/// The result holds the entries whose key is listed in `names`, in the order
/// they appear in `attributes`. Names missing from the set are omitted.
pub fn filter_attributes(attributes: &AttributeSet, names: &[&str]) -> Vec<KeyValue> {
    attributes
        .iter()
        .filter(|kv| names.contains(&kv.key.as_str()))
        .cloned()
        .collect()
}
