//! Request parameter map.
//!
//! Query parameters for API calls are an order-insensitive mapping of string
//! keys to JSON scalar values. The platform ignores falsy values, so they are
//! dropped before signing; the signature engine then iterates keys in
//! lexicographic order (see [`crate::session::signature`]).
//!
//! # Example
//!
//! ```
//! use mailru_api::Params;
//!
//! let params = Params::new()
//!     .set("uids", "12345")
//!     .set("limit", 10)
//!     .set("ext", 0); // falsy, dropped before dispatch
//!
//! assert_eq!(params.get_str("uids"), Some("12345"));
//! assert_eq!(params.to_query().len(), 2);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Value;

// ============================================================================
// Params
// ============================================================================

/// Query parameters for a platform method call.
///
/// Backed by a [`BTreeMap`] so iteration order is always lexicographic,
/// which makes signing invariant under insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: BTreeMap<String, Value>,
}

impl Params {
    /// Creates an empty parameter map.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter, builder style.
    #[inline]
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Inserts a parameter in place.
    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Removes a parameter, returning its value if present.
    #[inline]
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Returns a parameter value.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Returns a string parameter.
    #[inline]
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    /// Returns an unsigned integer parameter.
    ///
    /// Accepts both JSON numbers and numeric strings.
    #[must_use]
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.entries.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Removes a flag parameter and returns whether it was truthy.
    #[inline]
    pub fn take_flag(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some_and(|v| !is_falsy(&v))
    }

    /// Returns the number of parameters.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Renders the parameters as query pairs, dropping falsy values.
    ///
    /// This is the set of parameters that actually goes on the wire and
    /// into the signature.
    #[must_use]
    pub fn to_query(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .filter(|(_, v)| !is_falsy(v))
            .map(|(k, v)| (k.clone(), render(v)))
            .collect()
    }
}

impl FromIterator<(String, Value)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl From<BTreeMap<String, Value>> for Params {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self { entries }
    }
}

// ============================================================================
// Value Helpers
// ============================================================================

/// Returns `true` for values the platform treats as absent.
pub(crate) fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f == 0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Renders a scalar value the way it appears in a query string.
pub(crate) fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "1".to_owned(),
        Value::Bool(false) => "0".to_owned(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_falsy_values_dropped() {
        let params = Params::new()
            .set("a", 1)
            .set("b", 0)
            .set("c", "")
            .set("d", false)
            .set("e", Value::Null);

        let query = params.to_query();
        assert_eq!(query.len(), 1);
        assert_eq!(query.get("a").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_render_scalars() {
        assert_eq!(render(&json!("text")), "text");
        assert_eq!(render(&json!(42)), "42");
        assert_eq!(render(&json!(true)), "1");
    }

    #[test]
    fn test_query_iteration_is_sorted() {
        let params = Params::new().set("zeta", 1).set("alpha", 2).set("mid", 3);
        let keys: Vec<_> = params.to_query().into_keys().collect();
        assert_eq!(keys, ["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_get_u64_accepts_strings() {
        let params = Params::new().set("limit", "25").set("offset", 5);
        assert_eq!(params.get_u64("limit"), Some(25));
        assert_eq!(params.get_u64("offset"), Some(5));
        assert_eq!(params.get_u64("missing"), None);
    }

    #[test]
    fn test_take_flag() {
        let mut params = Params::new().set("scrape", true).set("fresh", 0);
        assert!(params.take_flag("scrape"));
        assert!(!params.take_flag("fresh"));
        assert!(!params.take_flag("absent"));
        assert!(params.is_empty());
    }
}
