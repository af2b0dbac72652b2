//! Query predicates
//!
//! Filters are expressed as a structured object that loosely follows the
//! MongoDB format; the transport layer translates it into the server's
//! filter condition. Callers never build raw query strings.
//!
//! ```rust,ignore
//! let q = Query::new().like("NAME", "Fetch%").is_null("CLASS_UUID");
//! // {"NAME": {"$like": "Fetch%"}, "CLASS_UUID": "$isnull"}
//! ```

use crate::Record;
use serde::Serialize;
use serde_json::{json, Value};

/// Structured filter over flat record fields
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Query(Record);

impl Query {
    /// Create empty query (matches everything)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Field equals value
    #[must_use]
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    /// SQL `LIKE` pattern match (`%` and `_` wildcards)
    #[must_use]
    pub fn like(mut self, field: &str, pattern: impl Into<String>) -> Self {
        self.0.insert(field.to_string(), json!({ "$like": pattern.into() }));
        self
    }

    /// Case-insensitive `LIKE`
    #[must_use]
    pub fn ilike(mut self, field: &str, pattern: impl Into<String>) -> Self {
        self.0.insert(field.to_string(), json!({ "$ilike": pattern.into() }));
        self
    }

    /// Field is null
    #[must_use]
    pub fn is_null(mut self, field: &str) -> Self {
        self.0.insert(field.to_string(), Value::String("$isnull".to_string()));
        self
    }

    /// Name pattern using shell wildcards (`*`, `?`)
    #[must_use]
    pub fn name_glob(self, pattern: &str) -> Self {
        self.like("NAME", glob_to_like(pattern))
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the predicate terms
    #[inline]
    #[must_use]
    pub fn terms(&self) -> &Record {
        &self.0
    }

    /// Serialized form sent as the filter condition
    #[must_use]
    pub fn to_filter_condition(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

/// Convert shell wildcards to `LIKE` wildcards
#[must_use]
pub fn glob_to_like(pattern: &str) -> String {
    pattern.replace('*', "%").replace('?', "_")
}
