//! Scenario metadata carried in the `__JSON` field
//!
//! The blob is free-form; two sub-keys are understood:
//! - `configJsonObj`: user-editable configuration
//! - `placeholderObjects`: substitution points, optionally instantiated

use crate::Record;
use serde_json::Value;
use std::collections::BTreeMap;

const CONFIG_KEY: &str = "configJsonObj";
const PLACEHOLDERS_KEY: &str = "placeholderObjects";
const INSTANTIATED_KEY: &str = "instantiatedObject";

/// One substitution point of a scenario
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    pub id: String,
    /// Uuid of the object the placeholder was instantiated with
    pub instantiated_with: Option<String>,
    pub fields: Record,
}

impl Placeholder {
    fn from_value(id: String, value: &Value) -> Self {
        let fields = value.as_object().cloned().unwrap_or_default();
        let instantiated_with = match fields.get(INSTANTIATED_KEY) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Object(obj)) => obj.get("UUID").and_then(Value::as_str).map(str::to_string),
            _ => None,
        };
        Self {
            id,
            instantiated_with,
            fields,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_instantiated(&self) -> bool {
        self.instantiated_with.is_some()
    }
}

/// Parsed `__JSON` blob
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioMetadata {
    raw: Record,
}

impl ScenarioMetadata {
    /// Parse the field value; unreadable content yields empty metadata
    #[must_use]
    pub fn from_field(value: Option<&Value>) -> Self {
        let raw = match value {
            Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => map,
                _ => Record::new(),
            },
            Some(Value::Object(map)) => map.clone(),
            _ => Record::new(),
        };
        Self { raw }
    }

    /// The configuration object, `{}` when absent
    #[must_use]
    pub fn config(&self) -> Value {
        self.raw
            .get(CONFIG_KEY)
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| Value::Object(Record::new()))
    }

    /// Replace the configuration, keeping all other keys
    #[must_use]
    pub fn with_config(mut self, config: Value) -> Self {
        self.raw.insert(CONFIG_KEY.to_string(), config);
        self
    }

    /// Placeholders keyed by id
    ///
    /// Accepts both an object keyed by id and a list of objects with an
    /// `id` field.
    #[must_use]
    pub fn placeholders(&self) -> BTreeMap<String, Placeholder> {
        let mut out = BTreeMap::new();
        match self.raw.get(PLACEHOLDERS_KEY) {
            Some(Value::Object(map)) => {
                for (id, value) in map {
                    out.insert(id.clone(), Placeholder::from_value(id.clone(), value));
                }
            }
            Some(Value::Array(items)) => {
                for (idx, value) in items.iter().enumerate() {
                    let id = value
                        .get("id")
                        .and_then(Value::as_str)
                        .map_or_else(|| idx.to_string(), str::to_string);
                    out.insert(id.clone(), Placeholder::from_value(id, value));
                }
            }
            _ => {}
        }
        out
    }

    #[inline]
    #[must_use]
    pub fn raw(&self) -> &Record {
        &self.raw
    }

    /// Serialize back into the string form stored in `__JSON`
    #[must_use]
    pub fn to_field_value(&self) -> Value {
        Value::String(Value::Object(self.raw.clone()).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_stringified_blob() {
        let field = json!("{\"configJsonObj\": {\"robot\": \"r1\"}, \"other\": 5}");
        let meta = ScenarioMetadata::from_field(Some(&field));
        assert_eq!(meta.config(), json!({ "robot": "r1" }));
        assert_eq!(meta.raw().get("other"), Some(&json!(5)));
    }

    #[test]
    fn garbage_blob_is_empty() {
        let meta = ScenarioMetadata::from_field(Some(&json!("{oops")));
        assert_eq!(meta.config(), json!({}));
        assert!(meta.placeholders().is_empty());
    }

    #[test]
    fn with_config_preserves_other_keys() {
        let field = json!({ "configJsonObj": { "a": 1 }, "placeholderObjects": {} });
        let meta = ScenarioMetadata::from_field(Some(&field)).with_config(json!({ "a": 2 }));
        assert_eq!(meta.config(), json!({ "a": 2 }));
        assert!(meta.raw().contains_key("placeholderObjects"));
        assert!(meta.to_field_value().is_string());
    }

    #[test]
    fn placeholders_report_instantiation() {
        let field = json!({
            "placeholderObjects": {
                "robot": { "instantiatedObject": "4baa8fc7-ec3a-85af-5115-985381bfedec" },
                "backend": {}
            }
        });
        let placeholders = ScenarioMetadata::from_field(Some(&field)).placeholders();
        assert!(placeholders["robot"].is_instantiated());
        assert!(!placeholders["backend"].is_instantiated());
    }
}
