//! Typed scenario records
//!
//! A scenario is stored server-side as one flat record in the
//! `connections` entity. Whether it is a class (a code template) or an
//! instance (a generated copy) is decided here, once, from the presence of
//! `CLASS_UUID`; every later component works with [`ScenarioKind`].

use crate::error::RecordError;
use crate::metadata::ScenarioMetadata;
use crate::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Well-known field names of a scenario record
pub mod field {
    pub const UUID: &str = "UUID";
    pub const NAME: &str = "NAME";
    pub const CLASS_UUID: &str = "CLASS_UUID";
    pub const IS_LOCAL: &str = "ISLOCAL";
    pub const JSON: &str = "__JSON";
    pub const GIT_CLONE_URL: &str = "Git Clone URL";
    pub const GIT_SUBFOLDER: &str = "Git Subfolder";
    pub const MODIFIED_TIMESTAMP: &str = "MODIFIED_TIMESTAMP";
}

/// Class or instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioKind {
    /// Reusable code template
    Class,
    /// Instantiation of the class with the given uuid
    Instance { class_uuid: Uuid },
}

/// A scenario class or instance as last seen on the server
///
/// The typed accessors are derived from `fields`, which always holds the
/// complete flat record so that nothing the server sent is lost when the
/// record is cached locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Record", into = "Record")]
pub struct ScenarioRecord {
    uuid: Uuid,
    name: String,
    is_local: bool,
    kind: ScenarioKind,
    fields: Record,
}

impl ScenarioRecord {
    /// Read a scenario from any JSON value
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Object(record) => Self::try_from(record),
            other => Err(RecordError::NotARecord(other.to_string())),
        }
    }

    /// Remote identifier
    #[inline]
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Display name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the code lives only on the developer's machine
    #[inline]
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.is_local
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> ScenarioKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn is_class(&self) -> bool {
        matches!(self.kind, ScenarioKind::Class)
    }

    #[inline]
    #[must_use]
    pub fn is_instance(&self) -> bool {
        !self.is_class()
    }

    /// Class this instance was created from
    #[inline]
    #[must_use]
    pub fn class_uuid(&self) -> Option<Uuid> {
        match self.kind {
            ScenarioKind::Class => None,
            ScenarioKind::Instance { class_uuid } => Some(class_uuid),
        }
    }

    /// Raw field access
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Full flat record
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &Record {
        &self.fields
    }

    /// Git URL the server generates class code from, if set
    #[must_use]
    pub fn git_clone_url(&self) -> Option<&str> {
        self.get(field::GIT_CLONE_URL)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn git_subfolder(&self) -> Option<&str> {
        self.get(field::GIT_SUBFOLDER).and_then(Value::as_str)
    }

    /// Typed view over the `__JSON` blob
    #[must_use]
    pub fn metadata(&self) -> ScenarioMetadata {
        ScenarioMetadata::from_field(self.get(field::JSON))
    }

    /// Consume into the flat record
    #[inline]
    #[must_use]
    pub fn into_record(self) -> Record {
        self.fields
    }
}

impl TryFrom<Record> for ScenarioRecord {
    type Error = RecordError;

    fn try_from(fields: Record) -> Result<Self, Self::Error> {
        let uuid = match fields.get(field::UUID) {
            Some(Value::String(s)) => {
                Uuid::parse_str(s).map_err(|_| RecordError::invalid("UUID", &Value::String(s.clone())))?
            }
            Some(other) => return Err(RecordError::invalid("UUID", other)),
            None => return Err(RecordError::MissingField("UUID")),
        };
        let name = match fields.get(field::NAME) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => return Err(RecordError::MissingField("NAME")),
            Some(other) => other.to_string(),
        };
        let is_local = fields.get(field::IS_LOCAL).is_some_and(truthy);
        let kind = match fields.get(field::CLASS_UUID) {
            None | Some(Value::Null) => ScenarioKind::Class,
            Some(Value::String(s)) if s.trim().is_empty() => ScenarioKind::Class,
            Some(Value::String(s)) => ScenarioKind::Instance {
                class_uuid: Uuid::parse_str(s.trim())
                    .map_err(|_| RecordError::invalid("CLASS_UUID", &Value::String(s.clone())))?,
            },
            Some(other) => return Err(RecordError::invalid("CLASS_UUID", other)),
        };
        Ok(Self {
            uuid,
            name,
            is_local,
            kind,
            fields,
        })
    }
}

impl From<ScenarioRecord> for Record {
    fn from(record: ScenarioRecord) -> Self {
        record.fields
    }
}

/// Loose truthiness used for flags the server may send as bool, number or text
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let s = s.trim();
            !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false"))
        }
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Check if a string has the 8-4-4-4-12 hex layout of a record id
#[must_use]
pub fn looks_like_uuid(s: &str) -> bool {
    let groups: Vec<&str> = s.split('-').collect();
    groups.len() == 5
        && groups
            .iter()
            .zip([8usize, 4, 4, 4, 12])
            .all(|(g, len)| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CLASS: &str = "586f14db-e121-8f74-b30f-8b070579ad51";
    const INSTANCE: &str = "b4e9c8bf-de02-6f68-00ab-b7da1adb45bb";

    #[test]
    fn class_record_without_class_uuid() {
        let rec = ScenarioRecord::from_value(json!({
            "UUID": CLASS, "NAME": "FooLocal", "ISLOCAL": 1, "CLASS_UUID": null
        }))
        .unwrap();
        assert!(rec.is_class());
        assert!(rec.is_local());
        assert_eq!(rec.name(), "FooLocal");
        assert_eq!(rec.class_uuid(), None);
    }

    #[test]
    fn instance_record_carries_class_link() {
        let rec = ScenarioRecord::from_value(json!({
            "UUID": INSTANCE, "NAME": "FooLocalInstance01", "CLASS_UUID": CLASS
        }))
        .unwrap();
        assert!(rec.is_instance());
        assert!(!rec.is_local());
        assert_eq!(rec.class_uuid(), Some(Uuid::parse_str(CLASS).unwrap()));
    }

    #[test]
    fn empty_class_uuid_means_class() {
        let rec = ScenarioRecord::from_value(json!({ "UUID": CLASS, "NAME": "X", "CLASS_UUID": "" })).unwrap();
        assert_eq!(rec.kind(), ScenarioKind::Class);
    }

    #[test]
    fn missing_uuid_is_rejected() {
        let err = ScenarioRecord::from_value(json!({ "NAME": "X" })).unwrap_err();
        assert_eq!(err, RecordError::MissingField("UUID"));
    }

    #[test]
    fn serde_keeps_every_field() {
        let value = json!({ "UUID": CLASS, "NAME": "X", "Manufacturer": "ACME" });
        let rec: ScenarioRecord = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(serde_json::to_value(&rec).unwrap(), value);
    }

    #[test]
    fn truthiness_follows_server_conventions() {
        assert!(truthy(&json!(true)));
        assert!(truthy(&json!(1)));
        assert!(truthy(&json!("TRUE")));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("false")));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&Value::Null));
    }

    #[test]
    fn uuid_shape_detection() {
        assert!(looks_like_uuid(CLASS));
        assert!(!looks_like_uuid("Gazebo Demo"));
        assert!(!looks_like_uuid("586f14db-e121-8f74-b30f"));
    }
}
