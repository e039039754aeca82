use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::status::ReviewStatus;

/// Opaque backend identifier. The backend hands out both numeric and string
/// ids depending on the collection, so both are accepted and kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawId")]
pub struct RecordId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    Str(String),
}

impl From<RawId> for RecordId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Int(n) => RecordId(n.to_string()),
            RawId::Str(s) => RecordId(s),
        }
    }
}

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        RecordId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId(s)
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        RecordId(n.to_string())
    }
}

/// Any backend entity: an id, an optional review status and reason, and an
/// opaque bag of domain fields (name, shaft numbers, weight, registration...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ReviewStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Decoded through a raw map so one odd row never fails a whole list:
/// `id` wins over `_id` when both are present (the other stays a plain
/// field), and a status that isn't a recognised string counts as absent.
impl<'de> Deserialize<'de> for Record {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;

        let raw_id = match fields.remove("id") {
            Some(id) if !id.is_null() => id,
            _ => fields
                .remove("_id")
                .filter(|id| !id.is_null())
                .ok_or_else(|| <D::Error as de::Error>::missing_field("id"))?,
        };
        let id = RecordId::deserialize(raw_id).map_err(<D::Error as de::Error>::custom)?;
        let status = fields.remove("status").and_then(lenient_status);
        let reason = fields.remove("reason").and_then(|v| value_text(&v));

        Ok(Record {
            id,
            status,
            reason,
            fields,
        })
    }
}

fn lenient_status(raw: Value) -> Option<ReviewStatus> {
    match raw {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => match s.parse() {
            Ok(status) => Some(status),
            Err(_) => {
                tracing::warn!(status = %s, "unrecognised record status, treating as absent");
                None
            }
        },
        other => {
            tracing::warn!(status = %other, "non-text record status, treating as absent");
            None
        }
    }
}

impl Record {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            status: None,
            reason: None,
            fields: Map::new(),
        }
    }

    pub fn with_status(mut self, status: ReviewStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Status with the "absent means pending" rule applied.
    pub fn effective_status(&self) -> ReviewStatus {
        self.status.unwrap_or_default()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// String form of a field as shown in a table cell. `None` for absent or
    /// null values so callers can order them last.
    pub fn field_text(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.id.to_string()),
            "status" => self.status.map(|s| s.as_str().to_string()),
            "reason" => self.reason.clone(),
            _ => self.fields.get(name).and_then(value_text),
        }
    }

    /// True when the field exists and carries something worth showing:
    /// non-blank text, a non-empty list or object, or any scalar.
    pub fn has_content(&self, name: &str) -> bool {
        match self.fields.get(name) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(map)) => !map.is_empty(),
            Some(_) => true,
        }
    }

    /// Case-insensitive substring match over every field's string form.
    /// `needle` must already be lowercased.
    pub fn matches_search(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        let hit = |text: &str| text.to_lowercase().contains(needle);
        if hit(self.id.as_str()) {
            return true;
        }
        if self.status.map(|s| hit(s.as_str())).unwrap_or(false) {
            return true;
        }
        if self.reason.as_deref().map(hit).unwrap_or(false) {
            return true;
        }
        self.fields
            .values()
            .filter_map(value_text)
            .any(|text| hit(&text))
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
