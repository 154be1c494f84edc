//! Objects mirrored into the search index.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Well-known field names in index documents.
pub mod fields {
    /// Object id.
    pub const ID: &str = "id";
    /// Object type.
    pub const TYPE: &str = "type";
    /// Owning tenant id.
    pub const APPID: &str = "appid";
    /// Whether the object is expected to exist in the primary store.
    pub const STORED: &str = "stored";
    /// Expiry instant in epoch milliseconds.
    pub const EXPIRES: &str = "_expires";
    /// Tags attached to an object.
    pub const TAGS: &str = "tags";
    /// Tag name on `tag` objects.
    pub const TAG: &str = "tag";
    /// Id of the owning object.
    pub const PARENT_ID: &str = "parentid";
    /// `"lat,lng"` location of `address` objects.
    pub const LATLNG: &str = "latlng";
    /// Nested object field.
    pub const NESTED: &str = "nstd";
    /// Creation time in epoch milliseconds.
    pub const TIMESTAMP: &str = "timestamp";

    /// Fields written by the search layer itself and stripped on read.
    pub const METADATA: [&str; 5] = [ID, TYPE, APPID, STORED, EXPIRES];

    /// Fields mapped as exact keywords in the index.
    pub const KEYWORDS: [&str; 6] = [ID, TYPE, APPID, PARENT_ID, TAGS, TAG];

    /// Subfield holding the unanalyzed value of a dynamic string field.
    pub const KEYWORD_SUBFIELD: &str = "keyword";
}

/// Capability of any domain type that can be mirrored into the index.
pub trait Indexable {
    /// Returns the object id.
    fn id(&self) -> &str;

    /// Returns the object type.
    fn object_type(&self) -> &str;

    /// Returns the owning tenant id.
    fn tenant_id(&self) -> &str;

    /// Returns the field map written to the index.
    fn fields(&self) -> Map<String, Value>;

    /// Returns `true` if the object is expected to exist in the primary store.
    fn stored(&self) -> bool {
        true
    }

    /// Builds the index document for this object.
    ///
    /// The document is the field map plus the metadata fields. A positive
    /// `ttl_seconds` adds an expiry instant.
    fn to_document(&self, ttl_seconds: u64) -> Value {
        let mut doc = self.fields();
        for key in fields::METADATA {
            doc.remove(key);
        }
        doc.insert(fields::ID.to_string(), Value::from(self.id()));
        doc.insert(fields::TYPE.to_string(), Value::from(self.object_type()));
        doc.insert(fields::APPID.to_string(), Value::from(self.tenant_id()));
        doc.insert(fields::STORED.to_string(), Value::Bool(self.stored()));
        if ttl_seconds > 0 {
            let ttl_millis = i64::try_from(ttl_seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
            let expires = Utc::now().timestamp_millis().saturating_add(ttl_millis);
            doc.insert(fields::EXPIRES.to_string(), Value::from(expires));
        }
        Value::Object(doc)
    }
}

/// A generic domain object as seen by the search layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchableObject {
    /// Object id.
    pub id: String,
    /// Object type.
    #[serde(rename = "type")]
    pub object_type: String,
    /// Owning tenant id.
    #[serde(rename = "appid")]
    pub tenant_id: String,
    /// Domain fields.
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Whether the object is expected to exist in the primary store.
    #[serde(default = "default_stored")]
    pub stored: bool,
}

fn default_stored() -> bool {
    true
}

impl SearchableObject {
    /// Creates a stored object with no fields.
    pub fn new(
        id: impl Into<String>,
        object_type: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            object_type: object_type.into(),
            tenant_id: tenant_id.into(),
            fields: Map::new(),
            stored: true,
        }
    }

    /// Adds a field.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Marks the object as stored or index-only.
    pub fn with_stored(mut self, stored: bool) -> Self {
        self.stored = stored;
        self
    }

    /// Returns a field value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns a string field value.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Rebuilds an object from an index document source.
    ///
    /// Fails if the source is not an object or has no id.
    pub fn from_source(source: &Value) -> Result<Self, ValidationError> {
        let map = source
            .as_object()
            .ok_or_else(|| ValidationError::MalformedDocument {
                id: String::new(),
                message: format!("expected an object, found {}", json_kind(source)),
            })?;
        let id = map
            .get(fields::ID)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ValidationError::MissingRequiredField {
                field: fields::ID.to_string(),
            })?;
        let text = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let stored = map
            .get(fields::STORED)
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let domain_fields = map
            .iter()
            .filter(|(k, _)| !fields::METADATA.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            id: id.to_string(),
            object_type: text(fields::TYPE),
            tenant_id: text(fields::APPID),
            fields: domain_fields,
            stored,
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl Indexable for SearchableObject {
    fn id(&self) -> &str {
        &self.id
    }

    fn object_type(&self) -> &str {
        &self.object_type
    }

    fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn fields(&self) -> Map<String, Value> {
        self.fields.clone()
    }

    fn stored(&self) -> bool {
        self.stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_layout() {
        let obj = SearchableObject::new("n1", "note", "acct-42")
            .with_field("title", json!("Meeting"))
            .with_field("id", json!("spoofed"));
        let doc = obj.to_document(0);

        assert_eq!(doc["id"], "n1");
        assert_eq!(doc["type"], "note");
        assert_eq!(doc["appid"], "acct-42");
        assert_eq!(doc["stored"], true);
        assert_eq!(doc["title"], "Meeting");
        assert!(doc.get("_expires").is_none());
    }

    #[test]
    fn test_document_ttl() {
        let obj = SearchableObject::new("n1", "note", "acct-42");
        let before = Utc::now().timestamp_millis();
        let doc = obj.to_document(10);
        let expires = doc["_expires"].as_i64().unwrap();
        assert!(expires >= before + 10_000);
    }

    #[test]
    fn test_from_source_strips_metadata() {
        let source = json!({
            "id": "n1",
            "type": "note",
            "appid": " alpha",
            "stored": false,
            "_expires": 1,
            "title": "Meeting",
        });
        let obj = SearchableObject::from_source(&source).unwrap();
        assert_eq!(obj.id, "n1");
        assert_eq!(obj.tenant_id, " alpha");
        assert!(!obj.stored);
        assert_eq!(obj.fields.len(), 1);
        assert_eq!(obj.field_str("title"), Some("Meeting"));
    }

    #[test]
    fn test_from_source_defaults() {
        let obj = SearchableObject::from_source(&json!({"id": "x"})).unwrap();
        assert!(obj.stored);
        assert_eq!(obj.object_type, "");

        assert!(matches!(
            SearchableObject::from_source(&json!({"title": "no id"})),
            Err(ValidationError::MissingRequiredField { field }) if field == "id"
        ));
        assert!(matches!(
            SearchableObject::from_source(&json!("scalar")),
            Err(ValidationError::MalformedDocument { .. })
        ));
    }

    #[test]
    fn test_document_round_trips_through_source() {
        let obj = SearchableObject::new("n1", "note", "acct-42").with_field("n", json!(3));
        let back = SearchableObject::from_source(&obj.to_document(0)).unwrap();
        assert_eq!(obj, back);
    }
}
