use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{Error, Result};

/// A schema-less JSON record.
///
/// Documents are identified by `_id` and carry a `_rev` revision marker that the
/// [`Database`](super::Database) checks on every write. All other properties live in a
/// flat JSON object; the `type` property is used by the application as the record
/// discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id", default)]
    id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    rev: Option<String>,
    #[serde(flatten)]
    properties: Map<String, Value>,
}

impl Document {
    /// Creates an unsaved document with a fresh UUID.
    pub fn new() -> Self {
        Document::with_id(Uuid::new_v4().to_string())
    }

    /// Creates an unsaved document with the given id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Document {
            id: id.into(),
            rev: None,
            properties: Map::new(),
        }
    }

    /// Builds a document from a JSON object. `_id` and `_rev` are taken from the
    /// object if present.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut doc: Document = serde_json::from_value(value)?;
        if doc.id.is_empty() {
            doc.id = Uuid::new_v4().to_string();
        }
        Ok(doc)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Revision of the stored copy this document was read from, `None` if it was
    /// never saved.
    pub fn rev(&self) -> Option<&str> {
        self.rev.as_deref()
    }

    pub(crate) fn set_rev(&mut self, rev: Option<String>) {
        self.rev = rev;
    }

    /// The `type` discriminator, if present and a string.
    pub fn doc_type(&self) -> Option<&str> {
        self.get("type").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.properties.remove(key)
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// The whole document, `_id` and `_rev` included, as one JSON object.
    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(self.properties.len() + 2);
        object.insert("_id".into(), Value::String(self.id.clone()));
        if let Some(rev) = &self.rev {
            object.insert("_rev".into(), Value::String(rev.clone()));
        }
        for (key, value) in &self.properties {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks that `id` can name a document file.
pub(crate) fn validate_id(id: &str) -> Result<()> {
    let invalid = id.is_empty()
        || id.starts_with('_')
        || id.starts_with('.')
        || id.contains(['/', '\\', '\0']);
    if invalid {
        return Err(Error::InvalidDocumentId(id.to_string()));
    }
    Ok(())
}

/// Generation counter of a `"{generation}-{hash}"` revision.
fn generation(rev: &str) -> Option<u64> {
    rev.split_once('-')?.0.parse().ok()
}

/// Revision following `current`.
pub(crate) fn next_revision(current: Option<&str>) -> String {
    let next = current.and_then(generation).unwrap_or(0) + 1;
    format!("{}-{}", next, Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_keeps_reserved_fields_apart() {
        let value = json!({ "_id": "abc", "_rev": "2-ff", "type": "file", "title": "Notes" });
        let doc = Document::from_value(value.clone()).unwrap();
        assert_eq!(doc.id(), "abc");
        assert_eq!(doc.rev(), Some("2-ff"));
        assert_eq!(doc.doc_type(), Some("file"));
        assert!(doc.get("_id").is_none());
        assert_eq!(doc.to_value(), value);
    }

    #[test]
    fn test_missing_id_gets_uuid() {
        let doc = Document::from_value(json!({ "type": "section" })).unwrap();
        assert!(Uuid::parse_str(doc.id()).is_ok());
        assert_eq!(doc.rev(), None);
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("inbox").is_ok());
        assert!(validate_id("4f1c-22").is_ok());
        for bad in ["", "_design", ".hidden", "a/b", "a\\b"] {
            assert!(matches!(validate_id(bad), Err(Error::InvalidDocumentId(_))), "{bad:?}");
        }
    }

    #[test]
    fn test_next_revision_increments_generation() {
        let first = next_revision(None);
        assert!(first.starts_with("1-"));
        let second = next_revision(Some(&first));
        assert!(second.starts_with("2-"));
        assert_ne!(first, second);
        // Unparseable revisions restart the count.
        assert!(next_revision(Some("garbage")).starts_with("1-"));
    }
}
