//! Document shapes on either side of the pipeline.
//!
//! [`RawDocument`] is what the source client hands over after normalising an
//! upstream record; [`SinkDocument`] is what the uploader submits. The
//! transformer in [`crate::transform`] is the only code that maps one onto the
//! other.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::SourceError;

/// Attribute carrying the document's location in the source system.
pub const SOURCE_URI: &str = "_source_uri";
/// Attribute carrying the creation time.
pub const CREATED_AT: &str = "_created_at";
/// Attribute carrying the last modification time.
pub const LAST_UPDATED_AT: &str = "_last_updated_at";

pub const AUTHOR: &str = "author";
pub const CATEGORY: &str = "category";
pub const TAGS: &str = "tags";

/// A timestamp as the source sent it. Interpretation is left to the transformer.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceTimestamp {
    Text(String),
    EpochMillis(i64),
}

/// A source record normalised into one canonical shape.
///
/// Each recognised field is read from the first key present among its
/// aliases (`title` then `name`, `content` then `body`, `url` then `source`,
/// `createdAt` then `created_at`, `updatedAt` then `updated_at`). The whole
/// original object is kept in `fields`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawDocument {
    pub id: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub created_at: Option<SourceTimestamp>,
    pub updated_at: Option<SourceTimestamp>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub fields: Map<String, Value>,
}

impl RawDocument {
    /// Parse one upstream record. Only JSON objects are accepted.
    pub fn from_value(value: Value) -> Result<Self, SourceError> {
        match value {
            Value::Object(fields) => Ok(Self::from_fields(fields)),
            other => Err(SourceError::UnexpectedShape(format!(
                "expected a document object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| {
                    fields
                        .get(*k)
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                })
                .map(str::to_owned)
        };
        let timestamp = |keys: &[&str]| {
            keys.iter().find_map(|k| match fields.get(*k) {
                Some(Value::String(s)) => Some(SourceTimestamp::Text(s.clone())),
                Some(Value::Number(n)) => n.as_i64().map(SourceTimestamp::EpochMillis),
                _ => None,
            })
        };

        let id = match fields.get("id") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let tags = match fields.get("tags") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
            Some(Value::String(tag)) => vec![tag.clone()],
            _ => Vec::new(),
        };

        Self {
            id,
            title: text(&["title", "name"]),
            content: text(&["content", "body"]),
            url: text(&["url", "source"]),
            created_at: timestamp(&["createdAt", "created_at"]),
            updated_at: timestamp(&["updatedAt", "updated_at"]),
            author: text(&["author"]),
            category: text(&["category"]),
            tags,
            fields,
        }
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    PlainText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentBody {
    pub bytes: Vec<u8>,
    pub content_type: ContentType,
}

impl DocumentBody {
    pub fn plain_text(text: &str) -> Self {
        Self {
            bytes: text.as_bytes().to_vec(),
            content_type: ContentType::PlainText,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    String(String),
    StringList(Vec<String>),
    Date(DateTime<Utc>),
}

/// The unit submitted to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkDocument {
    pub id: String,
    pub title: String,
    pub content: DocumentBody,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl SinkDocument {
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_alias_wins() {
        let doc = RawDocument::from_value(json!({
            "name": "from name",
            "title": "from title",
            "body": "from body",
            "source": "https://example.com/a",
            "created_at": 1_700_000_000_000i64,
        }))
        .unwrap();

        assert_eq!(doc.title.as_deref(), Some("from title"));
        assert_eq!(doc.content.as_deref(), Some("from body"));
        assert_eq!(doc.url.as_deref(), Some("https://example.com/a"));
        assert_eq!(
            doc.created_at,
            Some(SourceTimestamp::EpochMillis(1_700_000_000_000))
        );
        assert!(doc.updated_at.is_none());
    }

    #[test]
    fn empty_strings_fall_through_to_the_next_alias() {
        let doc = RawDocument::from_value(json!({
            "title": "",
            "name": "N",
            "content": "",
            "body": "B",
            "url": "",
            "source": "https://example.com/b",
        }))
        .unwrap();

        assert_eq!(doc.title.as_deref(), Some("N"));
        assert_eq!(doc.content.as_deref(), Some("B"));
        assert_eq!(doc.url.as_deref(), Some("https://example.com/b"));

        let doc = RawDocument::from_value(json!({ "title": "", "author": "" })).unwrap();
        assert!(doc.title.is_none());
        assert!(doc.author.is_none());
    }

    #[test]
    fn numeric_ids_become_strings_and_empty_ids_are_dropped() {
        let numeric = RawDocument::from_value(json!({ "id": 42 })).unwrap();
        assert_eq!(numeric.id.as_deref(), Some("42"));

        let empty = RawDocument::from_value(json!({ "id": "" })).unwrap();
        assert!(empty.id.is_none());
    }

    #[test]
    fn tags_accept_a_single_string() {
        let doc = RawDocument::from_value(json!({ "tags": "ops" })).unwrap();
        assert_eq!(doc.tags, vec!["ops".to_string()]);

        let doc = RawDocument::from_value(json!({ "tags": ["a", 1, "b"] })).unwrap();
        assert_eq!(doc.tags, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn non_objects_are_rejected() {
        let err = RawDocument::from_value(json!("just text")).unwrap_err();
        assert!(matches!(err, SourceError::UnexpectedShape(_)));
    }
}
