//! Raw source record → sink document.
//!
//! Total and side-effect free apart from reading the clock, which
//! [`DocumentTransformer::transform_at`] takes as an argument.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::document::{
    AttributeValue, DocumentBody, RawDocument, SinkDocument, SourceTimestamp, AUTHOR, CATEGORY,
    CREATED_AT, LAST_UPDATED_AT, SOURCE_URI, TAGS,
};

pub const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone)]
pub struct DocumentTransformer {
    plugin_name: String,
}

impl DocumentTransformer {
    pub fn new(plugin_name: impl Into<String>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
        }
    }

    pub fn transform(&self, raw: &RawDocument) -> SinkDocument {
        self.transform_at(raw, Utc::now())
    }

    pub fn transform_at(&self, raw: &RawDocument, now: DateTime<Utc>) -> SinkDocument {
        let id = raw
            .id
            .clone()
            .unwrap_or_else(|| self.generate_id(raw, now));

        let title = raw
            .title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(UNTITLED)
            .to_owned();

        let mut attributes = BTreeMap::new();
        attributes.insert(
            SOURCE_URI.to_owned(),
            AttributeValue::String(raw.url.clone().unwrap_or_default()),
        );
        attributes.insert(
            CREATED_AT.to_owned(),
            AttributeValue::Date(resolve_timestamp(raw.created_at.as_ref(), now, &id)),
        );
        attributes.insert(
            LAST_UPDATED_AT.to_owned(),
            AttributeValue::Date(resolve_timestamp(raw.updated_at.as_ref(), now, &id)),
        );
        if let Some(author) = &raw.author {
            attributes.insert(AUTHOR.to_owned(), AttributeValue::String(author.clone()));
        }
        if let Some(category) = &raw.category {
            attributes.insert(CATEGORY.to_owned(), AttributeValue::String(category.clone()));
        }
        if !raw.tags.is_empty() {
            attributes.insert(TAGS.to_owned(), AttributeValue::StringList(raw.tags.clone()));
        }

        SinkDocument {
            id,
            title,
            content: DocumentBody::plain_text(raw.content.as_deref().unwrap_or_default()),
            attributes,
        }
    }

    /// `{plugin}-{epoch millis}-{first 8 hex chars of sha256(json)}`.
    ///
    /// Includes the clock, so the same record transformed later gets a new id.
    fn generate_id(&self, raw: &RawDocument, now: DateTime<Utc>) -> String {
        let json = Value::Object(raw.fields.clone()).to_string();
        let digest = format!("{:x}", Sha256::digest(json.as_bytes()));
        format!(
            "{}-{}-{}",
            self.plugin_name,
            now.timestamp_millis(),
            &digest[..8]
        )
    }
}

fn resolve_timestamp(
    value: Option<&SourceTimestamp>,
    now: DateTime<Utc>,
    id: &str,
) -> DateTime<Utc> {
    let parsed = match value {
        None => return now,
        Some(SourceTimestamp::Text(text)) => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .ok(),
        Some(SourceTimestamp::EpochMillis(ms)) => Utc.timestamp_millis_opt(*ms).single(),
    };
    parsed.unwrap_or_else(|| {
        warn!(document_id = id, ?value, "Unparseable timestamp, using current time");
        now
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn raw(value: Value) -> RawDocument {
        RawDocument::from_value(value).unwrap()
    }

    fn date(doc: &SinkDocument, name: &str) -> DateTime<Utc> {
        match doc.attribute(name) {
            Some(AttributeValue::Date(d)) => *d,
            other => panic!("{name} is not a date: {other:?}"),
        }
    }

    #[test]
    fn empty_record_gets_every_default() {
        let now = Utc::now();
        let doc = DocumentTransformer::new("plug").transform_at(&raw(json!({})), now);

        assert!(doc.id.starts_with("plug-"));
        assert_eq!(doc.title, UNTITLED);
        assert!(doc.content.bytes.is_empty());
        assert_eq!(
            doc.attribute(SOURCE_URI),
            Some(&AttributeValue::String(String::new()))
        );
        assert_eq!(date(&doc, CREATED_AT), now);
        assert_eq!(date(&doc, LAST_UPDATED_AT), now);
        assert!(doc.attribute(AUTHOR).is_none());
        assert!(doc.attribute(TAGS).is_none());
    }

    #[test]
    fn title_and_content_only() {
        let before = Utc::now();
        let doc = DocumentTransformer::new("plug").transform(&raw(json!({
            "title": "T",
            "content": "C",
        })));

        assert_eq!(doc.title, "T");
        assert_eq!(doc.content.bytes, "C".as_bytes());
        assert_eq!(
            doc.attribute(SOURCE_URI),
            Some(&AttributeValue::String(String::new()))
        );
        for name in [CREATED_AT, LAST_UPDATED_AT] {
            let at = date(&doc, name);
            assert!(at >= before && at - before < Duration::seconds(5));
        }
    }

    #[test]
    fn empty_title_uses_the_name_alias() {
        let doc = DocumentTransformer::new("plug").transform(&raw(json!({
            "title": "",
            "name": "N",
            "content": "",
            "body": "B",
        })));
        assert_eq!(doc.title, "N");
        assert_eq!(doc.content.bytes, "B".as_bytes());
    }

    #[test]
    fn explicit_id_is_kept_verbatim() {
        let doc = DocumentTransformer::new("plug")
            .transform(&raw(json!({ "id": "doc-007", "title": "x" })));
        assert_eq!(doc.id, "doc-007");
    }

    #[test]
    fn generated_id_shape() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let doc = DocumentTransformer::new("wiki").transform_at(&raw(json!({ "title": "a" })), now);

        let hash = doc.id.strip_prefix("wiki-1700000000123-").unwrap();
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn distinct_records_without_id_get_distinct_ids() {
        let now = Utc::now();
        let transformer = DocumentTransformer::new("plug");
        let a = transformer.transform_at(&raw(json!({ "title": "a", "content": "one" })), now);
        let b = transformer.transform_at(&raw(json!({ "title": "b", "content": "two" })), now);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn source_fields_are_carried_into_attributes() {
        let now = Utc::now();
        let doc = DocumentTransformer::new("plug").transform_at(
            &raw(json!({
                "url": "https://kb.example.com/1",
                "createdAt": "2024-01-02T03:04:05Z",
                "updated_at": 1_704_164_645_000i64,
                "author": "ana",
                "category": "runbooks",
                "tags": ["db", "oncall"],
            })),
            now,
        );

        assert_eq!(
            doc.attribute(SOURCE_URI),
            Some(&AttributeValue::String("https://kb.example.com/1".into()))
        );
        assert_eq!(
            date(&doc, CREATED_AT),
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
        );
        assert_eq!(
            date(&doc, LAST_UPDATED_AT),
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
        );
        assert_eq!(doc.attribute(AUTHOR), Some(&AttributeValue::String("ana".into())));
        assert_eq!(
            doc.attribute(CATEGORY),
            Some(&AttributeValue::String("runbooks".into()))
        );
        assert_eq!(
            doc.attribute(TAGS),
            Some(&AttributeValue::StringList(vec!["db".into(), "oncall".into()]))
        );
    }

    #[test]
    fn garbage_timestamp_falls_back_to_now() {
        let now = Utc::now();
        let doc = DocumentTransformer::new("plug")
            .transform_at(&raw(json!({ "createdAt": "last tuesday" })), now);
        assert_eq!(date(&doc, CREATED_AT), now);
    }
}
