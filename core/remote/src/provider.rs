//! Remote store trait definition.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use caresync_common::{Error, Result};

/// A structured document as stored remotely: named fields plus an id.
///
/// The field schema is entity-type-specific and opaque to this layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Record identifier, identical to the local record id.
    pub id: String,
    /// Entity payload fields.
    pub fields: serde_json::Value,
}

impl Document {
    /// Build a document from a serializable record.
    ///
    /// # Errors
    /// - `Error::Internal` if the record cannot be represented as JSON
    pub fn from_record<T: Serialize>(id: &str, record: &T) -> Result<Self> {
        let fields = serde_json::to_value(record)
            .map_err(|e| Error::Internal(format!("encode document '{}': {}", id, e)))?;
        Ok(Self {
            id: id.to_string(),
            fields,
        })
    }

    /// Decode the document fields into a record type.
    ///
    /// # Errors
    /// - `Error::Deserialization` naming the offending document id
    pub fn into_record<T: DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(self.fields)
            .map_err(|e| Error::Deserialization(format!("document '{}': {}", self.id, e)))
    }
}

/// Field-equality constraints for a remote query.
///
/// The engine only ever needs owner scoping, so equality clauses are the
/// whole filter language.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    clauses: Vec<(String, String)>,
}

impl QueryFilter {
    /// Create an empty filter (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `field == value` constraint.
    pub fn field_eq(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    /// Get the constraint clauses.
    pub fn clauses(&self) -> &[(String, String)] {
        &self.clauses
    }

    /// Whether a document's fields satisfy every clause.
    pub fn matches(&self, fields: &serde_json::Value) -> bool {
        self.clauses.iter().all(|(field, value)| {
            fields
                .get(field)
                .and_then(|v| v.as_str())
                .is_some_and(|v| v == value)
        })
    }
}

/// Remote document store trait for different backends.
///
/// All operations are async. Implementations map their transport failures
/// onto the common error taxonomy: connectivity problems become
/// `Error::Network`/`Error::Timeout`, authorization and quota rejections
/// become `Error::QuotaOrPermission`, malformed responses become
/// `Error::Deserialization`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Get the backend name (e.g., "http", "memory").
    fn name(&self) -> &str;

    /// Fetch all documents of a collection matching the filter.
    ///
    /// The result is not an authoritative full-set snapshot: absence of a
    /// document implies nothing about deletion.
    async fn fetch_all(&self, collection: &str, filter: &QueryFilter) -> Result<Vec<Document>>;

    /// Fetch one document by id, or `None` if absent.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Create or fully overwrite a document (last writer wins).
    ///
    /// # Postconditions
    /// - The stored document equals `doc` byte-for-byte in comparable fields
    async fn set(&self, collection: &str, id: &str, doc: Document) -> Result<Document>;

    /// Remove a document. Deleting an absent document is a success.
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_round_trip() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Payload {
            title: String,
            count: u32,
        }

        let payload = Payload {
            title: "hello".to_string(),
            count: 3,
        };
        let doc = Document::from_record("abc", &payload).unwrap();
        assert_eq!(doc.id, "abc");
        assert_eq!(doc.fields["title"], "hello");

        let back: Payload = doc.into_record().unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_into_record_reports_document_id() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Strict {
            required: String,
        }

        let doc = Document {
            id: "broken-1".to_string(),
            fields: json!({"other": 1}),
        };
        let err = doc.into_record::<Strict>().unwrap_err();
        assert!(err.to_string().contains("broken-1"));
    }

    #[test]
    fn test_filter_matches() {
        let filter = QueryFilter::new().field_eq("userId", "user-1");
        assert!(filter.matches(&json!({"userId": "user-1", "title": "x"})));
        assert!(!filter.matches(&json!({"userId": "user-2"})));
        assert!(!filter.matches(&json!({"title": "x"})));
        assert!(QueryFilter::new().matches(&json!({"anything": true})));
    }
}
