//! In-memory remote store for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

use caresync_common::{Error, Result};

use crate::provider::{Document, QueryFilter, RemoteStore};

/// Kind of failure an injected fault produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Transient connectivity failure.
    Network,
    /// Permanent quota/permission rejection.
    QuotaOrPermission,
}

impl FaultKind {
    fn to_error(self, context: &str) -> Error {
        match self {
            FaultKind::Network => Error::Network(format!("injected fault: {}", context)),
            FaultKind::QuotaOrPermission => {
                Error::QuotaOrPermission(format!("injected fault: {}", context))
            }
        }
    }
}

#[derive(Default)]
struct Faults {
    /// (collection, id) -> fault raised on `set`.
    set: HashMap<(String, String), FaultKind>,
    /// collection -> fault raised on `fetch_all`.
    fetch_all: HashMap<String, FaultKind>,
}

/// In-memory remote store.
///
/// Useful for testing and local smoke runs. All data is stored in memory
/// and lost on drop. Faults can be injected per collection and document to
/// exercise the engine's failure containment.
#[derive(Default)]
pub struct MemoryRemote {
    collections: RwLock<HashMap<String, HashMap<String, Document>>>,
    faults: RwLock<Faults>,
}

impl MemoryRemote {
    /// Create a new empty memory remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `set(collection, id, ..)` fail until the fault is cleared.
    pub fn fail_set(&self, collection: &str, id: &str, kind: FaultKind) {
        self.faults
            .write()
            .unwrap()
            .set
            .insert((collection.to_string(), id.to_string()), kind);
    }

    /// Make `fetch_all(collection, ..)` fail until the fault is cleared.
    pub fn fail_fetch_all(&self, collection: &str, kind: FaultKind) {
        self.faults
            .write()
            .unwrap()
            .fetch_all
            .insert(collection.to_string(), kind);
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        let mut faults = self.faults.write().unwrap();
        faults.set.clear();
        faults.fetch_all.clear();
    }

    /// Seed a document directly, bypassing faults (test setup).
    pub fn seed(&self, collection: &str, doc: Document) {
        self.collections
            .write()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .insert(doc.id.clone(), doc);
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .unwrap()
            .get(collection)
            .map_or(0, |c| c.len())
    }

    /// Whether a collection holds no documents.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_all(&self, collection: &str, filter: &QueryFilter) -> Result<Vec<Document>> {
        if let Some(kind) = self.faults.read().unwrap().fetch_all.get(collection) {
            return Err(kind.to_error(&format!("fetch_all {}", collection)));
        }

        let collections = self.collections.read().unwrap();
        let docs = collections
            .get(collection)
            .map(|c| {
                c.values()
                    .filter(|doc| filter.matches(&doc.fields))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(docs)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let collections = self.collections.read().unwrap();
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned())
    }

    async fn set(&self, collection: &str, id: &str, doc: Document) -> Result<Document> {
        let key = (collection.to_string(), id.to_string());
        if let Some(kind) = self.faults.read().unwrap().set.get(&key) {
            return Err(kind.to_error(&format!("set {}/{}", collection, id)));
        }

        debug!("memory set {}/{}", collection, id);
        self.collections
            .write()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc.clone());
        Ok(doc)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut collections = self.collections.write().unwrap();
        if let Some(c) = collections.get_mut(collection) {
            c.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, user: &str) -> Document {
        Document {
            id: id.to_string(),
            fields: json!({"userId": user, "title": format!("title-{}", id)}),
        }
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let remote = MemoryRemote::new();
        remote
            .set("notifications", "a", doc("a", "user-1"))
            .await
            .unwrap();

        let fetched = remote.get("notifications", "a").await.unwrap().unwrap();
        assert_eq!(fetched.fields["title"], "title-a");
        assert!(remote.get("notifications", "zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_all_applies_filter() {
        let remote = MemoryRemote::new();
        remote.seed("notifications", doc("a", "user-1"));
        remote.seed("notifications", doc("b", "user-2"));
        remote.seed("notifications", doc("c", "user-1"));

        let filter = QueryFilter::new().field_eq("userId", "user-1");
        let docs = remote.fetch_all("notifications", &filter).await.unwrap();
        assert_eq!(docs.len(), 2);

        let all = remote
            .fetch_all("notifications", &QueryFilter::new())
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let remote = MemoryRemote::new();
        remote.seed("notifications", doc("a", "user-1"));

        remote.delete("notifications", "a").await.unwrap();
        assert!(remote.is_empty("notifications"));
        // Absent document deletes are still a success.
        remote.delete("notifications", "a").await.unwrap();
        remote.delete("nothing", "a").await.unwrap();
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let remote = MemoryRemote::new();
        remote.seed("notifications", doc("a", "user-1"));

        let replacement = Document {
            id: "a".to_string(),
            fields: json!({"userId": "user-1", "title": "replaced"}),
        };
        remote
            .set("notifications", "a", replacement)
            .await
            .unwrap();

        assert_eq!(remote.len("notifications"), 1);
        let fetched = remote.get("notifications", "a").await.unwrap().unwrap();
        assert_eq!(fetched.fields["title"], "replaced");
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let remote = MemoryRemote::new();
        remote.fail_set("notifications", "a", FaultKind::Network);
        remote.fail_fetch_all("client_history", FaultKind::QuotaOrPermission);

        let err = remote
            .set("notifications", "a", doc("a", "user-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)));

        // Other documents are unaffected.
        remote
            .set("notifications", "b", doc("b", "user-1"))
            .await
            .unwrap();

        let err = remote
            .fetch_all("client_history", &QueryFilter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QuotaOrPermission(_)));

        remote.clear_faults();
        remote
            .set("notifications", "a", doc("a", "user-1"))
            .await
            .unwrap();
    }
}
