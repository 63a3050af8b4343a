use crate::model::{generate_id, Document, Id, Revision};
use crate::store::traits::{
    DocumentFilter, DocumentStore, MigrationLogEntry, MigrationLogStore, PutReceipt, StoreError,
    Versioned,
};
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// In-memory document store with optimistic per-document concurrency.
/// Injected wherever a store handle is needed; tests build their own instance
/// instead of sharing module-level state.
#[derive(Debug)]
pub struct MemoryDocumentStore {
    name: String,
    docs: RwLock<HashMap<Id, (Revision, Document)>>,
    seq: AtomicU64,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::named("documents")
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            docs: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    fn next_revision(&self) -> Revision {
        // seq gives strict per-store ordering, the uuid fragment keeps tokens
        // from colliding across store instances.
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let entropy = generate_id();
        Revision::new(format!("{}-{}", seq, &entropy[..8]))
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, id: &Id) -> Result<Option<Versioned<Document>>, StoreError> {
        let docs = self.docs.read().await;
        Ok(docs.get(id).map(|(rev, doc)| Versioned {
            rev: rev.clone(),
            doc: doc.clone(),
        }))
    }

    async fn put(&self, doc: Document, rev: Option<Revision>) -> Result<PutReceipt, StoreError> {
        let mut docs = self.docs.write().await;
        match (docs.get(&doc.id), rev) {
            // Update of an existing document: token must match exactly.
            (Some((current, _)), Some(supplied)) if *current != supplied => {
                return Err(StoreError::Conflict {
                    id: doc.id.clone(),
                    supplied: Some(supplied),
                    current: current.clone(),
                });
            }
            // Create colliding with an existing document.
            (Some((current, _)), None) => {
                return Err(StoreError::Conflict {
                    id: doc.id.clone(),
                    supplied: None,
                    current: current.clone(),
                });
            }
            // Update of a document that no longer exists.
            (None, Some(_)) => return Err(StoreError::NotFound(doc.id.clone())),
            _ => {}
        }

        let next = self.next_revision();
        let receipt = PutReceipt {
            id: doc.id.clone(),
            rev: next.clone(),
        };
        debug!("{}: put '{}' at rev {}", self.name, doc.id, next);
        docs.insert(doc.id.clone(), (next, doc));
        Ok(receipt)
    }

    async fn delete(&self, id: &Id, rev: Revision) -> Result<bool, StoreError> {
        let mut docs = self.docs.write().await;
        match docs.get(id) {
            Some((current, _)) if *current != rev => Err(StoreError::Conflict {
                id: id.clone(),
                supplied: Some(rev),
                current: current.clone(),
            }),
            Some(_) => {
                docs.remove(id);
                debug!("{}: deleted '{}'", self.name, id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn all_docs(
        &self,
        filter: Option<DocumentFilter>,
    ) -> Result<Vec<Versioned<Document>>, StoreError> {
        let docs = self.docs.read().await;
        let mut matched: Vec<Versioned<Document>> = docs
            .values()
            .filter(|(_, doc)| filter.as_ref().map_or(true, |f| f.matches(doc)))
            .map(|(rev, doc)| Versioned {
                rev: rev.clone(),
                doc: doc.clone(),
            })
            .collect();
        // HashMap iteration order is arbitrary; keep listings stable.
        matched.sort_by(|a, b| a.doc.id.cmp(&b.doc.id));
        Ok(matched)
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory migration log: an append-only list with point lookup by name.
#[derive(Debug)]
pub struct MemoryMigrationLog {
    name: String,
    entries: RwLock<Vec<MigrationLogEntry>>,
}

impl MemoryMigrationLog {
    pub fn new() -> Self {
        Self::named("migration-log")
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryMigrationLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MigrationLogStore for MemoryMigrationLog {
    async fn completion(
        &self,
        migration_name: &str,
    ) -> Result<Option<MigrationLogEntry>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .find(|entry| entry.migration_name == migration_name)
            .cloned())
    }

    async fn append_completion(&self, entry: MigrationLogEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        debug!("{}: '{}' completed", self.name, entry.migration_name);
        entries.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DocumentType;
    use chrono::Utc;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = MemoryDocumentStore::new();
        let doc = Document::new_project_with_id("proj-1".to_string(), "p");

        let receipt = store.put(doc.clone(), None).await.unwrap();
        assert_eq!(receipt.id, "proj-1");

        let fetched = store.get(&"proj-1".to_string()).await.unwrap().unwrap();
        assert_eq!(fetched.rev, receipt.rev);
        assert_eq!(fetched.doc, doc);
    }

    #[tokio::test]
    async fn test_stale_revision_conflicts() {
        let store = MemoryDocumentStore::new();
        let doc = Document::new_project_with_id("proj-1".to_string(), "p");
        let first = store.put(doc.clone(), None).await.unwrap();

        // Writer A updates at the current revision.
        let second = store.put(doc.clone(), Some(first.rev.clone())).await.unwrap();
        assert_ne!(second.rev, first.rev);

        // Writer B still holds the old token and must be rejected.
        let err = store.put(doc.clone(), Some(first.rev)).await.unwrap_err();
        match err {
            StoreError::Conflict { id, current, .. } => {
                assert_eq!(id, "proj-1");
                assert_eq!(current, second.rev);
            }
            other => panic!("expected conflict, got {:?}", other),
        }

        // Create against an existing id conflicts too.
        assert!(matches!(
            store.put(doc, None).await,
            Err(StoreError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_put_with_rev_for_missing_document() {
        let store = MemoryDocumentStore::new();
        let doc = Document::new_project_with_id("ghost".to_string(), "p");
        let err = store
            .put(doc, Some(Revision::new("1-deadbeef")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_delete_checks_revision() {
        let store = MemoryDocumentStore::new();
        let doc = Document::new_project_with_id("proj-1".to_string(), "p");
        let receipt = store.put(doc, None).await.unwrap();

        assert!(matches!(
            store
                .delete(&"proj-1".to_string(), Revision::new("0-stale"))
                .await,
            Err(StoreError::Conflict { .. })
        ));
        assert!(store.delete(&"proj-1".to_string(), receipt.rev.clone()).await.unwrap());
        assert!(!store.delete(&"proj-1".to_string(), receipt.rev).await.unwrap());
    }

    #[tokio::test]
    async fn test_all_docs_filters_by_type_and_ids() {
        let store = MemoryDocumentStore::new();
        store
            .put(Document::new_project_with_id("proj-1".to_string(), "a"), None)
            .await
            .unwrap();
        store
            .put(
                Document::new_installation_with_id(
                    "inst-1".to_string(),
                    "a",
                    "combustion_safety",
                    "Combustion Safety",
                ),
                None,
            )
            .await
            .unwrap();

        let projects = store
            .all_docs(Some(DocumentFilter::of_type(DocumentType::Project)))
            .await
            .unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].doc.id, "proj-1");

        let by_ids = store
            .all_docs(Some(DocumentFilter {
                doc_type: Some(DocumentType::Installation),
                ids: Some(vec!["inst-1".to_string(), "inst-2".to_string()]),
            }))
            .await
            .unwrap();
        assert_eq!(by_ids.len(), 1);
        assert_eq!(by_ids[0].doc.id, "inst-1");

        let everything = store.all_docs(None).await.unwrap();
        assert_eq!(everything.len(), 2);
    }

    #[tokio::test]
    async fn test_migration_log_point_lookup() {
        let log = MemoryMigrationLog::new();
        assert!(log.completion("m1").await.unwrap().is_none());

        log.append_completion(MigrationLogEntry {
            migration_name: "m1".to_string(),
            completed_at: Utc::now(),
        })
        .await
        .unwrap();

        assert!(log.completion("m1").await.unwrap().is_some());
        assert!(log.completion("m2").await.unwrap().is_none());
    }
}
