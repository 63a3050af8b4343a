use crate::model::{Document, DocumentType, Id, Revision};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A document paired with the revision token it was read at. The token must
/// be handed back, unmodified, on the next write of that document.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub rev: Revision,
    pub doc: T,
}

/// Acknowledgment of a successful write.
#[derive(Debug, Clone, PartialEq)]
pub struct PutReceipt {
    pub id: Id,
    pub rev: Revision,
}

/// Provider-level query filter for `all_docs`. Installations of a project are
/// listed by combining the type filter with the project's `children` ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentFilter {
    pub doc_type: Option<DocumentType>,
    pub ids: Option<Vec<Id>>,
}

impl DocumentFilter {
    pub fn of_type(doc_type: DocumentType) -> Self {
        Self {
            doc_type: Some(doc_type),
            ids: None,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(doc_type) = self.doc_type {
            if doc.doc_type != doc_type {
                return false;
            }
        }
        if let Some(ids) = &self.ids {
            if !ids.contains(&doc.id) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The one expected-in-normal-operation error: the supplied revision is
    /// stale. Never retried automatically here — resolving it takes a
    /// user-visible merge/overwrite decision.
    #[error("revision conflict on document '{id}': supplied {supplied:?}, current {current}")]
    Conflict {
        id: Id,
        supplied: Option<Revision>,
        current: Revision,
    },
    #[error("document '{0}' not found")]
    NotFound(Id),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// The narrow contract this core consumes from the underlying embedded store:
/// an opaque key/value document store with optimistic per-document
/// concurrency and single-document write atomicity. Nothing here spans more
/// than one document.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: &Id) -> Result<Option<Versioned<Document>>, StoreError>;
    /// Write a document. `rev` is `None` for a brand-new document and the
    /// last-seen token otherwise; a stale token fails with [`StoreError::Conflict`].
    async fn put(&self, doc: Document, rev: Option<Revision>) -> Result<PutReceipt, StoreError>;
    async fn delete(&self, id: &Id, rev: Revision) -> Result<bool, StoreError>;
    async fn all_docs(
        &self,
        filter: Option<DocumentFilter>,
    ) -> Result<Vec<Versioned<Document>>, StoreError>;
}

/// Completion record for a named migration, appended only after the migration
/// function returned successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationLogEntry {
    pub migration_name: String,
    pub completed_at: DateTime<Utc>,
}

/// Second, independent store instance used only for migration completion
/// records. Append-only: completed entries are never rewritten.
#[async_trait::async_trait]
pub trait MigrationLogStore: Send + Sync {
    async fn completion(&self, migration_name: &str) -> Result<Option<MigrationLogEntry>, StoreError>;
    async fn append_completion(&self, entry: MigrationLogEntry) -> Result<(), StoreError>;
}
