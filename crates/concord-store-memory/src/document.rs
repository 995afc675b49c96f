//! [`MemoryDocumentStore`]: the in-process document collection.

use std::{
  collections::{BTreeMap, BTreeSet},
  path::Path,
};

use concord_core::{
  document::Document,
  operation::{DocumentOp, OpOutput, StoreKind},
  store::StoreAdapter,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  staged::{DEFAULT_MAX_SESSIONS, StagedSession, StagedState, StagedStore},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentState {
  documents: BTreeMap<Uuid, Document>,
}

impl DocumentState {
  pub fn len(&self) -> usize { self.documents.len() }

  pub fn is_empty(&self) -> bool { self.documents.is_empty() }

  pub fn get(&self, document_id: Uuid) -> Option<&Document> { self.documents.get(&document_id) }
}

impl StagedState for DocumentState {
  type Op = DocumentOp;

  fn is_read(op: &DocumentOp) -> bool { op.is_read() }

  fn read(&self, op: &DocumentOp) -> Result<OpOutput> {
    match op {
      DocumentOp::FindByConcept(concept_id) => {
        let mut docs: Vec<Document> = self
          .documents
          .values()
          .filter(|d| d.concept_id == *concept_id)
          .cloned()
          .collect();
        docs.sort_by_key(|d| (d.created_at, d.document_id));
        Ok(OpOutput::Documents(docs))
      }
      DocumentOp::ListConceptIds => {
        let ids: BTreeSet<Uuid> = self.documents.values().map(|d| d.concept_id).collect();
        Ok(OpOutput::ConceptIds(ids.into_iter().collect()))
      }
      // A write against a shared read view is evaluated as a dry run.
      other => self.clone().write(other),
    }
  }

  fn write(&mut self, op: &DocumentOp) -> Result<OpOutput> {
    let affected = match op {
      DocumentOp::InsertMany(docs) => {
        let mut seen = BTreeSet::new();
        for doc in docs {
          if self.documents.contains_key(&doc.document_id) || !seen.insert(doc.document_id) {
            return Err(Error::DuplicateDocument(doc.document_id));
          }
        }
        for doc in docs {
          self.documents.insert(doc.document_id, doc.clone());
        }
        docs.len()
      }
      DocumentOp::Patch { concept_id, patch, at } => {
        let doc = self
          .documents
          .get_mut(&patch.document_id)
          .filter(|d| d.concept_id == *concept_id)
          .ok_or(Error::DocumentNotFound {
            concept_id:  *concept_id,
            document_id: patch.document_id,
          })?;
        patch.apply_to(doc, *at);
        1
      }
      DocumentOp::DeleteByConcept(concept_id) => {
        let before = self.documents.len();
        self.documents.retain(|_, d| d.concept_id != *concept_id);
        before - self.documents.len()
      }
      read => return self.read(read),
    };
    Ok(OpOutput::Affected(affected))
  }
}

pub type DocumentSession = StagedSession<DocumentState>;

/// The document store. Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct MemoryDocumentStore {
  inner: StagedStore<DocumentState>,
}

impl Default for MemoryDocumentStore {
  fn default() -> Self { Self::new() }
}

impl MemoryDocumentStore {
  pub fn new() -> Self { Self { inner: StagedStore::in_memory(DEFAULT_MAX_SESSIONS) } }

  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let inner = StagedStore::open(path.as_ref(), DEFAULT_MAX_SESSIONS).await?;
    tracing::debug!(path = %path.as_ref().display(), "opened document store");
    Ok(Self { inner })
  }

  pub fn close_pool(&self) { self.inner.close_pool(); }

  pub fn available_sessions(&self) -> usize { self.inner.available_sessions() }

  pub async fn inspect<R>(&self, f: impl FnOnce(&DocumentState) -> R) -> R {
    self.inner.inspect(f).await
  }
}

impl StoreAdapter for MemoryDocumentStore {
  type Session = DocumentSession;
  type Op = DocumentOp;
  type Error = Error;

  fn kind(&self) -> StoreKind { StoreKind::Document }

  async fn open_session(&self) -> Result<DocumentSession> {
    let session = self.inner.open_session().await?;
    tracing::debug!(session = %session.id(), "document session opened");
    Ok(session)
  }

  async fn execute(&self, session: &mut DocumentSession, op: DocumentOp) -> Result<OpOutput> {
    self.inner.execute(session, op)
  }

  async fn commit(&self, session: DocumentSession) -> Result<()> {
    let id = session.id();
    let applied = self.inner.commit(session).await?;
    tracing::debug!(session = %id, applied, "document session committed");
    Ok(())
  }

  async fn rollback(&self, session: DocumentSession) -> Result<()> {
    tracing::debug!(
      session = %session.id(),
      discarded = session.pending_writes(),
      "document session rolled back"
    );
    Ok(())
  }

  async fn query(&self, op: DocumentOp) -> Result<OpOutput> { self.inner.query(op).await }
}
