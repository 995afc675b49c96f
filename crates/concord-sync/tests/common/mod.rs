//! Shared harness: SQLite relational store, in-memory graph and document
//! stores, each behind a fault-injecting wrapper.

#![allow(dead_code)]

use std::sync::Arc;

use concord_core::{
  concept::{Concept, NewConcept},
  document::{Document, DocumentDraft},
  event::SyncEvent,
  graph::{Category, CategoryDraft, ConceptNode, GraphDraft, RelationshipDraft},
  operation::{DocumentOp, GraphOp, RelationalOp, StoreKind, StoreOperation},
};
use concord_store_memory::{MemoryCache, MemoryDocumentStore, MemoryGraphStore};
use concord_store_sqlite::SqliteStore;
use concord_sync::{
  CacheConfig, ConceptCache, Coordinator, CoordinatorConfig, Synchronizer, Validator,
  ValidatorConfig,
  testkit::{FaultyStore, Faults},
};
use tempfile::TempDir;
use tokio::sync::broadcast;
use uuid::Uuid;

pub type Relational = FaultyStore<SqliteStore>;
pub type Graph = FaultyStore<MemoryGraphStore>;
pub type Documents = FaultyStore<MemoryDocumentStore>;
pub type TestCoordinator = Coordinator<Relational, Graph, Documents>;

pub struct Harness {
  pub coordinator: Arc<TestCoordinator>,
  pub cache:       Arc<ConceptCache<MemoryCache>>,
  pub sync:        Synchronizer<Relational, Graph, Documents, MemoryCache>,
  pub validator:   Validator<Relational, Graph, Documents, MemoryCache>,
  pub relational:  Faults,
  pub graph:       Faults,
  pub documents:   Faults,
  _dir:            TempDir,
}

pub async fn harness() -> Harness { harness_with(CoordinatorConfig::default()).await }

pub async fn harness_with(config: CoordinatorConfig) -> Harness {
  let dir = tempfile::tempdir().expect("tempdir");
  let sqlite = SqliteStore::open(dir.path().join("concord.db")).await.expect("sqlite store");

  let relational = FaultyStore::new(sqlite);
  let graph = FaultyStore::new(MemoryGraphStore::new());
  let documents = FaultyStore::new(MemoryDocumentStore::new());
  let (relational_faults, graph_faults, document_faults) =
    (relational.faults(), graph.faults(), documents.faults());

  let coordinator =
    Arc::new(Coordinator::new(relational, graph, documents, config).expect("coordinator"));
  let cache = Arc::new(ConceptCache::new(MemoryCache::new(), CacheConfig::default()));
  let sync = Synchronizer::new(coordinator.clone(), cache.clone());
  let validator = Validator::new(coordinator.clone(), cache.clone(), ValidatorConfig::default());

  Harness {
    coordinator,
    cache,
    sync,
    validator,
    relational: relational_faults,
    graph: graph_faults,
    documents: document_faults,
    _dir: dir,
  }
}

// ─── Payloads ────────────────────────────────────────────────────────────────

pub struct Payload {
  pub metadata:  NewConcept,
  pub graph:     GraphDraft,
  pub documents: Vec<DocumentDraft>,
}

/// Two categories joined by one relationship, and one document filed under
/// the first category.
pub fn payload(name: &str) -> Payload {
  let premise = CategoryDraft::new("Premise");
  let conclusion = CategoryDraft::new("Conclusion");
  let relationship = RelationshipDraft {
    source_id: premise.category_id,
    target_id: conclusion.category_id,
    relation:  "supports".into(),
    weight:    0.8,
  };
  let document = DocumentDraft {
    title:        format!("{name} notes"),
    content:      "First draft.".into(),
    category_ids: vec![premise.category_id],
  };
  Payload {
    metadata:  NewConcept::new(Uuid::new_v4(), name),
    graph:     GraphDraft {
      categories:    vec![premise, conclusion],
      relationships: vec![relationship],
    },
    documents: vec![document],
  }
}

pub async fn create(h: &Harness, p: Payload) -> Uuid {
  h.sync.create(p.metadata, p.graph, p.documents).await.expect("create concept")
}

// ─── Direct store access ─────────────────────────────────────────────────────

pub async fn concept(h: &Harness, id: Uuid) -> Option<Concept> {
  h.coordinator
    .query(RelationalOp::GetConcept(id))
    .await
    .unwrap()
    .into_concept(StoreKind::Relational)
    .unwrap()
}

pub async fn node(h: &Harness, id: Uuid) -> Option<ConceptNode> {
  h.coordinator
    .query(GraphOp::GetConceptNode(id))
    .await
    .unwrap()
    .into_concept_node(StoreKind::Graph)
    .unwrap()
}

pub async fn categories(h: &Harness, id: Uuid) -> Vec<Category> {
  h.coordinator
    .query(GraphOp::ListCategories(id))
    .await
    .unwrap()
    .into_categories(StoreKind::Graph)
    .unwrap()
}

pub async fn documents(h: &Harness, id: Uuid) -> Vec<Document> {
  h.coordinator
    .query(DocumentOp::FindByConcept(id))
    .await
    .unwrap()
    .into_documents(StoreKind::Document)
    .unwrap()
}

pub async fn concept_ids(h: &Harness, store: StoreKind) -> Vec<Uuid> {
  let op: StoreOperation = match store {
    StoreKind::Relational => RelationalOp::ListConceptIds.into(),
    StoreKind::Graph => GraphOp::ListConceptIds.into(),
    StoreKind::Document => DocumentOp::ListConceptIds.into(),
  };
  h.coordinator.query(op).await.unwrap().into_concept_ids(store).unwrap()
}

/// Apply `op` to one store behind the synchronizer's back.
pub async fn tamper(h: &Harness, op: impl Into<StoreOperation>) {
  let op = op.into();
  let tx = h.coordinator.begin(&[op.kind()]).await.unwrap();
  h.coordinator.run(tx, op).await.unwrap();
  h.coordinator.commit(tx).await.unwrap();
}

/// Every event already published to `rx`.
pub fn drain(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }
  events
}
