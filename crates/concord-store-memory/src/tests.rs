//! Tests for the in-process graph store, document store, and cache.

use std::time::Duration;

use chrono::Utc;
use concord_core::{
  document::{Document, DocumentPatch},
  graph::{Category, CategoryPatch, ConceptNode, Relationship},
  operation::{DocumentOp, GraphOp, OpOutput, StoreKind},
  store::{CacheStore, StoreAdapter},
};
use uuid::Uuid;

use crate::{Error, MemoryCache, MemoryDocumentStore, MemoryGraphStore};

fn node(concept_id: Uuid, name: &str) -> ConceptNode {
  ConceptNode {
    concept_id,
    name: name.into(),
    description: String::new(),
    created_at: Utc::now(),
  }
}

fn category(concept_id: Uuid, name: &str) -> Category {
  Category {
    category_id: Uuid::new_v4(),
    concept_id,
    name: name.into(),
    description: String::new(),
  }
}

fn edge(concept_id: Uuid, source: &Category, target: &Category) -> Relationship {
  Relationship {
    relationship_id: Uuid::new_v4(),
    concept_id,
    source_id: source.category_id,
    target_id: target.category_id,
    relation: "supports".into(),
    weight: 0.75,
  }
}

fn document(concept_id: Uuid, category_ids: Vec<Uuid>) -> Document {
  let now = Utc::now();
  Document {
    document_id: Uuid::new_v4(),
    concept_id,
    title: "Thesis".into(),
    content: "...".into(),
    category_ids,
    created_at: now,
    updated_at: now,
  }
}

/// A committed concept graph with two categories and one edge.
async fn seeded_graph() -> (MemoryGraphStore, Uuid, Category, Category) {
  let g = MemoryGraphStore::new();
  let id = Uuid::new_v4();
  let a = category(id, "a");
  let b = category(id, "b");
  g.query(GraphOp::CreateConceptGraph {
    node:       node(id, "Concept"),
    categories: vec![a.clone(), b.clone()],
  })
  .await
  .unwrap();
  g.query(GraphOp::CreateRelationship(edge(id, &a, &b)))
    .await
    .unwrap();
  (g, id, a, b)
}

// ─── Graph sessions ──────────────────────────────────────────────────────────

#[tokio::test]
async fn graph_writes_stay_private_until_commit() {
  let g = MemoryGraphStore::new();
  let id = Uuid::new_v4();

  let mut session = g.open_session().await.unwrap();
  let out = g
    .execute(&mut session, GraphOp::CreateConceptGraph {
      node:       node(id, "Staged"),
      categories: vec![category(id, "x")],
    })
    .await
    .unwrap();
  assert_eq!(out, OpOutput::Affected(2));

  let visible = g
    .query(GraphOp::GetConceptNode(id))
    .await
    .unwrap()
    .into_concept_node(StoreKind::Graph)
    .unwrap();
  assert!(visible.is_none());

  g.commit(session).await.unwrap();
  let categories = g
    .query(GraphOp::ListCategories(id))
    .await
    .unwrap()
    .into_categories(StoreKind::Graph)
    .unwrap();
  assert_eq!(categories.len(), 1);
  assert_eq!(g.inspect(|s| s.edge_count()).await, 1);
}

#[tokio::test]
async fn graph_rollback_discards_and_releases_permit() {
  let g = MemoryGraphStore::new();
  let before = g.available_sessions();
  let id = Uuid::new_v4();

  let mut session = g.open_session().await.unwrap();
  assert_eq!(g.available_sessions(), before - 1);
  g.execute(&mut session, GraphOp::UpsertConceptNode(node(id, "gone")))
    .await
    .unwrap();
  g.rollback(session).await.unwrap();

  assert_eq!(g.available_sessions(), before);
  assert_eq!(g.inspect(|s| s.node_count()).await, 0);
}

#[tokio::test]
async fn relationship_requires_categories_of_same_concept() {
  let (g, id, a, _) = seeded_graph().await;
  let other = Uuid::new_v4();
  let foreign = category(other, "foreign");
  g.query(GraphOp::CreateConceptGraph {
    node:       node(other, "Other"),
    categories: vec![foreign.clone()],
  })
  .await
  .unwrap();

  let err = g
    .query(GraphOp::CreateRelationship(edge(id, &a, &foreign)))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::CategoryNotFound { category_id, .. } if category_id == foreign.category_id));
}

#[tokio::test]
async fn non_finite_weight_rejected() {
  let (g, id, a, b) = seeded_graph().await;
  let mut rel = edge(id, &a, &b);
  rel.weight = f64::NAN;
  let err = g.query(GraphOp::CreateRelationship(rel)).await.unwrap_err();
  assert!(matches!(err, Error::InvalidWeight(_)));
}

#[tokio::test]
async fn duplicate_concept_graph_rejected() {
  let (g, id, ..) = seeded_graph().await;
  let err = g
    .query(GraphOp::CreateConceptGraph { node: node(id, "again"), categories: vec![] })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DuplicateNode(_)));
}

#[tokio::test]
async fn commit_replay_conflict_applies_nothing() {
  let (g, id, a, _) = seeded_graph().await;

  // Session stages a category patch, then the concept is deleted underneath it.
  let mut session = g.open_session().await.unwrap();
  g.execute(&mut session, GraphOp::PatchCategory {
    concept_id: id,
    patch:      CategoryPatch {
      category_id: a.category_id,
      name:        Some("renamed".into()),
      description: None,
    },
  })
  .await
  .unwrap();
  g.execute(&mut session, GraphOp::UpsertConceptNode(node(Uuid::new_v4(), "side")))
    .await
    .unwrap();
  g.query(GraphOp::DeleteConceptGraph(id)).await.unwrap();

  let err = g.commit(session).await.unwrap_err();
  assert!(matches!(err, Error::CategoryNotFound { .. }));
  assert_eq!(g.inspect(|s| s.node_count()).await, 0);
}

#[tokio::test]
async fn detach_delete_removes_subtree() {
  let (g, id, ..) = seeded_graph().await;
  let out = g.query(GraphOp::DeleteConceptGraph(id)).await.unwrap();
  // 1 concept + 2 categories + 2 INCLUDES + 1 RELATED_TO
  assert_eq!(out, OpOutput::Affected(6));
  assert_eq!(g.inspect(|s| s.node_count() + s.edge_count()).await, 0);

  let again = g.query(GraphOp::DeleteConceptGraph(id)).await.unwrap();
  assert_eq!(again, OpOutput::Affected(0));
}

#[tokio::test]
async fn patch_concept_node_updates_display_fields() {
  let (g, id, ..) = seeded_graph().await;
  g.query(GraphOp::PatchConceptNode {
    concept_id:  id,
    name:        None,
    description: Some("new description".into()),
  })
  .await
  .unwrap();

  let n = g
    .query(GraphOp::GetConceptNode(id))
    .await
    .unwrap()
    .into_concept_node(StoreKind::Graph)
    .unwrap()
    .unwrap();
  assert_eq!(n.name, "Concept");
  assert_eq!(n.description, "new description");
}

#[tokio::test]
async fn graph_snapshot_survives_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("graph.json");
  let id = Uuid::new_v4();
  {
    let g = MemoryGraphStore::open(&path).await.unwrap();
    let mut session = g.open_session().await.unwrap();
    g.execute(&mut session, GraphOp::CreateConceptGraph {
      node:       node(id, "Persisted"),
      categories: vec![category(id, "c")],
    })
    .await
    .unwrap();
    g.commit(session).await.unwrap();
  }

  let g = MemoryGraphStore::open(&path).await.unwrap();
  let ids = g
    .query(GraphOp::ListConceptIds)
    .await
    .unwrap()
    .into_concept_ids(StoreKind::Graph)
    .unwrap();
  assert_eq!(ids, vec![id]);
}

#[tokio::test]
async fn closed_graph_pool_refuses_sessions() {
  let g = MemoryGraphStore::new();
  g.close_pool();
  assert!(matches!(g.open_session().await, Err(Error::PoolClosed)));
}

// ─── Documents ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn documents_insert_find_and_delete_by_concept() {
  let d = MemoryDocumentStore::new();
  let id = Uuid::new_v4();
  let other = Uuid::new_v4();

  let mut session = d.open_session().await.unwrap();
  d.execute(&mut session, DocumentOp::InsertMany(vec![
    document(id, vec![]),
    document(id, vec![]),
    document(other, vec![]),
  ]))
  .await
  .unwrap();
  d.commit(session).await.unwrap();

  let found = d
    .query(DocumentOp::FindByConcept(id))
    .await
    .unwrap()
    .into_documents(StoreKind::Document)
    .unwrap();
  assert_eq!(found.len(), 2);

  let removed = d.query(DocumentOp::DeleteByConcept(id)).await.unwrap();
  assert_eq!(removed, OpOutput::Affected(2));
  assert_eq!(d.inspect(|s| s.len()).await, 1);
}

#[tokio::test]
async fn duplicate_document_batch_rejected_whole() {
  let d = MemoryDocumentStore::new();
  let id = Uuid::new_v4();
  let doc = document(id, vec![]);

  let err = d
    .query(DocumentOp::InsertMany(vec![doc.clone(), document(id, vec![]), doc]))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DuplicateDocument(_)));
  assert!(d.inspect(|s| s.is_empty()).await);
}

#[tokio::test]
async fn document_patch_scoped_to_concept() {
  let d = MemoryDocumentStore::new();
  let id = Uuid::new_v4();
  let doc = document(id, vec![]);
  d.query(DocumentOp::InsertMany(vec![doc.clone()])).await.unwrap();

  let patch = DocumentPatch {
    document_id: doc.document_id,
    title: Some("Revised".into()),
    ..Default::default()
  };

  let err = d
    .query(DocumentOp::Patch { concept_id: Uuid::new_v4(), patch: patch.clone(), at: Utc::now() })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DocumentNotFound { .. }));

  d.query(DocumentOp::Patch { concept_id: id, patch, at: Utc::now() })
    .await
    .unwrap();
  let title = d
    .inspect(|s| s.get(doc.document_id).map(|d| d.title.clone()))
    .await;
  assert_eq!(title.as_deref(), Some("Revised"));
}

// ─── Cache ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cache_set_get_delete() {
  let cache = MemoryCache::new();
  cache
    .set("concept:1".into(), "{}".into(), Duration::from_secs(60))
    .await
    .unwrap();
  assert_eq!(cache.get("concept:1").await.unwrap().as_deref(), Some("{}"));

  assert!(cache.delete("concept:1").await.unwrap());
  assert!(cache.get("concept:1").await.unwrap().is_none());
  assert!(!cache.delete("concept:1").await.unwrap());
}

#[tokio::test]
async fn cache_entries_expire() {
  let cache = MemoryCache::new();
  cache
    .set("short".into(), "v".into(), Duration::from_millis(20))
    .await
    .unwrap();
  cache
    .set("long".into(), "v".into(), Duration::from_secs(60))
    .await
    .unwrap();

  tokio::time::sleep(Duration::from_millis(60)).await;

  assert!(cache.get("short").await.unwrap().is_none());
  assert_eq!(cache.len(), 1);
  assert_eq!(cache.purge_expired(), 0);
  assert!(cache.get("long").await.unwrap().is_some());
}
