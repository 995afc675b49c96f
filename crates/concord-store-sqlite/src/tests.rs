//! Integration tests for `SqliteStore` against a temporary database file.

use chrono::Utc;
use concord_core::{
  concept::{Concept, ConceptPatch, NewConcept},
  operation::{OpOutput, RelationalOp, StoreKind},
  store::StoreAdapter,
};
use tempfile::TempDir;
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> (SqliteStore, TempDir) {
  let dir = tempfile::tempdir().expect("tempdir");
  let store = SqliteStore::open(dir.path().join("concord.db"))
    .await
    .expect("sqlite store");
  (store, dir)
}

fn concept(name: &str) -> Concept {
  NewConcept::new(Uuid::new_v4(), name).into_concept(Uuid::new_v4(), Utc::now())
}

async fn get(s: &SqliteStore, id: Uuid) -> Option<Concept> {
  s.query(RelationalOp::GetConcept(id))
    .await
    .unwrap()
    .into_concept(StoreKind::Relational)
    .unwrap()
}

// ─── Sessions ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn committed_insert_is_visible() {
  let (s, _dir) = store().await;
  let c = concept("Entropy");

  let mut session = s.open_session().await.unwrap();
  let out = s
    .execute(&mut session, RelationalOp::InsertConcept(c.clone()))
    .await
    .unwrap();
  assert_eq!(out, OpOutput::Affected(1));

  // Not visible to the reader before commit.
  assert!(get(&s, c.concept_id).await.is_none());

  s.commit(session).await.unwrap();
  assert_eq!(get(&s, c.concept_id).await, Some(c));
}

#[tokio::test]
async fn rollback_discards_writes() {
  let (s, _dir) = store().await;
  let c = concept("Discarded");

  let mut session = s.open_session().await.unwrap();
  s.execute(&mut session, RelationalOp::InsertConcept(c.clone()))
    .await
    .unwrap();
  s.rollback(session).await.unwrap();

  assert!(get(&s, c.concept_id).await.is_none());
  assert_eq!(s.available_sessions(), crate::store::DEFAULT_MAX_SESSIONS);
}

#[tokio::test]
async fn session_reads_its_own_writes() {
  let (s, _dir) = store().await;
  let c = concept("Own writes");

  let mut session = s.open_session().await.unwrap();
  s.execute(&mut session, RelationalOp::InsertConcept(c.clone()))
    .await
    .unwrap();
  let seen = s
    .execute(&mut session, RelationalOp::GetConcept(c.concept_id))
    .await
    .unwrap()
    .into_concept(StoreKind::Relational)
    .unwrap();
  assert_eq!(seen.map(|c| c.name), Some("Own writes".to_string()));
  s.rollback(session).await.unwrap();
}

#[tokio::test]
async fn duplicate_insert_is_rejected() {
  let (s, _dir) = store().await;
  let c = concept("Twice");
  s.query(RelationalOp::InsertConcept(c.clone())).await.unwrap();

  let mut session = s.open_session().await.unwrap();
  let err = s
    .execute(&mut session, RelationalOp::InsertConcept(c))
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::Database(_)));
  s.rollback(session).await.unwrap();
}

#[tokio::test]
async fn closed_pool_refuses_sessions() {
  let (s, _dir) = store().await;
  s.close_pool();
  let err = s.open_session().await.unwrap_err();
  assert!(matches!(err, crate::Error::PoolClosed));
}

#[tokio::test]
async fn unreachable_path_fails_to_open() {
  let result = SqliteStore::open("/nonexistent/concord/dir/concord.db").await;
  assert!(result.is_err());
}

// ─── Operations ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn patch_writes_only_present_fields() {
  let (s, _dir) = store().await;
  let mut c = concept("Before");
  c.description = "kept".into();
  s.query(RelationalOp::InsertConcept(c.clone())).await.unwrap();

  let at = Utc::now();
  let patch = ConceptPatch {
    name: Some("After".into()),
    is_public: Some(true),
    ..Default::default()
  };
  s.query(RelationalOp::PatchConcept { concept_id: c.concept_id, patch, at })
    .await
    .unwrap();

  let fetched = get(&s, c.concept_id).await.unwrap();
  assert_eq!(fetched.name, "After");
  assert_eq!(fetched.description, "kept");
  assert!(fetched.is_public);
  assert!(!fetched.is_synthesis);
  assert_eq!(fetched.updated_at.timestamp_millis(), at.timestamp_millis());
}

#[tokio::test]
async fn patch_missing_concept_errors() {
  let (s, _dir) = store().await;
  let missing = Uuid::new_v4();
  let err = s
    .query(RelationalOp::PatchConcept {
      concept_id: missing,
      patch:      ConceptPatch { name: Some("x".into()), ..Default::default() },
      at:         Utc::now(),
    })
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::ConceptNotFound(id) if id == missing));
}

#[tokio::test]
async fn delete_removes_row() {
  let (s, _dir) = store().await;
  let c = concept("Doomed");
  s.query(RelationalOp::InsertConcept(c.clone())).await.unwrap();

  let out = s.query(RelationalOp::DeleteConcept(c.concept_id)).await.unwrap();
  assert_eq!(out, OpOutput::Affected(1));
  assert!(get(&s, c.concept_id).await.is_none());

  let err = s.query(RelationalOp::DeleteConcept(c.concept_id)).await.unwrap_err();
  assert!(matches!(err, crate::Error::ConceptNotFound(_)));
}

#[tokio::test]
async fn list_concept_ids_returns_all() {
  let (s, _dir) = store().await;
  let a = concept("a");
  let b = concept("b");
  s.query(RelationalOp::InsertConcept(a.clone())).await.unwrap();
  s.query(RelationalOp::InsertConcept(b.clone())).await.unwrap();

  let ids = s
    .query(RelationalOp::ListConceptIds)
    .await
    .unwrap()
    .into_concept_ids(StoreKind::Relational)
    .unwrap();
  assert_eq!(ids.len(), 2);
  assert!(ids.contains(&a.concept_id));
  assert!(ids.contains(&b.concept_id));
}

#[tokio::test]
async fn reopen_preserves_rows() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("persist.db");
  let c = concept("Durable");
  {
    let s = SqliteStore::open(&path).await.unwrap();
    s.query(RelationalOp::InsertConcept(c.clone())).await.unwrap();
  }
  let s = SqliteStore::open(&path).await.unwrap();
  assert_eq!(get(&s, c.concept_id).await, Some(c));
}
