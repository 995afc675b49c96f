//! [`Synchronizer`]: create, update, and delete concepts across all three
//! stores as one saga each.
//!
//! A saga is an ordered list of store operations executed inside a single
//! coordinator transaction. Any failure before commit rolls every store back.
//! A failure during commit may leave earlier stores committed; that case is
//! reported in the [`SyncEvent::SyncError`] event and is left for the
//! validator to detect and repair.

use std::{collections::HashSet, sync::Arc, time::Instant};

use chrono::Utc;
use concord_core::{
  concept::NewConcept,
  document::{Document, DocumentDraft},
  event::{ConceptUpdate, SyncEvent, SyncOperation, TimedOperation},
  graph::{ConceptNode, GraphDraft},
  operation::{DocumentOp, GraphOp, RelationalOp, StoreKind, StoreOperation},
  store::{CacheStore, DocumentAdapter, GraphAdapter, RelationalAdapter},
  view::ConceptView,
};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
  Error, Result,
  cache::ConceptCache,
  coordinator::Coordinator,
  transaction::CommitReport,
};

pub struct Synchronizer<R, G, D, C>
where
  R: RelationalAdapter,
  G: GraphAdapter,
  D: DocumentAdapter,
  C: CacheStore,
{
  coordinator: Arc<Coordinator<R, G, D>>,
  cache:       Arc<ConceptCache<C>>,
}

impl<R, G, D, C> Synchronizer<R, G, D, C>
where
  R: RelationalAdapter,
  G: GraphAdapter,
  D: DocumentAdapter,
  C: CacheStore,
{
  pub fn new(coordinator: Arc<Coordinator<R, G, D>>, cache: Arc<ConceptCache<C>>) -> Self {
    Self { coordinator, cache }
  }

  pub fn coordinator(&self) -> &Arc<Coordinator<R, G, D>> { &self.coordinator }

  pub fn cache(&self) -> &Arc<ConceptCache<C>> { &self.cache }

  pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> { self.coordinator.events().subscribe() }

  /// The composite view of a concept, served from the cache when possible.
  pub async fn get(&self, concept_id: Uuid) -> Result<Option<ConceptView>> {
    self.cache.get_or_load(&self.coordinator, concept_id).await
  }

  // ─── Sagas ─────────────────────────────────────────────────────────────────

  /// Create a concept with its graph and documents. Returns the new id.
  pub async fn create(
    &self,
    metadata: NewConcept,
    graph: GraphDraft,
    documents: Vec<DocumentDraft>,
  ) -> Result<Uuid> {
    validate_create(&metadata, &graph, &documents)?;

    let concept_id = Uuid::new_v4();
    let now = Utc::now();
    let concept = metadata.into_concept(concept_id, now);
    let graph = graph.into_graph(concept_id);
    let documents: Vec<Document> =
      documents.into_iter().map(|d| d.into_document(concept_id, now)).collect();

    let mut steps: Vec<StoreOperation> = vec![
      RelationalOp::InsertConcept(concept.clone()).into(),
      GraphOp::CreateConceptGraph {
        node:       ConceptNode::from_concept(&concept),
        categories: graph.categories.clone(),
      }
      .into(),
    ];
    steps.extend(graph.relationships.iter().cloned().map(|r| GraphOp::CreateRelationship(r).into()));
    if !documents.is_empty() {
      steps.push(DocumentOp::InsertMany(documents.clone()).into());
    }

    let _lease = self.coordinator.leases().acquire(concept_id).await;
    self.execute_saga(SyncOperation::Create, concept_id, steps).await?;
    self.refresh_cache(concept_id).await;
    self.coordinator.events().publish(SyncEvent::ConceptCreated { concept, graph, documents });
    Ok(concept_id)
  }

  /// Apply `update` to an existing concept. Name and description changes are
  /// mirrored onto the graph node.
  pub async fn update(&self, concept_id: Uuid, update: ConceptUpdate) -> Result<Uuid> {
    if update.is_empty() {
      return Err(Error::InvalidInput("update contains no changes".into()));
    }

    let _lease = self.coordinator.leases().acquire(concept_id).await;
    self.ensure_exists(concept_id).await?;
    let known = self.category_ids(concept_id).await?;
    validate_update(&update, &known)?;

    let at = Utc::now();
    let mut steps: Vec<StoreOperation> = Vec::new();
    if let Some(patch) = update.metadata.as_ref().filter(|p| !p.is_empty()) {
      steps.push(RelationalOp::PatchConcept { concept_id, patch: patch.clone(), at }.into());
      if patch.touches_display_fields() {
        steps.push(
          GraphOp::PatchConceptNode {
            concept_id,
            name: patch.name.clone(),
            description: patch.description.clone(),
          }
          .into(),
        );
      }
    }
    for patch in update.categories.iter().filter(|p| !p.is_empty()) {
      steps.push(GraphOp::PatchCategory { concept_id, patch: patch.clone() }.into());
    }
    for patch in update.documents.iter().filter(|p| !p.is_empty()) {
      steps.push(DocumentOp::Patch { concept_id, patch: patch.clone(), at }.into());
    }

    self.execute_saga(SyncOperation::Update, concept_id, steps).await?;
    self.refresh_cache(concept_id).await;
    self.coordinator.events().publish(SyncEvent::ConceptUpdated { concept_id, update });
    Ok(concept_id)
  }

  /// Remove a concept from every store: documents, then the graph, then the
  /// relational row.
  pub async fn delete(&self, concept_id: Uuid) -> Result<Uuid> {
    let _lease = self.coordinator.leases().acquire(concept_id).await;
    self.ensure_exists(concept_id).await?;

    let steps: Vec<StoreOperation> = vec![
      DocumentOp::DeleteByConcept(concept_id).into(),
      GraphOp::DeleteConceptGraph(concept_id).into(),
      RelationalOp::DeleteConcept(concept_id).into(),
    ];

    self.execute_saga(SyncOperation::Delete, concept_id, steps).await?;
    self.drop_cached(concept_id).await;
    self.coordinator.events().publish(SyncEvent::ConceptDeleted { concept_id });
    Ok(concept_id)
  }

  // ─── Internals ─────────────────────────────────────────────────────────────

  async fn execute_saga(
    &self,
    operation: SyncOperation,
    concept_id: Uuid,
    steps: Vec<StoreOperation>,
  ) -> Result<CommitReport> {
    let started = Instant::now();
    let result = self.run_steps(steps).await;
    let events = self.coordinator.events();

    match &result {
      Ok(report) => {
        tracing::info!(
          %operation,
          %concept_id,
          stores = ?report.committed,
          "saga committed"
        );
      }
      Err(err) => {
        tracing::error!(%operation, %concept_id, error = %err, "saga failed");
        if err.is_partial_commit() {
          // Committed stores may have changed what a cached view shows.
          self.drop_cached(concept_id).await;
        }
        events.publish(SyncEvent::SyncError {
          operation,
          concept_id,
          error: err.to_string(),
          committed: err.committed_stores().to_vec(),
        });
      }
    }
    events.timing(TimedOperation::Saga(operation), None, result.is_ok(), started);
    result
  }

  async fn run_steps(&self, steps: Vec<StoreOperation>) -> Result<CommitReport> {
    let mut stores: Vec<StoreKind> = steps.iter().map(StoreOperation::kind).collect();
    stores.sort();
    stores.dedup();

    let tx = self.coordinator.begin(&stores).await?;
    for step in steps {
      if let Err(err) = self.coordinator.run(tx, step).await {
        self.coordinator.rollback(tx).await;
        return Err(err);
      }
    }
    self.coordinator.commit(tx).await
  }

  async fn ensure_exists(&self, concept_id: Uuid) -> Result<()> {
    let concept = self
      .coordinator
      .query(RelationalOp::GetConcept(concept_id))
      .await?
      .into_concept(StoreKind::Relational)?;
    match concept {
      Some(_) => Ok(()),
      None => Err(Error::NotFound(concept_id)),
    }
  }

  /// Ids of the categories the graph holds under `concept_id`.
  async fn category_ids(&self, concept_id: Uuid) -> Result<HashSet<Uuid>> {
    let categories = self
      .coordinator
      .query(GraphOp::ListCategories(concept_id))
      .await?
      .into_categories(StoreKind::Graph)?;
    Ok(categories.into_iter().map(|c| c.category_id).collect())
  }

  /// Invalidate then rebuild the cached view. Failures are logged; the
  /// stores are already committed and the entry is rebuilt on next read.
  async fn refresh_cache(&self, concept_id: Uuid) {
    self.drop_cached(concept_id).await;
    if let Err(err) = self.cache.rebuild(&self.coordinator, concept_id).await {
      tracing::warn!(%concept_id, error = %err, "cache rebuild failed");
    }
  }

  async fn drop_cached(&self, concept_id: Uuid) {
    if let Err(err) = self.cache.invalidate(concept_id).await {
      tracing::warn!(%concept_id, error = %err, "cache invalidation failed");
    }
  }
}

// ─── Input validation ────────────────────────────────────────────────────────

fn validate_create(
  metadata: &NewConcept,
  graph: &GraphDraft,
  documents: &[DocumentDraft],
) -> Result<()> {
  if metadata.name.trim().is_empty() {
    return Err(Error::InvalidInput("concept name must not be empty".into()));
  }

  let mut categories = HashSet::new();
  for category in &graph.categories {
    if category.name.trim().is_empty() {
      return Err(Error::InvalidInput("category name must not be empty".into()));
    }
    if !categories.insert(category.category_id) {
      return Err(Error::InvalidInput(format!("duplicate category id {}", category.category_id)));
    }
  }

  for relationship in &graph.relationships {
    for endpoint in [relationship.source_id, relationship.target_id] {
      if !categories.contains(&endpoint) {
        return Err(Error::InvalidInput(format!(
          "relationship endpoint {endpoint} is not a category of this concept"
        )));
      }
    }
    if !relationship.weight.is_finite() {
      return Err(Error::InvalidInput(format!(
        "relationship weight must be finite, got {}",
        relationship.weight
      )));
    }
  }

  for document in documents {
    if let Some(missing) = document.category_ids.iter().find(|id| !categories.contains(*id)) {
      return Err(Error::InvalidInput(format!(
        "document {:?} references unknown category {missing}",
        document.title
      )));
    }
  }
  Ok(())
}

/// `known` holds the concept's current category ids. Updates never add
/// categories, so every category a patch names must already be among them.
fn validate_update(update: &ConceptUpdate, known: &HashSet<Uuid>) -> Result<()> {
  if let Some(name) = update.metadata.as_ref().and_then(|p| p.name.as_deref())
    && name.trim().is_empty()
  {
    return Err(Error::InvalidInput("concept name must not be empty".into()));
  }

  for patch in &update.categories {
    if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
      return Err(Error::InvalidInput("category name must not be empty".into()));
    }
    if !known.contains(&patch.category_id) {
      return Err(Error::InvalidInput(format!(
        "category {} is not a category of this concept",
        patch.category_id
      )));
    }
  }

  for patch in &update.documents {
    let ids = patch.category_ids.as_deref().unwrap_or_default();
    if let Some(missing) = ids.iter().find(|id| !known.contains(*id)) {
      return Err(Error::InvalidInput(format!(
        "document {} references unknown category {missing}",
        patch.document_id
      )));
    }
  }
  Ok(())
}
