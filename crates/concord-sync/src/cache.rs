//! Read-through cache of assembled [`ConceptView`]s.
//!
//! The cache is never authoritative. Every entry can be rebuilt from the
//! three stores, and any write to a concept invalidates its entry.

use chrono::Utc;
use concord_core::{
  operation::{DocumentOp, GraphOp, RelationalOp, StoreKind},
  store::{CacheStore, DocumentAdapter, GraphAdapter, RelationalAdapter},
  view::ConceptView,
};
use uuid::Uuid;

use crate::{Error, Result, config::CacheConfig, coordinator::Coordinator};

fn cache_error<E: std::error::Error + Send + Sync + 'static>(err: E) -> Error {
  Error::Cache(Box::new(err))
}

#[derive(Debug, Clone)]
pub struct ConceptCache<C> {
  store:  C,
  config: CacheConfig,
}

impl<C: CacheStore> ConceptCache<C> {
  pub fn new(store: C, config: CacheConfig) -> Self { Self { store, config } }

  pub fn store(&self) -> &C { &self.store }

  pub fn key(&self, concept_id: Uuid) -> String {
    format!("{}{concept_id}", self.config.key_prefix)
  }

  /// The cached view, if present and decodable. Undecodable entries are
  /// dropped and reported as a miss.
  pub async fn get(&self, concept_id: Uuid) -> Result<Option<ConceptView>> {
    let key = self.key(concept_id);
    let Some(raw) = self.store.get(&key).await.map_err(cache_error)? else {
      return Ok(None);
    };
    match serde_json::from_str(&raw) {
      Ok(view) => Ok(Some(view)),
      Err(err) => {
        tracing::warn!(%key, error = %err, "discarding undecodable cache entry");
        self.store.delete(&key).await.map_err(cache_error)?;
        Ok(None)
      }
    }
  }

  pub async fn put(&self, view: &ConceptView) -> Result<()> {
    let raw = serde_json::to_string(view).map_err(concord_core::Error::from)?;
    self
      .store
      .set(self.key(view.concept.concept_id), raw, self.config.ttl())
      .await
      .map_err(cache_error)
  }

  /// Drop the entry for `concept_id`. Returns whether one was present.
  pub async fn invalidate(&self, concept_id: Uuid) -> Result<bool> {
    self.store.delete(&self.key(concept_id)).await.map_err(cache_error)
  }

  /// Serve from the cache, or assemble from the stores and populate it.
  /// Cache failures degrade to a store read; store failures propagate.
  ///
  /// A fill holds the concept's lease from the second lookup to the put, so a
  /// saga cannot commit and invalidate in between and leave a stale view
  /// cached behind it.
  pub async fn get_or_load<R, G, D>(
    &self,
    coordinator: &Coordinator<R, G, D>,
    concept_id: Uuid,
  ) -> Result<Option<ConceptView>>
  where
    R: RelationalAdapter,
    G: GraphAdapter,
    D: DocumentAdapter,
  {
    if let Some(view) = self.lookup(concept_id).await {
      return Ok(Some(view));
    }

    let _lease = coordinator.leases().acquire(concept_id).await;
    // Another reader or a saga may have filled the entry while we waited.
    if let Some(view) = self.lookup(concept_id).await {
      return Ok(Some(view));
    }

    let view = assemble_view(coordinator, concept_id).await?;
    if let Some(view) = &view
      && let Err(err) = self.put(view).await
    {
      tracing::warn!(%concept_id, error = %err, "cache write failed");
    }
    Ok(view)
  }

  /// `get` with cache failures logged and treated as a miss.
  async fn lookup(&self, concept_id: Uuid) -> Option<ConceptView> {
    match self.get(concept_id).await {
      Ok(Some(view)) => {
        tracing::trace!(%concept_id, "cache hit");
        Some(view)
      }
      Ok(None) => {
        tracing::trace!(%concept_id, "cache miss");
        None
      }
      Err(err) => {
        tracing::warn!(%concept_id, error = %err, "cache read failed");
        None
      }
    }
  }

  /// Reassemble the view from the stores and overwrite the entry. Callers
  /// that race with sagas must hold the concept's lease. A concept
  /// that no longer exists has its entry removed.
  pub async fn rebuild<R, G, D>(
    &self,
    coordinator: &Coordinator<R, G, D>,
    concept_id: Uuid,
  ) -> Result<Option<ConceptView>>
  where
    R: RelationalAdapter,
    G: GraphAdapter,
    D: DocumentAdapter,
  {
    match assemble_view(coordinator, concept_id).await? {
      Some(view) => {
        self.put(&view).await?;
        Ok(Some(view))
      }
      None => {
        self.invalidate(concept_id).await?;
        Ok(None)
      }
    }
  }
}

/// Read one concept from all three stores. `None` if the relational store
/// has no row for it.
pub async fn assemble_view<R, G, D>(
  coordinator: &Coordinator<R, G, D>,
  concept_id: Uuid,
) -> Result<Option<ConceptView>>
where
  R: RelationalAdapter,
  G: GraphAdapter,
  D: DocumentAdapter,
{
  let Some(concept) = coordinator
    .query(RelationalOp::GetConcept(concept_id))
    .await?
    .into_concept(StoreKind::Relational)?
  else {
    return Ok(None);
  };

  let (node, categories, relationships, documents) = tokio::try_join!(
    coordinator.query(GraphOp::GetConceptNode(concept_id)),
    coordinator.query(GraphOp::ListCategories(concept_id)),
    coordinator.query(GraphOp::ListRelationships(concept_id)),
    coordinator.query(DocumentOp::FindByConcept(concept_id)),
  )?;

  Ok(Some(ConceptView {
    concept,
    node: node.into_concept_node(StoreKind::Graph)?,
    categories: categories.into_categories(StoreKind::Graph)?,
    relationships: relationships.into_relationships(StoreKind::Graph)?,
    documents: documents.into_documents(StoreKind::Document)?,
    assembled_at: Utc::now(),
  }))
}
