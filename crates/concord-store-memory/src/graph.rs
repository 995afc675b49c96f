//! [`MemoryGraphStore`]: the in-process graph store.

use std::{
  collections::{BTreeMap, BTreeSet},
  path::Path,
};

use concord_core::{
  graph::{Category, ConceptNode, Relationship},
  operation::{GraphOp, OpOutput, StoreKind},
  store::StoreAdapter,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  staged::{DEFAULT_MAX_SESSIONS, StagedSession, StagedState, StagedStore},
};

// ─── State ───────────────────────────────────────────────────────────────────

/// Nodes and edges of every concept graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphState {
  concepts:   BTreeMap<Uuid, ConceptNode>,
  categories: BTreeMap<Uuid, Category>,
  /// `INCLUDES` edges as `(concept_id, category_id)`.
  includes:   BTreeSet<(Uuid, Uuid)>,
  /// `RELATED_TO` edges keyed by relationship id.
  related:    BTreeMap<Uuid, Relationship>,
}

impl GraphState {
  pub fn node_count(&self) -> usize { self.concepts.len() + self.categories.len() }

  pub fn edge_count(&self) -> usize { self.includes.len() + self.related.len() }

  fn category_of(&self, concept_id: Uuid, category_id: Uuid) -> Result<&Category> {
    match self.categories.get(&category_id) {
      Some(c) if c.concept_id == concept_id && self.includes.contains(&(concept_id, category_id)) => {
        Ok(c)
      }
      _ => Err(Error::CategoryNotFound { concept_id, category_id }),
    }
  }

  fn create_concept_graph(&mut self, node: &ConceptNode, categories: &[Category]) -> Result<usize> {
    let concept_id = node.concept_id;
    if self.concepts.contains_key(&concept_id) {
      return Err(Error::DuplicateNode(concept_id));
    }

    // Validate the whole batch before touching anything.
    let mut seen = BTreeSet::new();
    for category in categories {
      if category.concept_id != concept_id {
        return Err(Error::CrossConcept {
          category_id: category.category_id,
          expected:    concept_id,
          actual:      category.concept_id,
        });
      }
      if self.categories.contains_key(&category.category_id) || !seen.insert(category.category_id) {
        return Err(Error::DuplicateCategory(category.category_id));
      }
    }

    self.concepts.insert(concept_id, node.clone());
    for category in categories {
      self.categories.insert(category.category_id, category.clone());
      self.includes.insert((concept_id, category.category_id));
    }
    Ok(1 + categories.len())
  }

  fn create_relationship(&mut self, rel: &Relationship) -> Result<usize> {
    if !rel.weight.is_finite() {
      return Err(Error::InvalidWeight(rel.weight));
    }
    if self.related.contains_key(&rel.relationship_id) {
      return Err(Error::DuplicateRelationship(rel.relationship_id));
    }
    self.category_of(rel.concept_id, rel.source_id)?;
    self.category_of(rel.concept_id, rel.target_id)?;
    self.related.insert(rel.relationship_id, rel.clone());
    Ok(1)
  }

  fn detach_delete(&mut self, concept_id: Uuid) -> usize {
    let before = self.node_count() + self.edge_count();

    self.related.retain(|_, r| r.concept_id != concept_id);
    let owned: Vec<Uuid> = self
      .includes
      .iter()
      .filter(|(c, _)| *c == concept_id)
      .map(|(_, category_id)| *category_id)
      .collect();
    for category_id in owned {
      self.categories.remove(&category_id);
    }
    // Categories that lost their INCLUDES edge are still scoped by concept id.
    self.categories.retain(|_, c| c.concept_id != concept_id);
    self.includes.retain(|(c, _)| *c != concept_id);
    self.concepts.remove(&concept_id);

    before - (self.node_count() + self.edge_count())
  }
}

impl StagedState for GraphState {
  type Op = GraphOp;

  fn is_read(op: &GraphOp) -> bool { op.is_read() }

  fn read(&self, op: &GraphOp) -> Result<OpOutput> {
    match op {
      GraphOp::GetConceptNode(id) => Ok(OpOutput::ConceptNode(self.concepts.get(id).cloned())),
      GraphOp::ListCategories(id) => Ok(OpOutput::Categories(
        self
          .includes
          .iter()
          .filter(|(c, _)| c == id)
          .filter_map(|(_, category_id)| self.categories.get(category_id))
          .cloned()
          .collect(),
      )),
      GraphOp::ListRelationships(id) => Ok(OpOutput::Relationships(
        self.related.values().filter(|r| r.concept_id == *id).cloned().collect(),
      )),
      GraphOp::ListConceptIds => {
        let ids: BTreeSet<Uuid> = self
          .concepts
          .keys()
          .copied()
          .chain(self.categories.values().map(|c| c.concept_id))
          .chain(self.related.values().map(|r| r.concept_id))
          .collect();
        Ok(OpOutput::ConceptIds(ids.into_iter().collect()))
      }
      // A write against a shared read view is evaluated as a dry run.
      other => self.clone().write(other),
    }
  }

  fn write(&mut self, op: &GraphOp) -> Result<OpOutput> {
    let affected = match op {
      GraphOp::CreateConceptGraph { node, categories } => {
        self.create_concept_graph(node, categories)?
      }
      GraphOp::UpsertConceptNode(node) => {
        self.concepts.insert(node.concept_id, node.clone());
        1
      }
      GraphOp::CreateRelationship(rel) => self.create_relationship(rel)?,
      GraphOp::PatchConceptNode { concept_id, name, description } => {
        let node = self
          .concepts
          .get_mut(concept_id)
          .ok_or(Error::ConceptNodeNotFound(*concept_id))?;
        if let Some(name) = name {
          node.name = name.clone();
        }
        if let Some(description) = description {
          node.description = description.clone();
        }
        1
      }
      GraphOp::PatchCategory { concept_id, patch } => {
        self.category_of(*concept_id, patch.category_id)?;
        if let Some(category) = self.categories.get_mut(&patch.category_id) {
          if let Some(name) = &patch.name {
            category.name = name.clone();
          }
          if let Some(description) = &patch.description {
            category.description = description.clone();
          }
        }
        1
      }
      GraphOp::DeleteConceptGraph(concept_id) => self.detach_delete(*concept_id),
      read => return self.read(read),
    };
    Ok(OpOutput::Affected(affected))
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

pub type GraphSession = StagedSession<GraphState>;

/// The graph store. Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct MemoryGraphStore {
  inner: StagedStore<GraphState>,
}

impl Default for MemoryGraphStore {
  fn default() -> Self { Self::new() }
}

impl MemoryGraphStore {
  /// A volatile store with no snapshot file.
  pub fn new() -> Self { Self { inner: StagedStore::in_memory(DEFAULT_MAX_SESSIONS) } }

  /// Load `path` if present and rewrite it on every commit.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let inner = StagedStore::open(path.as_ref(), DEFAULT_MAX_SESSIONS).await?;
    tracing::debug!(path = %path.as_ref().display(), "opened graph store");
    Ok(Self { inner })
  }

  pub fn close_pool(&self) { self.inner.close_pool(); }

  pub fn available_sessions(&self) -> usize { self.inner.available_sessions() }

  /// Run `f` against the committed graph.
  pub async fn inspect<R>(&self, f: impl FnOnce(&GraphState) -> R) -> R { self.inner.inspect(f).await }
}

impl StoreAdapter for MemoryGraphStore {
  type Session = GraphSession;
  type Op = GraphOp;
  type Error = Error;

  fn kind(&self) -> StoreKind { StoreKind::Graph }

  async fn open_session(&self) -> Result<GraphSession> {
    let session = self.inner.open_session().await?;
    tracing::debug!(session = %session.id(), "graph session opened");
    Ok(session)
  }

  async fn execute(&self, session: &mut GraphSession, op: GraphOp) -> Result<OpOutput> {
    self.inner.execute(session, op)
  }

  async fn commit(&self, session: GraphSession) -> Result<()> {
    let id = session.id();
    let applied = self.inner.commit(session).await?;
    tracing::debug!(session = %id, applied, "graph session committed");
    Ok(())
  }

  async fn rollback(&self, session: GraphSession) -> Result<()> {
    tracing::debug!(
      session = %session.id(),
      discarded = session.pending_writes(),
      "graph session rolled back"
    );
    Ok(())
  }

  async fn query(&self, op: GraphOp) -> Result<OpOutput> { self.inner.query(op).await }
}
