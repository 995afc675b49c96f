//! [`Validator`]: detect divergence between the stores and repair the
//! safely repairable part of it.
//!
//! The relational store is the source of truth for a concept's existence and
//! display fields. The graph node is derived from it and can be rebuilt;
//! anything else is reported for manual intervention.

use std::{
  collections::{BTreeSet, HashSet},
  sync::Arc,
  time::Instant,
};

use concord_core::{
  concept::Concept,
  event::TimedOperation,
  graph::ConceptNode,
  integrity::{AggregateReport, ConceptReport, FixOutcome, FixResult, IntegrityIssue, IssueType},
  operation::{DocumentOp, GraphOp, RelationalOp, StoreKind},
  store::{CacheStore, DocumentAdapter, GraphAdapter, RelationalAdapter},
};
use futures_util::{StreamExt as _, stream};
use uuid::Uuid;

use crate::{Result, cache::ConceptCache, config::ValidatorConfig, coordinator::Coordinator};

/// A display field mirrored from the relational row onto the graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DisplayField {
  Name,
  Description,
}

impl DisplayField {
  const ALL: [DisplayField; 2] = [DisplayField::Name, DisplayField::Description];

  fn parse(field: &str) -> Option<Self> {
    match field {
      "name" => Some(DisplayField::Name),
      "description" => Some(DisplayField::Description),
      _ => None,
    }
  }

  fn as_str(self) -> &'static str {
    match self {
      DisplayField::Name => "name",
      DisplayField::Description => "description",
    }
  }

  fn of_concept(self, concept: &Concept) -> &str {
    match self {
      DisplayField::Name => &concept.name,
      DisplayField::Description => &concept.description,
    }
  }

  fn of_node(self, node: &ConceptNode) -> &str {
    match self {
      DisplayField::Name => &node.name,
      DisplayField::Description => &node.description,
    }
  }
}

pub struct Validator<R, G, D, C>
where
  R: RelationalAdapter,
  G: GraphAdapter,
  D: DocumentAdapter,
  C: CacheStore,
{
  coordinator: Arc<Coordinator<R, G, D>>,
  cache:       Arc<ConceptCache<C>>,
  config:      ValidatorConfig,
}

impl<R, G, D, C> Validator<R, G, D, C>
where
  R: RelationalAdapter,
  G: GraphAdapter,
  D: DocumentAdapter,
  C: CacheStore,
{
  pub fn new(
    coordinator: Arc<Coordinator<R, G, D>>,
    cache: Arc<ConceptCache<C>>,
    config: ValidatorConfig,
  ) -> Self {
    Self { coordinator, cache, config }
  }

  // ─── Detection ─────────────────────────────────────────────────────────────

  /// Scan one concept. Never fails: a store that cannot be read yields a
  /// report with status `error`.
  pub async fn validate_concept(&self, concept_id: Uuid) -> ConceptReport {
    let started = Instant::now();
    let report = match self.scan(concept_id).await {
      Ok(issues) => ConceptReport::from_issues(concept_id, issues),
      Err(err) => {
        tracing::warn!(%concept_id, error = %err, "validation could not read stores");
        ConceptReport::failed(concept_id, err.to_string())
      }
    };
    self.coordinator.events().timing(
      TimedOperation::Validate,
      None,
      report.error.is_none(),
      started,
    );
    report
  }

  /// Scan every concept in the relational store, then every concept id that
  /// only the graph or document store knows about. Reports keep enumeration
  /// order.
  pub async fn validate_all(&self) -> Result<AggregateReport> {
    let ids = self
      .coordinator
      .query(RelationalOp::ListConceptIds)
      .await?
      .into_concept_ids(StoreKind::Relational)?;

    let mut aggregate = AggregateReport { total_concepts: ids.len(), ..Default::default() };
    let reports: Vec<ConceptReport> = stream::iter(ids.iter().copied())
      .map(|id| self.validate_concept(id))
      .buffered(self.config.concurrency.max(1))
      .collect()
      .await;
    for report in reports {
      aggregate.record(report);
    }

    let known: HashSet<Uuid> = ids.into_iter().collect();
    let (graph_ids, document_ids) = tokio::try_join!(
      self.coordinator.query(GraphOp::ListConceptIds),
      self.coordinator.query(DocumentOp::ListConceptIds),
    )?;
    let orphans: BTreeSet<Uuid> = graph_ids
      .into_concept_ids(StoreKind::Graph)?
      .into_iter()
      .chain(document_ids.into_concept_ids(StoreKind::Document)?)
      .filter(|id| !known.contains(id))
      .collect();

    let reports: Vec<ConceptReport> = stream::iter(orphans)
      .map(|id| self.validate_concept(id))
      .buffered(self.config.concurrency.max(1))
      .collect()
      .await;
    for report in reports {
      aggregate.orphaned_concepts += 1;
      aggregate.record(report);
    }

    tracing::info!(
      total = aggregate.total_concepts,
      valid = aggregate.valid,
      with_issues = aggregate.with_issues,
      errored = aggregate.errored,
      orphaned = aggregate.orphaned_concepts,
      "validation pass complete"
    );
    Ok(aggregate)
  }

  async fn scan(&self, concept_id: Uuid) -> Result<Vec<IntegrityIssue>> {
    let coordinator = &self.coordinator;
    let concept = coordinator
      .query(RelationalOp::GetConcept(concept_id))
      .await?
      .into_concept(StoreKind::Relational)?;
    let Some(concept) = concept else {
      return self.scan_orphan(concept_id).await;
    };

    let (node, categories, documents) = tokio::try_join!(
      coordinator.query(GraphOp::GetConceptNode(concept_id)),
      coordinator.query(GraphOp::ListCategories(concept_id)),
      coordinator.query(DocumentOp::FindByConcept(concept_id)),
    )?;
    let node = node.into_concept_node(StoreKind::Graph)?;
    let categories = categories.into_categories(StoreKind::Graph)?;
    let documents = documents.into_documents(StoreKind::Document)?;

    let mut issues = Vec::new();
    match &node {
      None => issues.push(IntegrityIssue::new(
        IssueType::MissingInGraph,
        format!("concept {concept_id} has no node in the graph store"),
      )),
      Some(node) => {
        for field in DisplayField::ALL {
          let (expected, actual) = (field.of_concept(&concept), field.of_node(node));
          if expected != actual {
            issues.push(
              IntegrityIssue::new(
                IssueType::DataMismatch,
                format!(
                  "{} differs: relational {expected:?}, graph {actual:?}",
                  field.as_str()
                ),
              )
              .with_field(field.as_str()),
            );
          }
        }
      }
    }

    if categories.is_empty() {
      issues.push(IntegrityIssue::new(
        IssueType::NoCategories,
        format!("concept {concept_id} has no categories"),
      ));
    }
    if documents.is_empty() {
      issues.push(IntegrityIssue::new(
        IssueType::NoDocuments,
        format!("concept {concept_id} has no documents"),
      ));
    }

    let known: HashSet<Uuid> = categories.iter().map(|c| c.category_id).collect();
    for document in &documents {
      for category_id in document.category_ids.iter().filter(|id| !known.contains(*id)) {
        issues.push(
          IntegrityIssue::new(
            IssueType::InvalidReference,
            format!(
              "document {} references category {category_id}, which the graph does not hold \
               under concept {concept_id}",
              document.document_id
            ),
          )
          .with_field("category_ids"),
        );
      }
    }

    Ok(issues)
  }

  /// Issues for an id with no relational row: report what the other stores
  /// still hold for it.
  async fn scan_orphan(&self, concept_id: Uuid) -> Result<Vec<IntegrityIssue>> {
    let coordinator = &self.coordinator;
    let (node, categories, relationships, documents) = tokio::try_join!(
      coordinator.query(GraphOp::GetConceptNode(concept_id)),
      coordinator.query(GraphOp::ListCategories(concept_id)),
      coordinator.query(GraphOp::ListRelationships(concept_id)),
      coordinator.query(DocumentOp::FindByConcept(concept_id)),
    )?;
    let has_node = node.into_concept_node(StoreKind::Graph)?.is_some();
    let categories = categories.into_categories(StoreKind::Graph)?.len();
    let relationships = relationships.into_relationships(StoreKind::Graph)?.len();
    let documents = documents.into_documents(StoreKind::Document)?.len();

    let mut issues = vec![IntegrityIssue::new(
      IssueType::MissingInRelational,
      format!("concept {concept_id} has no row in the relational store"),
    )];
    if has_node || categories > 0 || relationships > 0 {
      issues.push(IntegrityIssue::new(
        IssueType::OrphanedGraph,
        format!(
          "graph still holds concept {concept_id}: node {}, {categories} categories, \
           {relationships} relationships",
          if has_node { "present" } else { "absent" }
        ),
      ));
    }
    if documents > 0 {
      issues.push(IntegrityIssue::new(
        IssueType::OrphanedDocuments,
        format!("{documents} documents still reference concept {concept_id}"),
      ));
    }
    Ok(issues)
  }

  // ─── Repair ────────────────────────────────────────────────────────────────

  /// Attempt to repair `issues` for one concept. Only graph-side problems
  /// with a relational source of truth are repaired automatically; each
  /// repair runs in its own graph transaction. The cached view is
  /// invalidated if anything changed.
  ///
  /// The concept's lease is held throughout, so a saga cannot delete or
  /// rename the concept between a repair's read of the relational row and
  /// its graph write.
  pub async fn fix_integrity_issues(
    &self,
    concept_id: Uuid,
    issues: &[IntegrityIssue],
  ) -> Vec<FixResult> {
    let _lease = self.coordinator.leases().acquire(concept_id).await;
    let mut results = Vec::with_capacity(issues.len());
    let mut changed = false;

    for issue in issues {
      let attempt = match issue.issue_type {
        IssueType::MissingInGraph => self.restore_node(concept_id).await,
        IssueType::DataMismatch => match issue.field.as_deref().and_then(DisplayField::parse) {
          Some(field) => self.overwrite_field(concept_id, field).await,
          None => Ok(FixOutcome::ManualInterventionRequired),
        },
        _ => Ok(FixOutcome::ManualInterventionRequired),
      };
      let outcome = attempt.unwrap_or_else(|err| {
        tracing::warn!(%concept_id, issue = ?issue.issue_type, error = %err, "repair failed");
        FixOutcome::Failed { error: err.to_string() }
      });
      changed |= outcome == FixOutcome::Fixed;
      results.push(FixResult { issue_type: issue.issue_type, field: issue.field.clone(), outcome });
    }

    if changed {
      if let Err(err) = self.cache.invalidate(concept_id).await {
        tracing::warn!(%concept_id, error = %err, "cache invalidation failed");
      }
      tracing::info!(%concept_id, "integrity repairs applied");
    }
    results
  }

  /// Validate one concept and repair whatever can be repaired.
  pub async fn validate_and_fix(&self, concept_id: Uuid) -> (ConceptReport, Vec<FixResult>) {
    let report = self.validate_concept(concept_id).await;
    let fixes = self.fix_integrity_issues(concept_id, &report.issues).await;
    (report, fixes)
  }

  async fn source_of_truth(&self, concept_id: Uuid) -> Result<Option<Concept>> {
    Ok(
      self
        .coordinator
        .query(RelationalOp::GetConcept(concept_id))
        .await?
        .into_concept(StoreKind::Relational)?,
    )
  }

  async fn current_node(&self, concept_id: Uuid) -> Result<Option<ConceptNode>> {
    Ok(
      self
        .coordinator
        .query(GraphOp::GetConceptNode(concept_id))
        .await?
        .into_concept_node(StoreKind::Graph)?,
    )
  }

  async fn restore_node(&self, concept_id: Uuid) -> Result<FixOutcome> {
    let Some(concept) = self.source_of_truth(concept_id).await? else {
      return Ok(FixOutcome::ManualInterventionRequired);
    };
    if self.current_node(concept_id).await?.is_some() {
      return Ok(FixOutcome::AlreadyConsistent);
    }
    self.repair_graph(GraphOp::UpsertConceptNode(ConceptNode::from_concept(&concept))).await?;
    Ok(FixOutcome::Fixed)
  }

  async fn overwrite_field(&self, concept_id: Uuid, field: DisplayField) -> Result<FixOutcome> {
    let Some(concept) = self.source_of_truth(concept_id).await? else {
      return Ok(FixOutcome::ManualInterventionRequired);
    };
    let Some(node) = self.current_node(concept_id).await? else {
      return Ok(FixOutcome::ManualInterventionRequired);
    };
    let value = field.of_concept(&concept);
    if field.of_node(&node) == value {
      return Ok(FixOutcome::AlreadyConsistent);
    }

    let (name, description) = match field {
      DisplayField::Name => (Some(value.to_owned()), None),
      DisplayField::Description => (None, Some(value.to_owned())),
    };
    self.repair_graph(GraphOp::PatchConceptNode { concept_id, name, description }).await?;
    Ok(FixOutcome::Fixed)
  }

  async fn repair_graph(&self, op: GraphOp) -> Result<()> {
    let tx = self.coordinator.begin(&[StoreKind::Graph]).await?;
    if let Err(err) = self.coordinator.run(tx, op).await {
      self.coordinator.rollback(tx).await;
      return Err(err);
    }
    self.coordinator.commit(tx).await?;
    Ok(())
  }
}
