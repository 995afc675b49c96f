//! Divergence detection and repair.

mod common;

use chrono::Utc;
use common::*;
use concord_core::{
  concept::ConceptPatch,
  document::DocumentPatch,
  graph::ConceptNode,
  integrity::{FixOutcome, IssueType, Severity, ValidationStatus},
  operation::{DocumentOp, GraphOp, RelationalOp},
};
use uuid::Uuid;

fn outcome_for(fixes: &[concord_core::integrity::FixResult], issue: IssueType) -> FixOutcome {
  fixes
    .iter()
    .find(|f| f.issue_type == issue)
    .map(|f| f.outcome.clone())
    .unwrap_or_else(|| panic!("no fix result for {issue:?}"))
}

async fn rename_node(h: &Harness, id: Uuid, name: &str) {
  tamper(h, GraphOp::PatchConceptNode {
    concept_id:  id,
    name:        Some(name.into()),
    description: None,
  })
  .await;
}

// ─── Detection ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn consistent_concept_is_valid() {
  let h = harness().await;
  let id = create(&h, payload("Consistent")).await;

  let report = h.validator.validate_concept(id).await;
  assert_eq!(report.status, ValidationStatus::Valid);
  assert!(report.issues.is_empty());
}

#[tokio::test]
async fn missing_documents_are_informational() {
  let h = harness().await;
  let mut p = payload("Undocumented");
  p.documents.clear();
  let id = create(&h, p).await;

  let report = h.validator.validate_concept(id).await;
  assert_eq!(report.status, ValidationStatus::IssuesFound);
  assert_eq!(report.issues.len(), 1);
  assert_eq!(report.issues[0].issue_type, IssueType::NoDocuments);
  assert_eq!(report.issues[0].severity, Severity::Info);
}

#[tokio::test]
async fn concept_without_categories_is_a_warning() {
  let h = harness().await;
  let mut p = payload("Flat");
  p.graph.categories.clear();
  p.graph.relationships.clear();
  p.documents[0].category_ids.clear();
  let id = create(&h, p).await;

  let report = h.validator.validate_concept(id).await;
  assert_eq!(report.count_of(IssueType::NoCategories), 1);
  assert_eq!(report.issues[0].severity, Severity::Warning);
}

#[tokio::test]
async fn unknown_id_is_missing_in_relational_only() {
  let h = harness().await;
  let report = h.validator.validate_concept(Uuid::new_v4()).await;

  assert_eq!(report.issues.len(), 1);
  assert_eq!(report.issues[0].issue_type, IssueType::MissingInRelational);
  assert_eq!(report.issues[0].severity, Severity::Critical);
}

#[tokio::test]
async fn display_field_mismatch_names_the_field() {
  let h = harness().await;
  let id = create(&h, payload("Original")).await;
  rename_node(&h, id, "Drifted").await;

  let report = h.validator.validate_concept(id).await;
  assert_eq!(report.issues.len(), 1);
  let issue = &report.issues[0];
  assert_eq!(issue.issue_type, IssueType::DataMismatch);
  assert_eq!(issue.severity, Severity::High);
  assert_eq!(issue.field.as_deref(), Some("name"));
}

#[tokio::test]
async fn invalid_reference_iff_document_cites_foreign_category() {
  let h = harness().await;
  let id = create(&h, payload("Referenced")).await;
  assert!(!h.validator.validate_concept(id).await.has_issue(IssueType::InvalidReference));

  // A category that exists, but under another concept.
  let other = create(&h, payload("Other")).await;
  let foreign = categories(&h, other).await[0].category_id;
  let document = documents(&h, id).await[0].document_id;
  tamper(&h, DocumentOp::Patch {
    concept_id: id,
    patch:      DocumentPatch {
      document_id: document,
      category_ids: Some(vec![foreign]),
      ..Default::default()
    },
    at:         chrono::Utc::now(),
  })
  .await;

  let report = h.validator.validate_concept(id).await;
  assert_eq!(report.count_of(IssueType::InvalidReference), 1);
  let issue = report
    .issues
    .iter()
    .find(|i| i.issue_type == IssueType::InvalidReference)
    .expect("invalid_reference");
  assert_eq!(issue.field.as_deref(), Some("category_ids"));
  assert!(issue.description.contains(&foreign.to_string()));
  assert!(!h.validator.validate_concept(other).await.has_issue(IssueType::InvalidReference));
}

#[tokio::test]
async fn validate_all_aggregates_in_enumeration_order() {
  let h = harness().await;
  let consistent = create(&h, payload("A")).await;
  let mut bare = payload("B");
  bare.documents.clear();
  let bare = create(&h, bare).await;
  let drifted = create(&h, payload("C")).await;
  rename_node(&h, drifted, "C prime").await;

  let aggregate = h.validator.validate_all().await.unwrap();
  assert_eq!(aggregate.total_concepts, 3);
  assert_eq!(aggregate.valid, 1);
  assert_eq!(aggregate.with_issues, 2);
  assert_eq!(aggregate.errored, 0);
  assert_eq!(aggregate.orphaned_concepts, 0);
  assert_eq!(aggregate.issues_by_type.get(&IssueType::NoDocuments), Some(&1));
  assert_eq!(aggregate.issues_by_type.get(&IssueType::DataMismatch), Some(&1));
  assert_eq!(aggregate.issues_by_severity.get(&Severity::High), Some(&1));

  // The relational store lists concepts oldest first.
  let seen: Vec<Uuid> = aggregate.reports.iter().map(|r| r.concept_id).collect();
  assert_eq!(seen, vec![consistent, bare, drifted]);
}

#[tokio::test]
async fn validate_all_on_empty_stores() {
  let h = harness().await;
  let aggregate = h.validator.validate_all().await.unwrap();
  assert_eq!(aggregate.total_concepts, 0);
  assert!(aggregate.reports.is_empty());
}

// ─── Repair ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn mismatch_repair_is_idempotent() {
  let h = harness().await;
  let id = create(&h, payload("Canonical")).await;
  rename_node(&h, id, "Stale").await;

  let issues = h.validator.validate_concept(id).await.issues;
  let first = h.validator.fix_integrity_issues(id, &issues).await;
  assert_eq!(outcome_for(&first, IssueType::DataMismatch), FixOutcome::Fixed);
  assert_eq!(node(&h, id).await.map(|n| n.name), Some("Canonical".to_owned()));
  assert_eq!(h.validator.validate_concept(id).await.status, ValidationStatus::Valid);

  let second = h.validator.fix_integrity_issues(id, &issues).await;
  assert_eq!(outcome_for(&second, IssueType::DataMismatch), FixOutcome::AlreadyConsistent);
}

#[tokio::test]
async fn missing_node_is_restored_but_categories_need_a_human() {
  let h = harness().await;
  let id = create(&h, payload("Wiped")).await;
  tamper(&h, GraphOp::DeleteConceptGraph(id)).await;

  let report = h.validator.validate_concept(id).await;
  assert!(report.has_issue(IssueType::MissingInGraph));
  assert!(report.has_issue(IssueType::NoCategories));
  assert!(report.has_issue(IssueType::InvalidReference));

  let fixes = h.validator.fix_integrity_issues(id, &report.issues).await;
  assert_eq!(outcome_for(&fixes, IssueType::MissingInGraph), FixOutcome::Fixed);
  assert_eq!(outcome_for(&fixes, IssueType::NoCategories), FixOutcome::ManualInterventionRequired);
  assert_eq!(
    outcome_for(&fixes, IssueType::InvalidReference),
    FixOutcome::ManualInterventionRequired
  );

  let concept = concept(&h, id).await.expect("concept");
  assert_eq!(node(&h, id).await, Some(ConceptNode::from_concept(&concept)));
}

#[tokio::test]
async fn repair_invalidates_the_cached_view() {
  let h = harness().await;
  let id = create(&h, payload("Cached")).await;
  rename_node(&h, id, "Behind the cache").await;

  // The write bypassed the synchronizer, so the cache is stale.
  let stale = h.sync.get(id).await.unwrap().expect("view");
  assert_eq!(stale.node.map(|n| n.name), Some("Cached".to_owned()));

  let (report, fixes) = h.validator.validate_and_fix(id).await;
  assert!(report.has_issue(IssueType::DataMismatch));
  assert_eq!(outcome_for(&fixes, IssueType::DataMismatch), FixOutcome::Fixed);

  assert!(h.cache.get(id).await.unwrap().is_none());
  let fresh = h.sync.get(id).await.unwrap().expect("view");
  assert_eq!(fresh.node.map(|n| n.name), Some("Cached".to_owned()));
  assert_eq!(fresh.concept.name, "Cached");
}

#[tokio::test]
async fn failed_repair_is_reported() {
  let h = harness().await;
  let id = create(&h, payload("Stubborn")).await;
  rename_node(&h, id, "Drift").await;
  h.graph.fail_commit(true);

  let issues = h.validator.validate_concept(id).await.issues;
  let fixes = h.validator.fix_integrity_issues(id, &issues).await;
  assert!(matches!(
    outcome_for(&fixes, IssueType::DataMismatch),
    FixOutcome::Failed { error } if error.contains("injected commit fault")
  ));
  assert_eq!(node(&h, id).await.map(|n| n.name), Some("Drift".to_owned()));
}

#[tokio::test]
async fn orphans_are_only_flagged_for_manual_repair() {
  let h = harness().await;
  let id = create(&h, payload("Orphaned")).await;
  tamper(&h, RelationalOp::DeleteConcept(id)).await;

  let report = h.validator.validate_concept(id).await;
  assert!(report.has_issue(IssueType::OrphanedGraph));
  let fixes = h.validator.fix_integrity_issues(id, &report.issues).await;
  assert!(fixes.iter().all(|f| f.outcome == FixOutcome::ManualInterventionRequired));
}

// ─── Repairs and sagas ───────────────────────────────────────────────────────

#[tokio::test]
async fn repair_waits_for_an_in_flight_delete() {
  let h = harness().await;
  let id = create(&h, payload("Contested")).await;
  tamper(&h, GraphOp::DeleteConceptGraph(id)).await;
  let issues = h.validator.validate_concept(id).await.issues;

  // Hold the lease the way a delete saga does while it commits.
  let lease = h.coordinator.leases().acquire(id).await;
  let (fixes, ()) = tokio::join!(h.validator.fix_integrity_issues(id, &issues), async {
    tamper(&h, RelationalOp::DeleteConcept(id)).await;
    drop(lease);
  });

  assert_eq!(
    outcome_for(&fixes, IssueType::MissingInGraph),
    FixOutcome::ManualInterventionRequired
  );
  assert!(node(&h, id).await.is_none());
}

#[tokio::test]
async fn repair_does_not_undo_an_in_flight_rename() {
  let h = harness().await;
  let id = create(&h, payload("Before")).await;
  rename_node(&h, id, "Drift").await;
  let issues = h.validator.validate_concept(id).await.issues;

  let lease = h.coordinator.leases().acquire(id).await;
  let (fixes, ()) = tokio::join!(h.validator.fix_integrity_issues(id, &issues), async {
    tamper(&h, RelationalOp::PatchConcept {
      concept_id: id,
      patch:      ConceptPatch { name: Some("After".into()), ..Default::default() },
      at:         Utc::now(),
    })
    .await;
    rename_node(&h, id, "After").await;
    drop(lease);
  });

  assert_eq!(outcome_for(&fixes, IssueType::DataMismatch), FixOutcome::AlreadyConsistent);
  assert_eq!(node(&h, id).await.map(|n| n.name), Some("After".to_owned()));
}

#[tokio::test]
async fn repair_racing_a_delete_leaves_no_orphans() {
  let h = harness().await;
  let id = create(&h, payload("Doomed")).await;
  tamper(&h, GraphOp::DeleteConceptGraph(id)).await;
  let issues = h.validator.validate_concept(id).await.issues;

  let (_, deleted) =
    tokio::join!(h.validator.fix_integrity_issues(id, &issues), h.sync.delete(id));
  deleted.unwrap();

  assert!(node(&h, id).await.is_none());
  let aggregate = h.validator.validate_all().await.unwrap();
  assert_eq!(aggregate.orphaned_concepts, 0);
}
