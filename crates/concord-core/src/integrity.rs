//! Integrity issues and validation reports.
//!
//! Divergence between stores is data, not an error: the validator returns
//! these types and only fails a concept's report when a store cannot be read.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Issues ──────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
  /// No relational row for the concept id.
  MissingInRelational,
  /// Relational row exists but the graph has no concept node.
  MissingInGraph,
  /// A display field differs between the relational row and the graph node.
  DataMismatch,
  NoCategories,
  NoDocuments,
  /// A document references a category id the graph does not hold under the
  /// same concept.
  InvalidReference,
  /// Graph elements survive for a concept with no relational row.
  OrphanedGraph,
  /// Documents survive for a concept with no relational row.
  OrphanedDocuments,
}

impl IssueType {
  pub fn severity(self) -> Severity {
    match self {
      IssueType::MissingInRelational | IssueType::MissingInGraph => Severity::Critical,
      IssueType::DataMismatch
      | IssueType::InvalidReference
      | IssueType::OrphanedGraph
      | IssueType::OrphanedDocuments => Severity::High,
      IssueType::NoCategories => Severity::Warning,
      IssueType::NoDocuments => Severity::Info,
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Critical,
  High,
  Warning,
  Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityIssue {
  #[serde(rename = "type")]
  pub issue_type:  IssueType,
  pub severity:    Severity,
  pub description: String,
  /// The offending field, for `data_mismatch` and `invalid_reference`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub field:       Option<String>,
}

impl IntegrityIssue {
  pub fn new(issue_type: IssueType, description: impl Into<String>) -> Self {
    Self {
      issue_type,
      severity: issue_type.severity(),
      description: description.into(),
      field: None,
    }
  }

  pub fn with_field(mut self, field: impl Into<String>) -> Self {
    self.field = Some(field.into());
    self
  }
}

// ─── Reports ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
  Valid,
  IssuesFound,
  /// A store could not be read while scanning this concept.
  Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptReport {
  pub concept_id: Uuid,
  pub status:     ValidationStatus,
  pub issues:     Vec<IntegrityIssue>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error:      Option<String>,
  pub checked_at: DateTime<Utc>,
}

impl ConceptReport {
  pub fn from_issues(concept_id: Uuid, issues: Vec<IntegrityIssue>) -> Self {
    let status = if issues.is_empty() {
      ValidationStatus::Valid
    } else {
      ValidationStatus::IssuesFound
    };
    Self { concept_id, status, issues, error: None, checked_at: Utc::now() }
  }

  pub fn failed(concept_id: Uuid, error: impl Into<String>) -> Self {
    Self {
      concept_id,
      status: ValidationStatus::Error,
      issues: Vec::new(),
      error: Some(error.into()),
      checked_at: Utc::now(),
    }
  }

  pub fn has_issue(&self, issue_type: IssueType) -> bool {
    self.issues.iter().any(|i| i.issue_type == issue_type)
  }

  pub fn count_of(&self, issue_type: IssueType) -> usize {
    self.issues.iter().filter(|i| i.issue_type == issue_type).count()
  }
}

/// Aggregate of a full scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateReport {
  /// Concepts enumerated from the relational store.
  pub total_concepts:     usize,
  pub valid:              usize,
  pub with_issues:        usize,
  pub errored:            usize,
  /// Concept ids found only in the graph or document store.
  pub orphaned_concepts:  usize,
  pub issues_by_type:     BTreeMap<IssueType, usize>,
  pub issues_by_severity: BTreeMap<Severity, usize>,
  pub reports:            Vec<ConceptReport>,
}

impl AggregateReport {
  /// Fold one concept report into the totals.
  pub fn record(&mut self, report: ConceptReport) {
    match report.status {
      ValidationStatus::Valid => self.valid += 1,
      ValidationStatus::IssuesFound => self.with_issues += 1,
      ValidationStatus::Error => self.errored += 1,
    }
    for issue in &report.issues {
      *self.issues_by_type.entry(issue.issue_type).or_default() += 1;
      *self.issues_by_severity.entry(issue.severity).or_default() += 1;
    }
    self.reports.push(report);
  }
}

// ─── Repairs ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FixOutcome {
  Fixed,
  /// Nothing to do: the stores already agree.
  AlreadyConsistent,
  ManualInterventionRequired,
  Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixResult {
  pub issue_type: IssueType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub field:      Option<String>,
  #[serde(flatten)]
  pub outcome:    FixOutcome,
}
