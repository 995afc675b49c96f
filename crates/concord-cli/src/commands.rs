//! Subcommand implementations. Each prints its result to stdout as JSON.

use std::{
  io::Read as _,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Subcommand;
use concord_core::{
  concept::NewConcept,
  document::DocumentDraft,
  event::{ConceptUpdate, SyncEvent},
  graph::GraphDraft,
  integrity::{ConceptReport, FixResult},
};
use concord_store_memory::{MemoryCache, MemoryDocumentStore, MemoryGraphStore};
use concord_store_sqlite::SqliteStore;
use concord_sync::{ConceptCache, Coordinator, Synchronizer, Validator};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::settings::Settings;

type ConceptSync = Synchronizer<SqliteStore, MemoryGraphStore, MemoryDocumentStore, MemoryCache>;
type ConceptValidator = Validator<SqliteStore, MemoryGraphStore, MemoryDocumentStore, MemoryCache>;

#[derive(Subcommand)]
pub enum Command {
  /// Create a concept from a JSON payload.
  Create {
    /// Payload file; `-` reads stdin.
    #[arg(long)]
    file: PathBuf,
  },

  /// Apply a JSON update to a concept.
  Update {
    concept_id: Uuid,
    /// Update file; `-` reads stdin.
    #[arg(long)]
    file:       PathBuf,
  },

  /// Delete a concept from every store.
  Delete { concept_id: Uuid },

  /// Print the assembled view of a concept.
  Show { concept_id: Uuid },

  /// Check the stores for divergence.
  Validate {
    /// Only check this concept.
    #[arg(long)]
    concept: Option<Uuid>,

    /// Repair what can be repaired automatically.
    #[arg(long)]
    fix: bool,
  },
}

/// Body of a `create` payload.
#[derive(Debug, Deserialize)]
pub struct CreatePayload {
  pub concept:   NewConcept,
  #[serde(default)]
  pub graph:     GraphDraft,
  #[serde(default)]
  pub documents: Vec<DocumentDraft>,
}

#[derive(Serialize)]
struct Checked {
  report: ConceptReport,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  fixes:  Vec<FixResult>,
}

pub struct App {
  sync:      ConceptSync,
  validator: ConceptValidator,
}

impl App {
  pub async fn open(settings: &Settings) -> anyhow::Result<Self> {
    for path in [&settings.relational_path, &settings.graph_path, &settings.document_path] {
      if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
          .with_context(|| format!("failed to create {}", parent.display()))?;
      }
    }

    let relational =
      SqliteStore::open_with_pool(&settings.relational_path, settings.relational_pool_size)
        .await
        .with_context(|| format!("failed to open {}", settings.relational_path.display()))?;
    let graph = MemoryGraphStore::open(&settings.graph_path)
      .await
      .with_context(|| format!("failed to open {}", settings.graph_path.display()))?;
    let documents = MemoryDocumentStore::open(&settings.document_path)
      .await
      .with_context(|| format!("failed to open {}", settings.document_path.display()))?;

    let coordinator = Arc::new(
      Coordinator::new(relational, graph, documents, settings.coordinator.clone())
        .context("invalid coordinator configuration")?,
    );
    let cache = Arc::new(ConceptCache::new(MemoryCache::new(), settings.cache.clone()));
    let sync = Synchronizer::new(coordinator.clone(), cache.clone());
    let validator = Validator::new(coordinator, cache, settings.validator.clone());
    Ok(Self { sync, validator })
  }

  pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> { self.sync.subscribe() }

  pub async fn run(&self, command: Command) -> anyhow::Result<()> {
    match command {
      Command::Create { file } => {
        let payload: CreatePayload = read_json(&file)?;
        let concept_id = self
          .sync
          .create(payload.concept, payload.graph, payload.documents)
          .await
          .context("create failed")?;
        print_json(&serde_json::json!({ "concept_id": concept_id }))
      }

      Command::Update { concept_id, file } => {
        let update: ConceptUpdate = read_json(&file)?;
        self.sync.update(concept_id, update).await.context("update failed")?;
        print_json(&serde_json::json!({ "concept_id": concept_id }))
      }

      Command::Delete { concept_id } => {
        self.sync.delete(concept_id).await.context("delete failed")?;
        print_json(&serde_json::json!({ "concept_id": concept_id, "deleted": true }))
      }

      Command::Show { concept_id } => {
        let view = self
          .sync
          .get(concept_id)
          .await?
          .with_context(|| format!("concept {concept_id} not found"))?;
        print_json(&view)
      }

      Command::Validate { concept: Some(concept_id), fix } => {
        print_json(&self.check(concept_id, fix).await)
      }

      Command::Validate { concept: None, fix: false } => {
        let aggregate = self.validator.validate_all().await.context("validation failed")?;
        print_json(&aggregate)
      }

      Command::Validate { concept: None, fix: true } => {
        let aggregate = self.validator.validate_all().await.context("validation failed")?;
        let mut checked = Vec::new();
        for report in aggregate.reports {
          let fixes = self.validator.fix_integrity_issues(report.concept_id, &report.issues).await;
          checked.push(Checked { report, fixes });
        }
        print_json(&checked)
      }
    }
  }

  async fn check(&self, concept_id: Uuid, fix: bool) -> Checked {
    if fix {
      let (report, fixes) = self.validator.validate_and_fix(concept_id).await;
      Checked { report, fixes }
    } else {
      Checked { report: self.validator.validate_concept(concept_id).await, fixes: Vec::new() }
    }
  }
}

/// Log events until every publisher has been dropped.
pub async fn log_events(mut rx: broadcast::Receiver<SyncEvent>) {
  loop {
    match rx.recv().await {
      Ok(SyncEvent::Timing(t)) => tracing::debug!(
        operation = ?t.operation,
        store = ?t.store,
        status = ?t.status,
        duration_ms = t.duration_ms,
        "timing"
      ),
      Ok(SyncEvent::SyncError { operation, concept_id, error, committed }) => tracing::warn!(
        %operation,
        %concept_id,
        committed = ?committed,
        %error,
        "sync error"
      ),
      Ok(SyncEvent::ConceptCreated { concept, .. }) => {
        tracing::info!(concept_id = %concept.concept_id, "concept created")
      }
      Ok(SyncEvent::ConceptUpdated { concept_id, .. }) => {
        tracing::info!(%concept_id, "concept updated")
      }
      Ok(SyncEvent::ConceptDeleted { concept_id }) => {
        tracing::info!(%concept_id, "concept deleted")
      }
      Err(broadcast::error::RecvError::Lagged(skipped)) => {
        tracing::debug!(skipped, "event log lagged")
      }
      Err(broadcast::error::RecvError::Closed) => break,
    }
  }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
  let raw = if path == Path::new("-") {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf).context("failed to read stdin")?;
    buf
  } else {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
  };
  serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
