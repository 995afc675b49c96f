//! Runtime configuration, read from a TOML file and `CONCORD_*` environment
//! variables. Nested tables use a double underscore in variable names, e.g.
//! `CONCORD_COORDINATOR__OPERATION_TIMEOUT_MS=5000`.

use std::path::{Path, PathBuf};

use concord_sync::{CacheConfig, CoordinatorConfig, ValidatorConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// SQLite database holding concept metadata.
  pub relational_path:      PathBuf,
  /// JSON snapshot of the graph store.
  pub graph_path:           PathBuf,
  /// JSON snapshot of the document store.
  pub document_path:        PathBuf,
  pub relational_pool_size: usize,
  pub coordinator:          CoordinatorConfig,
  pub cache:                CacheConfig,
  pub validator:            ValidatorConfig,
}

impl Default for Settings {
  fn default() -> Self {
    let data = PathBuf::from("~/.local/share/concord");
    Self {
      relational_path:      data.join("concord.db"),
      graph_path:           data.join("graph.json"),
      document_path:        data.join("documents.json"),
      relational_pool_size: 8,
      coordinator:          CoordinatorConfig::default(),
      cache:                CacheConfig::default(),
      validator:            ValidatorConfig::default(),
    }
  }
}

impl Settings {
  /// Load from `path` (optional) overlaid with the environment.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    let mut settings: Settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("CONCORD").separator("__"))
      .build()?
      .try_deserialize()?;

    settings.relational_path = expand_tilde(&settings.relational_path);
    settings.graph_path = expand_tilde(&settings.graph_path);
    settings.document_path = expand_tilde(&settings.document_path);
    Ok(settings)
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
