//! `concord`: create, inspect, and validate concepts across the relational,
//! graph, and document stores.
//!
//! Reads `concord.toml` (or the path given with `--config`) and `CONCORD_*`
//! environment variables. Log verbosity follows `RUST_LOG`.

mod commands;
mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use commands::{App, Command};
use settings::Settings;

#[derive(Parser)]
#[command(author, version, about = "Concord cross-store concept coordinator")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "concord.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr; stdout carries command output.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)
    .with_context(|| format!("failed to load {}", cli.config.display()))?;
  tracing::debug!(?settings, "configuration loaded");

  let app = App::open(&settings).await?;
  let logger = tokio::spawn(commands::log_events(app.subscribe()));
  let result = app.run(cli.command).await;

  // Dropping the app closes the event bus so the logger drains and exits.
  drop(app);
  if let Err(e) = logger.await {
    tracing::warn!(error = %e, "event logger task failed");
  }
  result
}
