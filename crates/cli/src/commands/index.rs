//! One-shot crawl and database build

use std::{
  io::{IsTerminal, Write},
  path::PathBuf,
  time::Instant,
};

use anyhow::{Context, Result};
use serde::Serialize;
use tagscope::{IndexMode, IndexerStatus};
use tagscope_core::Settings;
use tracing::info;

use super::{new_registry, require_complete, resolve_host, wait_until_idle};
use crate::host::WINDOW;

#[derive(Debug, Serialize)]
struct IndexReport {
  #[serde(flatten)]
  status: IndexerStatus,
  elapsed_ms: u128,
}

/// Crawl the project and (re)build its databases
pub fn cmd_index(settings: Settings, project: Option<PathBuf>, json: bool) -> Result<()> {
  let host = resolve_host(settings, project)?;
  require_complete(&host)?;

  let started = Instant::now();
  let progress = (!json && std::io::stderr().is_terminal()).then_some(print_progress as fn(u32));
  let mut registry = new_registry(&host, progress);
  registry.window_state_changed();

  let indexer = registry
    .indexer_for_window(WINDOW)
    .cloned()
    .context("No indexer was created for the project")?;
  let status = wait_until_idle(&indexer, 1, started)?;
  registry.quit();

  let report = IndexReport {
    status,
    elapsed_ms: started.elapsed().as_millis(),
  };
  info!(
    files = report.status.files,
    generations = report.status.generations,
    elapsed_ms = report.elapsed_ms,
    "Index complete"
  );

  if json {
    println!("{}", serde_json::to_string_pretty(&report)?);
    return Ok(());
  }

  let status = &report.status;
  if let Some(project) = &status.project {
    println!("Project:    {}", project.display());
  }
  if let Some(db) = &status.db_location {
    println!("Database:   {}", db.display());
  }
  println!(
    "Mode:       {}",
    match status.mode {
      IndexMode::OneTier => "one-tier",
      IndexMode::TwoTier => "two-tier",
    }
  );
  println!("Dirs:       {}", status.directories);
  println!("Files:      {}", status.files);
  if status.generations == 0 {
    println!("Note:       database not rebuilt (see log output)");
  }
  println!("Took:       {:.2}s", report.elapsed_ms as f64 / 1000.0);

  Ok(())
}

/// Rewrite the progress line on stderr
fn print_progress(percent: u32) {
  let mut stderr = std::io::stderr().lock();
  let _ = write!(stderr, "{}", progress_line(percent));
  if percent >= 100 {
    let _ = writeln!(stderr);
  }
  let _ = stderr.flush();
}

fn progress_line(percent: u32) -> String {
  format!("\rBuilding symbol database {:>3}%", percent.min(100))
}
