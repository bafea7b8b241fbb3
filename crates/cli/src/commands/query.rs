//! Query a project's databases

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tagscope::{ProjectConfig, QueryError, QueryKind, QueryResult, cscope::query};
use tagscope_core::Settings;
use tracing::debug;

use super::{require_complete, resolve_host};

/// Run one cscope query and print its matches
pub fn cmd_query(
  settings: Settings,
  kind: QueryKind,
  term: &str,
  project: Option<PathBuf>,
  near: Option<PathBuf>,
  json: bool,
) -> Result<()> {
  let host = resolve_host(settings, project)?;
  require_complete(&host)?;
  let config = host.config();

  let near = match near {
    Some(path) => std::path::absolute(&path).with_context(|| format!("Invalid path {}", path.display()))?,
    None => std::env::current_dir().context("Failed to get current directory")?,
  };

  debug!(kind = %kind, term, project = %config.project_file().display(), near = %near.display(), "Querying");
  let results = find_matches(&config, kind, term, &near)?;

  if json {
    println!("{}", serde_json::to_string_pretty(&results)?);
    return Ok(());
  }

  if results.is_empty() {
    println!("No matches for {kind} '{term}'");
    return Ok(());
  }

  for result in &results {
    match &result.function {
      Some(function) => println!("{}:{}: {}: {}", result.file.display(), result.line, function, result.text),
      None => println!("{}:{}: {}", result.file.display(), result.line, result.text),
    }
  }

  Ok(())
}

/// Matches ordered by proximity to `near`
fn find_matches(config: &ProjectConfig, kind: QueryKind, term: &str, near: &Path) -> Result<Vec<QueryResult>> {
  match query(config, kind, term, Some(near)) {
    Ok(results) => Ok(results),
    Err(e @ QueryError::NotIndexed(_)) => Err(anyhow!("{e}\nRun `tagscope index` first.")),
    Err(e) => Err(e.into()),
  }
}
