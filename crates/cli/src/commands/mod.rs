//! CLI command implementations

mod config;
mod index;
mod query;
mod watch;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  thread,
  time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use tagscope::{BackendFactory, CscopeBackend, IndexBackend, IndexerHandle, IndexerStatus, ProjectRegistry};
use tagscope_core::Settings;

use crate::host::ProjectHost;

pub use config::{cmd_config_init, cmd_config_path, cmd_config_show};
pub use index::cmd_index;
pub use query::cmd_query;
pub use watch::cmd_watch;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Resolve the project argument against the current directory
fn resolve_host(settings: Settings, project: Option<PathBuf>) -> Result<Arc<ProjectHost>> {
  let path = match project {
    Some(path) => path,
    None => std::env::current_dir().context("Failed to get current directory")?,
  };
  Ok(Arc::new(ProjectHost::discover(&path, settings)?))
}

/// Ensure the project would be indexed at all
fn require_complete(host: &ProjectHost) -> Result<()> {
  let config = host.config();
  if !config.is_complete() {
    bail!(
      "Project {} has nothing to index: check its folders and index_file_extensions",
      config.project_file().display()
    );
  }
  Ok(())
}

/// Database builds report percentages to `progress` when given
fn cscope_backend(progress: Option<fn(u32)>) -> BackendFactory {
  Arc::new(move |_: &Path| {
    let backend = match progress {
      Some(observer) => CscopeBackend::with_progress(observer),
      None => CscopeBackend::new(),
    };
    Box::new(backend) as Box<dyn IndexBackend>
  })
}

fn new_registry(host: &Arc<ProjectHost>, progress: Option<fn(u32)>) -> ProjectRegistry {
  ProjectRegistry::new(host.clone(), cscope_backend(progress))
}

/// Poll `indexer` until no crawl is pending and at least `crawls` completed
fn wait_until_idle(indexer: &IndexerHandle, crawls: u64, started: Instant) -> Result<IndexerStatus> {
  loop {
    let status = indexer.status().context("Indexer stopped unexpectedly")?;
    if status.is_idle() && status.crawls_completed >= crawls {
      return Ok(status);
    }
    if started.elapsed() > Duration::from_secs(5) && status.crawls_dispatched == 0 {
      bail!("Indexer did not start crawling");
    }
    thread::sleep(POLL_INTERVAL);
  }
}
