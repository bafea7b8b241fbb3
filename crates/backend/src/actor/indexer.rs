//! Indexer actor - keeps one project's cscope file lists up to date
//!
//! The Indexer owns a [`Crawler`] and decides when to crawl, which subtree
//! to crawl, and how to split the matched files between index tiers:
//!
//! - **One-tier** (at most [`TWO_TIER_THRESHOLD`] files): `primary.files`
//!   lists every file and cscope builds the database on demand at query time.
//! - **Two-tier**: `secondary.files` lists every file and is rebuilt only on
//!   full updates; `primary.files` holds the promoted ("hot") files that were
//!   saved recently, so their changes are visible without a full rebuild.
//!
//! At most one crawl runs at a time. Requests arriving mid-crawl either
//! no-op (full refresh) or queue their directory for a partial crawl that is
//! dispatched once the current one has been processed.

use std::{
  collections::HashSet,
  io::Write,
  path::{Path, PathBuf},
  sync::Arc,
};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::{
  crawler::CrawlOutcome,
  handle::CrawlerHandle,
  runtime::{Actor, ActorError, Context},
};
use crate::{
  cscope::RunnerError,
  domain::{
    project::common_path_prefix,
    project_config::ProjectConfig,
    snapshot::{DirectorySnapshot, FileId},
  },
};

/// Projects with more matched files than this are indexed in two tiers
pub const TWO_TIER_THRESHOLD: usize = 50;

/// Database holding the promoted files
pub const PRIMARY_DB: &str = "primary";
/// Database holding every matched file
pub const SECONDARY_DB: &str = "secondary";
pub const FILE_LIST_EXT: &str = "files";
pub const DB_EXT: &str = "out";

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while generating a project's index
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
  #[error("Project has no usable configuration")]
  NoConfig,

  #[error("Project has no database location")]
  NoDatabaseLocation,

  #[error("Failed to write {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Building the cscope database failed: {0}")]
  Tool(#[from] RunnerError),
}

// ============================================================================
// Index Backend
// ============================================================================

/// Builds the on-disk database from the file lists the Indexer wrote
pub trait IndexBackend: Send + 'static {
  /// Rebuild the database named `name` inside `db_location`
  fn build(&mut self, db_location: &Path, name: &str, config: &ProjectConfig) -> Result<(), IndexError>;
}

// ============================================================================
// Status
// ============================================================================

/// How matched files are split between databases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMode {
  OneTier,
  TwoTier,
}

/// Point-in-time view of an Indexer's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexerStatus {
  pub project: Option<PathBuf>,
  pub db_location: Option<PathBuf>,
  pub complete: bool,
  pub mode: IndexMode,
  pub directories: usize,
  pub files: usize,
  pub promoted: usize,
  pub demoted: usize,
  pub queued: usize,
  pub crawl_in_progress: bool,
  pub crawls_dispatched: u64,
  pub crawls_completed: u64,
  pub generations: u64,
}

impl IndexerStatus {
  /// No crawl running and nothing waiting to be crawled
  pub fn is_idle(&self) -> bool {
    !self.crawl_in_progress && self.queued == 0 && self.crawls_dispatched == self.crawls_completed
  }
}

// ============================================================================
// Indexer Actor
// ============================================================================

pub struct Indexer {
  crawler: CrawlerHandle,
  backend: Box<dyn IndexBackend>,
  config: Option<Arc<ProjectConfig>>,
  mode: IndexMode,
  file_index: DirectorySnapshot,
  promotion_set: HashSet<PathBuf>,
  demotion_set: HashSet<PathBuf>,
  crawl_in_progress: bool,
  partial_crawl_queue: Vec<PathBuf>,
  crawls_dispatched: u64,
  crawls_completed: u64,
  generations: u64,
}

impl Actor for Indexer {
  const NAME: &'static str = "indexer";

  fn started(&mut self, _ctx: &Context<Self>) {
    if let Err(e) = self.crawler.start() {
      error!(error = %e, "Failed to start crawler");
    }
  }

  fn stopped(&mut self) {
    if let Err(e) = self.crawler.quit() {
      debug!(error = %e, "Crawler was not running");
    }
  }
}

impl Indexer {
  pub fn new(backend: Box<dyn IndexBackend>) -> Self {
    Self {
      crawler: CrawlerHandle::new(),
      backend,
      config: None,
      mode: IndexMode::OneTier,
      file_index: DirectorySnapshot::new(),
      promotion_set: HashSet::new(),
      demotion_set: HashSet::new(),
      crawl_in_progress: false,
      partial_crawl_queue: Vec::new(),
      crawls_dispatched: 0,
      crawls_completed: 0,
      generations: 0,
    }
  }

  fn project_label(&self) -> String {
    self
      .config
      .as_ref()
      .map(|c| c.project_file().display().to_string())
      .unwrap_or_default()
  }

  /// Replace the config when it differs by value, then refresh
  pub fn set_config(&mut self, ctx: &Context<Self>, config: Arc<ProjectConfig>) {
    if self.config.as_deref() == Some(&*config) {
      return;
    }

    info!(project = %config.project_file().display(), "New config received, refreshing");
    self.config = Some(config);
    self.refresh(ctx);
  }

  pub fn refresh(&mut self, ctx: &Context<Self>) {
    self.perform_crawl(ctx, false);
  }

  pub fn status(&self) -> IndexerStatus {
    IndexerStatus {
      project: self.config.as_ref().map(|c| c.project_file().to_path_buf()),
      db_location: self
        .config
        .as_ref()
        .and_then(|c| c.db_location())
        .map(Path::to_path_buf),
      complete: self.config.as_ref().is_some_and(|c| c.is_complete()),
      mode: self.mode,
      directories: self.file_index.len(),
      files: self.file_index.file_count(),
      promoted: self.promotion_set.len(),
      demoted: self.demotion_set.len(),
      queued: self.partial_crawl_queue.len(),
      crawl_in_progress: self.crawl_in_progress,
      crawls_dispatched: self.crawls_dispatched,
      crawls_completed: self.crawls_completed,
      generations: self.generations,
    }
  }

  /// Every matched file of the last crawl
  pub fn file_list(&self) -> Vec<PathBuf> {
    self.file_index.file_paths()
  }

  // ==========================================================================
  // Crawling
  // ==========================================================================

  fn perform_crawl(&mut self, ctx: &Context<Self>, partial: bool) {
    let Some(config) = self.config.clone().filter(|c| c.is_complete()) else {
      return;
    };

    if self.crawl_in_progress {
      info!(project = %config.project_file().display(), "Refresh already in progress");
      return;
    }

    let start_path = if partial { self.partial_start_path(&config) } else { None };
    match &start_path {
      Some(start) => debug!(project = %config.project_file().display(), start = %start.display(), "Partial refresh"),
      None => debug!(project = %config.project_file().display(), "Full refresh"),
    }

    self.partial_crawl_queue.clear();
    self.crawl_in_progress = true;
    self.crawls_dispatched += 1;

    let on_result = ctx
      .addr()
      .callback("crawl_result", |indexer: &mut Indexer, ctx: &Context<Indexer>, result| {
        indexer.on_crawl_result(ctx, result)
      });
    self.crawler.crawl_with(config, start_path, on_result);
  }

  /// Deepest existing directory covering every queued path, if it lies
  /// under a configured root
  fn partial_start_path(&self, config: &ProjectConfig) -> Option<PathBuf> {
    let mut start = common_path_prefix(&self.partial_crawl_queue)?;
    while !start.is_dir() {
      start = start.parent()?.to_path_buf();
    }
    config.find_base_path(&start).map(|_| start)
  }

  fn on_crawl_result(&mut self, ctx: &Context<Self>, result: Result<CrawlOutcome, ActorError>) {
    self.crawl_in_progress = false;
    self.crawls_completed += 1;

    match result {
      Ok(outcome) => self.apply_crawl(ctx, outcome),
      Err(e) => error!(project = %self.project_label(), error = %e, "Crawl failed"),
    }

    if !self.partial_crawl_queue.is_empty() && !self.crawl_in_progress {
      ctx.addr().cast("partial_crawl", |indexer: &mut Indexer, ctx: &Context<Indexer>| {
        indexer.perform_crawl(ctx, true);
        Ok(())
      });
    }
  }

  pub(crate) fn apply_crawl(&mut self, ctx: &Context<Self>, outcome: CrawlOutcome) {
    let CrawlOutcome { snapshot, start_path } = outcome;
    let count = snapshot.file_count();
    debug!(project = %self.project_label(), files = count, partial = start_path.is_some(), "Crawl results received");

    if count > TWO_TIER_THRESHOLD {
      if self.mode == IndexMode::OneTier {
        if start_path.is_some() {
          info!(
            project = %self.project_label(),
            "Partial update exceeded the two-tier threshold, performing full update"
          );
          self.perform_crawl(ctx, false);
          return;
        }

        info!(project = %self.project_label(), files = count, "Threshold exceeded, switching to two-tier mode");
        self.reset_tiering();
        self.mode = IndexMode::TwoTier;
      }
    } else if start_path.is_none() && self.mode == IndexMode::TwoTier {
      info!(project = %self.project_label(), files = count, "Project below threshold, reverting to one-tier mode");
      self.reset_tiering();
    }

    let previous = match &start_path {
      Some(start) => self.file_index.extract_under(start),
      None => std::mem::take(&mut self.file_index),
    };
    let changed = previous != snapshot;
    self.file_index.merge(snapshot);

    if changed {
      debug!(project = %self.project_label(), "Crawl contained changes");
      if self.generate_index(true) {
        self.purge_demoted(start_path.as_deref());
      }
    }
  }

  fn reset_tiering(&mut self) {
    self.mode = IndexMode::OneTier;
    self.partial_crawl_queue.clear();
    self.file_index.clear();
    self.promotion_set.clear();
    self.demotion_set.clear();
  }

  /// Drop demoted files under `scope` (everything when `None`) from both sets
  fn purge_demoted(&mut self, scope: Option<&Path>) {
    let purged: Vec<PathBuf> = self
      .demotion_set
      .iter()
      .filter(|f| scope.is_none_or(|s| f.starts_with(s)))
      .cloned()
      .collect();

    for file in purged {
      self.demotion_set.remove(&file);
      self.promotion_set.remove(&file);
    }
  }

  // ==========================================================================
  // Promotion
  // ==========================================================================

  /// Mark a saved file as hot
  pub fn promote_buffer(&mut self, ctx: &Context<Self>, path: PathBuf) {
    let Some(config) = self.config.clone().filter(|c| c.is_complete()) else {
      return;
    };
    if self.promotion_set.contains(&path) {
      return;
    }

    let (Some(dir), Some(name)) = (path.parent(), path.file_name().and_then(|n| n.to_str())) else {
      return;
    };
    let name = name.to_string();
    let dir_id = match std::fs::metadata(dir) {
      Ok(meta) => FileId::of(dir, &meta),
      Err(e) => {
        debug!(path = %path.display(), error = %e, "Cannot stat directory of promoted file");
        return;
      }
    };

    // A renamed directory keeps its identity; stay consistent with the snapshot
    let live = path.clone();
    let path = match self.file_index.get(&dir_id) {
      Some(entry) if entry.path != dir => entry.path.join(&name),
      _ => path,
    };

    if self.promotion_set.contains(&path) || !config.file_matches_path_via(&path, &live) {
      return;
    }

    debug!(path = %path.display(), "Promoting");
    match self.mode {
      IndexMode::TwoTier => {
        self.promotion_set.insert(path);
        self.generate_index(false);
      }
      IndexMode::OneTier => {
        let known = self.file_index.get(&dir_id).is_some_and(|e| e.contains(&name));
        if !known {
          self.perform_crawl(ctx, false);
        }
      }
    }
  }

  /// Mark a closed file for removal from the hot set
  pub fn demote_buffer(&mut self, ctx: &Context<Self>, path: PathBuf) {
    if !self.promotion_set.contains(&path) || self.demotion_set.contains(&path) {
      return;
    }

    debug!(path = %path.display(), "Demoting");
    if let Some(dir) = path.parent() {
      self.partial_crawl_queue.push(dir.to_path_buf());
    }
    self.demotion_set.insert(path);

    ctx.addr().cast("partial_crawl", |indexer: &mut Indexer, ctx: &Context<Indexer>| {
      indexer.perform_crawl(ctx, true);
      Ok(())
    });
  }

  // ==========================================================================
  // Index Generation
  // ==========================================================================

  /// Write the file lists and, on a full two-tier update, rebuild the
  /// secondary database. Failures are logged and reported as `false`.
  fn generate_index(&mut self, full_update: bool) -> bool {
    match self.write_index(full_update) {
      Ok(()) => {
        self.generations += 1;
        true
      }
      Err(e) => {
        error!(project = %self.project_label(), error = ?e, "Generating index failed");
        false
      }
    }
  }

  fn write_index(&mut self, full_update: bool) -> Result<(), IndexError> {
    let config = self.config.clone().ok_or(IndexError::NoConfig)?;
    let db_location = config.db_location().ok_or(IndexError::NoDatabaseLocation)?;

    let primary = db_location.join(format!("{PRIMARY_DB}.{FILE_LIST_EXT}"));
    let secondary = db_location.join(format!("{SECONDARY_DB}.{FILE_LIST_EXT}"));
    let files = self.file_index.file_paths();

    match self.mode {
      IndexMode::TwoTier => {
        if self.promotion_set.is_empty() {
          remove_if_exists(&primary)?;
        } else {
          let mut promoted: Vec<PathBuf> = self.promotion_set.iter().cloned().collect();
          promoted.sort();
          write_file_list(&primary, &promoted)?;
        }

        if full_update {
          write_file_list(&secondary, &files)?;
          self.backend.build(db_location, SECONDARY_DB, &config)?;
        }
      }
      IndexMode::OneTier => {
        write_file_list(&primary, &files)?;
        remove_if_exists(&secondary)?;
        remove_if_exists(&db_location.join(format!("{SECONDARY_DB}.{DB_EXT}")))?;
      }
    }

    Ok(())
  }
}

/// One path per line; paths containing spaces are double-quoted
pub fn write_file_list(path: &Path, files: &[PathBuf]) -> Result<(), IndexError> {
  let io_err = |source| IndexError::Io {
    path: path.to_path_buf(),
    source,
  };

  // Only the database folder itself is created, never its parents
  if let Some(dir) = path.parent()
    && !dir.exists()
  {
    std::fs::create_dir(dir).map_err(io_err)?;
  }

  let mut out = std::io::BufWriter::new(std::fs::File::create(path).map_err(io_err)?);
  for file in files {
    let file = file.to_string_lossy();
    if file.contains(' ') {
      writeln!(out, "\"{file}\"").map_err(io_err)?;
    } else {
      writeln!(out, "{file}").map_err(io_err)?;
    }
  }
  out.flush().map_err(io_err)
}

/// Read a list written by [`write_file_list`]
pub fn read_file_list(path: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
  let content = std::fs::read_to_string(path)?;
  Ok(
    content
      .lines()
      .map(str::trim)
      .filter(|l| !l.is_empty())
      .map(|l| PathBuf::from(l.strip_prefix('"').and_then(|l| l.strip_suffix('"')).unwrap_or(l)))
      .collect(),
  )
}

fn remove_if_exists(path: &Path) -> Result<(), IndexError> {
  match std::fs::remove_file(path) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
    Err(source) => {
      warn!(path = %path.display(), error = %source, "Failed to remove stale file list");
      Err(IndexError::Io {
        path: path.to_path_buf(),
        source,
      })
    }
  }
}
