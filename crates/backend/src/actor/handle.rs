//! Actor handles for communicating with actors
//!
//! Handles are cheap to clone and wrap an [`Addr`] with typed methods, so
//! callers never build closures over actor internals themselves.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use super::{
  crawler::{CrawlOutcome, Crawler},
  indexer::{IndexBackend, Indexer, IndexerStatus},
  message::ResultCallback,
  runtime::{ActorError, ActorState, Addr},
};
use crate::domain::project_config::ProjectConfig;

// ============================================================================
// Crawler Handle
// ============================================================================

/// Handle to a Crawler actor
#[derive(Clone, Debug)]
pub struct CrawlerHandle {
  addr: Addr<Crawler>,
}

impl Default for CrawlerHandle {
  fn default() -> Self {
    Self::new()
  }
}

impl CrawlerHandle {
  pub fn new() -> Self {
    Self {
      addr: Addr::new(Crawler::new()),
    }
  }

  pub fn start(&self) -> Result<(), ActorError> {
    self.addr.start()
  }

  pub fn quit(&self) -> Result<(), ActorError> {
    self.addr.quit()
  }

  pub fn state(&self) -> ActorState {
    self.addr.state()
  }

  /// Crawl in the background; `on_result` receives the snapshot or the error
  pub fn crawl_with(
    &self,
    config: Arc<ProjectConfig>,
    start_path: Option<PathBuf>,
    on_result: ResultCallback<CrawlOutcome>,
  ) {
    self.addr.cast_with(
      "crawl",
      move |crawler, _ctx| crawler.crawl(config, start_path).map_err(ActorError::from),
      on_result,
    );
  }
}

// ============================================================================
// Indexer Handle
// ============================================================================

/// Handle to an Indexer actor
///
/// Everything except [`status`](Self::status) and
/// [`file_list`](Self::file_list) is fire-and-forget: the request is queued
/// and the caller returns immediately.
#[derive(Clone, Debug)]
pub struct IndexerHandle {
  addr: Addr<Indexer>,
}

impl IndexerHandle {
  /// Create an Indexer without starting it; the first request starts it
  pub fn new(backend: Box<dyn IndexBackend>) -> Self {
    Self {
      addr: Addr::new(Indexer::new(backend)),
    }
  }

  /// Create and start an Indexer
  pub fn spawn(backend: Box<dyn IndexBackend>) -> Result<Self, ActorError> {
    let handle = Self::new(backend);
    handle.start()?;
    Ok(handle)
  }

  pub fn start(&self) -> Result<(), ActorError> {
    self.addr.start()
  }

  pub fn quit(&self) -> Result<(), ActorError> {
    self.addr.quit()
  }

  pub fn state(&self) -> ActorState {
    self.addr.state()
  }

  pub fn set_config(&self, config: Arc<ProjectConfig>) {
    self.addr.cast("set_config", move |indexer, ctx| {
      indexer.set_config(ctx, config);
      Ok(())
    });
  }

  pub fn refresh(&self) {
    self.addr.cast("refresh", |indexer, ctx| {
      indexer.refresh(ctx);
      Ok(())
    });
  }

  pub fn promote_buffer(&self, path: impl AsRef<Path>) {
    let path = path.as_ref().to_path_buf();
    self.addr.cast("promote_buffer", move |indexer, ctx| {
      indexer.promote_buffer(ctx, path);
      Ok(())
    });
  }

  pub fn demote_buffer(&self, path: impl AsRef<Path>) {
    let path = path.as_ref().to_path_buf();
    self.addr.cast("demote_buffer", move |indexer, ctx| {
      indexer.demote_buffer(ctx, path);
      Ok(())
    });
  }

  pub fn status(&self) -> Result<IndexerStatus, ActorError> {
    self.addr.call("status", |indexer, _ctx| Ok(indexer.status()))
  }

  pub fn file_list(&self) -> Result<Vec<PathBuf>, ActorError> {
    self.addr.call("file_list", |indexer, _ctx| Ok(indexer.file_list()))
  }

  pub fn addr(&self) -> &Addr<Indexer> {
    &self.addr
  }

  /// True when both handles refer to the same Indexer
  pub fn same_actor(&self, other: &IndexerHandle) -> bool {
    self.addr.ptr_eq(&other.addr)
  }
}
