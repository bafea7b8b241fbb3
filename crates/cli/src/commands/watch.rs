//! Watch command: keep the project's database current while files change
//!
//! notify's callback and the Ctrl-C handler both feed one channel. Events are
//! debounced into batches; every batch that touches the project becomes one
//! explicit registry refresh, and an edited project file re-evaluates the
//! project's settings first.

use std::{
  path::{Path, PathBuf},
  sync::mpsc,
  time::Duration,
};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tagscope_core::Settings;
use tracing::{debug, info, trace, warn};

use super::{new_registry, require_complete, resolve_host};
use crate::host::{ProjectHost, WINDOW};

const DEBOUNCE: Duration = Duration::from_millis(300);

enum WatchEvent {
  Fs(notify::Result<Event>),
  Shutdown,
}

/// Changes collected during one debounce window
#[derive(Debug, Default, PartialEq)]
struct ChangeBatch {
  project_file_changed: bool,
  paths: usize,
}

impl ChangeBatch {
  fn is_empty(&self) -> bool {
    !self.project_file_changed && self.paths == 0
  }

  /// Fold one notify event into the batch
  fn absorb(&mut self, event: &Event, host: &ProjectHost, db_location: Option<&Path>) {
    if matches!(event.kind, EventKind::Access(_) | EventKind::Other) {
      return;
    }

    for path in &event.paths {
      if host.is_project_file(path) {
        self.project_file_changed = true;
      } else if db_location.is_some_and(|db| path.starts_with(db)) {
        trace!(path = %path.display(), "Skipping database change");
      } else {
        self.paths += 1;
      }
    }
  }
}

/// Watch the project until Ctrl-C
pub fn cmd_watch(settings: Settings, project: Option<PathBuf>) -> Result<()> {
  let host = resolve_host(settings, project)?;
  require_complete(&host)?;

  let (tx, rx) = mpsc::channel::<WatchEvent>();

  let shutdown_tx = tx.clone();
  ctrlc::set_handler(move || {
    let _ = shutdown_tx.send(WatchEvent::Shutdown);
  })
  .context("Failed to install Ctrl-C handler")?;

  let mut watcher = RecommendedWatcher::new(
    move |res| {
      let _ = tx.send(WatchEvent::Fs(res));
    },
    notify::Config::default(),
  )
  .context("Failed to initialize file watcher")?;

  for root in host.watch_roots() {
    watcher
      .watch(&root, RecursiveMode::Recursive)
      .with_context(|| format!("Failed to watch {}", root.display()))?;
  }
  let project_file = host.project_file();
  if host.is_project_file(&project_file)
    && let Some(dir) = project_file.parent()
  {
    watcher
      .watch(dir, RecursiveMode::NonRecursive)
      .with_context(|| format!("Failed to watch {}", dir.display()))?;
  }

  let mut registry = new_registry(&host, None);
  registry.window_state_changed();
  info!(project = %project_file.display(), "Watching for changes, press Ctrl-C to stop");

  let mut shutdown = false;
  while !shutdown {
    let Ok(first) = rx.recv() else {
      break;
    };

    let db_location = host.config().db_location().map(Path::to_path_buf);
    let mut batch = ChangeBatch::default();
    let mut next = Some(first);
    while let Some(event) = next.take() {
      match event {
        WatchEvent::Shutdown => {
          shutdown = true;
          break;
        }
        WatchEvent::Fs(Ok(event)) => batch.absorb(&event, &host, db_location.as_deref()),
        WatchEvent::Fs(Err(e)) => warn!(error = %e, "Watcher error"),
      }
      next = rx.recv_timeout(DEBOUNCE).ok();
    }

    if shutdown || batch.is_empty() {
      continue;
    }

    debug!(paths = batch.paths, project_file = batch.project_file_changed, "Change batch settled");
    if batch.project_file_changed {
      registry.buffer_promoted(&project_file);
    }
    if batch.paths > 0 {
      registry.refresh(Some(WINDOW), true);
    }
  }

  info!("Stopping watcher");
  drop(watcher);
  registry.quit();
  Ok(())
}
