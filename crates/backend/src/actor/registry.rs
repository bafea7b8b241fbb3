//! ProjectRegistry - maps editor windows onto per-project Indexers
//!
//! The registry is the only entry point for editor lifecycle events. It keeps
//! one [`IndexerHandle`] per project identity, remembers which windows show
//! which project, and quits an Indexer once no window references its project.
//!
//! Project identity is the window's project file, or a placeholder inside
//! the cache directory for windows that have folders but no project file.
//!
//! All methods take `&mut self`: the registry is driven from a single thread
//! (the editor's), and callers that share it wrap it in a mutex.

use std::{
  collections::{BTreeSet, HashMap},
  path::{Path, PathBuf},
  sync::Arc,
};

use tagscope_core::config::Settings;
use tracing::{debug, error, info, warn};

use super::{
  handle::IndexerHandle,
  indexer::IndexBackend,
  runtime::ActorError,
};
use crate::{
  domain::{project::placeholder_project_file, project_config::ProjectConfig},
  editor::{EditorHost, WindowId, WindowInfo},
};

/// Creates the index backend for a newly seen project
pub type BackendFactory = Arc<dyn Fn(&Path) -> Box<dyn IndexBackend> + Send + Sync>;

struct ProjectEntry {
  indexer: IndexerHandle,
  config: Option<Arc<ProjectConfig>>,
  windows: BTreeSet<WindowId>,
}

pub struct ProjectRegistry {
  host: Arc<dyn EditorHost>,
  backend: BackendFactory,
  projects: HashMap<PathBuf, ProjectEntry>,
  windows: HashMap<WindowId, PathBuf>,
}

impl ProjectRegistry {
  pub fn new(host: Arc<dyn EditorHost>, backend: BackendFactory) -> Self {
    Self {
      host,
      backend,
      projects: HashMap::new(),
      windows: HashMap::new(),
    }
  }

  // ==========================================================================
  // Lifecycle Events
  // ==========================================================================

  /// Bring the Indexers of one window (or all windows) in line with their
  /// current project and settings
  ///
  /// An `explicit` refresh also re-crawls projects whose config did not
  /// change; a config change already triggers a crawl on its own.
  pub fn refresh(&mut self, window: Option<WindowId>, explicit: bool) {
    let settings = self.host.settings();
    let windows: Vec<WindowInfo> = match window {
      Some(id) => self.host.window(id).into_iter().collect(),
      None => self.host.windows(),
    };

    for info in &windows {
      self.refresh_window(info, &settings, explicit);
    }
  }

  fn refresh_window(&mut self, info: &WindowInfo, settings: &Settings, explicit: bool) {
    let Some(project) = self.project_identity(info) else {
      self.disassociate(info.id);
      return;
    };

    if self.windows.get(&info.id).is_some_and(|current| *current != project) {
      self.disassociate(info.id);
    }

    let config = Arc::new(ProjectConfig::build(
      &project,
      &info.folders,
      &info.effective_settings(settings),
    ));

    let backend = &self.backend;
    let entry = self.projects.entry(project.clone()).or_insert_with(|| {
      info!(project = %project.display(), window = info.id, "Creating indexer");
      ProjectEntry {
        indexer: IndexerHandle::new(backend(&project)),
        config: None,
        windows: BTreeSet::new(),
      }
    });

    let mut explicit = explicit;
    if entry.config.as_deref() != Some(&*config) {
      entry.indexer.set_config(Arc::clone(&config));
      entry.config = Some(config);
      explicit = false;
    }

    entry.windows.insert(info.id);
    self.windows.insert(info.id, project.clone());

    if let Err(e) = entry.indexer.start() {
      error!(project = %project.display(), error = %e, "Failed to start indexer");
      return;
    }

    if explicit {
      entry.indexer.refresh();
    }
  }

  /// Forget closed windows, refresh the open ones, and quit orphaned Indexers
  pub fn window_state_changed(&mut self) {
    let live: BTreeSet<WindowId> = self.host.windows().iter().map(|w| w.id).collect();

    let closed: Vec<WindowId> = self.windows.keys().filter(|id| !live.contains(id)).copied().collect();
    for id in closed {
      debug!(window = id, "Window closed");
      self.disassociate(id);
    }

    self.refresh(None, false);
    self.prune();
  }

  /// A buffer was saved
  pub fn buffer_promoted(&mut self, path: &Path) {
    if self.projects.contains_key(path) {
      debug!(project = %path.display(), "Project file saved, re-evaluating settings");
      self.settings_changed(Some(path));
      return;
    }

    for entry in self.projects.values() {
      entry.indexer.promote_buffer(path);
    }
  }

  /// A buffer was closed
  pub fn buffer_demoted(&mut self, path: &Path) {
    if self.projects.contains_key(path) {
      return;
    }

    for entry in self.projects.values() {
      entry.indexer.demote_buffer(path);
    }
  }

  /// Settings changed for one project, or globally when `project` is `None`
  ///
  /// A project without an Indexer gets the global treatment: every window is
  /// refreshed, which picks it up if a window now references it.
  pub fn settings_changed(&mut self, project: Option<&Path>) {
    let Some((project, entry)) = project.and_then(|p| self.projects.get_mut(p).map(|entry| (p, entry))) else {
      self.refresh(None, false);
      return;
    };

    let Some(info) = self
      .host
      .windows()
      .into_iter()
      .find(|w| entry.windows.contains(&w.id))
    else {
      debug!(project = %project.display(), "No open window references project");
      return;
    };

    let settings = info.effective_settings(&self.host.settings());
    let config = Arc::new(ProjectConfig::build(project, &info.folders, &settings));
    if entry.config.as_deref() != Some(&*config) {
      info!(project = %project.display(), "Project settings changed");
      entry.indexer.set_config(Arc::clone(&config));
      entry.config = Some(config);
    }
  }

  /// Drop every window association and quit every Indexer
  pub fn quit(&mut self) {
    self.windows.clear();
    for entry in self.projects.values_mut() {
      entry.windows.clear();
    }
    self.prune();
  }

  /// Quit and remove Indexers no window references
  pub fn prune(&mut self) {
    let orphaned: Vec<PathBuf> = self
      .projects
      .iter()
      .filter(|(_, entry)| entry.windows.is_empty())
      .map(|(project, _)| project.clone())
      .collect();

    for project in orphaned {
      let Some(entry) = self.projects.remove(&project) else {
        continue;
      };

      info!(project = %project.display(), "Stopping indexer");
      match entry.indexer.quit() {
        Ok(()) | Err(ActorError::NotRunning(_)) => {}
        Err(e) => warn!(project = %project.display(), error = %e, "Indexer did not stop cleanly"),
      }
    }
  }

  // ==========================================================================
  // Accessors
  // ==========================================================================

  pub fn indexer_for_window(&self, window: WindowId) -> Option<&IndexerHandle> {
    let project = self.windows.get(&window)?;
    self.indexer_for_project(project)
  }

  pub fn indexer_for_project(&self, project: &Path) -> Option<&IndexerHandle> {
    self.projects.get(project).map(|e| &e.indexer)
  }

  pub fn config_for_project(&self, project: &Path) -> Option<Arc<ProjectConfig>> {
    self.projects.get(project).and_then(|e| e.config.clone())
  }

  /// Identities of every registered project
  pub fn projects(&self) -> impl Iterator<Item = &Path> {
    self.projects.keys().map(PathBuf::as_path)
  }

  pub fn project_of(&self, window: WindowId) -> Option<&Path> {
    self.windows.get(&window).map(PathBuf::as_path)
  }

  pub fn windows_of(&self, project: &Path) -> Vec<WindowId> {
    self
      .projects
      .get(project)
      .map(|e| e.windows.iter().copied().collect())
      .unwrap_or_default()
  }

  // ==========================================================================
  // Helpers
  // ==========================================================================

  fn project_identity(&self, info: &WindowInfo) -> Option<PathBuf> {
    if let Some(project_file) = &info.project_file {
      return Some(project_file.clone());
    }

    if info.folders.is_empty() {
      return None;
    }

    let placeholder = placeholder_project_file(&self.host.cache_dir(), info.id);
    if let Some(dir) = placeholder.parent()
      && let Err(e) = std::fs::create_dir_all(dir)
    {
      warn!(path = %dir.display(), error = %e, "Failed to create placeholder project folder");
    }
    Some(placeholder)
  }

  fn disassociate(&mut self, window: WindowId) {
    if let Some(project) = self.windows.remove(&window)
      && let Some(entry) = self.projects.get_mut(&project)
    {
      debug!(window, project = %project.display(), "Window left project");
      entry.windows.remove(&window);
    }
  }
}

impl Drop for ProjectRegistry {
  fn drop(&mut self) {
    if !self.projects.is_empty() {
      self.quit();
    }
  }
}
