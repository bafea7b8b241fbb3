//! The editor side of the registry
//!
//! The registry never talks to a concrete editor. It asks an [`EditorHost`]
//! which windows are open, what their folders and project files are, and
//! where scratch data may go.

use std::path::PathBuf;

use tagscope_core::config::{FolderEntry, Settings, SettingsOverrides};

/// Identifies an editor window for the lifetime of the session
pub type WindowId = u64;

/// What the registry needs to know about one live window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowInfo {
  pub id: WindowId,
  /// Project file opened in the window, if any
  pub project_file: Option<PathBuf>,
  pub folders: Vec<FolderEntry>,
  /// Per-project settings, applied over the global settings
  pub settings: SettingsOverrides,
}

impl WindowInfo {
  pub fn new(id: WindowId) -> Self {
    Self {
      id,
      ..Default::default()
    }
  }

  /// Global settings with this window's overrides applied
  pub fn effective_settings(&self, global: &Settings) -> Settings {
    global.with_overrides(&self.settings)
  }
}

/// Source of window state and settings for a [`ProjectRegistry`](crate::actor::registry::ProjectRegistry)
pub trait EditorHost: Send + Sync {
  /// Every currently open window
  fn windows(&self) -> Vec<WindowInfo>;

  /// Global settings
  fn settings(&self) -> Settings;

  /// Directory for placeholder projects of windows without a project file
  fn cache_dir(&self) -> PathBuf;

  fn window(&self, id: WindowId) -> Option<WindowInfo> {
    self.windows().into_iter().find(|w| w.id == id)
  }
}
