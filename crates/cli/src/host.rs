//! A single-window editor host backed by a project file or a folder

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tagscope::{EditorHost, ProjectConfig, WindowId, WindowInfo, domain::project::placeholder_project_file};
use tagscope_core::{FolderEntry, ProjectFile, Settings, dirs::default_cache_dir};
use tracing::warn;

/// The CLI drives exactly one window
pub const WINDOW: WindowId = 1;

#[derive(Debug, Clone, PartialEq)]
enum Target {
  ProjectFile(PathBuf),
  Folder(PathBuf),
}

/// Presents a project on disk as the only open editor window
///
/// The project file is re-read on every [`EditorHost::windows`] call, so
/// edits are picked up by settings re-evaluation.
#[derive(Debug)]
pub struct ProjectHost {
  target: Target,
  settings: Settings,
  cache_dir: PathBuf,
}

impl ProjectHost {
  /// Resolve `path` (a project file, or a folder that may contain one)
  pub fn discover(path: &Path, settings: Settings) -> Result<Self> {
    Self::discover_with_cache(path, settings, default_cache_dir())
  }

  pub fn discover_with_cache(path: &Path, settings: Settings, cache_dir: PathBuf) -> Result<Self> {
    let path = path
      .canonicalize()
      .with_context(|| format!("Project path {} does not exist", path.display()))?;

    let target = if path.is_file() {
      if !ProjectFile::is_project_file(&path) {
        bail!("{} is not a project file (*.tagscope.toml)", path.display());
      }
      Target::ProjectFile(path)
    } else {
      match ProjectFile::find_in(&path) {
        Some(project_file) => Target::ProjectFile(project_file),
        None => Target::Folder(path),
      }
    };

    Ok(Self {
      target,
      settings,
      cache_dir,
    })
  }

  /// Project identity as the registry sees it
  pub fn project_file(&self) -> PathBuf {
    match &self.target {
      Target::ProjectFile(path) => path.clone(),
      Target::Folder(_) => placeholder_project_file(&self.cache_dir, WINDOW),
    }
  }

  /// True when `path` is the project file being watched
  pub fn is_project_file(&self, path: &Path) -> bool {
    matches!(&self.target, Target::ProjectFile(p) if p == path)
  }

  /// Directories whose changes matter: every configured folder, plus the
  /// project file's directory
  pub fn watch_roots(&self) -> Vec<PathBuf> {
    let info = self.window_info();
    let base = self.project_file().parent().map(Path::to_path_buf).unwrap_or_default();
    let mut roots: Vec<PathBuf> = info
      .folders
      .iter()
      .map(|f| if f.path.is_absolute() { f.path.clone() } else { base.join(&f.path) })
      .collect();
    roots.sort();
    roots.dedup();
    roots
  }

  /// Build the project's config the same way the registry does
  pub fn config(&self) -> ProjectConfig {
    let info = self.window_info();
    if info.project_file.is_none()
      && let Some(dir) = self.project_file().parent()
      && let Err(e) = std::fs::create_dir_all(dir)
    {
      warn!(path = %dir.display(), error = %e, "Failed to create placeholder project folder");
    }
    ProjectConfig::build(&self.project_file(), &info.folders, &info.effective_settings(&self.settings))
  }

  fn window_info(&self) -> WindowInfo {
    match &self.target {
      Target::ProjectFile(path) => {
        let project = ProjectFile::load(path).unwrap_or_else(|e| {
          warn!(project = %path.display(), error = %e, "Failed to load project file");
          ProjectFile::default()
        });
        WindowInfo {
          project_file: Some(path.clone()),
          folders: project.folders,
          settings: project.settings,
          ..WindowInfo::new(WINDOW)
        }
      }
      Target::Folder(dir) => WindowInfo {
        folders: vec![FolderEntry::new(dir)],
        ..WindowInfo::new(WINDOW)
      },
    }
  }
}

impl EditorHost for ProjectHost {
  fn windows(&self) -> Vec<WindowInfo> {
    vec![self.window_info()]
  }

  fn settings(&self) -> Settings {
    self.settings.clone()
  }

  fn cache_dir(&self) -> PathBuf {
    self.cache_dir.clone()
  }
}
