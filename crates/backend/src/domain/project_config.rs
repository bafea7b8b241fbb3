//! Per-project indexing rules
//!
//! A [`ProjectConfig`] is built fresh from the effective settings every time
//! a project is refreshed or its settings change, and is never mutated
//! afterwards. The Indexer compares configs by value to decide whether it has
//! to react, so equality covers exactly the fields that influence what gets
//! indexed.

use std::{
  collections::{BTreeMap, BTreeSet},
  fs::Metadata,
  path::{Path, PathBuf},
};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tagscope_core::{FolderEntry, Settings};
use tracing::{debug, warn};

use super::project::database_location;

// ============================================================================
// Patterns
// ============================================================================

/// Set of fnmatch-style patterns
///
/// A pattern matches when it matches either the bare entry name or its full
/// path. `*` also matches path separators.
#[derive(Clone)]
pub struct PatternSet {
  patterns: BTreeSet<String>,
  matcher: GlobSet,
}

impl PatternSet {
  pub fn new<I, S>(patterns: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let patterns: BTreeSet<String> = patterns
      .into_iter()
      .map(|p| p.as_ref().to_string())
      .filter(|p| !p.is_empty())
      .collect();

    let mut builder = GlobSetBuilder::new();
    for pattern in &patterns {
      match GlobBuilder::new(pattern).literal_separator(false).build() {
        Ok(glob) => {
          builder.add(glob);
        }
        Err(e) => warn!(pattern = %pattern, error = %e, "Ignoring invalid pattern"),
      }
    }

    let matcher = builder.build().unwrap_or_else(|e| {
      warn!(error = %e, "Failed to compile pattern set");
      GlobSet::empty()
    });

    Self { patterns, matcher }
  }

  pub fn is_empty(&self) -> bool {
    self.patterns.is_empty()
  }

  pub fn patterns(&self) -> impl Iterator<Item = &str> {
    self.patterns.iter().map(String::as_str)
  }

  pub fn matches(&self, name: &str, full_path: &Path) -> bool {
    !self.patterns.is_empty() && (self.matcher.is_match(name) || self.matcher.is_match(full_path))
  }
}

impl Default for PatternSet {
  fn default() -> Self {
    Self::new(std::iter::empty::<&str>())
  }
}

impl PartialEq for PatternSet {
  fn eq(&self, other: &Self) -> bool {
    self.patterns == other.patterns
  }
}

impl Eq for PatternSet {}

impl std::fmt::Debug for PatternSet {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_set().entries(self.patterns.iter()).finish()
  }
}

// ============================================================================
// Folder Rules
// ============================================================================

/// Kind of a directory entry, from its metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
  File,
  Directory,
  Other,
}

impl From<&Metadata> for EntryKind {
  fn from(meta: &Metadata) -> Self {
    if meta.is_file() {
      EntryKind::File
    } else if meta.is_dir() {
      EntryKind::Directory
    } else {
      EntryKind::Other
    }
  }
}

/// Rules for one configured root folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderConfig {
  pub follow_symlinks: bool,
  pub file_whitelist: PatternSet,
  pub file_blacklist: PatternSet,
  pub folder_whitelist: PatternSet,
  pub folder_blacklist: PatternSet,
}

impl FolderConfig {
  /// Merge the global pattern lists with the folder's own
  fn build(folder: &FolderEntry, settings: &Settings) -> Self {
    let merged = |global: &[String], local: &[String]| PatternSet::new(global.iter().chain(local.iter()));

    Self {
      follow_symlinks: folder.follow_symlinks,
      file_whitelist: merged(&settings.file_include_patterns, &folder.file_include_patterns),
      file_blacklist: merged(&settings.file_exclude_patterns, &folder.file_exclude_patterns),
      folder_whitelist: merged(&settings.folder_include_patterns, &folder.folder_include_patterns),
      folder_blacklist: merged(&settings.folder_exclude_patterns, &folder.folder_exclude_patterns),
    }
  }
}

/// Settings consumed by the cscope invocation; not part of config equality
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolSettings {
  pub cscope_path: Option<PathBuf>,
  pub search_std_include_folders: bool,
  pub extra_include_folders: Vec<PathBuf>,
  pub tmp_folder: Option<PathBuf>,
  pub maximum_results: usize,
}

impl From<&Settings> for ToolSettings {
  fn from(settings: &Settings) -> Self {
    Self {
      cscope_path: settings.cscope_path.clone(),
      search_std_include_folders: settings.search_std_include_folders,
      extra_include_folders: settings.extra_include_folders.clone(),
      tmp_folder: settings.tmp_folder.clone(),
      maximum_results: settings.maximum_results,
    }
  }
}

// ============================================================================
// Project Config
// ============================================================================

/// Immutable snapshot of a project's indexing rules
#[derive(Debug, Clone)]
pub struct ProjectConfig {
  project_file: PathBuf,
  db_location: Option<PathBuf>,
  file_extensions: BTreeSet<String>,
  folders: BTreeMap<PathBuf, FolderConfig>,
  index_blacklist: PatternSet,
  search_std_include_folders: bool,
  std_include_folders: BTreeSet<PathBuf>,
  complete: bool,
  tool: ToolSettings,
}

impl ProjectConfig {
  /// Build the config of `project_file` from its folders and effective settings
  pub fn build(project_file: &Path, folders: &[FolderEntry], settings: &Settings) -> Self {
    let mut config = Self {
      project_file: project_file.to_path_buf(),
      db_location: database_location(project_file),
      file_extensions: settings
        .index_file_extensions
        .iter()
        .filter(|e| !e.is_empty())
        .cloned()
        .collect(),
      folders: BTreeMap::new(),
      index_blacklist: PatternSet::new(&settings.index_exclude_patterns),
      search_std_include_folders: settings.search_std_include_folders,
      std_include_folders: settings.std_include_folders.iter().cloned().collect(),
      complete: false,
      tool: ToolSettings::from(settings),
    };

    if config.db_location.is_none() {
      return config;
    }

    if config.file_extensions.is_empty() {
      warn!(
        project = %project_file.display(),
        "The list of file extensions to index is empty, check your settings"
      );
      return config;
    }

    let base = project_file.parent().unwrap_or_else(|| Path::new(""));
    for folder in folders {
      if folder.path.as_os_str().is_empty() {
        continue;
      }

      let path = if folder.path.is_absolute() {
        folder.path.clone()
      } else {
        debug!(folder = %folder.path.display(), base = %base.display(), "Resolving relative folder");
        base.join(&folder.path)
      };

      config.folders.insert(path, FolderConfig::build(folder, settings));
    }

    config.complete = !config.file_extensions.is_empty() && !config.folders.is_empty();
    if !config.complete {
      warn!(project = %project_file.display(), "Project has no folders, indexing disabled");
    }

    config
  }

  /// True when there is a database location, an extension and a folder
  pub fn is_complete(&self) -> bool {
    self.complete
  }

  pub fn project_file(&self) -> &Path {
    &self.project_file
  }

  pub fn db_location(&self) -> Option<&Path> {
    self.db_location.as_deref()
  }

  pub fn file_extensions(&self) -> impl Iterator<Item = &str> {
    self.file_extensions.iter().map(String::as_str)
  }

  pub fn search_std_include_folders(&self) -> bool {
    self.search_std_include_folders
  }

  pub fn std_include_folders(&self) -> impl Iterator<Item = &Path> {
    self.std_include_folders.iter().map(PathBuf::as_path)
  }

  pub fn tool_settings(&self) -> &ToolSettings {
    &self.tool
  }

  /// Configured roots with their rules
  pub fn roots(&self) -> impl Iterator<Item = (&Path, &FolderConfig)> {
    self.folders.iter().map(|(p, c)| (p.as_path(), c))
  }

  /// The configured root containing `path`; the deepest one for nested roots
  pub fn find_base_path(&self, path: &Path) -> Option<(&Path, &FolderConfig)> {
    let found = self
      .folders
      .iter()
      .filter(|(root, _)| path.starts_with(root))
      .max_by_key(|(root, _)| root.components().count())
      .map(|(root, cfg)| (root.as_path(), cfg));

    if found.is_none() {
      debug!(path = %path.display(), "No configured root contains path");
    }
    found
  }

  fn has_allowed_extension(&self, name: &str) -> bool {
    Path::new(name)
      .extension()
      .and_then(|e| e.to_str())
      .is_some_and(|ext| self.file_extensions.contains(&format!(".{ext}")))
  }

  /// Whether the file `name` in `dir` belongs to the index of root `root`
  pub fn file_matches(&self, root: &Path, dir: &Path, name: &str, kind: EntryKind) -> bool {
    let Some(folder) = self.folders.get(root) else {
      return false;
    };

    if kind != EntryKind::File || !self.has_allowed_extension(name) {
      return false;
    }

    let full_path = dir.join(name);
    if !folder.file_whitelist.is_empty() && !folder.file_whitelist.matches(name, &full_path) {
      return false;
    }

    !(folder.file_blacklist.matches(name, &full_path) || self.index_blacklist.matches(name, &full_path))
  }

  /// Whether the crawl descends into the folder `name` in `dir`
  pub fn folder_matches(&self, root: &Path, dir: &Path, name: &str, kind: EntryKind) -> bool {
    let Some(folder) = self.folders.get(root) else {
      return false;
    };

    if kind != EntryKind::Directory {
      return false;
    }

    let full_path = dir.join(name);
    if !folder.folder_whitelist.is_empty() && !folder.folder_whitelist.matches(name, &full_path) {
      return false;
    }

    !(folder.folder_blacklist.matches(name, &full_path) || self.index_blacklist.matches(name, &full_path))
  }

  /// [`file_matches`](Self::file_matches) for an arbitrary path, statting it
  /// according to its root's symlink policy
  pub fn file_matches_path(&self, path: &Path) -> bool {
    self.file_matches_path_via(path, path)
  }

  /// Match `path` against its root's rules while statting `live`, another
  /// name of the same file (e.g. through a renamed or aliased directory)
  pub fn file_matches_path_via(&self, path: &Path, live: &Path) -> bool {
    let (Some(dir), Some(name)) = (path.parent(), path.file_name().and_then(|n| n.to_str())) else {
      return false;
    };
    let Some((root, folder)) = self.find_base_path(dir) else {
      return false;
    };

    let meta = if folder.follow_symlinks {
      std::fs::metadata(live)
    } else {
      std::fs::symlink_metadata(live)
    };

    match meta {
      Ok(meta) => self.file_matches(root, dir, name, EntryKind::from(&meta)),
      Err(e) => {
        debug!(path = %live.display(), error = %e, "Cannot stat file");
        false
      }
    }
  }
}

/// Field-by-field equality over the rules that affect the index
impl PartialEq for ProjectConfig {
  fn eq(&self, other: &Self) -> bool {
    self.complete == other.complete
      && self.db_location == other.db_location
      && self.file_extensions == other.file_extensions
      && self.folders == other.folders
      && self.index_blacklist == other.index_blacklist
      && self.search_std_include_folders == other.search_std_include_folders
      && self.std_include_folders == other.std_include_folders
  }
}

impl Eq for ProjectConfig {}
