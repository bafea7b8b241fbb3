//! Settings for tagscope with per-project overrides.
//!
//! Settings priority: project file `[settings]` table > user
//! (~/.config/tagscope/config.toml) > built-in defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File extensions indexed when the user has not configured any
pub const DEFAULT_FILE_EXTENSIONS: &[&str] = &[".c", ".cc", ".cpp", ".h", ".hpp", ".l", ".y", ".py", ".rb", ".java"];

/// Suffix that marks a file as a tagscope project file
pub const PROJECT_FILE_SUFFIX: &str = ".tagscope.toml";

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while reading settings or project files
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Failed to parse {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("Failed to write {}: {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Failed to serialize settings: {0}")]
  Serialize(#[from] toml::ser::Error),
}

// ============================================================================
// Log Configuration
// ============================================================================

/// Logging configuration used by the command line host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  /// Default: "info"
  #[serde(default = "default_log_level")]
  pub level: String,

  /// Log file rotation: "daily", "hourly", "never"
  /// Default: "daily"
  #[serde(default = "default_log_rotation")]
  pub rotation: String,
}

fn default_log_level() -> String {
  "info".to_string()
}
fn default_log_rotation() -> String {
  "daily".to_string()
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      rotation: default_log_rotation(),
    }
  }
}

// ============================================================================
// Settings
// ============================================================================

fn default_file_extensions() -> Vec<String> {
  DEFAULT_FILE_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}
fn default_maximum_results() -> usize {
  1000
}

/// Effective indexing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// Extensions (with the leading dot) of files to index
  #[serde(default = "default_file_extensions")]
  pub index_file_extensions: Vec<String>,

  /// Explicit path to the cscope executable, PATH is searched otherwise
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cscope_path: Option<PathBuf>,

  /// Let cscope search the standard include folders (disables kernel mode)
  pub search_std_include_folders: bool,

  pub std_include_folders: Vec<PathBuf>,

  /// Passed to cscope as `-I` folders
  pub extra_include_folders: Vec<PathBuf>,

  /// TMPDIR for cscope invocations
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tmp_folder: Option<PathBuf>,

  /// Query results above this count are rejected
  #[serde(default = "default_maximum_results")]
  pub maximum_results: usize,

  /// Patterns excluded from indexing for both files and folders
  pub index_exclude_patterns: Vec<String>,
  pub file_include_patterns: Vec<String>,
  pub file_exclude_patterns: Vec<String>,
  pub folder_include_patterns: Vec<String>,
  pub folder_exclude_patterns: Vec<String>,

  pub log: LogConfig,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      index_file_extensions: default_file_extensions(),
      cscope_path: None,
      search_std_include_folders: false,
      std_include_folders: Vec::new(),
      extra_include_folders: Vec::new(),
      tmp_folder: None,
      maximum_results: default_maximum_results(),
      index_exclude_patterns: Vec::new(),
      file_include_patterns: Vec::new(),
      file_exclude_patterns: Vec::new(),
      folder_include_patterns: Vec::new(),
      folder_exclude_patterns: Vec::new(),
      log: LogConfig::default(),
    }
  }
}

impl Settings {
  /// Load settings from a TOML file, falling back to defaults when it does not exist
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    if !path.exists() {
      debug!(path = %path.display(), "No settings file, using defaults");
      return Ok(Self::default());
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    toml::from_str(&content).map_err(|source| {
      warn!(path = %path.display(), error = %source, "Failed to parse settings");
      ConfigError::Parse {
        path: path.to_path_buf(),
        source,
      }
    })
  }

  /// Load the user-level settings
  pub fn load_user() -> Result<Self, ConfigError> {
    Self::load(&Self::user_config_path())
  }

  /// Get the user-level settings path
  pub fn user_config_path() -> PathBuf {
    crate::dirs::default_config_dir().join("config.toml")
  }

  /// Apply project-scoped overrides on top of these settings
  pub fn with_overrides(&self, overrides: &SettingsOverrides) -> Settings {
    let mut merged = self.clone();

    if let Some(ref v) = overrides.index_file_extensions {
      merged.index_file_extensions = v.clone();
    }
    if let Some(ref v) = overrides.cscope_path {
      merged.cscope_path = Some(v.clone());
    }
    if let Some(v) = overrides.search_std_include_folders {
      merged.search_std_include_folders = v;
    }
    if let Some(ref v) = overrides.std_include_folders {
      merged.std_include_folders = v.clone();
    }
    if let Some(ref v) = overrides.extra_include_folders {
      merged.extra_include_folders = v.clone();
    }
    if let Some(ref v) = overrides.tmp_folder {
      merged.tmp_folder = Some(v.clone());
    }
    if let Some(v) = overrides.maximum_results {
      merged.maximum_results = v;
    }
    if let Some(ref v) = overrides.index_exclude_patterns {
      merged.index_exclude_patterns = v.clone();
    }
    if let Some(ref v) = overrides.file_include_patterns {
      merged.file_include_patterns = v.clone();
    }
    if let Some(ref v) = overrides.file_exclude_patterns {
      merged.file_exclude_patterns = v.clone();
    }
    if let Some(ref v) = overrides.folder_include_patterns {
      merged.folder_include_patterns = v.clone();
    }
    if let Some(ref v) = overrides.folder_exclude_patterns {
      merged.folder_exclude_patterns = v.clone();
    }

    merged
  }

  /// Render the default settings as a commented TOML document
  pub fn generate_template() -> Result<String, ConfigError> {
    let body = toml::to_string_pretty(&Settings::default())?;
    Ok(format!(
      "# tagscope settings\n#\n# Project files may override any of these keys in their [settings] table.\n\n{body}"
    ))
  }
}

/// Project-scoped settings; every key present replaces the user-level value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsOverrides {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub index_file_extensions: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cscope_path: Option<PathBuf>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub search_std_include_folders: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub std_include_folders: Option<Vec<PathBuf>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub extra_include_folders: Option<Vec<PathBuf>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tmp_folder: Option<PathBuf>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub maximum_results: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub index_exclude_patterns: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub file_include_patterns: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub file_exclude_patterns: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub folder_include_patterns: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub folder_exclude_patterns: Option<Vec<String>>,
}

// ============================================================================
// Project File
// ============================================================================

fn default_follow_symlinks() -> bool {
  true
}

/// A source folder listed in a project file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderEntry {
  /// Absolute, or relative to the project file's directory
  pub path: PathBuf,

  #[serde(default = "default_follow_symlinks")]
  pub follow_symlinks: bool,

  #[serde(default)]
  pub file_include_patterns: Vec<String>,
  #[serde(default)]
  pub file_exclude_patterns: Vec<String>,
  #[serde(default)]
  pub folder_include_patterns: Vec<String>,
  #[serde(default)]
  pub folder_exclude_patterns: Vec<String>,
}

impl FolderEntry {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      follow_symlinks: true,
      file_include_patterns: Vec::new(),
      file_exclude_patterns: Vec::new(),
      folder_include_patterns: Vec::new(),
      folder_exclude_patterns: Vec::new(),
    }
  }
}

/// Contents of a `*.tagscope.toml` project file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectFile {
  pub folders: Vec<FolderEntry>,
  pub settings: SettingsOverrides,
}

impl ProjectFile {
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Write the project file, replacing any existing content
  pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(self)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Write {
      path: path.to_path_buf(),
      source,
    })
  }

  pub fn is_project_file(path: &Path) -> bool {
    path
      .file_name()
      .and_then(|n| n.to_str())
      .is_some_and(|n| n.ends_with(PROJECT_FILE_SUFFIX) && n.len() > PROJECT_FILE_SUFFIX.len())
  }

  /// Locate a project file in `dir`, preferring the one named after the directory
  pub fn find_in(dir: &Path) -> Option<PathBuf> {
    if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
      let preferred = dir.join(format!("{name}{PROJECT_FILE_SUFFIX}"));
      if preferred.is_file() {
        return Some(preferred);
      }
    }

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
      .ok()?
      .filter_map(|e| e.ok())
      .map(|e| e.path())
      .filter(|p| p.is_file() && Self::is_project_file(p))
      .collect();
    candidates.sort();
    candidates.into_iter().next()
  }
}
