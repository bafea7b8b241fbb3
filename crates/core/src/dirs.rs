//! Default locations for tagscope configuration and cache data

use std::path::PathBuf;

/// Get the default config directory
///
/// Respects the following environment variables (in order of precedence):
/// 1. TAGSCOPE_CONFIG_DIR - explicit config directory override
/// 2. XDG_CONFIG_HOME - standard XDG config home directory
/// 3. dirs::config_dir() - platform default
pub fn default_config_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("TAGSCOPE_CONFIG_DIR") {
    return PathBuf::from(dir);
  }

  if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
    return PathBuf::from(xdg_config).join("tagscope");
  }

  dirs::config_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("tagscope")
}

/// Get the default cache directory
///
/// Placeholder projects for folders opened without a project file live here.
///
/// Respects the following environment variables (in order of precedence):
/// 1. TAGSCOPE_CACHE_DIR - explicit cache directory override
/// 2. XDG_CACHE_HOME - standard XDG cache home directory
/// 3. dirs::cache_dir() - platform default
pub fn default_cache_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("TAGSCOPE_CACHE_DIR") {
    return PathBuf::from(dir);
  }

  if let Ok(xdg_cache) = std::env::var("XDG_CACHE_HOME") {
    return PathBuf::from(xdg_cache).join("tagscope");
  }

  dirs::cache_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("tagscope")
}

/// Get the directory log files are written to
pub fn default_log_dir() -> PathBuf {
  default_cache_dir().join("logs")
}
