//! Settings model shared by the tagscope library and command line host

pub mod config;
pub mod dirs;

pub use config::{ConfigError, FolderEntry, LogConfig, ProjectFile, Settings, SettingsOverrides};
