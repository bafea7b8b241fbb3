//! Config commands

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tagscope_core::{FolderEntry, ProjectFile, Settings, config::PROJECT_FILE_SUFFIX};

use crate::host::ProjectHost;

/// Show the effective settings for a project (or the user settings alone)
pub fn cmd_config_show(settings: Settings, project: Option<PathBuf>) -> Result<()> {
  let user_path = Settings::user_config_path();
  if user_path.exists() {
    println!("# User settings: {}", user_path.display());
  } else {
    println!("# Using default settings (no {} found)", user_path.display());
  }

  let dir = match project {
    Some(path) => path,
    None => std::env::current_dir().context("Failed to get current directory")?,
  };
  let host = ProjectHost::discover(&dir, settings.clone())?;
  let project_file = host.project_file();

  let effective = if host.is_project_file(&project_file) {
    println!("# Project file: {}", project_file.display());
    let project = ProjectFile::load(&project_file)?;
    settings.with_overrides(&project.settings)
  } else {
    println!("# No project file, folder is indexed as-is");
    settings
  };
  println!();
  println!("{}", toml::to_string_pretty(&effective)?);

  Ok(())
}

/// Create `<dir>/<dir name>.tagscope.toml` listing the directory itself
pub fn cmd_config_init(force: bool, project: Option<PathBuf>) -> Result<()> {
  let dir = match project {
    Some(path) => path,
    None => std::env::current_dir().context("Failed to get current directory")?,
  };
  let dir = dir
    .canonicalize()
    .with_context(|| format!("Directory {} does not exist", dir.display()))?;
  let name = dir
    .file_name()
    .and_then(|n| n.to_str())
    .context("Directory has no usable name")?;
  let project_file = dir.join(format!("{name}{PROJECT_FILE_SUFFIX}"));

  if project_file.exists() && !force {
    bail!("{} already exists (use --force to overwrite)", project_file.display());
  }

  let project = ProjectFile {
    folders: vec![FolderEntry::new(".")],
    ..Default::default()
  };
  project.save(&project_file)?;

  println!("Created project file: {}", project_file.display());
  println!("Edit its [settings] table to override user settings for this project.");
  Ok(())
}

/// Print the user settings path
pub fn cmd_config_path() -> Result<()> {
  println!("{}", Settings::user_config_path().display());
  Ok(())
}
