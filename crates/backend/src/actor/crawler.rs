//! Crawler actor - walks project folders and builds directory snapshots.
//!
//! The walk is depth-first and sorted by file name. Every directory is keyed
//! by its stable identity, so aliases reached through symlinks or bind mounts
//! are visited once. Files hard-linked into several directories are recorded
//! only at their first match.
//!
//! Errors on individual entries (permission denied, a file vanishing between
//! listing and stat) are logged and the entry is skipped; the rest of the
//! tree is still crawled.

use std::{
  collections::{HashMap, HashSet},
  path::{Path, PathBuf},
  sync::Arc,
};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::runtime::{Actor, ActorError};
use crate::domain::{
  project_config::{EntryKind, FolderConfig, ProjectConfig},
  snapshot::{DirectoryEntry, DirectorySnapshot, FileId},
};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that abort a crawl
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
  #[error("Directory {} has the same identity as {}", path.display(), existing.display())]
  DuplicateDirectoryIdentity { path: PathBuf, existing: PathBuf },

  #[error("{} is not under any configured folder", .0.display())]
  OutsideProject(PathBuf),
}

impl From<CrawlError> for ActorError {
  fn from(e: CrawlError) -> Self {
    ActorError::failed(e)
  }
}

/// Result of one crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOutcome {
  pub snapshot: DirectorySnapshot,
  /// The subtree that was crawled, `None` for a full crawl
  pub start_path: Option<PathBuf>,
}

// ============================================================================
// Crawler Actor
// ============================================================================

/// Stateless walker; runs on its own thread so crawls never block the Indexer
#[derive(Debug, Default)]
pub struct Crawler {
  crawls: u64,
}

impl Actor for Crawler {
  const NAME: &'static str = "crawler";
}

impl Crawler {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn crawl(&mut self, config: Arc<ProjectConfig>, start_path: Option<PathBuf>) -> Result<CrawlOutcome, CrawlError> {
    self.crawls += 1;
    let outcome = crawl(&config, start_path.as_deref())?;
    info!(
      project = %config.project_file().display(),
      start = ?outcome.start_path,
      directories = outcome.snapshot.len(),
      files = outcome.snapshot.file_count(),
      crawl = self.crawls,
      "Crawl complete"
    );
    Ok(outcome)
  }
}

/// Walk every configured root, or only the subtree at `start_path`
pub fn crawl(config: &ProjectConfig, start_path: Option<&Path>) -> Result<CrawlOutcome, CrawlError> {
  let mut snapshot = DirectorySnapshot::new();

  match start_path {
    Some(start) => {
      let (root, folder) = config
        .find_base_path(start)
        .ok_or_else(|| CrawlError::OutsideProject(start.to_path_buf()))?;
      crawl_folder(config, root, folder, start, &mut snapshot)?;
    }
    None => {
      for (root, folder) in config.roots() {
        crawl_folder(config, root, folder, root, &mut snapshot)?;
      }
    }
  }

  Ok(CrawlOutcome {
    snapshot,
    start_path: start_path.map(Path::to_path_buf),
  })
}

fn crawl_folder(
  config: &ProjectConfig,
  root: &Path,
  folder: &FolderConfig,
  start: &Path,
  snapshot: &mut DirectorySnapshot,
) -> Result<(), CrawlError> {
  debug!(start = %start.display(), root = %root.display(), "Crawling folder");

  // The walk start is always resolved; `follow_symlinks` governs entries below it
  let follow = folder.follow_symlinks;
  let start_meta = match std::fs::metadata(start) {
    Ok(meta) if meta.is_dir() => meta,
    Ok(_) => {
      warn!(path = %start.display(), "Crawl start is not a directory, skipping");
      return Ok(());
    }
    Err(e) => {
      warn!(path = %start.display(), error = %e, "Cannot read crawl start, skipping");
      return Ok(());
    }
  };

  let start_id = FileId::of(start, &start_meta);
  if let Some(existing) = snapshot.get(&start_id) {
    return Err(CrawlError::DuplicateDirectoryIdentity {
      path: start.to_path_buf(),
      existing: existing.path.clone(),
    });
  }

  // Directories of this walk, by path, so files can find their parent entry
  let mut dir_ids: HashMap<PathBuf, FileId> = HashMap::new();
  let mut visited_files: HashSet<FileId> = HashSet::new();

  let mut walker = WalkDir::new(start).follow_links(follow).sort_by_file_name().into_iter();

  while let Some(next) = walker.next() {
    let entry = match next {
      Ok(entry) => entry,
      Err(e) => {
        warn!(path = ?e.path(), error = %e, "Skipping unreadable entry");
        continue;
      }
    };

    if entry.depth() == 0 {
      snapshot.insert(start_id, DirectoryEntry::new(start));
      dir_ids.insert(start.to_path_buf(), start_id);
      continue;
    }

    let path = entry.path();
    let (Some(parent), Some(name)) = (path.parent(), entry.file_name().to_str()) else {
      warn!(path = %path.display(), "Skipping entry with a non UTF-8 name");
      if entry.file_type().is_dir() {
        walker.skip_current_dir();
      }
      continue;
    };
    let Some(&parent_id) = dir_ids.get(parent) else {
      continue;
    };

    let meta = match entry.metadata() {
      Ok(meta) => meta,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "Cannot stat entry, skipping");
        if entry.file_type().is_dir() {
          walker.skip_current_dir();
        }
        continue;
      }
    };
    let id = FileId::of(path, &meta);
    let kind = EntryKind::from(&meta);

    if kind == EntryKind::Directory {
      if let Some(existing) = snapshot.get(&id) {
        debug!(path = %path.display(), existing = %existing.path.display(), "Directory already visited");
        walker.skip_current_dir();
        continue;
      }

      if !config.folder_matches(root, parent, name, kind) {
        walker.skip_current_dir();
        continue;
      }

      snapshot.insert(id, DirectoryEntry::new(path));
      dir_ids.insert(path.to_path_buf(), id);
      continue;
    }

    if visited_files.contains(&id) {
      debug!(path = %path.display(), "File already visited");
      continue;
    }

    if config.file_matches(root, parent, name, kind)
      && let Some(dir) = snapshot.get_mut(&parent_id)
    {
      dir.add_file(name.to_string(), &meta);
      visited_files.insert(id);
    }
  }

  Ok(())
}
