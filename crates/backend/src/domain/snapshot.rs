//! Directory snapshots produced by a crawl
//!
//! A snapshot maps the stable identity of every visited directory to the
//! files that matched inside it. Keying by identity rather than path lets a
//! renamed or aliased directory be recognized as the same one.

use std::{
  collections::HashMap,
  fs::Metadata,
  path::{Path, PathBuf},
  time::UNIX_EPOCH,
};

/// Stable identity of a file or directory (device and inode on Unix)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId {
  dev: u64,
  ino: u64,
}

impl FileId {
  #[cfg(unix)]
  pub fn of(_path: &Path, meta: &Metadata) -> Self {
    use std::os::unix::fs::MetadataExt;
    Self {
      dev: meta.dev(),
      ino: meta.ino(),
    }
  }

  /// Without inode numbers the canonical path stands in for the identity
  #[cfg(not(unix))]
  pub fn of(path: &Path, _meta: &Metadata) -> Self {
    use std::hash::{Hash, Hasher};
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    canonical.hash(&mut hasher);
    Self {
      dev: 0,
      ino: hasher.finish(),
    }
  }
}

/// Change-detection contribution of one file: size plus mtime in nanoseconds
pub fn fingerprint_of(meta: &Metadata) -> u64 {
  let mtime = meta
    .modified()
    .ok()
    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
    .map(|d| d.as_nanos() as u64)
    .unwrap_or(0);
  meta.len().wrapping_add(mtime)
}

/// Matched files of one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
  pub path: PathBuf,
  /// File names, in walk order
  pub files: Vec<String>,
  /// Wrapping sum of [`fingerprint_of`] over `files`
  pub fingerprint: u64,
}

impl DirectoryEntry {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      files: Vec::new(),
      fingerprint: 0,
    }
  }

  pub fn add_file(&mut self, name: String, meta: &Metadata) {
    self.files.push(name);
    self.fingerprint = self.fingerprint.wrapping_add(fingerprint_of(meta));
  }

  pub fn contains(&self, name: &str) -> bool {
    self.files.iter().any(|f| f == name)
  }
}

/// Identity-keyed view of the matched files under one or more roots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
  entries: HashMap<FileId, DirectoryEntry>,
}

impl DirectorySnapshot {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, id: &FileId) -> Option<&DirectoryEntry> {
    self.entries.get(id)
  }

  pub fn get_mut(&mut self, id: &FileId) -> Option<&mut DirectoryEntry> {
    self.entries.get_mut(id)
  }

  pub fn contains(&self, id: &FileId) -> bool {
    self.entries.contains_key(id)
  }

  pub fn insert(&mut self, id: FileId, entry: DirectoryEntry) {
    self.entries.insert(id, entry);
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }

  pub fn entries(&self) -> impl Iterator<Item = (&FileId, &DirectoryEntry)> {
    self.entries.iter()
  }

  /// Total number of matched files
  pub fn file_count(&self) -> usize {
    self.entries.values().map(|e| e.files.len()).sum()
  }

  /// Absolute paths of every matched file, sorted
  pub fn file_paths(&self) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = self
      .entries
      .values()
      .flat_map(|e| e.files.iter().map(|f| e.path.join(f)))
      .collect();
    paths.sort();
    paths
  }

  /// Remove and return the entries whose path lies under `prefix`
  pub fn extract_under(&mut self, prefix: &Path) -> DirectorySnapshot {
    let ids: Vec<FileId> = self
      .entries
      .iter()
      .filter(|(_, e)| e.path.starts_with(prefix))
      .map(|(id, _)| *id)
      .collect();

    let mut extracted = DirectorySnapshot::new();
    for id in ids {
      if let Some(entry) = self.entries.remove(&id) {
        extracted.entries.insert(id, entry);
      }
    }
    extracted
  }

  /// Add every entry of `other`, replacing entries with the same identity
  pub fn merge(&mut self, other: DirectorySnapshot) {
    self.entries.extend(other.entries);
  }
}
