//! Test helpers for actor integration tests.
//!
//! Provides `TestProject` for building source trees on disk, a recording
//! index backend that never runs cscope, an in-memory `EditorHost`, and
//! polling helpers for asynchronous outcomes.

use std::{
  path::{Path, PathBuf},
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::{Duration, Instant},
};

use filetime::FileTime;
use tagscope_core::config::{FolderEntry, Settings};
use tempfile::TempDir;

use crate::{
  actor::{
    handle::IndexerHandle,
    indexer::{IndexBackend, IndexError, IndexerStatus, read_file_list},
    registry::{BackendFactory, ProjectRegistry},
  },
  domain::project_config::ProjectConfig,
  editor::{EditorHost, WindowId, WindowInfo},
};

pub const TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Source Trees
// ============================================================================

/// A project file plus a `src` folder inside a temporary directory.
pub struct TestProject {
  pub dir: TempDir,
  pub project_file: PathBuf,
  pub src: PathBuf,
}

impl TestProject {
  pub fn new(name: &str) -> Self {
    let dir = TempDir::new().expect("create project temp dir");
    let project_file = dir.path().join(format!("{name}.tagscope.toml"));
    let src = dir.path().join("src");
    std::fs::create_dir_all(&src).expect("create src dir");
    Self { dir, project_file, src }
  }

  pub fn folders(&self) -> Vec<FolderEntry> {
    vec![FolderEntry::new(&self.src)]
  }

  pub fn config(&self) -> Arc<ProjectConfig> {
    Arc::new(ProjectConfig::build(&self.project_file, &self.folders(), &Settings::default()))
  }

  pub fn path(&self, rel: &str) -> PathBuf {
    self.src.join(rel)
  }

  /// Write a file under `src`, creating parent directories.
  pub fn write_file(&self, rel: &str, content: &str) -> PathBuf {
    let path = self.path(rel);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(&path, content).expect("write file");
    path
  }

  /// Write `count` C files named `<prefix>NNN.c` into `dir` under `src`.
  pub fn write_c_files(&self, dir: &str, prefix: &str, count: usize) -> Vec<PathBuf> {
    (0..count)
      .map(|i| self.write_file(&format!("{dir}/{prefix}{i:03}.c"), "int x;\n"))
      .collect()
  }

  pub fn remove_file(&self, rel: &str) {
    let _ = std::fs::remove_file(self.path(rel));
  }

  /// Move the mtime forward without changing content.
  pub fn touch_file(&self, rel: &str, seconds_ahead: i64) {
    let now = FileTime::now();
    let later = FileTime::from_unix_time(now.unix_seconds() + seconds_ahead, now.nanoseconds());
    filetime::set_file_mtime(self.path(rel), later).expect("set mtime");
  }

  pub fn db_location(&self) -> PathBuf {
    self.config().db_location().expect("db location").to_path_buf()
  }

  pub fn file_list(&self, name: &str) -> Option<Vec<PathBuf>> {
    read_file_list(&self.db_location().join(format!("{name}.files"))).ok()
  }
}

// ============================================================================
// Index Backend
// ============================================================================

/// Counts database builds instead of running cscope.
#[derive(Clone, Default)]
pub struct RecordingBackend {
  pub builds: Arc<AtomicUsize>,
}

impl RecordingBackend {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn build_count(&self) -> usize {
    self.builds.load(Ordering::SeqCst)
  }

  pub fn factory(&self) -> BackendFactory {
    let backend = self.clone();
    Arc::new(move |_project: &Path| Box::new(backend.clone()) as Box<dyn IndexBackend>)
  }
}

impl IndexBackend for RecordingBackend {
  fn build(&mut self, _db_location: &Path, _name: &str, _config: &ProjectConfig) -> Result<(), IndexError> {
    self.builds.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

/// Spawn an Indexer with a recording backend and hand it `project`'s config.
pub fn spawn_indexer(project: &TestProject) -> (IndexerHandle, RecordingBackend) {
  let backend = RecordingBackend::new();
  let indexer = IndexerHandle::spawn(Box::new(backend.clone())).expect("spawn indexer");
  indexer.set_config(project.config());
  (indexer, backend)
}

// ============================================================================
// Editor Host
// ============================================================================

/// In-memory editor with mutable window list.
pub struct TestHost {
  windows: Mutex<Vec<WindowInfo>>,
  cache: TempDir,
}

impl TestHost {
  pub fn new() -> Arc<Self> {
    Arc::new(Self {
      windows: Mutex::new(Vec::new()),
      cache: TempDir::new().expect("create cache temp dir"),
    })
  }

  pub fn open_project(&self, id: WindowId, project: &TestProject) {
    self.open(WindowInfo {
      id,
      project_file: Some(project.project_file.clone()),
      folders: project.folders(),
      ..WindowInfo::new(id)
    });
  }

  pub fn open(&self, window: WindowInfo) {
    let mut windows = self.windows.lock().unwrap();
    windows.retain(|w| w.id != window.id);
    windows.push(window);
  }

  pub fn close(&self, id: WindowId) {
    self.windows.lock().unwrap().retain(|w| w.id != id);
  }

  pub fn update(&self, id: WindowId, f: impl FnOnce(&mut WindowInfo)) {
    let mut windows = self.windows.lock().unwrap();
    if let Some(window) = windows.iter_mut().find(|w| w.id == id) {
      f(window);
    }
  }
}

impl EditorHost for TestHost {
  fn windows(&self) -> Vec<WindowInfo> {
    self.windows.lock().unwrap().clone()
  }

  fn settings(&self) -> Settings {
    Settings::default()
  }

  fn cache_dir(&self) -> PathBuf {
    self.cache.path().to_path_buf()
  }
}

pub fn new_registry(host: &Arc<TestHost>, backend: &RecordingBackend) -> ProjectRegistry {
  ProjectRegistry::new(Arc::clone(host) as Arc<dyn EditorHost>, backend.factory())
}

// ============================================================================
// Polling
// ============================================================================

/// Poll `check` every 50ms until it returns true or `timeout` elapses.
pub fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
  let start = Instant::now();
  let poll_interval = Duration::from_millis(50);

  while start.elapsed() < timeout {
    if check() {
      return true;
    }
    std::thread::sleep(poll_interval);
  }

  false
}

/// Wait until the Indexer has no crawl running or pending.
pub fn wait_idle(indexer: &IndexerHandle) -> IndexerStatus {
  let mut last = None;
  let idle = wait_for(TIMEOUT, || {
    let status = indexer.status().expect("status");
    let idle = status.is_idle();
    last = Some(status);
    idle
  });
  assert!(idle, "Indexer did not become idle: {last:?}");
  last.expect("at least one status")
}

/// Wait until the Indexer reports a status satisfying `check`.
pub fn wait_status(indexer: &IndexerHandle, check: impl Fn(&IndexerStatus) -> bool) -> IndexerStatus {
  let mut last = None;
  let reached = wait_for(TIMEOUT, || {
    let status = indexer.status().expect("status");
    let ok = status.is_idle() && check(&status);
    last = Some(status);
    ok
  });
  assert!(reached, "Indexer never reached expected status: {last:?}");
  last.expect("at least one status")
}
