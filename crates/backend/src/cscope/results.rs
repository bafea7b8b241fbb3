//! Parsers for cscope's line-oriented output

use std::{
  cmp::Ordering,
  collections::HashSet,
  ffi::OsStr,
  path::{Path, PathBuf},
  sync::LazyLock,
};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, trace};

static BUILD_PROGRESS_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^> Building symbol database (\d+) of (\d+)$").expect("valid progress regex"));

static QUERY_LINE_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^(\S+)\s+(\S+)?\s*(\d+)\s+(.*)$").expect("valid query regex"));

/// Tells the runner whether to keep reading output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
  Continue,
  /// Too many results; the runner stops the process
  LimitExceeded,
}

/// Consumes cscope output one line at a time
pub trait LineParser {
  fn parse_line(&mut self, line: &str) -> ParseStatus;

  /// Called once after the process has exited
  fn finish(&mut self) {}
}

// ============================================================================
// Build Progress
// ============================================================================

pub type ProgressObserver = Box<dyn FnMut(u32) + Send>;

/// Turns `> Building symbol database N of M` lines into percentages
#[derive(Default)]
pub struct BuildProgress {
  observer: Option<ProgressObserver>,
  last_percent: Option<u32>,
}

impl BuildProgress {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_observer(observer: ProgressObserver) -> Self {
    Self {
      observer: Some(observer),
      last_percent: None,
    }
  }

  pub fn last_percent(&self) -> Option<u32> {
    self.last_percent
  }

  fn report(&mut self, percent: u32) {
    if self.last_percent == Some(percent) {
      return;
    }
    self.last_percent = Some(percent);
    info!(percent, "Cscope indexing");
    if let Some(observer) = &mut self.observer {
      observer(percent);
    }
  }
}

impl LineParser for BuildProgress {
  fn parse_line(&mut self, line: &str) -> ParseStatus {
    let Some(caps) = BUILD_PROGRESS_RE.captures(line.trim_end()) else {
      trace!(line, "Unmatched build output");
      return ParseStatus::Continue;
    };

    let (Ok(current), Ok(total)) = (caps[1].parse::<u64>(), caps[2].parse::<u64>()) else {
      debug!(line, "Failed to parse build progress");
      return ParseStatus::Continue;
    };

    if total > 0 {
      let percent = ((current as f64 / total as f64) * 100.0).round() as u32;
      self.report(percent);
    }
    ParseStatus::Continue
  }

  fn finish(&mut self) {
    self.report(100);
  }
}

impl std::fmt::Debug for BuildProgress {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BuildProgress")
      .field("last_percent", &self.last_percent)
      .finish()
  }
}

// ============================================================================
// Query Results
// ============================================================================

/// One line of a cscope query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
  pub file: PathBuf,
  pub line: u32,
  /// Enclosing function, or the symbol for definition queries
  pub function: Option<String>,
  pub text: String,
}

/// Collects query lines, grouped by file in order of first appearance
#[derive(Debug, Default)]
pub struct QueryResults {
  groups: Vec<(PathBuf, Vec<QueryResult>)>,
  filter: HashSet<PathBuf>,
  count: usize,
  limit: Option<usize>,
}

impl QueryResults {
  /// `limit` of zero means unlimited
  pub fn new(limit: usize) -> Self {
    Self {
      limit: (limit > 0).then_some(limit),
      ..Default::default()
    }
  }

  /// Lines for these files are counted but not kept
  pub fn set_filter(&mut self, files: impl IntoIterator<Item = PathBuf>) {
    self.filter = files.into_iter().collect();
  }

  /// Lines seen so far, including filtered ones
  pub fn count(&self) -> usize {
    self.count
  }

  pub fn limit(&self) -> Option<usize> {
    self.limit
  }

  pub fn is_empty(&self) -> bool {
    self.groups.is_empty()
  }

  pub fn into_results(self) -> Vec<QueryResult> {
    self.groups.into_iter().flat_map(|(_, results)| results).collect()
  }

  /// Results ordered by distance from `anchor`: same directory first, then
  /// its subdirectories, then everything else by shared prefix length
  ///
  /// `anchor` is the file the query was issued from, or a directory.
  pub fn into_sorted(self, anchor: &Path) -> Vec<QueryResult> {
    let anchor = Anchor::new(anchor);
    let mut results = self.into_results();
    results.sort_by(|a, b| compare_by_proximity(&anchor, a, b));
    results
  }
}

impl LineParser for QueryResults {
  fn parse_line(&mut self, line: &str) -> ParseStatus {
    let Some(caps) = QUERY_LINE_RE.captures(line.trim_end()) else {
      trace!(line, "Unmatched query output");
      return ParseStatus::Continue;
    };

    self.count += 1;
    if self.limit.is_some_and(|limit| self.count > limit) {
      self.groups.clear();
      return ParseStatus::LimitExceeded;
    }

    let file = PathBuf::from(&caps[1]);
    if self.filter.contains(&file) {
      return ParseStatus::Continue;
    }

    let Ok(line_number) = caps[3].parse::<u32>() else {
      return ParseStatus::Continue;
    };

    let result = QueryResult {
      file: file.clone(),
      line: line_number,
      function: caps.get(2).map(|m| m.as_str().to_string()),
      text: caps[4].to_string(),
    };

    match self.groups.iter_mut().find(|(f, _)| *f == file) {
      Some((_, group)) => group.push(result),
      None => self.groups.push((file, vec![result])),
    }
    ParseStatus::Continue
  }

  fn finish(&mut self) {
    debug!(count = self.count, "Cscope query finished");
  }
}

struct Anchor<'a> {
  dir: &'a Path,
  name: Option<&'a OsStr>,
}

impl<'a> Anchor<'a> {
  fn new(path: &'a Path) -> Self {
    if path.is_dir() {
      return Self { dir: path, name: None };
    }
    Self {
      dir: path.parent().unwrap_or(path),
      name: path.file_name(),
    }
  }
}

fn proximity_key<'a>(anchor: &Anchor<'_>, result: &'a QueryResult) -> (usize, &'a str, u32) {
  let anchor_dir = anchor.dir;
  let dir = result.file.parent().unwrap_or(&result.file);
  let name = result.file.to_str().unwrap_or_default();

  match dir.strip_prefix(anchor_dir) {
    Ok(rest) => {
      let depth = rest.as_os_str().len();
      let base = if anchor.name.is_some() && result.file.file_name() == anchor.name {
        ""
      } else {
        result.file.file_name().and_then(|n| n.to_str()).unwrap_or_default()
      };
      (depth, base, result.line)
    }
    Err(_) => {
      let shared: usize = anchor_dir
        .components()
        .zip(dir.components())
        .take_while(|(a, b)| a == b)
        .map(|(a, _)| a.as_os_str().len() + 1)
        .sum();
      ((1usize << 31) - shared, name, result.line)
    }
  }
}

fn compare_by_proximity(anchor: &Anchor<'_>, a: &QueryResult, b: &QueryResult) -> Ordering {
  proximity_key(anchor, a).cmp(&proximity_key(anchor, b))
}
