//! Running the cscope executable
//!
//! Every invocation runs inside the project's database folder, so file
//! lists and databases are referred to by bare name. Output from both
//! stdout and stderr is fed line by line to a [`LineParser`]; a parser
//! asking to stop kills the process.

use std::{
  ffi::OsString,
  fmt,
  io::{BufRead, BufReader, Read},
  path::{Path, PathBuf},
  process::{Command, Stdio},
  str::FromStr,
};

use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use super::results::{BuildProgress, LineParser, ParseStatus, ProgressObserver, QueryResult, QueryResults};
use crate::{
  actor::indexer::{DB_EXT, FILE_LIST_EXT, IndexBackend, IndexError, PRIMARY_DB, SECONDARY_DB, read_file_list},
  domain::project_config::ProjectConfig,
};

const CSCOPE_EXECUTABLE: &str = "cscope";

// ============================================================================
// Error Types
// ============================================================================

/// Errors starting or running cscope
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
  #[error("cscope executable not found in PATH")]
  ToolNotFound,

  #[error("Failed to start {command}: {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },

  #[error("Lost cscope output: {0}")]
  Io(#[from] std::io::Error),

  #[error("Running cscope returned an error. cmd_line: {command}, cwd: {}, exit code: {code:?}", cwd.display())]
  ExitStatus {
    command: String,
    cwd: PathBuf,
    code: Option<i32>,
  },
}

/// Errors answering a query
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
  #[error(transparent)]
  Runner(#[from] RunnerError),

  #[error(
    "The cscope query generated more than {limit} results. Please refine your search or increase maximum_results in the settings."
  )]
  LimitExceeded { limit: usize },

  #[error("Project has no database location")]
  NoDatabaseLocation,

  #[error("Project at {} has not been indexed yet", .0.display())]
  NotIndexed(PathBuf),

  #[error("Failed to read {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

// ============================================================================
// Query Kinds
// ============================================================================

/// cscope line-mode search types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
  Symbol,
  Definition,
  Callees,
  Callers,
  Text,
  Egrep,
  FilesIncluding,
}

impl QueryKind {
  pub const ALL: [QueryKind; 7] = [
    QueryKind::Symbol,
    QueryKind::Definition,
    QueryKind::Callees,
    QueryKind::Callers,
    QueryKind::Text,
    QueryKind::Egrep,
    QueryKind::FilesIncluding,
  ];

  /// Field number passed as `-<n>`
  pub fn field(self) -> u8 {
    match self {
      QueryKind::Symbol => 0,
      QueryKind::Definition => 1,
      QueryKind::Callees => 2,
      QueryKind::Callers => 3,
      QueryKind::Text => 4,
      QueryKind::Egrep => 6,
      QueryKind::FilesIncluding => 8,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      QueryKind::Symbol => "symbol",
      QueryKind::Definition => "definition",
      QueryKind::Callees => "callees",
      QueryKind::Callers => "callers",
      QueryKind::Text => "text",
      QueryKind::Egrep => "egrep",
      QueryKind::FilesIncluding => "files-including",
    }
  }
}

impl fmt::Display for QueryKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for QueryKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    QueryKind::ALL
      .into_iter()
      .find(|k| k.as_str() == s)
      .ok_or_else(|| {
        let names: Vec<&str> = QueryKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("unknown query kind '{s}', expected one of: {}", names.join(", "))
      })
  }
}

// ============================================================================
// Runner
// ============================================================================

/// Resolve the cscope executable: the configured path if it is an
/// executable file, else a `PATH` lookup
pub fn find_executable(configured: Option<&Path>) -> Result<PathBuf, RunnerError> {
  if let Some(path) = configured {
    if is_executable(path) {
      return Ok(path.to_path_buf());
    }
    if path.exists() {
      warn!(path = %path.display(), "Found cscope candidate but it is not an executable");
    }
  }

  which::which(CSCOPE_EXECUTABLE).map_err(|e| {
    debug!(error = %e, "cscope lookup failed");
    RunnerError::ToolNotFound
  })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
  use std::os::unix::fs::PermissionsExt;
  std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
  path.is_file()
}

enum OutputLine {
  Stdout(String),
  Stderr(String),
}

/// A cscope invocation template for one project
#[derive(Debug, Clone)]
pub struct Cscope {
  executable: PathBuf,
  common_args: Vec<OsString>,
  tmp_folder: Option<PathBuf>,
}

impl Cscope {
  pub fn for_project(config: &ProjectConfig) -> Result<Self, RunnerError> {
    let tool = config.tool_settings();
    let executable = find_executable(tool.cscope_path.as_deref())?;

    let mut common_args = Vec::new();
    if !config.search_std_include_folders() {
      common_args.push(OsString::from("-k"));
    } else {
      for folder in config.std_include_folders() {
        common_args.push(OsString::from("-I"));
        common_args.push(folder.as_os_str().to_owned());
      }
    }
    for folder in &tool.extra_include_folders {
      common_args.push(OsString::from("-I"));
      common_args.push(folder.as_os_str().to_owned());
    }

    Ok(Self {
      executable,
      common_args,
      tmp_folder: tool.tmp_folder.clone(),
    })
  }

  pub fn executable(&self) -> &Path {
    &self.executable
  }

  fn command_line(&self, args: &[OsString]) -> String {
    std::iter::once(self.executable.as_os_str())
      .chain(self.common_args.iter().map(OsString::as_os_str))
      .chain(args.iter().map(OsString::as_os_str))
      .map(|a| a.to_string_lossy())
      .collect::<Vec<_>>()
      .join(" ")
  }

  /// Run cscope in `cwd` and feed its output to `parser`
  pub fn run(&self, cwd: &Path, args: &[OsString], parser: &mut dyn LineParser) -> Result<ParseStatus, RunnerError> {
    let command_line = self.command_line(args);
    debug!(command = %command_line, cwd = %cwd.display(), "Running cscope");

    let mut command = Command::new(&self.executable);
    command
      .args(&self.common_args)
      .args(args)
      .current_dir(cwd)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped());
    if let Some(tmp) = &self.tmp_folder {
      command.env("TMPDIR", tmp);
    }

    let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
      command: command_line.clone(),
      source,
    })?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let mut status = ParseStatus::Continue;
    std::thread::scope(|scope| {
      if let Some(out) = stdout {
        let tx = tx.clone();
        scope.spawn(move || forward_lines(out, OutputLine::Stdout, &tx));
      }
      if let Some(err) = stderr {
        let tx = tx.clone();
        scope.spawn(move || forward_lines(err, OutputLine::Stderr, &tx));
      }
      drop(tx);

      while let Some(line) = rx.blocking_recv() {
        match line {
          OutputLine::Stdout(line) | OutputLine::Stderr(line) if status == ParseStatus::LimitExceeded => {
            trace!(line, "Discarding output after limit");
          }
          OutputLine::Stdout(line) => {
            if parser.parse_line(&line) == ParseStatus::LimitExceeded {
              status = ParseStatus::LimitExceeded;
              if let Err(e) = child.kill() {
                debug!(error = %e, "Failed to stop cscope");
              }
            }
          }
          OutputLine::Stderr(line) => {
            debug!(line, "cscope stderr");
            parser.parse_line(&line);
          }
        }
      }
    });

    let exit = child.wait()?;
    parser.finish();

    if status == ParseStatus::LimitExceeded {
      return Ok(status);
    }
    if !exit.success() {
      let err = RunnerError::ExitStatus {
        command: command_line,
        cwd: cwd.to_path_buf(),
        code: exit.code(),
      };
      error!(error = %err, "cscope failed");
      return Err(err);
    }
    Ok(status)
  }

  /// Build the database `<name>.out` from `<name>.files` in `db_location`
  pub fn build_database(
    &self,
    db_location: &Path,
    name: &str,
    force_rebuild: bool,
    progress: &mut BuildProgress,
  ) -> Result<(), RunnerError> {
    let mut args: Vec<OsString> = vec![
      "-b".into(),
      "-q".into(),
      "-v".into(),
      format!("-i{name}.{FILE_LIST_EXT}").into(),
      format!("-f{name}.{DB_EXT}").into(),
    ];
    if force_rebuild {
      args.push("-u".into());
    }

    self.run(db_location, &args, progress)?;
    info!(db = %db_location.join(format!("{name}.{DB_EXT}")).display(), "Database built");
    Ok(())
  }

  fn query_once(
    &self,
    db_location: &Path,
    db_name: &str,
    file_list: Option<&str>,
    kind: QueryKind,
    term: &str,
    results: &mut QueryResults,
  ) -> Result<(), QueryError> {
    let mut args: Vec<OsString> = Vec::new();
    match file_list {
      Some(list) => args.push(format!("-i{list}").into()),
      None => args.push("-d".into()),
    }
    args.push("-L".into());
    args.push(format!("-{}{term}", kind.field()).into());
    args.push(format!("-f{db_name}").into());

    match self.run(db_location, &args, results)? {
      ParseStatus::Continue => Ok(()),
      ParseStatus::LimitExceeded => Err(QueryError::LimitExceeded {
        limit: results.limit().unwrap_or_default(),
      }),
    }
  }
}

fn forward_lines(source: impl Read, wrap: fn(String) -> OutputLine, tx: &mpsc::UnboundedSender<OutputLine>) {
  for line in BufReader::new(source).lines() {
    let Ok(line) = line else {
      break;
    };
    if line.is_empty() {
      continue;
    }
    if tx.send(wrap(line)).is_err() {
      break;
    }
  }
}

// ============================================================================
// Queries
// ============================================================================

/// Query the project's databases
///
/// The primary database (promoted files, or every file in one-tier mode) is
/// queried first and built on the fly from `primary.files`. The secondary
/// database is then queried without rebuilding, skipping files already
/// covered by the primary list.
///
/// With `near`, results are ordered by proximity to that file or directory;
/// otherwise they keep cscope's order, grouped by file.
pub fn query(
  config: &ProjectConfig,
  kind: QueryKind,
  term: &str,
  near: Option<&Path>,
) -> Result<Vec<QueryResult>, QueryError> {
  let db_location = config.db_location().ok_or(QueryError::NoDatabaseLocation)?;
  let primary_list = db_location.join(format!("{PRIMARY_DB}.{FILE_LIST_EXT}"));
  let secondary_db = db_location.join(format!("{SECONDARY_DB}.{DB_EXT}"));

  if !primary_list.is_file() && !secondary_db.is_file() {
    return Err(QueryError::NotIndexed(db_location.to_path_buf()));
  }

  let cscope = Cscope::for_project(config)?;
  let mut results = QueryResults::new(config.tool_settings().maximum_results);

  let mut primary_files = Vec::new();
  if primary_list.is_file() {
    debug!(project = %config.project_file().display(), "Querying primary database");
    primary_files = read_file_list(&primary_list).map_err(|source| QueryError::Io {
      path: primary_list.clone(),
      source,
    })?;
    cscope.query_once(
      db_location,
      &format!("{PRIMARY_DB}.{DB_EXT}"),
      Some(&format!("{PRIMARY_DB}.{FILE_LIST_EXT}")),
      kind,
      term,
      &mut results,
    )?;
  }

  if secondary_db.is_file() {
    debug!(project = %config.project_file().display(), "Querying secondary database");
    results.set_filter(primary_files);
    cscope.query_once(
      db_location,
      &format!("{SECONDARY_DB}.{DB_EXT}"),
      None,
      kind,
      term,
      &mut results,
    )?;
  }

  Ok(match near {
    Some(anchor) => results.into_sorted(anchor),
    None => results.into_results(),
  })
}

// ============================================================================
// Index Backend
// ============================================================================

/// Builds databases with the cscope executable
#[derive(Default)]
pub struct CscopeBackend {
  observer: Option<fn(u32)>,
}

impl CscopeBackend {
  pub fn new() -> Self {
    Self::default()
  }

  /// Report build progress percentages to `observer`
  pub fn with_progress(observer: fn(u32)) -> Self {
    Self {
      observer: Some(observer),
    }
  }
}

impl IndexBackend for CscopeBackend {
  fn build(&mut self, db_location: &Path, name: &str, config: &ProjectConfig) -> Result<(), IndexError> {
    let cscope = Cscope::for_project(config)?;
    let mut progress = match self.observer {
      Some(observer) => BuildProgress::with_observer(Box::new(observer) as ProgressObserver),
      None => BuildProgress::new(),
    };
    cscope.build_database(db_location, name, false, &mut progress)?;
    Ok(())
  }
}
