use std::path::{Path, PathBuf};

use tagscope_core::config::PROJECT_FILE_SUFFIX;
use tracing::warn;

/// Appended to the project name to form its database directory
pub const DB_FOLDER_SUFFIX: &str = "-tagscope";

/// Placeholder project file for a window that has folders but no project file
pub fn placeholder_project_file(cache_dir: &Path, window_id: u64) -> PathBuf {
  cache_dir
    .join(format!("tmp_index_{window_id}"))
    .join("dummy_project.txt")
}

/// Name of a project, derived from its project file
pub fn project_name(project_file: &Path) -> Option<String> {
  let file_name = project_file.file_name()?.to_str()?;
  let name = match file_name.strip_suffix(PROJECT_FILE_SUFFIX) {
    Some(stripped) if !stripped.is_empty() => stripped.to_string(),
    _ => project_file.file_stem()?.to_str()?.to_string(),
  };
  Some(name)
}

/// Resolve the private database directory next to the project file
///
/// Returns `None` (and logs why) when the project file's directory does not
/// exist or the database path is taken by a regular file.
pub fn database_location(project_file: &Path) -> Option<PathBuf> {
  let dir = project_file.parent()?;

  if !dir.is_dir() {
    warn!(
      path = %dir.display(),
      project = %project_file.display(),
      "Project directory does not exist, not indexing"
    );
    return None;
  }

  let name = project_name(project_file)?;
  let db_location = dir.join(format!("{name}{DB_FOLDER_SUFFIX}"));

  if db_location.is_file() {
    warn!(
      path = %db_location.display(),
      project = %project_file.display(),
      "Database path exists but is not a folder, not indexing"
    );
    return None;
  }

  Some(db_location)
}

/// Longest path that is a component-wise prefix of every path in `paths`
pub fn common_path_prefix(paths: &[PathBuf]) -> Option<PathBuf> {
  let (first, rest) = paths.split_first()?;
  let mut prefix: Vec<_> = first.components().collect();

  for path in rest {
    let shared = prefix
      .iter()
      .zip(path.components())
      .take_while(|(a, b)| *a == b)
      .count();
    prefix.truncate(shared);
  }

  if prefix.is_empty() {
    return None;
  }
  Some(prefix.into_iter().collect())
}
