//! tagscope CLI - incremental cscope cross-reference indexes

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tagscope::QueryKind;
use tagscope_core::{Settings, dirs::default_log_dir};
use tracing::warn;

mod commands;
mod host;
mod logging;

use commands::{cmd_config_init, cmd_config_path, cmd_config_show, cmd_index, cmd_query, cmd_watch};
use logging::{init_cli_logging, init_file_logging};

#[derive(Parser)]
#[command(name = "tagscope")]
#[command(about = "Incremental cscope cross-reference indexes for project folders")]
#[command(after_help = "\
QUICK START:
  tagscope config init            # Create a project file in the current directory
  tagscope index                  # Crawl the project and build its database
  tagscope query definition main  # Look up a symbol

COMMON WORKFLOWS:
  tagscope watch                  # Re-index on file changes")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
  /// Show the effective settings
  #[command(long_about = "Show the effective settings.\n\n\
    Displays the user settings file and, when a project file is found, the \
    project's overrides merged on top.")]
  Show {
    /// Project path (default: current directory)
    project: Option<PathBuf>,
  },

  /// Create a project file listing the project directory as its only folder
  Init {
    /// Overwrite an existing project file
    #[arg(long)]
    force: bool,
    /// Project directory (default: current directory)
    #[arg(short, long)]
    project: Option<PathBuf>,
  },

  /// Print the user settings path
  Path,
}

#[derive(Subcommand)]
enum Commands {
  /// Crawl a project and (re)build its cscope database
  #[command(after_help = "\
PROJECTS:
  A path may be a *.tagscope.toml project file, a directory containing one,
  or a plain directory. Plain directories are indexed into the cache dir.")]
  Index {
    /// Project file or directory (default: current directory)
    project: Option<PathBuf>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Query a project's cscope database
  #[command(after_help = "\
KINDS:
  symbol, definition, callees, callers, text, egrep, files-including")]
  Query {
    /// What to look for
    kind: QueryKind,
    /// Symbol, text or pattern
    term: String,
    /// Project file or directory (default: current directory)
    #[arg(short, long)]
    project: Option<PathBuf>,
    /// List matches closest to this file or directory first (default: current directory)
    #[arg(long, value_name = "PATH")]
    near: Option<PathBuf>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Keep a project's database current while files change
  Watch {
    /// Project file or directory (default: current directory)
    project: Option<PathBuf>,
    /// Log to a rolling file in the cache directory instead of stderr
    #[arg(long)]
    log_file: bool,
  },

  /// Inspect or create configuration
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let (settings, load_error) = match Settings::load_user() {
    Ok(settings) => (settings, None),
    Err(e) => (Settings::default(), Some(e)),
  };

  // File logging for the watcher, console-only for other commands
  let _guard = match &cli.command {
    Commands::Watch { log_file: true, .. } => init_file_logging(&settings.log, &default_log_dir()),
    _ => {
      init_cli_logging(&settings.log);
      None
    }
  };

  if let Some(e) = load_error {
    warn!(error = %e, "Failed to load user settings, using defaults");
  }

  match cli.command {
    Commands::Index { project, json } => cmd_index(settings, project, json),
    Commands::Query {
      kind,
      term,
      project,
      near,
      json,
    } => cmd_query(settings, kind, &term, project, near, json),
    Commands::Watch { project, .. } => cmd_watch(settings, project),
    Commands::Config { command } => match command {
      ConfigCommand::Show { project } => cmd_config_show(settings, project),
      ConfigCommand::Init { force, project } => cmd_config_init(force, project),
      ConfigCommand::Path => cmd_config_path(),
    },
  }
}
