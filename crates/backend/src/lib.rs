pub mod actor;
pub mod cscope;
pub mod domain;
pub mod editor;

pub use actor::{
  ActorError, BackendFactory, IndexerHandle, ProjectRegistry,
  indexer::{IndexBackend, IndexError, IndexMode, IndexerStatus},
};
pub use cscope::{CscopeBackend, QueryError, QueryKind, QueryResult, RunnerError};
pub use domain::project_config::ProjectConfig;
pub use editor::{EditorHost, WindowId, WindowInfo};
