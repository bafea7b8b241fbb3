//! cscope integration: building databases and answering queries

pub mod results;
pub mod runner;

pub use results::{BuildProgress, LineParser, ParseStatus, QueryResult, QueryResults};
pub use runner::{Cscope, CscopeBackend, QueryError, QueryKind, RunnerError, find_executable, query};
