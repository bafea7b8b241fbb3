//! Actor-based concurrency for project indexing
//!
//! Every project gets two actors, each running on its own OS thread:
//!
//! - [`Indexer`](indexer::Indexer): owns the project's index state and decides
//!   when and what to crawl
//! - [`Crawler`](crawler::Crawler): walks the project folders and returns a
//!   snapshot
//!
//! The [`ProjectRegistry`] maps editor windows onto Indexers. Actors never
//! share state; they exchange closures through their mailboxes (see
//! [`runtime`]).
//!
//! ```text
//! editor events → ProjectRegistry → Indexer ⇄ Crawler
//!                                      ↓
//!                                 file lists → cscope
//! ```

pub mod crawler;
pub mod handle;
pub mod indexer;
pub mod message;
pub mod registry;
pub mod runtime;

#[cfg(test)]
mod __tests__;

pub use handle::{CrawlerHandle, IndexerHandle};
pub use registry::{BackendFactory, ProjectRegistry};
pub use runtime::{Actor, ActorError, ActorState, Addr, Context};
