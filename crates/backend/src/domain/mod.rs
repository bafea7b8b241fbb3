//! Domain types - core indexing entities
//!
//! Project configuration, directory snapshots and project identity helpers.
//! These types are independent of the actor machinery that moves them around.

pub mod project;
pub mod project_config;
pub mod snapshot;
