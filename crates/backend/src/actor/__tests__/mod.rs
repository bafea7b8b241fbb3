pub mod helpers;

mod registry;
mod runtime;
