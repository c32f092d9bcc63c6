//! Tessera: reconciliation and execution core for infrastructure pipelines.
//!
//! Diffs a previously applied pipeline against a desired resource graph,
//! plans the minimal create/update/delete steps, and executes them in
//! dependency order against pluggable resource back-ends.

pub mod backend;
pub mod cli;
pub mod core;
pub mod resources;
pub mod transport;
pub mod tripwire;

pub use crate::core::error::{Error, Result};
