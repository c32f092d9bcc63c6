//! Core reconciliation logic: data model, planning, execution, persistence.

pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod identity;
pub mod noop;
pub mod parser;
pub mod planner;
pub mod reference;
pub mod state;
pub mod types;
