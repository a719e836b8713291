//! schema_delta library - incremental PostgreSQL schema delta compiler
//!
//! Lowers logical schema deltas (concepts, links, atoms, constraints) into
//! guarded physical operations, executes them in priority order, and keeps
//! existing deployments current through a versioned upgrade chain.

pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod delta;
pub mod error;
pub mod logging;
pub mod ops;
pub mod output;
pub mod schema;
pub mod upgrade;
