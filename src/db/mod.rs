//! Backend access layer.
//!
//! This module provides everything the compiler needs from PostgreSQL:
//! - A [`Session`] trait with `execute`/`fetch` over positional parameters
//! - A synchronous PostgreSQL implementation
//! - Catalog introspection used by guards, upgrades and index maintenance
//! - Identifier/literal quoting and schema-qualified names
//!
//! # Type Decisions
//!
//! **Why a hand-written `SqlValue` instead of `postgres::types` directly?**
//! Operations are built and compared long before a connection exists, and
//! tests run them against an in-memory session. A small owned value enum keeps
//! them `Clone + PartialEq` and backend-neutral.

pub mod config;
pub mod escape;
pub mod introspect;
pub mod postgres;
pub mod session;
pub mod value;

#[cfg(test)]
pub mod sim;

pub use config::{DatabaseConfig, PostgresConfig};
pub use escape::{quote_ident, quote_literal, PgName};
pub use session::{Row, Session};
pub use value::{DatabaseValue, SqlValue};

use thiserror::Error;

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to connect: {message}")]
    ConnectFailed { message: String },

    /// The backend refused a statement.
    #[error("Backend rejected statement: {message}\n  in: {sql}")]
    Rejected { sql: String, message: String },

    #[error("Missing column '{name}' in query result")]
    MissingColumn { name: String },

    #[error("Unexpected result: {message}")]
    Protocol { message: String },
}
