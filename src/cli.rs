//! CLI argument definitions.
//!
//! This module contains the top-level CLI structure and shared flags.
//! Individual command definitions are in the `commands` module.

use clap::Parser;

use crate::commands::Command;
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(author, version, about = "Incremental PostgreSQL schema delta compiler", long_about = None)]
pub struct Args {
    /// PostgreSQL connection URL; overrides .schema_delta.json and DATABASE_URL
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}
