//! Command definitions and implementations.
//!
//! Each command lives in its own module with:
//! - The command struct with clap attributes for CLI parsing
//! - `execute.rs` producing a serializable result
//! - `output.rs` rendering that result as a table

mod status;
mod upgrade;

pub use status::StatusCmd;
pub use upgrade::UpgradeCmd;

use clap::Subcommand;
use std::error::Error;

use crate::db::Session;
use crate::output::{OutputFormat, Outputable};

/// Trait for executing commands with command-specific result types.
pub trait Execute {
    type Output: Outputable;

    fn execute(self, session: &mut dyn Session) -> Result<Self::Output, Box<dyn Error>>;
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the persisted and current backend format versions
    Status(StatusCmd),

    /// Run every pending backend upgrade step
    Upgrade(UpgradeCmd),
}

impl Command {
    /// Execute the command and return formatted output
    pub fn run(self, session: &mut dyn Session, format: OutputFormat) -> Result<String, Box<dyn Error>> {
        match self {
            Command::Status(cmd) => {
                let result = cmd.execute(session)?;
                Ok(result.format(format))
            }
            Command::Upgrade(cmd) => {
                let result = cmd.execute(session)?;
                Ok(result.format(format))
            }
        }
    }
}
