pub(super) mod execute;
mod output;

use clap::Args;

/// Show the backend format version and pending upgrade steps
#[derive(Args, Debug)]
#[command(after_help = "\
Examples:
  schema_delta status                 # Persisted vs current format version
  schema_delta --format json status   # Machine-readable")]
pub struct StatusCmd {}
