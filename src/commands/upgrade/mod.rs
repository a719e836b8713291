mod execute;
mod output;

use clap::Args;

/// Bring the backend format up to date
#[derive(Args, Debug)]
#[command(after_help = "\
Examples:
  schema_delta upgrade             # Run every pending step
  schema_delta upgrade --dry-run   # List pending steps without running them")]
pub struct UpgradeCmd {
    /// List the pending steps without running them
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}
