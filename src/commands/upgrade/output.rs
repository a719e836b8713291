//! Output formatting for upgrade command results.

use super::execute::{UpgradeResult, UpgradeState};
use crate::output::Outputable;

impl Outputable for UpgradeResult {
    fn to_table(&self) -> String {
        let from = self.from.map(|v| v.to_string()).unwrap_or_default();
        let mut output = match self.state {
            UpgradeState::NotDeployed => {
                return format!("No deployment found; the next delta bootstraps format {}.\n", self.to);
            }
            UpgradeState::UpToDate => return format!("Backend is up to date (format {}).\n", self.to),
            UpgradeState::Upgraded => format!("Upgraded backend format {} -> {}:\n", from, self.to),
            UpgradeState::WouldUpgrade => format!("Would upgrade backend format {} -> {}:\n", from, self.to),
        };
        for step in &self.steps {
            let symbol = if self.state == UpgradeState::Upgraded { "✓" } else { "→" };
            output.push_str(&format!("  {} {:>3}  {}\n", symbol, step.version, step.description));
        }
        if self.state == UpgradeState::WouldUpgrade {
            output.push_str("\nNo changes made (dry-run mode).\n");
        }
        output
    }
}
