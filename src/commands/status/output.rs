//! Output formatting for status command results.

use super::execute::StatusResult;
use crate::output::{key_values, Outputable};

impl Outputable for StatusResult {
    fn to_table(&self) -> String {
        let persisted = match self.persisted_version {
            Some(version) => version.to_string(),
            None => "not deployed".to_string(),
        };
        let mut output = key_values(&[
            ("Backend", self.backend.clone()),
            ("Persisted format", persisted),
            ("Current format", self.current_version.to_string()),
        ]);
        output.push('\n');

        if self.pending.is_empty() {
            if self.is_current() {
                output.push_str("\nBackend is up to date.\n");
            }
            return output;
        }
        output.push_str(&format!("\nPending steps ({}):\n", self.pending.len()));
        for step in &self.pending {
            output.push_str(&format!("  {:>3}  {}\n", step.version, step.description));
        }
        output
    }
}
