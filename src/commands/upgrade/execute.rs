use std::error::Error;

use serde::Serialize;

use super::UpgradeCmd;
use crate::commands::status::execute::{pending_steps, PendingStep};
use crate::commands::Execute;
use crate::db::Session;
use crate::upgrade::{self, UpgradeOutcome, BACKEND_FORMAT_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeState {
    NotDeployed,
    UpToDate,
    Upgraded,
    WouldUpgrade,
}

#[derive(Debug, Serialize)]
pub struct UpgradeResult {
    pub state: UpgradeState,
    pub from: Option<i32>,
    pub to: i32,
    /// Steps that ran, or would run in dry-run mode.
    pub steps: Vec<PendingStep>,
}

impl Execute for UpgradeCmd {
    type Output = UpgradeResult;

    fn execute(self, session: &mut dyn Session) -> Result<Self::Output, Box<dyn Error>> {
        let from = upgrade::format_version(session)?;
        let steps = pending_steps(from);

        if self.dry_run {
            let state = match from {
                None => UpgradeState::NotDeployed,
                Some(_) if steps.is_empty() => UpgradeState::UpToDate,
                Some(_) => UpgradeState::WouldUpgrade,
            };
            return Ok(UpgradeResult {
                state,
                from,
                to: BACKEND_FORMAT_VERSION,
                steps,
            });
        }

        let result = match upgrade::upgrade(session)? {
            UpgradeOutcome::NotDeployed => UpgradeResult {
                state: UpgradeState::NotDeployed,
                from: None,
                to: BACKEND_FORMAT_VERSION,
                steps: Vec::new(),
            },
            UpgradeOutcome::UpToDate { version } => UpgradeResult {
                state: UpgradeState::UpToDate,
                from: Some(version),
                to: version,
                steps: Vec::new(),
            },
            UpgradeOutcome::Upgraded { from, to } => UpgradeResult {
                state: UpgradeState::Upgraded,
                from: Some(from),
                to,
                steps,
            },
        };
        Ok(result)
    }
}
