use std::error::Error;

use serde::Serialize;

use super::StatusCmd;
use crate::commands::Execute;
use crate::db::Session;
use crate::upgrade::{self, BACKEND_FORMAT_VERSION, UPGRADE_STEPS};

/// A step that has not run against the deployment yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingStep {
    pub version: i32,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResult {
    pub backend: String,
    /// `None` when no deployment exists.
    pub persisted_version: Option<i32>,
    pub current_version: i32,
    pub pending: Vec<PendingStep>,
}

impl StatusResult {
    pub fn is_current(&self) -> bool {
        self.persisted_version == Some(self.current_version)
    }
}

/// Steps newer than `version`, in chain order.
pub(crate) fn pending_steps(version: Option<i32>) -> Vec<PendingStep> {
    let Some(version) = version else {
        return Vec::new();
    };
    UPGRADE_STEPS
        .iter()
        .filter(|step| step.version > version)
        .map(|step| PendingStep {
            version: step.version,
            description: step.description.to_string(),
        })
        .collect()
}

impl Execute for StatusCmd {
    type Output = StatusResult;

    fn execute(self, session: &mut dyn Session) -> Result<Self::Output, Box<dyn Error>> {
        let persisted_version = upgrade::format_version(session)?;
        Ok(StatusResult {
            backend: session.backend_name().to_string(),
            persisted_version,
            current_version: BACKEND_FORMAT_VERSION,
            pending: pending_steps(persisted_version),
        })
    }
}
