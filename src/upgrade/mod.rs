//! Backend upgrade chain.
//!
//! Brings an existing deployment's physical layout up to the current format
//! before any delta is applied.
//! - The persisted version lives in the single row of `sd_meta.backend_info`
//! - Steps run in order, each in its own transaction
//! - The version is recorded with the step, so an interrupted chain resumes
//!   after the last completed step
//! - Steps are idempotent (safe to replay)

mod steps;

use tracing::{info, info_span, warn};

use crate::db::Session;
use crate::error::DeltaError;

/// Physical layout version this build produces and understands.
pub const BACKEND_FORMAT_VERSION: i32 = 16;

/// One step of the chain; running it moves a deployment from
/// `version - 1` to `version`.
#[derive(Debug, Clone, Copy)]
pub struct UpgradeStep {
    pub version: i32,
    pub description: &'static str,
    run: fn(&mut dyn Session) -> Result<(), DeltaError>,
}

const fn step(
    version: i32,
    description: &'static str,
    run: fn(&mut dyn Session) -> Result<(), DeltaError>,
) -> UpgradeStep {
    UpgradeStep {
        version,
        description,
        run,
    }
}

/// All steps, indexed by version.
pub const UPGRADE_STEPS: &[UpgradeStep] = &[
    step(1, "Feature registry and backend info tables", steps::feature_registry),
    step(2, "Link endpoints composite type", steps::link_endpoints_type),
    step(3, "Concept automatic flag", steps::concept_automatic),
    step(4, "Module imports", steps::module_imports),
    step(5, "Link table endpoint columns renamed to source_id/target_id", steps::link_endpoint_columns),
    step(6, "Link exposed behaviour", steps::link_exposed_behaviour),
    step(7, "Drop per-concept record types", steps::drop_record_types),
    step(8, "Root link table link_id column", steps::root_link_id),
    step(9, "Attribute metadata tables", steps::attribute_tables),
    step(10, "Double-colon namespace separators in stored expressions", steps::namespace_separators),
    step(11, "Table-qualified concept id checks", steps::concept_id_checks),
    step(12, "Constraint metadata table replaces column checks", steps::consolidate_constraints),
    step(13, "Tagged default payloads", steps::tagged_defaults),
    step(14, "Policy actions and events", steps::policy_subsystem),
    step(15, "Drop link is_atom", steps::drop_link_is_atom),
    step(16, "Link specialized targets", steps::link_spectargets),
];

/// Result of running the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// No metadata schema: the next delta bootstraps a fresh deployment.
    NotDeployed,
    UpToDate { version: i32 },
    Upgraded { from: i32, to: i32 },
}

/// Persisted format version; `None` when nothing is deployed.
pub fn format_version(session: &mut dyn Session) -> Result<Option<i32>, DeltaError> {
    steps::stored_version(session)
}

fn run_step(session: &mut dyn Session, step: &UpgradeStep) -> Result<(), DeltaError> {
    session.begin()?;
    let result = (step.run)(session).and_then(|()| steps::record_version(session, step.version));
    match result {
        Ok(()) => {
            session.commit()?;
            Ok(())
        }
        Err(err) => {
            if let Err(rollback) = session.rollback() {
                warn!(error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}

/// Run every pending step.
///
/// A deployment newer than this build is refused rather than touched.
pub fn upgrade(session: &mut dyn Session) -> Result<UpgradeOutcome, DeltaError> {
    let Some(from) = format_version(session)? else {
        info!("no deployment found; nothing to upgrade");
        return Ok(UpgradeOutcome::NotDeployed);
    };
    if from > BACKEND_FORMAT_VERSION {
        return Err(DeltaError::UnsupportedFormat {
            found: from,
            current: BACKEND_FORMAT_VERSION,
        });
    }
    if from == BACKEND_FORMAT_VERSION {
        return Ok(UpgradeOutcome::UpToDate { version: from });
    }

    for step in UPGRADE_STEPS.iter().filter(|s| s.version > from) {
        let span = info_span!("upgrade_step", version = step.version);
        let _guard = span.enter();
        info!(description = step.description, "upgrading backend format");
        run_step(session, step).map_err(|source| DeltaError::Upgrade {
            version: step.version,
            source: Box::new(source),
        })?;
    }
    Ok(UpgradeOutcome::Upgraded {
        from,
        to: BACKEND_FORMAT_VERSION,
    })
}
