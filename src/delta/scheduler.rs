//! Flattening of the command tree and priority-ordered execution.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::db::Session;
use crate::error::DeltaError;
use crate::ops::{Operation, Outcome, Priority};

use super::command::{Command, Delta, PgOp};

/// Counts reported after a delta ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub executed: usize,
    pub skipped: usize,
}

fn collect_command<'a>(cmd: &'a Command, out: &mut Vec<&'a Operation>) {
    collect(&cmd.pgops, &cmd.children, out);
}

/// Own operations in discovery order, with the children spliced in at the
/// marker, or after everything when the command never placed one.
fn collect<'a>(pgops: &'a [PgOp], children: &'a [Command], out: &mut Vec<&'a Operation>) {
    let mut spliced = false;
    for entry in pgops {
        match entry {
            PgOp::Op(op) => out.push(op),
            PgOp::Children if !spliced => {
                spliced = true;
                for child in children {
                    collect_command(child, out);
                }
            }
            PgOp::Children => {}
        }
    }
    if !spliced {
        for child in children {
            collect_command(child, out);
        }
    }
}

/// Every operation of the delta in execution order: ascending priority,
/// discovery order within a priority.
pub fn plan(delta: &Delta) -> Vec<&Operation> {
    let mut discovered = Vec::new();
    collect(&delta.pgops, &delta.commands, &mut discovered);

    let mut buckets: BTreeMap<Priority, Vec<&Operation>> = BTreeMap::new();
    for op in discovered {
        buckets.entry(op.priority).or_default().push(op);
    }
    buckets.into_values().flatten().collect()
}

fn run(session: &mut dyn Session, ops: &[&Operation]) -> Result<ExecutionReport, DeltaError> {
    let mut report = ExecutionReport::default();
    for op in ops {
        match op.execute(session)? {
            Outcome::Executed => report.executed += 1,
            Outcome::Skipped => report.skipped += 1,
        }
    }
    Ok(report)
}

/// Execute a compiled delta in a single transaction.
pub fn execute(session: &mut dyn Session, delta: &Delta) -> Result<ExecutionReport, DeltaError> {
    let ops = plan(delta);
    session.begin()?;
    match run(session, &ops) {
        Ok(report) => {
            session.commit()?;
            info!(
                backend = session.backend_name(),
                executed = report.executed,
                skipped = report.skipped,
                "delta applied"
            );
            Ok(report)
        }
        Err(err) => {
            if let Err(rollback) = session.rollback() {
                warn!(error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}
