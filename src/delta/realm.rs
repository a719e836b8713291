//! The realm: one whole delta compiled against one deployment.
//!
//! Compiling a realm prepends the bootstrap operations, lowers every command,
//! reconciles the mapping indexes collected along the way and, on a fresh
//! deployment, records the format marker.

use std::collections::BTreeMap;

use tracing::debug;

use crate::db::introspect::{self, IndexInfo};
use crate::db::Session;
use crate::error::DeltaError;
use crate::ops::Operation;
use crate::schema::{QualName, Schema, TypeRules};
use crate::upgrade::BACKEND_FORMAT_VERSION;

use super::command::{Delta, PgOp};
use super::context::{CommandContext, DeltaSummary};
use super::handlers::apply_command;
use super::metadata;
use super::names;
use super::ExpressionCompiler;

const VERSION_PRIORITY: i32 = 5;

const LINK_IDS: &str = "SELECT \"name\", \"link_type_id\" FROM \"sd_meta\".\"link\"";

/// What the compiler needs to know about the deployment up front.
#[derive(Debug, Clone, Default)]
pub struct RealmIntrospection {
    /// Persisted link type ids by link name.
    pub link_ids: BTreeMap<QualName, i64>,
    /// The same map, inverted.
    pub link_names: BTreeMap<i64, QualName>,
    /// Existing mapping indexes of every module schema.
    pub indexes: Vec<IndexInfo>,
    /// Persisted format version; `None` before the first bootstrap.
    pub format_version: Option<i32>,
}

impl RealmIntrospection {
    pub fn load(session: &mut dyn Session) -> Result<Self, DeltaError> {
        let mut found = Self {
            format_version: crate::upgrade::format_version(session)?,
            ..Self::default()
        };
        if introspect::table_exists(session, &names::meta_table("link"))? {
            for row in session.fetch(LINK_IDS, &[])? {
                let name = row.required_text("name")?;
                let Some(id) = row.int("link_type_id")? else {
                    continue;
                };
                let name: QualName = name.parse().map_err(|_| {
                    DeltaError::inconsistency(format!("stored link name '{}' is not qualified", name))
                })?;
                found.link_names.insert(id, name.clone());
                found.link_ids.insert(name, id);
            }
        }
        found.indexes = introspect::indexes_like(session, "sdm_%", "%_link_mapping_idx")?;
        debug!(
            links = found.link_ids.len(),
            indexes = found.indexes.len(),
            format_version = ?found.format_version,
            "loaded backend state"
        );
        Ok(found)
    }
}

/// Marks the deployment as being at the current format.
pub fn version_merge() -> Operation {
    Operation::new(metadata::version_merge(BACKEND_FORMAT_VERSION)).at(VERSION_PRIORITY)
}

pub fn compile_realm(
    schema: &mut Schema,
    delta: &mut Delta,
    backend: &RealmIntrospection,
    rules: &TypeRules,
    expressions: &dyn ExpressionCompiler,
) -> Result<(), DeltaError> {
    let summary = DeltaSummary::scan(delta);
    let mut ctx = CommandContext::new(summary, rules, expressions, backend.link_ids.clone());

    delta.pgops = metadata::bootstrap().into_iter().map(PgOp::Op).collect();
    delta.pgops.push(PgOp::Children);
    for cmd in delta.commands.iter_mut() {
        apply_command(cmd, schema, &mut ctx)?;
    }

    let index_ops = ctx.mappings.reconcile(&backend.indexes, &backend.link_names)?;
    delta.pgops.extend(index_ops.into_iter().map(PgOp::Op));
    // Existing deployments carry their marker forward through the upgrade chain.
    if backend.format_version.is_none() {
        delta.pgops.push(PgOp::Op(version_merge()));
    }
    Ok(())
}
