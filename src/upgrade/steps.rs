//! Individual upgrade steps.
//!
//! Every step guards each operation against the catalog, so a step replayed
//! on a deployment it already ran against changes nothing.

use crate::db::introspect;
use crate::db::{quote_ident, PgName, Session, SqlValue};
use crate::delta::metadata;
use crate::delta::names::{self, meta_table, pg_ident, META_SCHEMA};
use crate::error::DeltaError;
use crate::ops::{
    AlterAction, AlterItem, AlterTable, Column, Condition, CreateTable, DropCompositeType, Filter, Operation,
    RenameColumn, RenameTableConstraint, Update,
};
use crate::schema::payload::{normalize_namespaces, read_default, write_default, PayloadFormat};

pub(super) type StepResult = Result<(), DeltaError>;

fn run(session: &mut dyn Session, ops: Vec<Operation>) -> StepResult {
    for op in ops {
        op.execute(session)?;
    }
    Ok(())
}

fn create_table(table: CreateTable) -> Operation {
    let name = table.name.clone();
    Operation::new(table).unless(Condition::TableExists(name))
}

fn add_column(table: &PgName, column: Column) -> Operation {
    let guard = Condition::column(table, &column.name);
    Operation::new(
        AlterTable::new(table.clone()).add(AlterItem::new(AlterAction::AddColumn(column)).unless(guard)),
    )
    .when(Condition::TableExists(table.clone()))
}

fn drop_column(table: &PgName, column: &str) -> Operation {
    Operation::new(
        AlterTable::new(table.clone())
            .add(AlterItem::new(AlterAction::DropColumn(column.to_string())).when(Condition::column(table, column))),
    )
    .when(Condition::TableExists(table.clone()))
}

fn rename_column(table: &PgName, old: &str, new: &str) -> Operation {
    Operation::new(RenameColumn {
        table: table.clone(),
        old: old.to_string(),
        new: new.to_string(),
    })
    .when(Condition::column(table, old))
    .unless(Condition::column(table, new))
}

/// Every `(schema, table)` pair of user module schemas whose name matches.
fn module_tables(session: &mut dyn Session, pattern: &str) -> Result<Vec<PgName>, DeltaError> {
    let mut tables = Vec::new();
    for schema in introspect::schemas_like(session, "sdm_%")? {
        for table in introspect::tables_like(session, &schema, pattern)? {
            tables.push(PgName::new(schema.clone(), table));
        }
    }
    Ok(tables)
}

/// Rewrite one text column of a metadata table row by row, touching only
/// the rows whose value changes.
fn rewrite_column<F>(session: &mut dyn Session, table: &str, column: &str, rewrite: F) -> StepResult
where
    F: Fn(&str, &str) -> Result<String, DeltaError>,
{
    let name = meta_table(table);
    if !introspect::column_exists(session, &name, column)? {
        return Ok(());
    }
    let query = format!("SELECT \"name\", {} FROM {}", quote_ident(column), name);
    let mut updates = Vec::new();
    for row in session.fetch(&query, &[])? {
        let key = row.required_text("name")?;
        let Some(current) = row.text(column)? else {
            continue;
        };
        let rewritten = rewrite(&key, &current)?;
        if rewritten != current {
            updates.push(Update {
                table: name.clone(),
                values: vec![(column.to_string(), SqlValue::from(rewritten))],
                filters: vec![Filter::eq("name", key)],
            });
        }
    }
    run(session, updates.into_iter().map(Operation::new).collect())
}

pub(super) fn feature_registry(session: &mut dyn Session) -> StepResult {
    run(
        session,
        vec![
            create_table(metadata::feature_table()),
            create_table(metadata::backend_info_table()),
            Operation::new(metadata::uuid_feature()),
        ],
    )
}

pub(super) fn link_endpoints_type(session: &mut dyn Session) -> StepResult {
    let ty = metadata::link_endpoints_type();
    let name = ty.name.clone();
    run(session, vec![Operation::new(ty).unless(Condition::CompositeTypeExists(name))])
}

pub(super) fn concept_automatic(session: &mut dyn Session) -> StepResult {
    let column = Column::new("automatic", "boolean")
        .required(true)
        .with_default(Some("false".to_string()));
    run(session, vec![add_column(&meta_table("concept"), column)])
}

pub(super) fn module_imports(session: &mut dyn Session) -> StepResult {
    run(session, vec![add_column(&meta_table("module"), Column::new("imports", "text[]"))])
}

pub(super) fn link_endpoint_columns(session: &mut dyn Session) -> StepResult {
    let mut ops = Vec::new();
    for table in module_tables(session, "%_link")? {
        ops.push(rename_column(&table, "source", "source_id"));
        ops.push(rename_column(&table, "target", "target_id"));
    }
    run(session, ops)
}

pub(super) fn link_exposed_behaviour(session: &mut dyn Session) -> StepResult {
    run(
        session,
        vec![add_column(&meta_table("link"), Column::new("exposed_behaviour", "text"))],
    )
}

pub(super) fn drop_record_types(session: &mut dyn Session) -> StepResult {
    let mut ops = Vec::new();
    for schema in introspect::schemas_like(session, "sdm_%")? {
        let types = introspect::composite_types_like(session, &schema, "%_record")?;
        for ty in types.into_iter().filter(|ty| ty.ends_with("_record")) {
            let name = PgName::new(schema.clone(), ty);
            ops.push(
                Operation::new(DropCompositeType {
                    name: name.clone(),
                    cascade: true,
                })
                .when(Condition::CompositeTypeExists(name)),
            );
        }
    }
    run(session, ops)
}

pub(super) fn root_link_id(session: &mut dyn Session) -> StepResult {
    let root = names::link_table(&crate::schema::name::qn(crate::schema::snapshot::ROOT_LINK));
    run(session, vec![add_column(&root, Column::new("link_id", "uuid"))])
}

pub(super) fn attribute_tables(session: &mut dyn Session) -> StepResult {
    run(
        session,
        vec![
            create_table(metadata::attribute_table()),
            create_table(metadata::attribute_value_table()),
        ],
    )
}

pub(super) fn namespace_separators(session: &mut dyn Session) -> StepResult {
    let normalize = |_: &str, text: &str| Ok(normalize_namespaces(text));
    rewrite_column(session, "link", "default", normalize)?;
    rewrite_column(session, "link", "computable", normalize)
}

pub(super) fn concept_id_checks(session: &mut dyn Session) -> StepResult {
    let mut ops = Vec::new();
    for table in module_tables(session, "%_data")? {
        let new = pg_ident(&table.name, "_concept_id_check");
        ops.push(
            Operation::new(RenameTableConstraint {
                table: table.clone(),
                old: "concept_id_check".to_string(),
                new: new.clone(),
            })
            .when(Condition::TableConstraintExists {
                table: table.clone(),
                constraint: "concept_id_check".to_string(),
            })
            .unless(Condition::TableConstraintExists {
                table: table.clone(),
                constraint: new,
            }),
        );
    }
    run(session, ops)
}

pub(super) fn consolidate_constraints(session: &mut dyn Session) -> StepResult {
    let mut ops = Vec::new();
    for table in module_tables(session, "%_data")? {
        let prefix = format!("{}_check_", table.name);
        let legacy: Vec<String> = introspect::table_constraints_like(session, &table, "%check%")?
            .into_iter()
            .filter(|name| name.starts_with(&prefix))
            .collect();
        if legacy.is_empty() {
            continue;
        }
        let mut alter = AlterTable::new(table.clone());
        for name in legacy {
            alter.push(
                AlterItem::new(AlterAction::DropConstraint(name.clone())).when(Condition::TableConstraintExists {
                    table: table.clone(),
                    constraint: name,
                }),
            );
        }
        ops.push(Operation::new(alter));
    }
    ops.push(create_table(metadata::constraint_table()));
    run(session, ops)
}

pub(super) fn tagged_defaults(session: &mut dyn Session) -> StepResult {
    let retag = |name: &str, text: &str| {
        let (items, format) = read_default(text)
            .map_err(|err| DeltaError::inconsistency(format!("default of '{}': {}", name, err)))?;
        Ok(match format {
            PayloadFormat::Tagged => text.to_string(),
            PayloadFormat::NamespacedExpr | PayloadFormat::ColonDelimited => write_default(&items),
        })
    };
    for table in ["atom", "link", "link_property"] {
        rewrite_column(session, table, "default", retag)?;
    }
    Ok(())
}

pub(super) fn policy_subsystem(session: &mut dyn Session) -> StepResult {
    let policy = meta_table("policy");
    run(
        session,
        vec![
            create_table(metadata::action_table()),
            create_table(metadata::event_table()),
            create_table(metadata::policy_table()),
            add_column(&policy, Column::new("event", "text")),
            add_column(&policy, Column::new("actions", "text[]")),
        ],
    )
}

pub(super) fn drop_link_is_atom(session: &mut dyn Session) -> StepResult {
    run(session, vec![drop_column(&meta_table("link"), "is_atom")])
}

pub(super) fn link_spectargets(session: &mut dyn Session) -> StepResult {
    run(
        session,
        vec![add_column(&meta_table("link"), Column::new("spectargets", "text[]"))],
    )
}

/// The persisted format version, or `None` when nothing is deployed.
///
/// A deployment without the version table, or with an empty one, predates
/// versioning and reads as version 0.
pub(super) fn stored_version(session: &mut dyn Session) -> Result<Option<i32>, DeltaError> {
    if !introspect::schema_exists(session, META_SCHEMA)? {
        return Ok(None);
    }
    let info = meta_table("backend_info");
    if !introspect::table_exists(session, &info)? {
        return Ok(Some(0));
    }
    let query = format!("SELECT \"format_version\" FROM {}", info);
    let version = match session.fetch(&query, &[])?.first() {
        Some(row) => row.int("format_version")?.unwrap_or(0),
        None => 0,
    };
    i32::try_from(version)
        .map(Some)
        .map_err(|_| DeltaError::inconsistency(format!("format version {} out of range", version)))
}

/// Record `version` unless the deployment already claims a newer one.
pub(super) fn record_version(session: &mut dyn Session, version: i32) -> StepResult {
    run(session, vec![Operation::new(metadata::version_merge(version))])
}
