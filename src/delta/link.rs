//! Links: owner-table columns or relation tables, plus mapping indexes.

use crate::db::{quote_ident, PgName};
use crate::error::DeltaError;
use crate::ops::{
    AlterAction, AlterItem, Column, Condition, CreateTable, DropTable, Operation, RenameColumn,
    RenameTable, TableConstraint,
};
use crate::schema::apply::apply;
use crate::schema::objects::{Link, LinkMapping, SchemaObject};
use crate::schema::{ObjectKind, QualName, Schema, SchemaLookup};

use super::batch::TableBatcher;
use super::command::{Command, CommandKind, PropValue};
use super::context::{CommandContext, Frame};
use super::handlers::apply_in_frame;
use super::inheritance::{self, base_order_delta};
use super::mapping::MappingAction;
use super::metadata;
use super::names;
use super::render_default;
use super::storage::{self, PointerStorage, TableType, TARGET_ID_COLUMN, TARGET_VALUE_COLUMN};
use super::typechange;

const TABLE_PRIORITY: i32 = 0;
const COLUMN_PRIORITY: i32 = 1;
const ROW_PRIORITY: i32 = 2;
const DROP_COLUMN_PRIORITY: i32 = 2;
const DEFAULTS_PRIORITY: i32 = 3;
const DROP_TABLE_PRIORITY: i32 = 3;

/// Batch tag keeping default changes out of the drop-column batch.
pub const DEFAULTS_TAG: &str = "defaults";

const STD_MODULE: &str = "std";

fn link_of(obj: Option<&SchemaObject>, cmd: &Command) -> Result<Link, DeltaError> {
    obj.and_then(SchemaObject::as_link)
        .cloned()
        .ok_or_else(|| DeltaError::unknown(cmd.object, &cmd.name))
}

/// The link as it will be once the property commands nested under `cmd`
/// have been applied. Storage depends on them, and the children run after
/// the link's own lowering.
fn planned(link: &Link, cmd: &Command) -> Link {
    let mut planned = link.clone();
    for child in &cmd.children {
        if child.object != ObjectKind::LinkProperty {
            continue;
        }
        match child.kind {
            CommandKind::Create => {
                let normal = match child.new_value("bases") {
                    Some(PropValue::Names(bases)) if !bases.is_empty() => bases[0].clone(),
                    _ => child.name.clone(),
                };
                planned.properties.entry(normal).or_insert_with(|| child.name.clone());
            }
            CommandKind::Delete => planned.properties.retain(|_, spec| spec != &child.name),
            _ => {}
        }
    }
    planned
}

/// Table of a base link when it has one.
fn base_table(schema: &Schema, base: &QualName) -> Result<Option<PgName>, DeltaError> {
    match schema.get(base) {
        Some(SchemaObject::Link(base_link)) if storage::has_table(schema, base_link)? => {
            Ok(Some(names::link_table(base)))
        }
        _ => Ok(None),
    }
}

/// Create the relation table of `link`, after those of its bases.
pub(super) fn provide_table(schema: &Schema, link: &Link, ops: &mut Vec<Operation>) -> Result<(), DeltaError> {
    if link.name.module == STD_MODULE {
        return Ok(());
    }
    let mut parents = Vec::new();
    for base in &link.bases {
        let Some(SchemaObject::Link(base_link)) = schema.get(base) else {
            continue;
        };
        // A generic base has a table once any specialization has one, and
        // `link` may be gaining its table in this very delta.
        let has_table = if base_link.is_generic() {
            !base_link.is_pure_computable()
        } else {
            storage::has_table(schema, base_link)?
        };
        if !has_table {
            continue;
        }
        provide_table(schema, base_link, ops)?;
        parents.push(names::link_table(base));
    }

    let table = names::link_table(&link.name);
    let mut create = CreateTable::new(table.clone())
        .column(Column::new("source_id", "uuid").required(true))
        .column(Column::new(TARGET_ID_COLUMN, "uuid"))
        .column(Column::new("link_type_id", "integer").required(true));
    if !link.is_generic() && storage::is_atomic(schema, link) {
        if let Some(target) = &link.target {
            create = create.column(Column::new(TARGET_VALUE_COLUMN, storage::column_type(schema, target)?));
        }
    }
    create = create
        .constraint(TableConstraint::unique(
            names::pg_ident(&table.name, "_source_id_target_id_link_type_id_key"),
            &["source_id", TARGET_ID_COLUMN, "link_type_id"],
        ))
        .inherits(parents);
    ops.push(
        Operation::new(create)
            .at(TABLE_PRIORITY)
            .unless(Condition::TableExists(table)),
    );
    Ok(())
}

fn owner_column(link: &Link, location: &PointerStorage, ctx: &CommandContext<'_>) -> Result<Column, DeltaError> {
    Ok(Column::new(location.column.clone(), location.column_type.clone())
        .required(link.required)
        .with_default(render_default(&link.default, ctx.expressions)?))
}

pub fn create(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let link = link_of(applied.current.as_ref(), cmd)?;
    let planned = planned(&link, cmd);
    let link_type_id = ctx.link_type_id(&link.name);

    let mut own = TableBatcher::new();
    let mut ops = Vec::new();
    let mut frame_table = None;

    if link.is_generic() {
        if storage::has_table(schema, &planned)? {
            provide_table(schema, &planned, &mut ops)?;
            frame_table = Some(names::link_table(&link.name));
        }
    } else if let Some(location) = storage::resolve(schema, &planned)? {
        match location.table_type {
            TableType::Concept => {
                let item = AlterItem::new(AlterAction::AddColumn(owner_column(&link, &location, ctx)?))
                    .unless(Condition::column(&location.table, &location.column));
                ctx.queue(&mut own, &location.table, COLUMN_PRIORITY, None, item);
                if let Some(frame) = ctx.nearest_mut(ObjectKind::Concept) {
                    if link.source.as_ref() == Some(&frame.name) {
                        frame.created_pointers.insert(link.normal_name().clone());
                    }
                }
            }
            TableType::Link => {
                provide_table(schema, &planned, &mut ops)?;
                if link.mapping != LinkMapping::ManyToMany {
                    ctx.mappings.schedule(
                        &link.name,
                        MappingAction::Create,
                        location.table.clone(),
                        link.mapping,
                        link_type_id,
                    );
                }
                frame_table = Some(location.table);
            }
        }
    }

    cmd.extend_ops(ops);
    cmd.extend_ops(own.drain());
    cmd.push_op(
        Operation::new(metadata::insert_row("link", metadata::link_record(&link, link_type_id)))
            .at(ROW_PRIORITY),
    );
    let mut frame = Frame::new(cmd, None, applied.current.clone());
    if let Some(table) = frame_table {
        frame = frame.with_table(table);
    }
    apply_in_frame(cmd, schema, ctx, frame, |_, _, _| Ok(()))
}

/// Change the column type of a pointer whose target changed.
fn retarget(
    ctx: &mut CommandContext<'_>,
    own: &mut TableBatcher,
    old: &Link,
    new: &Link,
    location: &PointerStorage,
) {
    if let (Some(before), Some(after)) = (&old.target, &new.target) {
        if ctx.summary.is_created(after) || ctx.summary.is_rename(before, after) {
            return;
        }
    }
    let item = AlterItem::new(AlterAction::AlterColumnType {
        column: location.column.clone(),
        type_name: location.column_type.clone(),
        using: Some(format!("{}::{}", quote_ident(&location.column), location.column_type)),
    })
    .when(Condition::column(&location.table, &location.column));
    ctx.queue(own, &location.table, COLUMN_PRIORITY, None, item);
}

pub fn alter(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let old = link_of(applied.original.as_ref(), cmd)?;
    let new = link_of(applied.current.as_ref(), cmd)?;
    let planned = planned(&new, cmd);
    let link_type_id = ctx.link_type_id(&new.name);

    let mut own = TableBatcher::new();
    let mut ops = Vec::new();
    let before = storage::resolve(schema, &old)?;
    let after = storage::resolve(schema, &planned)?;

    match (&before, &after) {
        (Some(b), Some(a)) if b.table == a.table && b.column == a.column => {
            if b.column_type != a.column_type {
                retarget(ctx, &mut own, &old, &new, a);
            }
            if a.table_type == TableType::Concept {
                if old.required != new.required {
                    let item = AlterItem::new(AlterAction::SetNotNull {
                        column: a.column.clone(),
                        required: new.required,
                    })
                    .when(Condition::column(&a.table, &a.column));
                    ctx.queue(&mut own, &a.table, COLUMN_PRIORITY, None, item);
                }
                if old.default != new.default {
                    let item = AlterItem::new(AlterAction::SetDefault {
                        column: a.column.clone(),
                        default: render_default(&new.default, ctx.expressions)?,
                    })
                    .when(Condition::column(&a.table, &a.column));
                    ctx.queue(&mut own, &a.table, DEFAULTS_PRIORITY, Some(DEFAULTS_TAG), item);
                }
            }
        }
        _ => {
            // Storage moved. The new location is provided; existing values
            // are not carried over.
            if let Some(a) = &after {
                match a.table_type {
                    TableType::Concept => {
                        let item = AlterItem::new(AlterAction::AddColumn(owner_column(&new, a, ctx)?))
                            .unless(Condition::column(&a.table, &a.column));
                        ctx.queue(&mut own, &a.table, COLUMN_PRIORITY, None, item);
                    }
                    TableType::Link => provide_table(schema, &planned, &mut ops)?,
                }
            }
            if let Some(b) = &before {
                match b.table_type {
                    TableType::Concept => {
                        let item = AlterItem::new(AlterAction::DropColumn(b.column.clone()))
                            .when(Condition::column(&b.table, &b.column));
                        ctx.queue(&mut own, &b.table, DROP_COLUMN_PRIORITY, None, item);
                    }
                    TableType::Link if after.as_ref().map(|a| &a.table) != Some(&b.table) => {
                        ops.push(
                            Operation::new(DropTable { name: b.table.clone() })
                                .at(DROP_TABLE_PRIORITY)
                                .when(Condition::TableExists(b.table.clone())),
                        );
                    }
                    TableType::Link => {}
                }
            }
        }
    }

    if let Some(a) = &after {
        if a.table_type == TableType::Link {
            let mapping_changed = old.mapping != new.mapping;
            let storage_changed = before.as_ref().map(|b| b.table_type) != Some(TableType::Link);
            if mapping_changed || storage_changed {
                ctx.mappings.schedule(
                    &new.name,
                    MappingAction::Alter {
                        old_name: old.name.clone(),
                    },
                    a.table.clone(),
                    new.mapping,
                    link_type_id,
                );
            }
        }
    }

    let table = storage::has_table(schema, &planned)?.then(|| names::link_table(&new.name));
    if let Some(table) = &table {
        let delta = base_order_delta(
            &old.bases.iter().map(|b| ctx.summary.current_name(b)).collect::<Vec<_>>(),
            &new.bases,
        );
        if !delta.is_empty() {
            let mut parents = Vec::new();
            for base in delta.dropped.iter().chain(&delta.detach).chain(&delta.attach) {
                if let Some(parent) = base_table(schema, base)? {
                    parents.push((base.clone(), parent));
                }
            }
            inheritance::reparent(
                table,
                &delta,
                |base| {
                    parents
                        .iter()
                        .find(|(name, _)| name == base)
                        .map(|(_, parent)| parent.clone())
                },
                &mut own,
            );
        }
    }

    cmd.extend_ops(ops);
    cmd.extend_ops(own.drain());
    cmd.push_op(
        Operation::new(metadata::update_row(
            "link",
            &new.name.to_string(),
            metadata::link_record(&new, link_type_id),
        ))
        .at(ROW_PRIORITY),
    );
    let mut frame = Frame::new(cmd, applied.original.clone(), applied.current.clone());
    if let Some(table) = table {
        frame = frame.with_table(table);
    }
    apply_in_frame(cmd, schema, ctx, frame, |_, _, _| Ok(()))
}

pub fn rename(cmd: &mut Command, schema: &mut Schema, _ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let old = link_of(applied.original.as_ref(), cmd)?;
    let new = link_of(applied.current.as_ref(), cmd)?;

    let table = names::link_table(&old.name);
    cmd.push_op(
        Operation::new(RenameTable {
            name: table.clone(),
            new_name: names::link_table(&new.name),
        })
        .when(Condition::TableExists(table)),
    );

    if new.is_generic() {
        let (old_column, new_column) = (names::pointer_column(&old.name), names::pointer_column(&new.name));
        if old_column != new_column {
            for obj in schema.objects_of_kind(ObjectKind::Link) {
                let SchemaObject::Link(spec) = obj else {
                    continue;
                };
                if spec.is_generic() || spec.normal_name() != &new.name {
                    continue;
                }
                let Some(location) = storage::resolve(schema, spec)? else {
                    continue;
                };
                let Some(source) = &spec.source else {
                    continue;
                };
                if location.table_type != TableType::Concept || typechange::inherited_column(schema, source, &new.name)? {
                    continue;
                }
                cmd.push_op(
                    Operation::new(RenameColumn {
                        table: location.table.clone(),
                        old: old_column.clone(),
                        new: new_column.clone(),
                    })
                    .when(Condition::column(&location.table, &old_column)),
                );
            }
        }
    }

    cmd.push_op(Operation::new(metadata::rename_row(
        "link",
        &old.name.to_string(),
        &new.name.to_string(),
    )));
    Ok(())
}

pub fn delete(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let old = link_of(applied.original.as_ref(), cmd)?;
    let mut own = TableBatcher::new();
    let mut ops = Vec::new();

    let frame = Frame::new(cmd, applied.original.clone(), None).with_table(names::link_table(&old.name));
    apply_in_frame(cmd, schema, ctx, frame, |_, _, _| Ok(()))?;

    if let Some(location) = storage::resolve(schema, &old)? {
        if location.table_type == TableType::Concept {
            if let Some(source) = &old.source {
                let source_gone = ctx.summary.is_deleted(source) || schema.get(source).is_none();
                let reinherited = !source_gone && schema.pointers_of(source)?.contains_key(old.normal_name());
                if !source_gone && !reinherited {
                    let item = AlterItem::new(AlterAction::DropColumn(location.column.clone()))
                        .when(Condition::column(&location.table, &location.column));
                    ctx.queue(&mut own, &location.table, DROP_COLUMN_PRIORITY, None, item);
                }
            }
        }
    }

    if old.name.module != STD_MODULE {
        let table = names::link_table(&old.name);
        ops.push(
            Operation::new(DropTable { name: table.clone() })
                .at(DROP_TABLE_PRIORITY)
                .when(Condition::TableExists(table.clone())),
        );
        if !old.is_generic() {
            ctx.mappings.cancel(&old.name);
            ctx.mappings.schedule(
                &old.name,
                MappingAction::Delete,
                table,
                old.mapping,
                ctx.link_type_id(&old.name),
            );
        }
    }

    cmd.extend_ops(own.drain());
    cmd.extend_ops(ops);
    cmd.push_op(
        Operation::new(metadata::delete_row("link", &old.name.to_string())).at(ROW_PRIORITY),
    );
    Ok(())
}
