//! Link properties: columns of their link's table.

use crate::db::quote_ident;
use crate::error::DeltaError;
use crate::ops::{AlterAction, AlterItem, Column, Condition, Operation, RenameColumn};
use crate::schema::apply::apply;
use crate::schema::objects::{LinkMapping, LinkProperty, SchemaObject};
use crate::schema::{ObjectKind, QualName, Schema, SchemaLookup};

use super::batch::TableBatcher;
use super::command::Command;
use super::context::CommandContext;
use super::link::{self, DEFAULTS_TAG};
use super::mapping::MappingAction;
use super::metadata;
use super::names;
use super::render_default;
use super::storage::{self, PointerStorage, TableType};

const COLUMN_PRIORITY: i32 = 1;
const ROW_PRIORITY: i32 = 2;
const DROP_COLUMN_PRIORITY: i32 = 2;
const DEFAULTS_PRIORITY: i32 = 3;
const REQUIRED_ROW_PRIORITY: i32 = 4;
const REQUIRED_COLUMN_PRIORITY: i32 = 5;

fn property_of(obj: Option<&SchemaObject>, cmd: &Command) -> Result<LinkProperty, DeltaError> {
    obj.and_then(SchemaObject::as_link_property)
        .cloned()
        .ok_or_else(|| DeltaError::unknown(cmd.object, &cmd.name))
}

fn location(schema: &Schema, prop: &LinkProperty) -> Result<Option<PointerStorage>, DeltaError> {
    if prop.is_generic() {
        return Ok(None);
    }
    storage::resolve_property(schema, prop)
}

/// Provide the link's own table and, when the link was stored as a column
/// of its source concept until now, drop that column and enforce its
/// cardinality on the new table.
fn move_to_own_table(
    cmd: &mut Command,
    schema: &Schema,
    ctx: &mut CommandContext<'_>,
    prop: &LinkProperty,
    source: &QualName,
    own: &mut TableBatcher,
) -> Result<(), DeltaError> {
    let current = schema.link(source)?;
    let mut ops = Vec::new();
    link::provide_table(schema, current, &mut ops)?;
    cmd.extend_ops(ops);

    let mut previous = current.clone();
    previous.properties.retain(|_, spec| spec != &prop.name);
    let Some(before) = storage::resolve(schema, &previous)? else {
        return Ok(());
    };
    if before.table_type != TableType::Concept {
        return Ok(());
    }
    let item = AlterItem::new(AlterAction::DropColumn(before.column.clone()))
        .when(Condition::column(&before.table, &before.column));
    ctx.queue(own, &before.table, DROP_COLUMN_PRIORITY, None, item);
    if current.mapping != LinkMapping::ManyToMany {
        let link_type_id = ctx.link_type_id(source);
        ctx.mappings.schedule(
            source,
            MappingAction::Alter {
                old_name: source.clone(),
            },
            names::link_table(source),
            current.mapping,
            link_type_id,
        );
    }
    Ok(())
}

pub fn create(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let prop = property_of(applied.current.as_ref(), cmd)?;
    let mut own = TableBatcher::new();

    if let Some(location) = location(schema, &prop)? {
        // A link altered together with its properties has already moved;
        // otherwise a link gaining its first property moves here.
        if ctx.batcher_for(&location.table).is_none() {
            if let Some(source) = &prop.source {
                move_to_own_table(cmd, schema, ctx, &prop, source, &mut own)?;
            }
        }
        let column = Column::new(location.column.clone(), location.column_type.clone())
            .required(prop.required)
            .with_default(render_default(&prop.default, ctx.expressions)?);
        let item = AlterItem::new(AlterAction::AddColumn(column))
            .unless(Condition::column(&location.table, &location.column));
        ctx.queue(&mut own, &location.table, COLUMN_PRIORITY, None, item);
    }

    cmd.extend_ops(own.drain());
    cmd.push_op(
        Operation::new(metadata::insert_row("link_property", metadata::link_property_record(&prop)))
            .at(ROW_PRIORITY),
    );
    Ok(())
}

pub fn alter(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let old = property_of(applied.original.as_ref(), cmd)?;
    let new = property_of(applied.current.as_ref(), cmd)?;
    let mut own = TableBatcher::new();

    if let Some(location) = location(schema, &new)? {
        let (table, column) = (&location.table, &location.column);
        if old.target != new.target {
            let item = AlterItem::new(AlterAction::AlterColumnType {
                column: column.clone(),
                type_name: location.column_type.clone(),
                using: Some(format!("{}::{}", quote_ident(column), location.column_type)),
            })
            .when(Condition::column(table, column));
            ctx.queue(&mut own, table, COLUMN_PRIORITY, None, item);
        }
        if old.default != new.default {
            let item = AlterItem::new(AlterAction::SetDefault {
                column: column.clone(),
                default: render_default(&new.default, ctx.expressions)?,
            })
            .when(Condition::column(table, column));
            ctx.queue(&mut own, table, DEFAULTS_PRIORITY, Some(DEFAULTS_TAG), item);
        }
        if old.required != new.required {
            let item = AlterItem::new(AlterAction::SetNotNull {
                column: column.clone(),
                required: new.required,
            })
            .when(Condition::column(table, column));
            ctx.queue(&mut own, table, REQUIRED_COLUMN_PRIORITY, None, item);
        }
    }

    let row_priority = if old.required != new.required {
        REQUIRED_ROW_PRIORITY
    } else {
        ROW_PRIORITY
    };
    cmd.extend_ops(own.drain());
    cmd.push_op(
        Operation::new(metadata::update_row(
            "link_property",
            &new.name.to_string(),
            metadata::link_property_record(&new),
        ))
        .at(row_priority),
    );
    Ok(())
}

pub fn rename(cmd: &mut Command, schema: &mut Schema, _ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let old = property_of(applied.original.as_ref(), cmd)?;
    let new = property_of(applied.current.as_ref(), cmd)?;

    if new.is_generic() {
        let (old_column, new_column) = (names::pointer_column(&old.name), names::pointer_column(&new.name));
        for obj in schema.objects_of_kind(ObjectKind::LinkProperty) {
            let SchemaObject::LinkProperty(spec) = obj else {
                continue;
            };
            if spec.is_generic() || spec.normal_name() != &new.name || old_column == new_column {
                continue;
            }
            if let Some(location) = location(schema, spec)? {
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
        "link_property",
        &old.name.to_string(),
        &new.name.to_string(),
    )));
    Ok(())
}

pub fn delete(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let old = property_of(applied.original.as_ref(), cmd)?;
    let mut own = TableBatcher::new();

    let link_dropped = old
        .source
        .as_ref()
        .is_some_and(|source| ctx.summary.is_deleted(source));
    if !link_dropped && !old.is_generic() {
        if let Some(source) = &old.source {
            let table = names::link_table(source);
            let column = names::pointer_column(old.normal_name());
            let reinherited = schema.get(source).is_some()
                && schema.properties_of(source)?.contains_key(old.normal_name());
            if !reinherited {
                let item = AlterItem::new(AlterAction::DropColumn(column.clone()))
                    .when(Condition::column(&table, &column));
                ctx.queue(&mut own, &table, DROP_COLUMN_PRIORITY, None, item);
            }
        }
    }

    cmd.extend_ops(own.drain());
    cmd.push_op(
        Operation::new(metadata::delete_row("link_property", &old.name.to_string())).at(ROW_PRIORITY),
    );
    Ok(())
}
