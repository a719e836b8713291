//! Expression indexes declared on concepts.

use crate::db::{quote_ident, PgName};
use crate::error::DeltaError;
use crate::ops::{Condition, CreateIndex, DropIndex, Operation, RenameIndex};
use crate::schema::apply::apply;
use crate::schema::objects::{SchemaObject, SourceIndex};
use crate::schema::Schema;

use super::command::Command;
use super::context::CommandContext;
use super::metadata;
use super::names;

const INDEX_PRIORITY: i32 = 3;
const ROW_PRIORITY: i32 = 1;

fn index_of(obj: Option<&SchemaObject>, cmd: &Command) -> Result<SourceIndex, DeltaError> {
    match obj {
        Some(SchemaObject::Index(index)) => Ok(index.clone()),
        _ => Err(DeltaError::unknown(cmd.object, &cmd.name)),
    }
}

fn subject_table(index: &SourceIndex) -> Result<PgName, DeltaError> {
    index
        .subject
        .as_ref()
        .map(names::concept_table)
        .ok_or_else(|| DeltaError::inconsistency(format!("index '{}' has no subject", index.name)))
}

fn create_op(ctx: &CommandContext<'_>, index: &SourceIndex) -> Result<Operation, DeltaError> {
    let table = subject_table(index)?;
    let expr = ctx.expressions.compile(&index.expr, &quote_ident(&table.name))?;
    let create = CreateIndex {
        name: names::source_index_name(&table, &index.name),
        table,
        // Arbitrary expressions need their own parentheses inside the
        // column list.
        columns: vec![format!("({})", expr)],
        unique: false,
        predicate: None,
    };
    let qualified = create.qualified_name();
    Ok(Operation::new(create)
        .at(INDEX_PRIORITY)
        .unless(Condition::IndexExists(qualified)))
}

fn drop_op(index: &SourceIndex) -> Result<Operation, DeltaError> {
    let table = subject_table(index)?;
    let name = table.with_name(names::source_index_name(&table, &index.name));
    Ok(Operation::new(DropIndex { name: name.clone() })
        .at(INDEX_PRIORITY)
        .when(Condition::IndexExists(name)))
}

pub fn create(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let index = index_of(applied.current.as_ref(), cmd)?;
    cmd.push_op(create_op(ctx, &index)?);
    cmd.push_op(Operation::new(metadata::insert_row("index", metadata::index_record(&index))).at(ROW_PRIORITY));
    Ok(())
}

pub fn alter(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let old = index_of(applied.original.as_ref(), cmd)?;
    let new = index_of(applied.current.as_ref(), cmd)?;
    if old.expr != new.expr || old.subject != new.subject {
        cmd.push_op(drop_op(&old)?);
        cmd.push_op(create_op(ctx, &new)?);
    }
    cmd.push_op(
        Operation::new(metadata::update_row("index", &new.name.to_string(), metadata::index_record(&new)))
            .at(ROW_PRIORITY),
    );
    Ok(())
}

pub fn rename(cmd: &mut Command, schema: &mut Schema, _ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let old = index_of(applied.original.as_ref(), cmd)?;
    let new = index_of(applied.current.as_ref(), cmd)?;
    let table = subject_table(&new)?;
    let current = table.with_name(names::source_index_name(&table, &old.name));
    cmd.push_op(
        Operation::new(RenameIndex {
            name: current.clone(),
            new_name: names::source_index_name(&table, &new.name),
        })
        .when(Condition::IndexExists(current)),
    );
    cmd.push_op(Operation::new(metadata::rename_row(
        "index",
        &old.name.to_string(),
        &new.name.to_string(),
    )));
    Ok(())
}

pub fn delete(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let old = index_of(applied.original.as_ref(), cmd)?;
    let subject_dropped = old.subject.as_ref().is_some_and(|s| ctx.summary.is_deleted(s));
    if !subject_dropped {
        cmd.push_op(drop_op(&old)?);
    }
    cmd.push_op(Operation::new(metadata::delete_row("index", &old.name.to_string())).at(ROW_PRIORITY));
    Ok(())
}
