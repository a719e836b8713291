//! Concepts map to tables inheriting the tables of their bases.

use crate::db::PgName;
use crate::error::DeltaError;
use crate::ops::{
    AlterAction, AlterItem, Condition, CreateTable, DropTable, Operation, RenameTable,
    TableConstraint,
};
use crate::schema::apply::apply;
use crate::schema::name::qn;
use crate::schema::objects::{Concept, SchemaObject};
use crate::schema::snapshot::ID_LINK;
use crate::schema::{Schema, SchemaLookup};

use super::command::Command;
use super::context::{CommandContext, Frame};
use super::handlers::apply_in_frame;
use super::inheritance;
use super::metadata;
use super::names;

const ROW_PRIORITY: i32 = 1;
const DROP_PRIORITY: i32 = 3;

fn concept_of(obj: Option<&SchemaObject>, cmd: &Command) -> Result<Concept, DeltaError> {
    obj.and_then(SchemaObject::as_concept)
        .cloned()
        .ok_or_else(|| DeltaError::unknown(cmd.object, &cmd.name))
}

fn parent_tables(schema: &Schema, concept: &Concept) -> Vec<PgName> {
    concept
        .bases
        .iter()
        .filter(|b| matches!(schema.get(b), Some(SchemaObject::Concept(_))))
        .map(names::concept_table)
        .collect()
}

pub fn create(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let concept = concept_of(applied.current.as_ref(), cmd)?;
    let table = names::concept_table(&concept.name);

    cmd.push_op(
        Operation::new(CreateTable::new(table.clone()).inherits(parent_tables(schema, &concept)))
            .unless(Condition::TableExists(table.clone())),
    );
    cmd.push_op(
        Operation::new(metadata::insert_row("concept", metadata::concept_record(&concept)))
            .at(ROW_PRIORITY),
    );

    let frame = Frame::new(cmd, None, applied.current.clone()).with_table(table.clone());
    apply_in_frame(cmd, schema, ctx, frame, |schema, _, frame| {
        if schema.pointers_of(&concept.name)?.contains_key(&qn(ID_LINK)) {
            let pkey = names::pg_ident(&table.name, "_pkey");
            frame.batcher.get(&table, ROW_PRIORITY, None).push(
                AlterItem::new(AlterAction::AddConstraint(TableConstraint::primary_key(
                    pkey.clone(),
                    &["id"],
                )))
                .unless(Condition::TableConstraintExists {
                    table: table.clone(),
                    constraint: pkey,
                }),
            );
        }
        Ok(())
    })
}

pub fn alter(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let old = concept_of(applied.original.as_ref(), cmd)?;
    let new = concept_of(applied.current.as_ref(), cmd)?;
    let table = names::concept_table(&new.name);

    cmd.push_op(
        Operation::new(metadata::update_row(
            "concept",
            &new.name.to_string(),
            metadata::concept_record(&new),
        ))
        .at(ROW_PRIORITY),
    );

    let frame = Frame::new(cmd, applied.original.clone(), applied.current.clone()).with_table(table);
    apply_in_frame(cmd, schema, ctx, frame, |schema, ctx, frame| {
        // Children run first so pointers they create are not added twice.
        let created = std::mem::take(&mut frame.created_pointers);
        inheritance::rebase_concept(schema, ctx, &new, &old.bases, &created, &mut frame.batcher)
    })
}

pub fn rename(cmd: &mut Command, schema: &mut Schema, _ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let old = concept_of(applied.original.as_ref(), cmd)?;
    let new = concept_of(applied.current.as_ref(), cmd)?;
    let table = names::concept_table(&old.name);
    cmd.push_op(
        Operation::new(RenameTable {
            name: table.clone(),
            new_name: names::concept_table(&new.name),
        })
        .when(Condition::TableExists(table)),
    );
    cmd.push_op(Operation::new(metadata::rename_row(
        "concept",
        &old.name.to_string(),
        &new.name.to_string(),
    )));
    Ok(())
}

pub fn delete(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let old = concept_of(applied.original.as_ref(), cmd)?;
    let table = names::concept_table(&old.name);

    let frame = Frame::new(cmd, applied.original.clone(), None).with_table(table.clone());
    apply_in_frame(cmd, schema, ctx, frame, |_, _, _| Ok(()))?;

    cmd.push_op(
        Operation::new(DropTable { name: table.clone() })
            .at(DROP_PRIORITY)
            .when(Condition::TableExists(table)),
    );
    cmd.push_op(
        Operation::new(metadata::delete_row("concept", &old.name.to_string())).at(ROW_PRIORITY),
    );
    Ok(())
}
