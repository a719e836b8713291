//! Objects that only exist as metadata rows: actions, events, policies and
//! attributes.

use crate::error::DeltaError;
use crate::ops::{Operation, Record};
use crate::schema::apply::apply;
use crate::schema::objects::SchemaObject;
use crate::schema::Schema;

use super::command::Command;
use super::context::CommandContext;
use super::metadata;

/// Metadata table and row priority of a record-only object.
fn placement(obj: &SchemaObject) -> Option<(&'static str, i32, Record)> {
    match obj {
        SchemaObject::Action(a) => Some(("action", 1, metadata::action_record(a))),
        SchemaObject::Event(e) => Some(("event", 1, metadata::event_record(e))),
        SchemaObject::Attribute(a) => Some(("attribute", 1, metadata::attribute_record(a))),
        SchemaObject::Policy(p) => Some(("policy", 2, metadata::policy_record(p))),
        SchemaObject::AttributeValue(v) => Some(("attribute_value", 2, metadata::attribute_value_record(v))),
        _ => None,
    }
}

fn placement_of(obj: Option<&SchemaObject>, cmd: &Command) -> Result<(&'static str, i32, Record), DeltaError> {
    obj.and_then(placement)
        .ok_or_else(|| DeltaError::unknown(cmd.object, &cmd.name))
}

pub fn create(cmd: &mut Command, schema: &mut Schema, _ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let (table, priority, row) = placement_of(applied.current.as_ref(), cmd)?;
    cmd.push_op(Operation::new(metadata::insert_row(table, row)).at(priority));
    Ok(())
}

pub fn alter(cmd: &mut Command, schema: &mut Schema, _ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let (table, priority, row) = placement_of(applied.current.as_ref(), cmd)?;
    let name = cmd.name.to_string();
    cmd.push_op(Operation::new(metadata::update_row(table, &name, row)).at(priority));
    Ok(())
}

pub fn rename(cmd: &mut Command, schema: &mut Schema, _ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let (table, _, _) = placement_of(applied.current.as_ref(), cmd)?;
    let (old, new) = (cmd.name.to_string(), cmd.result_name().to_string());
    cmd.push_op(Operation::new(metadata::rename_row(table, &old, &new)));
    Ok(())
}

pub fn delete(cmd: &mut Command, schema: &mut Schema, _ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let (table, priority, _) = placement_of(applied.original.as_ref(), cmd)?;
    let name = cmd.name.to_string();
    cmd.push_op(Operation::new(metadata::delete_row(table, &name)).at(priority));
    Ok(())
}
