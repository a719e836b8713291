//! Modules map to PostgreSQL schemas.

use crate::error::DeltaError;
use crate::ops::{Condition, CreateSchema, DropSchema, OpGroup, Operation};
use crate::schema::apply::apply_module;
use crate::schema::{ObjectKind, Schema};

use super::command::Command;
use super::context::CommandContext;
use super::handlers::apply_children;
use super::metadata;
use super::names;

fn missing(cmd: &Command) -> DeltaError {
    DeltaError::unknown(ObjectKind::Module, &cmd.name)
}

pub fn create(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let (_, module) = apply_module(schema, cmd)?;
    let module = module.ok_or_else(|| missing(cmd))?;
    let schema_name = names::module_schema(&module.name);

    // Schema and row go together: a deployment either has both or neither.
    let group = OpGroup::new(vec![
        Operation::new(CreateSchema {
            name: schema_name.clone(),
        }),
        Operation::new(metadata::insert_row("module", metadata::module_record(&module))),
    ]);
    cmd.push_op(Operation::new(group).unless(Condition::SchemaExists(schema_name)));
    apply_children(cmd, schema, ctx)
}

pub fn alter(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let (_, module) = apply_module(schema, cmd)?;
    let module = module.ok_or_else(|| missing(cmd))?;
    cmd.push_op(
        Operation::new(metadata::update_row(
            "module",
            &module.name,
            metadata::module_record(&module),
        ))
        .at(1),
    );
    apply_children(cmd, schema, ctx)
}

pub fn delete(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    apply_children(cmd, schema, ctx)?;
    let (module, _) = apply_module(schema, cmd)?;
    let module = module.ok_or_else(|| missing(cmd))?;
    let schema_name = names::module_schema(&module.name);
    let group = OpGroup::new(vec![
        Operation::new(metadata::delete_row("module", &module.name)),
        Operation::new(DropSchema {
            name: schema_name.clone(),
        }),
    ]);
    cmd.push_op(
        Operation::new(group)
            .at(4)
            .when(Condition::SchemaExists(schema_name)),
    );
    Ok(())
}
