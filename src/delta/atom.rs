//! Atoms map to domains.

use crate::error::DeltaError;
use crate::ops::{AlterDomainDefault, Condition, Operation, RenameDomain, RenameSequence};
use crate::schema::apply::apply;
use crate::schema::objects::{Atom, SchemaObject};
use crate::schema::Schema;

use super::command::Command;
use super::context::CommandContext;
use super::metadata;
use super::names;
use super::render_default;
use super::typechange::{self, Intent};

const ROW_PRIORITY: i32 = 1;

fn atom_of(obj: Option<&SchemaObject>, cmd: &Command) -> Result<Atom, DeltaError> {
    obj.and_then(SchemaObject::as_atom)
        .cloned()
        .ok_or_else(|| DeltaError::unknown(cmd.object, &cmd.name))
}

pub fn create(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let atom = atom_of(applied.current.as_ref(), cmd)?;
    cmd.extend_ops(typechange::migrate(schema, ctx, Intent::Create, &atom)?);
    cmd.push_op(
        Operation::new(metadata::insert_row("atom", metadata::atom_record(&atom))).at(ROW_PRIORITY),
    );
    Ok(())
}

pub fn alter(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let old = atom_of(applied.original.as_ref(), cmd)?;
    let new = atom_of(applied.current.as_ref(), cmd)?;

    let rebuilt = typechange::base_type(schema, &old)? != typechange::base_type(schema, &new)?;
    if rebuilt {
        cmd.extend_ops(typechange::migrate(schema, ctx, Intent::Alter, &new)?);
    } else if old.default != new.default {
        let domain = names::atom_domain(&new.name);
        cmd.push_op(
            Operation::new(AlterDomainDefault {
                name: domain.clone(),
                default: render_default(&new.default, ctx.expressions)?,
            })
            .when(Condition::DomainExists(domain)),
        );
    }
    cmd.push_op(
        Operation::new(metadata::update_row(
            "atom",
            &new.name.to_string(),
            metadata::atom_record(&new),
        ))
        .at(ROW_PRIORITY),
    );
    Ok(())
}

pub fn rename(cmd: &mut Command, schema: &mut Schema, _ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let old = atom_of(applied.original.as_ref(), cmd)?;
    let new = atom_of(applied.current.as_ref(), cmd)?;

    let domain = names::atom_domain(&old.name);
    cmd.push_op(
        Operation::new(RenameDomain {
            name: domain.clone(),
            new_name: names::atom_domain(&new.name),
        })
        .when(Condition::DomainExists(domain)),
    );
    if typechange::is_sequence(schema, &new) {
        let sequence = names::atom_sequence(&old.name);
        cmd.push_op(
            Operation::new(RenameSequence {
                name: sequence.clone(),
                new_name: names::atom_sequence(&new.name),
            })
            .when(Condition::SequenceExists(sequence)),
        );
    }
    cmd.push_op(Operation::new(metadata::rename_row(
        "atom",
        &old.name.to_string(),
        &new.name.to_string(),
    )));
    Ok(())
}

pub fn delete(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let old = atom_of(applied.original.as_ref(), cmd)?;
    cmd.extend_ops(typechange::migrate(schema, ctx, Intent::Drop, &old)?);
    cmd.push_op(
        Operation::new(metadata::delete_row("atom", &old.name.to_string())).at(ROW_PRIORITY),
    );
    Ok(())
}
