//! Dispatch table from `(object kind, command kind)` to lowering functions.

use std::collections::HashMap;
use std::sync::OnceLock;

use tracing::debug;

use crate::error::DeltaError;
use crate::schema::{ObjectKind, Schema};

use super::command::{Command, CommandKind, PgOp};
use super::context::{CommandContext, Frame};
use super::{atom, concept, constraint, index, link, module, property, records};

/// Applies one command to the snapshot and attaches its physical operations.
pub type Handler = fn(&mut Command, &mut Schema, &mut CommandContext<'_>) -> Result<(), DeltaError>;

type Registry = HashMap<(ObjectKind, CommandKind), Handler>;

fn register(registry: &mut Registry, object: ObjectKind, kind: CommandKind, handler: Handler) {
    registry.insert((object, kind), handler);
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        use CommandKind::*;
        use ObjectKind as K;

        let mut r = Registry::new();
        register(&mut r, K::Module, Create, module::create);
        register(&mut r, K::Module, Alter, module::alter);
        register(&mut r, K::Module, Delete, module::delete);

        register(&mut r, K::Atom, Create, atom::create);
        register(&mut r, K::Atom, Alter, atom::alter);
        register(&mut r, K::Atom, Rebase, atom::alter);
        register(&mut r, K::Atom, Rename, atom::rename);
        register(&mut r, K::Atom, Delete, atom::delete);

        register(&mut r, K::Concept, Create, concept::create);
        register(&mut r, K::Concept, Alter, concept::alter);
        register(&mut r, K::Concept, Rebase, concept::alter);
        register(&mut r, K::Concept, Rename, concept::rename);
        register(&mut r, K::Concept, Delete, concept::delete);

        register(&mut r, K::Link, Create, link::create);
        register(&mut r, K::Link, Alter, link::alter);
        register(&mut r, K::Link, Rebase, link::alter);
        register(&mut r, K::Link, Rename, link::rename);
        register(&mut r, K::Link, Delete, link::delete);

        register(&mut r, K::LinkProperty, Create, property::create);
        register(&mut r, K::LinkProperty, Alter, property::alter);
        register(&mut r, K::LinkProperty, Rename, property::rename);
        register(&mut r, K::LinkProperty, Delete, property::delete);

        register(&mut r, K::Constraint, Create, constraint::create);
        register(&mut r, K::Constraint, Alter, constraint::alter);
        register(&mut r, K::Constraint, Rename, constraint::rename);
        register(&mut r, K::Constraint, Delete, constraint::delete);

        register(&mut r, K::Index, Create, index::create);
        register(&mut r, K::Index, Alter, index::alter);
        register(&mut r, K::Index, Rename, index::rename);
        register(&mut r, K::Index, Delete, index::delete);

        for object in [K::Action, K::Event, K::Policy, K::Attribute, K::AttributeValue] {
            register(&mut r, object, Create, records::create);
            register(&mut r, object, Alter, records::alter);
            register(&mut r, object, Rename, records::rename);
            register(&mut r, object, Delete, records::delete);
        }
        register(&mut r, K::Event, Rebase, records::alter);
        r
    })
}

pub fn handler_for(object: ObjectKind, kind: CommandKind) -> Option<Handler> {
    registry().get(&(object, kind)).copied()
}

pub fn apply_command(
    cmd: &mut Command,
    schema: &mut Schema,
    ctx: &mut CommandContext<'_>,
) -> Result<(), DeltaError> {
    let handler = handler_for(cmd.object, cmd.kind).ok_or_else(|| DeltaError::UnsupportedCommand {
        command: cmd.kind.to_string(),
        kind: cmd.object,
    })?;
    debug!(kind = %cmd.kind, object = %cmd.object, name = %cmd.name, depth = ctx.depth(), "lowering");
    handler(cmd, schema, ctx)
}

/// Mark where child operations go and lower every child command.
pub fn apply_children(
    cmd: &mut Command,
    schema: &mut Schema,
    ctx: &mut CommandContext<'_>,
) -> Result<(), DeltaError> {
    cmd.pgops.push(PgOp::Children);
    let mut children = std::mem::take(&mut cmd.children);
    let result = children
        .iter_mut()
        .try_for_each(|child| apply_command(child, schema, ctx));
    cmd.children = children;
    result
}

/// Lower the children of `cmd` inside `frame`, then run `finish` on the
/// popped frame and flush its batches into `cmd`.
pub fn apply_in_frame(
    cmd: &mut Command,
    schema: &mut Schema,
    ctx: &mut CommandContext<'_>,
    frame: Frame,
    finish: impl FnOnce(&Schema, &CommandContext<'_>, &mut Frame) -> Result<(), DeltaError>,
) -> Result<(), DeltaError> {
    ctx.push(frame);
    let result = apply_children(cmd, schema, ctx);
    let mut frame = ctx
        .pop()
        .ok_or_else(|| DeltaError::inconsistency("command frame stack underflow"))?;
    result?;
    finish(&*schema, &*ctx, &mut frame)?;
    cmd.extend_ops(frame.batcher.drain());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ObjectKind::Concept, CommandKind::Create)]
    #[case(ObjectKind::Link, CommandKind::Rebase)]
    #[case(ObjectKind::Policy, CommandKind::Delete)]
    #[case(ObjectKind::Module, CommandKind::Alter)]
    fn test_registered_pairs(#[case] object: ObjectKind, #[case] kind: CommandKind) {
        assert!(handler_for(object, kind).is_some());
    }

    #[rstest]
    #[case(ObjectKind::Module, CommandKind::Rename)]
    #[case(ObjectKind::Constraint, CommandKind::Rebase)]
    fn test_unregistered_pairs(#[case] object: ObjectKind, #[case] kind: CommandKind) {
        assert!(handler_for(object, kind).is_none());
    }
}
