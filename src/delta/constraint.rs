//! Value constraints on atoms and pointers.
//!
//! A constraint on an atom becomes a `CHECK` on the atom's domain, so every
//! column of that type inherits it. A constraint on a pointer becomes a
//! table constraint on the pointer's storage table. Checks are typed through
//! the operator registry before they are rendered.

use crate::db::{quote_ident, quote_literal, PgName};
use crate::error::DeltaError;
use crate::ops::{
    AddDomainConstraint, AlterAction, AlterTable, Condition, DomainCheck, DropDomainConstraint,
    OpGroup, Operation, TableConstraint,
};
use crate::schema::apply::apply;
use crate::schema::objects::{Constraint, ConstraintCheck, Literal, SchemaObject};
use crate::schema::types::NativeType;
use crate::schema::{QualName, Schema, SchemaLookup, TypeRef};

use super::command::Command;
use super::context::CommandContext;
use super::metadata;
use super::names;
use super::storage::{self, TableType, TARGET_VALUE_COLUMN};

const PHYSICAL_PRIORITY: i32 = 1;
const ROW_PRIORITY: i32 = 3;

/// Where a constraint on a given subject is enforced.
#[derive(Debug, Clone, PartialEq)]
enum Placement {
    Domain(PgName),
    Table { table: PgName, column: String },
}

fn placement(schema: &Schema, subject: &QualName) -> Result<(Placement, TypeRef), DeltaError> {
    match schema.get(subject) {
        Some(SchemaObject::Atom(_)) => Ok((
            Placement::Domain(names::atom_domain(subject)),
            TypeRef::Named(subject.clone()),
        )),
        Some(SchemaObject::Link(link)) => {
            let target = link.target.clone().ok_or_else(|| {
                DeltaError::inconsistency(format!("link '{}' has no target", link.name))
            })?;
            let location = storage::resolve(schema, link)?.ok_or_else(|| {
                DeltaError::inconsistency(format!("constraint on generic link '{}'", link.name))
            })?;
            let column = match location.table_type {
                TableType::Concept => location.column,
                TableType::Link if storage::is_atomic(schema, link) => TARGET_VALUE_COLUMN.to_string(),
                TableType::Link => location.column,
            };
            Ok((
                Placement::Table {
                    table: location.table,
                    column,
                },
                TypeRef::Named(target),
            ))
        }
        Some(SchemaObject::LinkProperty(prop)) => {
            let target = prop.target.clone().ok_or_else(|| {
                DeltaError::inconsistency(format!("link property '{}' has no target", prop.name))
            })?;
            let location = storage::resolve_property(schema, prop)?.ok_or_else(|| {
                DeltaError::inconsistency(format!("constraint on generic property '{}'", prop.name))
            })?;
            Ok((
                Placement::Table {
                    table: location.table,
                    column: location.column,
                },
                TypeRef::Named(target),
            ))
        }
        _ => Err(DeltaError::inconsistency(format!(
            "'{}' cannot carry constraints",
            subject
        ))),
    }
}

fn render_literal(lit: &Literal) -> String {
    match lit {
        Literal::Bool(true) => "TRUE".to_string(),
        Literal::Bool(false) => "FALSE".to_string(),
        Literal::Int(i) => i.to_string(),
        Literal::Float(f) => f.to_string(),
        Literal::Str(s) => quote_literal(s),
    }
}

fn typed(
    schema: &Schema,
    ctx: &CommandContext<'_>,
    operator: &str,
    args: &[TypeRef],
) -> Result<TypeRef, DeltaError> {
    ctx.rules.resolve(operator, args, schema).ok_or_else(|| {
        DeltaError::inconsistency(format!("no typing rule for '{}' on {:?}", operator, args))
    })
}

/// SQL boolean expression for `check` applied to `value`, or `None` for
/// checks enforced by a table constraint instead.
pub fn check_sql(
    schema: &Schema,
    ctx: &CommandContext<'_>,
    check: &ConstraintCheck,
    subject: &TypeRef,
    value: &str,
) -> Result<Option<String>, DeltaError> {
    let compare = |operator: &str, lit: &Literal| -> Result<String, DeltaError> {
        let literal_type = TypeRef::Native(NativeType::of_literal(lit));
        typed(schema, ctx, operator, &[subject.clone(), literal_type])?;
        Ok(format!("{} {} {}", value, operator, render_literal(lit)))
    };
    let length = |operator: &str, bound: i64| -> Result<String, DeltaError> {
        let len = typed(schema, ctx, "char_length", &[subject.clone()])?;
        typed(schema, ctx, operator, &[len, TypeRef::Native(NativeType::Integer)])?;
        Ok(format!("char_length({}) {} {}", value, operator, bound))
    };
    let sql = match check {
        ConstraintCheck::MinValue(lit) => compare(">=", lit)?,
        ConstraintCheck::MaxValue(lit) => compare("<=", lit)?,
        ConstraintCheck::MinLength(n) => length(">=", *n)?,
        ConstraintCheck::MaxLength(n) => length("<=", *n)?,
        ConstraintCheck::Regexp(pattern) => {
            typed(
                schema,
                ctx,
                "~",
                &[subject.clone(), TypeRef::Native(NativeType::String)],
            )?;
            format!("{} ~ {}", value, quote_literal(pattern))
        }
        ConstraintCheck::Expression(expr) => ctx.expressions.compile(expr, value)?,
        ConstraintCheck::Unique => return Ok(None),
    };
    Ok(Some(sql))
}

/// Checks a freshly built domain for `atom` must carry.
pub fn domain_checks(
    schema: &Schema,
    ctx: &CommandContext<'_>,
    atom: &QualName,
) -> Result<Vec<DomainCheck>, DeltaError> {
    let subject = TypeRef::Named(atom.clone());
    let mut checks = Vec::new();
    for obj in schema.objects_of_kind(crate::schema::ObjectKind::Constraint) {
        let SchemaObject::Constraint(c) = obj else {
            continue;
        };
        if c.subject.as_ref() != Some(atom) {
            continue;
        }
        let Some(check) = &c.check else {
            continue;
        };
        if let Some(expr) = check_sql(schema, ctx, check, &subject, "VALUE")? {
            checks.push(DomainCheck::new(names::domain_constraint_name(&c.name), expr));
        }
    }
    Ok(checks)
}

fn add_op(
    schema: &Schema,
    ctx: &CommandContext<'_>,
    constraint: &Constraint,
) -> Result<Option<Operation>, DeltaError> {
    let (Some(subject), Some(check)) = (&constraint.subject, &constraint.check) else {
        return Ok(None);
    };
    let (placement, subject_type) = placement(schema, subject)?;
    let op = match placement {
        Placement::Domain(domain) => {
            let expr = check_sql(schema, ctx, check, &subject_type, "VALUE")?.ok_or_else(|| {
                DeltaError::inconsistency(format!(
                    "constraint '{}': atoms cannot be unique",
                    constraint.name
                ))
            })?;
            let name = names::domain_constraint_name(&constraint.name);
            Operation::new(AddDomainConstraint {
                name: domain.clone(),
                constraint: DomainCheck::new(name.clone(), expr),
            })
            .unless(Condition::DomainConstraintExists {
                domain,
                constraint: name,
            })
        }
        Placement::Table { table, column } => {
            let name = names::table_constraint_name(&table, &constraint.name);
            let quoted = quote_ident(&column);
            let tc = match check_sql(schema, ctx, check, &subject_type, &quoted)? {
                Some(expr) => TableConstraint::check(name.clone(), expr),
                None => TableConstraint::unique(name.clone(), &[column.as_str()]),
            };
            Operation::new(AlterTable::new(table.clone()).add(AlterAction::AddConstraint(tc))).unless(
                Condition::TableConstraintExists {
                    table,
                    constraint: name,
                },
            )
        }
    };
    Ok(Some(op.at(PHYSICAL_PRIORITY)))
}

fn drop_op(schema: &Schema, constraint: &Constraint) -> Result<Option<Operation>, DeltaError> {
    let Some(subject) = &constraint.subject else {
        return Ok(None);
    };
    // The subject may be gone already; its own drop takes the constraint along.
    if schema.get(subject).is_none() {
        return Ok(None);
    }
    let (placement, _) = placement(schema, subject)?;
    let op = match placement {
        Placement::Domain(domain) => {
            let name = names::domain_constraint_name(&constraint.name);
            Operation::new(DropDomainConstraint {
                name: domain.clone(),
                constraint: name.clone(),
            })
            .when(Condition::DomainConstraintExists {
                domain,
                constraint: name,
            })
        }
        Placement::Table { table, .. } => {
            let name = names::table_constraint_name(&table, &constraint.name);
            Operation::new(AlterTable::new(table.clone()).add(AlterAction::DropConstraint(name.clone())))
                .when(Condition::TableConstraintExists {
                    table,
                    constraint: name,
                })
        }
    };
    Ok(Some(op.at(PHYSICAL_PRIORITY)))
}

fn as_constraint(obj: Option<&SchemaObject>) -> Option<&Constraint> {
    match obj {
        Some(SchemaObject::Constraint(c)) => Some(c),
        _ => None,
    }
}

fn replace_group(ops: Vec<Option<Operation>>) -> Option<Operation> {
    let ops: Vec<Operation> = ops.into_iter().flatten().collect();
    if ops.is_empty() {
        None
    } else {
        Some(Operation::new(OpGroup::new(ops)).at(PHYSICAL_PRIORITY))
    }
}

pub fn create(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let constraint = as_constraint(applied.current.as_ref())
        .ok_or_else(|| DeltaError::unknown(cmd.object, &cmd.name))?;
    if let Some(op) = add_op(schema, ctx, constraint)? {
        cmd.push_op(op);
    }
    cmd.push_op(
        Operation::new(metadata::insert_row("constraint", metadata::constraint_record(constraint)))
            .at(ROW_PRIORITY),
    );
    Ok(())
}

pub fn alter(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let (Some(old), Some(new)) = (
        as_constraint(applied.original.as_ref()),
        as_constraint(applied.current.as_ref()),
    ) else {
        return Err(DeltaError::unknown(cmd.object, &cmd.name));
    };
    if old.subject != new.subject || old.check != new.check {
        if let Some(group) = replace_group(vec![drop_op(schema, old)?, add_op(schema, ctx, new)?]) {
            cmd.push_op(group);
        }
    }
    cmd.push_op(
        Operation::new(metadata::update_row(
            "constraint",
            &new.name.to_string(),
            metadata::constraint_record(new),
        ))
        .at(ROW_PRIORITY),
    );
    Ok(())
}

/// Physical names derive from the constraint name, so a rename rebuilds
/// the constraint under its new name.
pub fn rename(cmd: &mut Command, schema: &mut Schema, ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let (Some(old), Some(new)) = (
        as_constraint(applied.original.as_ref()),
        as_constraint(applied.current.as_ref()),
    ) else {
        return Err(DeltaError::unknown(cmd.object, &cmd.name));
    };
    if let Some(group) = replace_group(vec![drop_op(schema, old)?, add_op(schema, ctx, new)?]) {
        cmd.push_op(group);
    }
    cmd.push_op(
        Operation::new(metadata::rename_row(
            "constraint",
            &old.name.to_string(),
            &new.name.to_string(),
        ))
        .at(ROW_PRIORITY),
    );
    Ok(())
}

pub fn delete(cmd: &mut Command, schema: &mut Schema, _ctx: &mut CommandContext<'_>) -> Result<(), DeltaError> {
    let applied = apply(schema, cmd)?;
    let old = as_constraint(applied.original.as_ref())
        .ok_or_else(|| DeltaError::unknown(cmd.object, &cmd.name))?;
    if let Some(op) = drop_op(schema, old)? {
        cmd.push_op(op);
    }
    cmd.push_op(
        Operation::new(metadata::delete_row("constraint", &old.name.to_string())).at(ROW_PRIORITY),
    );
    Ok(())
}
