//! Domain rebuilds for atoms whose base type changes.
//!
//! PostgreSQL cannot change the base type of a domain in place. The domain
//! is moved aside, rebuilt on the new base, every column using it is
//! converted, child atoms are rebuilt on top of the new domain, and the
//! moved-aside domain is dropped last.

use std::collections::BTreeSet;

use crate::db::{quote_ident, PgName};
use crate::error::DeltaError;
use crate::ops::{
    AlterAction, AlterItem, AlterTable, Condition, CreateDomain, CreateSequence, DropDomain,
    DropSequence, Operation, RenameDomain,
};
use crate::schema::name::qn;
use crate::schema::objects::{Atom, SchemaObject};
use crate::schema::{ObjectKind, QualName, Schema, SchemaLookup};

use super::constraint;
use super::context::CommandContext;
use super::names;
use super::render_default;
use super::storage::{self, TableType, TARGET_VALUE_COLUMN};

const SEQUENCE_ATOM: &str = "std::sequence";
const DROP_PRIORITY: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Create,
    Alter,
    Drop,
}

/// A column whose type is an atom's domain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ColumnUse {
    pub table: PgName,
    pub column: String,
}

/// Backend type an atom's domain is declared on.
pub fn base_type(schema: &Schema, atom: &Atom) -> Result<String, DeltaError> {
    let base = atom.bases.first().ok_or_else(|| {
        DeltaError::inconsistency(format!("atom '{}' has no base", atom.name))
    })?;
    storage::column_type(schema, base)
}

pub fn is_sequence(schema: &Schema, atom: &Atom) -> bool {
    let sequence = qn(SEQUENCE_ATOM);
    atom.bases.iter().any(|base| schema.issubclass(base, &sequence))
}

fn child_atoms<'s>(schema: &'s Schema, name: &QualName) -> Vec<&'s Atom> {
    schema
        .objects_of_kind(ObjectKind::Atom)
        .into_iter()
        .filter_map(SchemaObject::as_atom)
        .filter(|atom| atom.bases.contains(name))
        .collect()
}

/// Whether the pointer column comes from an ancestor table. Such columns
/// follow the ancestor's alterations and cannot be altered on their own.
pub(super) fn inherited_column(schema: &Schema, source: &QualName, normal: &QualName) -> Result<bool, DeltaError> {
    if schema.get(source).is_none() {
        return Ok(false);
    }
    for ancestor in schema.mro(source)?.iter().skip(1) {
        if let Some(SchemaObject::Concept(c)) = schema.get(ancestor) {
            if c.pointers.contains_key(normal) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Columns typed by the domain of `atom`.
pub fn users(schema: &Schema, atom: &QualName) -> Result<Vec<ColumnUse>, DeltaError> {
    let mut found = BTreeSet::new();
    for obj in schema.objects_of_kind(ObjectKind::Link) {
        let SchemaObject::Link(link) = obj else {
            continue;
        };
        if link.target.as_ref() != Some(atom) {
            continue;
        }
        let Some(location) = storage::resolve(schema, link)? else {
            continue;
        };
        match location.table_type {
            TableType::Concept => {
                let Some(source) = &link.source else {
                    continue;
                };
                if inherited_column(schema, source, link.normal_name())? {
                    continue;
                }
                found.insert(ColumnUse {
                    table: location.table,
                    column: location.column,
                });
            }
            TableType::Link => {
                found.insert(ColumnUse {
                    table: location.table,
                    column: TARGET_VALUE_COLUMN.to_string(),
                });
            }
        }
    }
    for obj in schema.objects_of_kind(ObjectKind::LinkProperty) {
        let SchemaObject::LinkProperty(prop) = obj else {
            continue;
        };
        if prop.target.as_ref() != Some(atom) {
            continue;
        }
        if let Some(location) = storage::resolve_property(schema, prop)? {
            found.insert(ColumnUse {
                table: location.table,
                column: location.column,
            });
        }
    }
    Ok(found.into_iter().collect())
}

fn convert_column(usage: &ColumnUse, type_name: &str) -> Operation {
    let using = format!("{}::{}", quote_ident(&usage.column), type_name);
    Operation::new(
        AlterTable::new(usage.table.clone()).add(
            AlterItem::new(AlterAction::AlterColumnType {
                column: usage.column.clone(),
                type_name: type_name.to_string(),
                using: Some(using),
            })
            .when(Condition::column(&usage.table, &usage.column)),
        ),
    )
}

fn create_domain(
    schema: &Schema,
    ctx: &CommandContext<'_>,
    atom: &Atom,
    base: String,
) -> Result<Operation, DeltaError> {
    let domain = names::atom_domain(&atom.name);
    let mut create = CreateDomain::new(domain.clone(), base);
    create.default = render_default(&atom.default, ctx.expressions)?;
    create.constraints = constraint::domain_checks(schema, ctx, &atom.name)?;
    Ok(Operation::new(create).unless(Condition::DomainExists(domain)))
}

fn rebuild(
    schema: &Schema,
    ctx: &CommandContext<'_>,
    atom: &Atom,
    base: String,
    ops: &mut Vec<Operation>,
) -> Result<(), DeltaError> {
    let domain = names::atom_domain(&atom.name);
    let tmp = names::atom_tmp_domain(&atom.name);
    ops.push(
        Operation::new(RenameDomain {
            name: domain.clone(),
            new_name: tmp.clone(),
        })
        .when(Condition::DomainExists(domain.clone())),
    );
    ops.push(create_domain(schema, ctx, atom, base)?);
    let domain_type = domain.to_string();
    for usage in users(schema, &atom.name)? {
        ops.push(convert_column(&usage, &domain_type));
    }
    for child in child_atoms(schema, &atom.name) {
        rebuild(schema, ctx, child, domain_type.clone(), ops)?;
    }
    ops.push(Operation::new(DropDomain { name: tmp.clone() }).when(Condition::DomainExists(tmp)));
    Ok(())
}

/// Operations for `intent` on `atom`. For [`Intent::Drop`] the atom is the
/// deleted one and the snapshot no longer holds it.
pub fn migrate(
    schema: &Schema,
    ctx: &CommandContext<'_>,
    intent: Intent,
    atom: &Atom,
) -> Result<Vec<Operation>, DeltaError> {
    let mut ops = Vec::new();
    match intent {
        Intent::Create => {
            ops.push(create_domain(schema, ctx, atom, base_type(schema, atom)?)?);
            if is_sequence(schema, atom) {
                let sequence = names::atom_sequence(&atom.name);
                ops.push(
                    Operation::new(CreateSequence {
                        name: sequence.clone(),
                    })
                    .unless(Condition::SequenceExists(sequence)),
                );
            }
        }
        Intent::Alter => rebuild(schema, ctx, atom, base_type(schema, atom)?, &mut ops)?,
        Intent::Drop => {
            let replacement = base_type(schema, atom)?;
            for usage in users(schema, &atom.name)? {
                ops.push(convert_column(&usage, &replacement));
            }
            for child in child_atoms(schema, &atom.name) {
                rebuild(schema, ctx, child, replacement.clone(), &mut ops)?;
            }
            let domain = names::atom_domain(&atom.name);
            ops.push(
                Operation::new(DropDomain {
                    name: domain.clone(),
                })
                .at(DROP_PRIORITY)
                .when(Condition::DomainExists(domain)),
            );
            if is_sequence(schema, atom) {
                let sequence = names::atom_sequence(&atom.name);
                ops.push(
                    Operation::new(DropSequence {
                        name: sequence.clone(),
                    })
                    .at(DROP_PRIORITY)
                    .when(Condition::SequenceExists(sequence)),
                );
            }
        }
    }
    Ok(ops)
}
