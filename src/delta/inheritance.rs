//! Table inheritance following base changes.
//!
//! Concept and link tables inherit the tables of their bases in base order.
//! When the bases change, only the divergent suffix of the inheritance list
//! is detached and reattached, and pointer columns appearing or vanishing
//! through the change are added or dropped on the object's own table.

use std::collections::{BTreeMap, BTreeSet};

use crate::db::PgName;
use crate::error::DeltaError;
use crate::ops::{AlterAction, AlterItem, Column, Condition};
use crate::schema::objects::{Concept, SchemaObject};
use crate::schema::{QualName, Schema, SchemaLookup};

use super::batch::TableBatcher;
use super::context::CommandContext;
use super::render_default;
use super::storage::{self, TableType};

const PARENT_PRIORITY: i32 = 1;
const DROP_COLUMN_PRIORITY: i32 = 2;

/// How an ordered base list changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseOrderDelta {
    /// Bases no longer present at all.
    pub dropped: Vec<QualName>,
    /// Remaining bases whose position diverges and must be detached.
    pub detach: Vec<QualName>,
    /// Bases attached, in order, after the detach.
    pub attach: Vec<QualName>,
}

impl BaseOrderDelta {
    pub fn is_empty(&self) -> bool {
        self.dropped.is_empty() && self.detach.is_empty() && self.attach.is_empty()
    }
}

/// `old` must already be expressed in current names.
pub fn base_order_delta(old: &[QualName], new: &[QualName]) -> BaseOrderDelta {
    let dropped: Vec<QualName> = old.iter().filter(|b| !new.contains(b)).cloned().collect();
    let remaining: Vec<&QualName> = old.iter().filter(|b| new.contains(b)).collect();
    let common = remaining
        .iter()
        .zip(new)
        .take_while(|(a, b)| **a == *b)
        .count();
    BaseOrderDelta {
        dropped,
        detach: remaining[common..].iter().map(|b| (*b).clone()).collect(),
        attach: new[common..].to_vec(),
    }
}

/// Queue the parent changes of `table` into its batch.
///
/// `table_of` maps a base to its table, or `None` when the base has no
/// table to inherit from.
pub fn reparent(
    table: &PgName,
    delta: &BaseOrderDelta,
    table_of: impl Fn(&QualName) -> Option<PgName>,
    batcher: &mut TableBatcher,
) {
    let alter = batcher.get(table, PARENT_PRIORITY, None);
    for base in delta.dropped.iter().chain(&delta.detach) {
        if let Some(parent) = table_of(base) {
            alter.push(
                AlterItem::new(AlterAction::DropParent(parent.clone()))
                    .when(Condition::inherits(table, &parent)),
            );
        }
    }
    for base in &delta.attach {
        if let Some(parent) = table_of(base) {
            alter.push(
                AlterItem::new(AlterAction::AddParent(parent.clone()))
                    .unless(Condition::inherits(table, &parent)),
            );
        }
    }
}

/// Pointers reachable through `bases`, plus the concept's own.
fn reachable(schema: &Schema, concept: &Concept, bases: &[QualName]) -> Result<BTreeMap<QualName, QualName>, DeltaError> {
    let mut found = concept.pointers.clone();
    for base in bases {
        if matches!(schema.get(base), Some(SchemaObject::Concept(_))) {
            for (normal, spec) in schema.pointers_of(base)? {
                found.entry(normal).or_insert(spec);
            }
        }
    }
    Ok(found)
}

/// Rebase a concept table: columns first, then parents.
pub fn rebase_concept(
    schema: &Schema,
    ctx: &CommandContext<'_>,
    concept: &Concept,
    old_bases: &[QualName],
    created: &BTreeSet<QualName>,
    batcher: &mut TableBatcher,
) -> Result<(), DeltaError> {
    let old_bases: Vec<QualName> = old_bases.iter().map(|b| ctx.summary.current_name(b)).collect();
    let delta = base_order_delta(&old_bases, &concept.bases);
    if delta.is_empty() {
        return Ok(());
    }
    let table = super::names::concept_table(&concept.name);
    let before = reachable(schema, concept, &old_bases)?;
    let after = schema.pointers_of(&concept.name)?;

    for (normal, spec) in &after {
        if before.contains_key(normal) || created.contains(normal) {
            continue;
        }
        let link = schema.link(spec)?;
        let Some(location) = storage::resolve(schema, link)? else {
            continue;
        };
        if location.table_type != TableType::Concept {
            continue;
        }
        let column = Column::new(location.column.clone(), location.column_type)
            .required(link.required)
            .with_default(render_default(&link.default, ctx.expressions)?);
        batcher.get(&table, PARENT_PRIORITY, None).push(
            AlterItem::new(AlterAction::AddColumn(column))
                .unless(Condition::column(&table, &location.column)),
        );
    }

    reparent(
        &table,
        &delta,
        |base| Some(super::names::concept_table(base)),
        batcher,
    );

    for (normal, spec) in &before {
        if after.contains_key(normal) {
            continue;
        }
        let Ok(link) = schema.link(spec) else {
            continue;
        };
        let Some(location) = storage::resolve(schema, link)? else {
            continue;
        };
        if location.table_type == TableType::Concept {
            batcher.add(
                &table,
                DROP_COLUMN_PRIORITY,
                AlterItem::new(AlterAction::DropColumn(location.column.clone()))
                    .when(Condition::column(&table, &location.column)),
            );
        }
    }
    Ok(())
}
