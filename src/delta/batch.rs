//! Per-table accumulation of ALTER TABLE clauses.
//!
//! Handlers ask for "the alteration of table T at priority P" and keep adding
//! clauses to the same statement instead of emitting one statement each.

use crate::db::PgName;
use crate::ops::{AlterItem, AlterTable, Operation, Priority};

/// Identity of one batched alteration. `tag` separates batches that must
/// stay apart even on the same table and priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchKey {
    pub table: PgName,
    pub priority: Priority,
    pub tag: Option<&'static str>,
}

#[derive(Debug, Clone, Default)]
pub struct TableBatcher {
    batches: Vec<(BatchKey, AlterTable)>,
}

impl TableBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The accumulating alteration for `(table, priority, tag)`.
    pub fn get(&mut self, table: &PgName, priority: Priority, tag: Option<&'static str>) -> &mut AlterTable {
        let key = BatchKey {
            table: table.clone(),
            priority,
            tag,
        };
        let idx = match self.batches.iter().position(|(k, _)| *k == key) {
            Some(idx) => idx,
            None => {
                self.batches.push((key, AlterTable::new(table.clone())));
                self.batches.len() - 1
            }
        };
        &mut self.batches[idx].1
    }

    pub fn add(&mut self, table: &PgName, priority: Priority, item: impl Into<AlterItem>) {
        self.get(table, priority, None).push(item);
    }

    pub fn is_empty(&self) -> bool {
        self.batches.iter().all(|(_, alter)| alter.is_empty())
    }

    /// Take the non-empty batches as operations, in first-request order.
    pub fn drain(&mut self) -> Vec<Operation> {
        std::mem::take(&mut self.batches)
            .into_iter()
            .filter(|(_, alter)| !alter.is_empty())
            .map(|(key, alter)| Operation::new(alter).at(key.priority))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{AlterAction, Column, OpKind};

    #[test]
    fn test_same_key_accumulates() {
        let table = PgName::new("sdm_app", "Person_data");
        let mut batcher = TableBatcher::new();
        batcher.add(&table, 1, AlterAction::AddColumn(Column::new("name", "text")));
        batcher.add(&table, 1, AlterAction::AddColumn(Column::new("age", "integer")));
        batcher.add(&table, 2, AlterAction::DropColumn("nick".into()));
        batcher.get(&table, 3, Some("defaults"));

        let ops = batcher.drain();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].priority, 1);
        let OpKind::AlterTable(alter) = &ops[0].kind else {
            panic!("expected alter table");
        };
        assert_eq!(alter.items.len(), 2);
        assert_eq!(ops[1].priority, 2);
        assert!(batcher.is_empty());
    }

    #[test]
    fn test_tag_separates_batches() {
        let table = PgName::new("sdm_app", "Person_data");
        let mut batcher = TableBatcher::new();
        batcher.add(&table, 3, AlterAction::DropColumn("a".into()));
        batcher
            .get(&table, 3, Some("defaults"))
            .push(AlterAction::SetDefault {
                column: "b".into(),
                default: None,
            });
        assert_eq!(batcher.drain().len(), 2);
    }
}
