//! Physical operation model.
//!
//! Every schema change is lowered into [`Operation`]s: a typed DDL/DML
//! payload ([`OpKind`]) tagged with a priority and guarded by existence
//! conditions. Operations are plain data until a scheduler executes them
//! against a [`Session`].
//!
//! # Type Decisions
//!
//! **Why `enum_dispatch` instead of `Box<dyn PhysicalOp>`?** Operations are
//! compared in tests and cloned when commands are replayed; a closed enum
//! keeps them `Clone + PartialEq` while still dispatching rendering through
//! one trait.

pub mod condition;
pub mod ddl;
pub mod domain;
pub mod index;
pub mod rows;
pub mod table;

use enum_dispatch::enum_dispatch;
use tracing::{debug, trace};

use crate::db::{DbError, Session, SqlValue};

pub use condition::Condition;
pub use ddl::{
    CreateCompositeType, CreateExtension, CreateSchema, CreateSequence, DropCompositeType, DropSchema,
    DropSequence, RawSql, RenameSequence,
};
pub use domain::{
    AddDomainConstraint, AlterDomainDefault, CreateDomain, DomainCheck, DropDomain,
    DropDomainConstraint, RenameDomain,
};
pub use index::{CreateIndex, DropIndex, RenameIndex};
pub use rows::{record, Delete, Filter, Insert, Merge, Record, Update};
pub use table::{
    AlterAction, AlterItem, AlterTable, Column, ConstraintKind, CreateTable, DropTable,
    RenameColumn, RenameTable, RenameTableConstraint, TableConstraint,
};

/// Execution bucket; lower runs first.
pub type Priority = i32;

/// A rendered SQL statement with positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Executed,
    /// A guard did not hold.
    Skipped,
}

#[enum_dispatch]
pub trait PhysicalOp {
    /// SQL this operation runs when all of its guards hold.
    fn statements(&self) -> Vec<Statement>;

    fn run(&self, session: &mut dyn Session) -> Result<Outcome, DbError> {
        for stmt in self.statements() {
            trace!(sql = %stmt.sql, "statement");
            session.execute(&stmt.sql, &stmt.params)?;
        }
        Ok(Outcome::Executed)
    }
}

/// Ordered operations executed as one unit, each with its own guards.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OpGroup {
    pub ops: Vec<Operation>,
}

impl OpGroup {
    pub fn new(ops: Vec<Operation>) -> Self {
        Self { ops }
    }
}

impl PhysicalOp for OpGroup {
    fn statements(&self) -> Vec<Statement> {
        self.ops.iter().flat_map(|op| op.kind.statements()).collect()
    }

    fn run(&self, session: &mut dyn Session) -> Result<Outcome, DbError> {
        let mut outcome = Outcome::Skipped;
        for op in &self.ops {
            if op.execute(session)? == Outcome::Executed {
                outcome = Outcome::Executed;
            }
        }
        Ok(outcome)
    }
}

#[enum_dispatch(PhysicalOp)]
#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    CreateSchema,
    DropSchema,
    CreateExtension,
    CreateTable,
    DropTable,
    AlterTable,
    RenameTable,
    RenameColumn,
    RenameTableConstraint,
    CreateDomain,
    RenameDomain,
    DropDomain,
    AlterDomainDefault,
    AddDomainConstraint,
    DropDomainConstraint,
    CreateIndex,
    DropIndex,
    RenameIndex,
    CreateCompositeType,
    DropCompositeType,
    CreateSequence,
    RenameSequence,
    DropSequence,
    Insert,
    Update,
    Delete,
    Merge,
    RawSql,
    OpGroup,
}

/// A guarded, prioritized physical operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub priority: Priority,
    pub conditions: Vec<Condition>,
    pub neg_conditions: Vec<Condition>,
    pub kind: OpKind,
}

impl Operation {
    pub fn new(kind: impl Into<OpKind>) -> Self {
        Self {
            priority: 0,
            conditions: Vec::new(),
            neg_conditions: Vec::new(),
            kind: kind.into(),
        }
    }

    pub fn at(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Run only if `condition` holds.
    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Run only if `condition` does not hold.
    pub fn unless(mut self, condition: Condition) -> Self {
        self.neg_conditions.push(condition);
        self
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.kind.statements()
    }

    pub fn execute(&self, session: &mut dyn Session) -> Result<Outcome, DbError> {
        if let Some(reason) = condition::guards_hold(session, &self.conditions, &self.neg_conditions)? {
            debug!(priority = self.priority, reason, "operation skipped");
            return Ok(Outcome::Skipped);
        }
        self.kind.run(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sim::SimSession;
    use crate::db::PgName;

    fn schema_op(name: &str) -> Operation {
        Operation::new(CreateSchema { name: name.into() })
    }

    #[test]
    fn test_negated_guard_skips_replay() {
        let mut session = SimSession::new();
        let op = schema_op("sdm_app").unless(Condition::SchemaExists("sdm_app".into()));
        assert_eq!(op.execute(&mut session).unwrap(), Outcome::Executed);
        assert_eq!(op.execute(&mut session).unwrap(), Outcome::Skipped);
        assert_eq!(session.executed().len(), 1);
    }

    #[test]
    fn test_positive_guard_requires_state() {
        let mut session = SimSession::new();
        let op = Operation::new(DropSchema { name: "sdm_app".into() })
            .when(Condition::SchemaExists("sdm_app".into()));
        assert_eq!(op.execute(&mut session).unwrap(), Outcome::Skipped);
        assert!(session.executed().is_empty());
    }

    #[test]
    fn test_alter_table_runs_only_passing_clauses() {
        let mut session = SimSession::new();
        let table = PgName::new("sdm_app", "Person_data");
        session.add_schema("sdm_app");
        session.add_table(&table, &["id", "name"]);

        let op = Operation::new(
            AlterTable::new(table.clone())
                .add(
                    AlterItem::new(AlterAction::AddColumn(Column::new("name", "text")))
                        .unless(Condition::column(&table, "name")),
                )
                .add(
                    AlterItem::new(AlterAction::AddColumn(Column::new("age", "integer")))
                        .unless(Condition::column(&table, "age")),
                ),
        );
        assert_eq!(op.execute(&mut session).unwrap(), Outcome::Executed);
        assert_eq!(
            session.executed(),
            vec!["ALTER TABLE \"sdm_app\".\"Person_data\" ADD COLUMN \"age\" integer".to_string()]
        );
        assert_eq!(op.execute(&mut session).unwrap(), Outcome::Skipped);
    }

    #[test]
    fn test_group_reports_skip_when_all_children_skip() {
        let mut session = SimSession::new();
        session.add_schema("sdm_app");
        let group = Operation::new(OpGroup::new(vec![
            schema_op("sdm_app").unless(Condition::SchemaExists("sdm_app".into())),
        ]));
        assert_eq!(group.execute(&mut session).unwrap(), Outcome::Skipped);
    }

    #[test]
    fn test_builder_defaults() {
        let op = schema_op("sdm_x").at(4);
        assert_eq!(op.priority, 4);
        assert!(matches!(op.kind, OpKind::CreateSchema(_)));
        assert_eq!(op.statements()[0].sql, "CREATE SCHEMA \"sdm_x\"");
    }
}
