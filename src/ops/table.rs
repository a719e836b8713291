//! Table DDL: create, drop, rename and batched `ALTER TABLE`.

use tracing::debug;

use crate::db::{quote_ident, DbError, PgName, Session};

use super::condition::{guards_hold, Condition};
use super::{Outcome, PhysicalOp, Statement};

/// Column definition as it appears in `CREATE TABLE` and `ADD COLUMN`.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub type_name: String,
    pub required: bool,
    pub default: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            required: false,
            default: None,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_default(mut self, default: Option<String>) -> Self {
        self.default = default;
        self
    }

    pub fn render(&self) -> String {
        let mut sql = format!("{} {}", quote_ident(&self.name), self.type_name);
        if self.required {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintKind {
    PrimaryKey(Vec<String>),
    Unique(Vec<String>),
    Check(String),
}

/// Named table constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct TableConstraint {
    pub name: String,
    pub kind: ConstraintKind,
}

impl TableConstraint {
    pub fn primary_key(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            kind: ConstraintKind::PrimaryKey(columns.iter().map(|c| c.to_string()).collect()),
        }
    }

    pub fn unique(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            kind: ConstraintKind::Unique(columns.iter().map(|c| c.to_string()).collect()),
        }
    }

    pub fn check(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ConstraintKind::Check(expr.into()),
        }
    }

    pub fn render(&self) -> String {
        let body = match &self.kind {
            ConstraintKind::PrimaryKey(cols) => format!("PRIMARY KEY ({})", ident_list(cols)),
            ConstraintKind::Unique(cols) => format!("UNIQUE ({})", ident_list(cols)),
            ConstraintKind::Check(expr) => format!("CHECK ({})", expr),
        };
        format!("CONSTRAINT {} {}", quote_ident(&self.name), body)
    }
}

pub(crate) fn ident_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub name: PgName,
    pub columns: Vec<Column>,
    pub constraints: Vec<TableConstraint>,
    pub parents: Vec<PgName>,
}

impl CreateTable {
    pub fn new(name: PgName) -> Self {
        Self {
            name,
            columns: Vec::new(),
            constraints: Vec::new(),
            parents: Vec::new(),
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn constraint(mut self, constraint: TableConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn inherits(mut self, parents: Vec<PgName>) -> Self {
        self.parents = parents;
        self
    }
}

impl PhysicalOp for CreateTable {
    fn statements(&self) -> Vec<Statement> {
        let body: Vec<String> = self
            .columns
            .iter()
            .map(Column::render)
            .chain(self.constraints.iter().map(TableConstraint::render))
            .collect();
        let mut sql = format!("CREATE TABLE {} ({})", self.name, body.join(", "));
        if !self.parents.is_empty() {
            let parents: Vec<String> = self.parents.iter().map(|p| p.to_string()).collect();
            sql.push_str(&format!(" INHERITS ({})", parents.join(", ")));
        }
        vec![Statement::new(sql)]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropTable {
    pub name: PgName,
}

impl PhysicalOp for DropTable {
    fn statements(&self) -> Vec<Statement> {
        vec![Statement::new(format!("DROP TABLE {}", self.name))]
    }
}

/// Moves a table to another schema and/or gives it a new local name.
#[derive(Debug, Clone, PartialEq)]
pub struct RenameTable {
    pub name: PgName,
    pub new_name: PgName,
}

impl PhysicalOp for RenameTable {
    fn statements(&self) -> Vec<Statement> {
        let mut stmts = Vec::new();
        let mut current = self.name.clone();
        if current.schema != self.new_name.schema {
            stmts.push(Statement::new(format!(
                "ALTER TABLE {} SET SCHEMA {}",
                current,
                quote_ident(&self.new_name.schema)
            )));
            current = PgName::new(self.new_name.schema.clone(), current.name);
        }
        if current.name != self.new_name.name {
            stmts.push(Statement::new(format!(
                "ALTER TABLE {} RENAME TO {}",
                current,
                quote_ident(&self.new_name.name)
            )));
        }
        stmts
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenameColumn {
    pub table: PgName,
    pub old: String,
    pub new: String,
}

impl PhysicalOp for RenameColumn {
    fn statements(&self) -> Vec<Statement> {
        vec![Statement::new(format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.table,
            quote_ident(&self.old),
            quote_ident(&self.new)
        ))]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenameTableConstraint {
    pub table: PgName,
    pub old: String,
    pub new: String,
}

impl PhysicalOp for RenameTableConstraint {
    fn statements(&self) -> Vec<Statement> {
        vec![Statement::new(format!(
            "ALTER TABLE {} RENAME CONSTRAINT {} TO {}",
            self.table,
            quote_ident(&self.old),
            quote_ident(&self.new)
        ))]
    }
}

/// One clause of an `ALTER TABLE`.
#[derive(Debug, Clone, PartialEq)]
pub enum AlterAction {
    AddColumn(Column),
    DropColumn(String),
    AlterColumnType {
        column: String,
        type_name: String,
        using: Option<String>,
    },
    SetDefault {
        column: String,
        default: Option<String>,
    },
    SetNotNull {
        column: String,
        required: bool,
    },
    AddConstraint(TableConstraint),
    DropConstraint(String),
    AddParent(PgName),
    DropParent(PgName),
}

impl AlterAction {
    pub fn render(&self) -> String {
        match self {
            AlterAction::AddColumn(col) => format!("ADD COLUMN {}", col.render()),
            AlterAction::DropColumn(name) => format!("DROP COLUMN {}", quote_ident(name)),
            AlterAction::AlterColumnType {
                column,
                type_name,
                using,
            } => {
                let mut sql = format!("ALTER COLUMN {} SET DATA TYPE {}", quote_ident(column), type_name);
                if let Some(expr) = using {
                    sql.push_str(" USING ");
                    sql.push_str(expr);
                }
                sql
            }
            AlterAction::SetDefault { column, default } => match default {
                Some(expr) => format!("ALTER COLUMN {} SET DEFAULT {}", quote_ident(column), expr),
                None => format!("ALTER COLUMN {} DROP DEFAULT", quote_ident(column)),
            },
            AlterAction::SetNotNull { column, required } => {
                let verb = if *required { "SET" } else { "DROP" };
                format!("ALTER COLUMN {} {} NOT NULL", quote_ident(column), verb)
            }
            AlterAction::AddConstraint(c) => format!("ADD {}", c.render()),
            AlterAction::DropConstraint(name) => format!("DROP CONSTRAINT {}", quote_ident(name)),
            AlterAction::AddParent(parent) => format!("INHERIT {}", parent),
            AlterAction::DropParent(parent) => format!("NO INHERIT {}", parent),
        }
    }
}

/// An alter clause with its own guards.
#[derive(Debug, Clone, PartialEq)]
pub struct AlterItem {
    pub action: AlterAction,
    pub conditions: Vec<Condition>,
    pub neg_conditions: Vec<Condition>,
}

impl AlterItem {
    pub fn new(action: AlterAction) -> Self {
        Self {
            action,
            conditions: Vec::new(),
            neg_conditions: Vec::new(),
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn unless(mut self, condition: Condition) -> Self {
        self.neg_conditions.push(condition);
        self
    }
}

impl From<AlterAction> for AlterItem {
    fn from(action: AlterAction) -> Self {
        AlterItem::new(action)
    }
}

/// Batched `ALTER TABLE`: all clauses that pass their guards run as one
/// statement; when none pass the operation is skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct AlterTable {
    pub table: PgName,
    pub items: Vec<AlterItem>,
}

impl AlterTable {
    pub fn new(table: PgName) -> Self {
        Self {
            table,
            items: Vec::new(),
        }
    }

    pub fn add(mut self, item: impl Into<AlterItem>) -> Self {
        self.items.push(item.into());
        self
    }

    pub fn push(&mut self, item: impl Into<AlterItem>) {
        self.items.push(item.into());
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn render(&self, items: &[&AlterItem]) -> Statement {
        let clauses: Vec<String> = items.iter().map(|i| i.action.render()).collect();
        Statement::new(format!("ALTER TABLE {} {}", self.table, clauses.join(", ")))
    }
}

impl PhysicalOp for AlterTable {
    fn statements(&self) -> Vec<Statement> {
        if self.items.is_empty() {
            return Vec::new();
        }
        let items: Vec<&AlterItem> = self.items.iter().collect();
        vec![self.render(&items)]
    }

    fn run(&self, session: &mut dyn Session) -> Result<Outcome, DbError> {
        let mut passing = Vec::with_capacity(self.items.len());
        for item in &self.items {
            match guards_hold(session, &item.conditions, &item.neg_conditions)? {
                None => passing.push(item),
                Some(reason) => debug!(table = %self.table, clause = %item.action.render(), reason, "alter clause skipped"),
            }
        }
        if passing.is_empty() {
            return Ok(Outcome::Skipped);
        }
        let stmt = self.render(&passing);
        session.execute(&stmt.sql, &stmt.params)?;
        Ok(Outcome::Executed)
    }
}
