//! Schemas, composite types, sequences and raw statements.

use crate::db::{quote_ident, PgName, SqlValue};

use super::table::Column;
use super::{PhysicalOp, Statement};

#[derive(Debug, Clone, PartialEq)]
pub struct CreateSchema {
    pub name: String,
}

impl PhysicalOp for CreateSchema {
    fn statements(&self) -> Vec<Statement> {
        vec![Statement::new(format!("CREATE SCHEMA {}", quote_ident(&self.name)))]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropSchema {
    pub name: String,
}

impl PhysicalOp for DropSchema {
    fn statements(&self) -> Vec<Statement> {
        vec![Statement::new(format!("DROP SCHEMA {}", quote_ident(&self.name)))]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateExtension {
    pub name: String,
    pub schema: String,
}

impl PhysicalOp for CreateExtension {
    fn statements(&self) -> Vec<Statement> {
        vec![Statement::new(format!(
            "CREATE EXTENSION {} WITH SCHEMA {}",
            quote_ident(&self.name),
            quote_ident(&self.schema)
        ))]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateCompositeType {
    pub name: PgName,
    pub attributes: Vec<Column>,
}

impl PhysicalOp for CreateCompositeType {
    fn statements(&self) -> Vec<Statement> {
        let attrs: Vec<String> = self
            .attributes
            .iter()
            .map(|a| format!("{} {}", quote_ident(&a.name), a.type_name))
            .collect();
        vec![Statement::new(format!(
            "CREATE TYPE {} AS ({})",
            self.name,
            attrs.join(", ")
        ))]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropCompositeType {
    pub name: PgName,
    pub cascade: bool,
}

impl PhysicalOp for DropCompositeType {
    fn statements(&self) -> Vec<Statement> {
        let cascade = if self.cascade { " CASCADE" } else { "" };
        vec![Statement::new(format!("DROP TYPE {}{}", self.name, cascade))]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateSequence {
    pub name: PgName,
}

impl PhysicalOp for CreateSequence {
    fn statements(&self) -> Vec<Statement> {
        vec![Statement::new(format!("CREATE SEQUENCE {}", self.name))]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenameSequence {
    pub name: PgName,
    pub new_name: PgName,
}

impl PhysicalOp for RenameSequence {
    fn statements(&self) -> Vec<Statement> {
        let mut stmts = Vec::new();
        let mut current = self.name.clone();
        if current.schema != self.new_name.schema {
            stmts.push(Statement::new(format!(
                "ALTER SEQUENCE {} SET SCHEMA {}",
                current,
                quote_ident(&self.new_name.schema)
            )));
            current = PgName::new(self.new_name.schema.clone(), current.name);
        }
        if current.name != self.new_name.name {
            stmts.push(Statement::new(format!(
                "ALTER SEQUENCE {} RENAME TO {}",
                current,
                quote_ident(&self.new_name.name)
            )));
        }
        stmts
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropSequence {
    pub name: PgName,
}

impl PhysicalOp for DropSequence {
    fn statements(&self) -> Vec<Statement> {
        vec![Statement::new(format!("DROP SEQUENCE {}", self.name))]
    }
}

/// Verbatim statement, used for data rewrites the typed ops do not cover.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSql {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl RawSql {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

impl PhysicalOp for RawSql {
    fn statements(&self) -> Vec<Statement> {
        vec![Statement {
            sql: self.sql.clone(),
            params: self.params.clone(),
        }]
    }
}
