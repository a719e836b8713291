//! Domain DDL.

use crate::db::{quote_ident, PgName};

use super::{PhysicalOp, Statement};

/// Named `CHECK` on a domain.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainCheck {
    pub name: String,
    pub expr: String,
}

impl DomainCheck {
    pub fn new(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expr: expr.into(),
        }
    }

    fn render(&self) -> String {
        format!("CONSTRAINT {} CHECK ({})", quote_ident(&self.name), self.expr)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateDomain {
    pub name: PgName,
    pub base: String,
    pub default: Option<String>,
    pub constraints: Vec<DomainCheck>,
}

impl CreateDomain {
    pub fn new(name: PgName, base: impl Into<String>) -> Self {
        Self {
            name,
            base: base.into(),
            default: None,
            constraints: Vec::new(),
        }
    }
}

impl PhysicalOp for CreateDomain {
    fn statements(&self) -> Vec<Statement> {
        let mut sql = format!("CREATE DOMAIN {} AS {}", self.name, self.base);
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        for check in &self.constraints {
            sql.push(' ');
            sql.push_str(&check.render());
        }
        vec![Statement::new(sql)]
    }
}

/// Moves and/or renames a domain.
#[derive(Debug, Clone, PartialEq)]
pub struct RenameDomain {
    pub name: PgName,
    pub new_name: PgName,
}

impl PhysicalOp for RenameDomain {
    fn statements(&self) -> Vec<Statement> {
        let mut stmts = Vec::new();
        let mut current = self.name.clone();
        if current.schema != self.new_name.schema {
            stmts.push(Statement::new(format!(
                "ALTER DOMAIN {} SET SCHEMA {}",
                current,
                quote_ident(&self.new_name.schema)
            )));
            current = PgName::new(self.new_name.schema.clone(), current.name);
        }
        if current.name != self.new_name.name {
            stmts.push(Statement::new(format!(
                "ALTER DOMAIN {} RENAME TO {}",
                current,
                quote_ident(&self.new_name.name)
            )));
        }
        stmts
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropDomain {
    pub name: PgName,
}

impl PhysicalOp for DropDomain {
    fn statements(&self) -> Vec<Statement> {
        vec![Statement::new(format!("DROP DOMAIN {}", self.name))]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlterDomainDefault {
    pub name: PgName,
    pub default: Option<String>,
}

impl PhysicalOp for AlterDomainDefault {
    fn statements(&self) -> Vec<Statement> {
        let sql = match &self.default {
            Some(expr) => format!("ALTER DOMAIN {} SET DEFAULT {}", self.name, expr),
            None => format!("ALTER DOMAIN {} DROP DEFAULT", self.name),
        };
        vec![Statement::new(sql)]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddDomainConstraint {
    pub name: PgName,
    pub constraint: DomainCheck,
}

impl PhysicalOp for AddDomainConstraint {
    fn statements(&self) -> Vec<Statement> {
        vec![Statement::new(format!(
            "ALTER DOMAIN {} ADD {}",
            self.name,
            self.constraint.render()
        ))]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropDomainConstraint {
    pub name: PgName,
    pub constraint: String,
}

impl PhysicalOp for DropDomainConstraint {
    fn statements(&self) -> Vec<Statement> {
        vec![Statement::new(format!(
            "ALTER DOMAIN {} DROP CONSTRAINT {}",
            self.name,
            quote_ident(&self.constraint)
        ))]
    }
}
