//! Existence guards attached to physical operations.

use std::fmt;

use crate::db::{introspect, DbError, PgName, Session};

/// Backend state an operation depends on.
///
/// Operations carry conditions that must hold and conditions that must not
/// hold; an unmet guard skips the operation, which is how replays stay
/// idempotent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    SchemaExists(String),
    ExtensionExists(String),
    TableExists(PgName),
    ColumnExists { table: PgName, column: String },
    IndexExists(PgName),
    SequenceExists(PgName),
    DomainExists(PgName),
    CompositeTypeExists(PgName),
    TableInherits { table: PgName, parent: PgName },
    TableConstraintExists { table: PgName, constraint: String },
    DomainConstraintExists { domain: PgName, constraint: String },
}

impl Condition {
    pub fn column(table: &PgName, column: &str) -> Self {
        Condition::ColumnExists {
            table: table.clone(),
            column: column.to_string(),
        }
    }

    pub fn inherits(table: &PgName, parent: &PgName) -> Self {
        Condition::TableInherits {
            table: table.clone(),
            parent: parent.clone(),
        }
    }

    pub fn holds(&self, session: &mut dyn Session) -> Result<bool, DbError> {
        match self {
            Condition::SchemaExists(name) => introspect::schema_exists(session, name),
            Condition::ExtensionExists(name) => introspect::extension_exists(session, name),
            Condition::TableExists(table) => introspect::table_exists(session, table),
            Condition::ColumnExists { table, column } => {
                introspect::column_exists(session, table, column)
            }
            Condition::IndexExists(index) => introspect::index_exists(session, index),
            Condition::SequenceExists(seq) => introspect::sequence_exists(session, seq),
            Condition::DomainExists(domain) => introspect::domain_exists(session, domain),
            Condition::CompositeTypeExists(ty) => introspect::composite_type_exists(session, ty),
            Condition::TableInherits { table, parent } => {
                introspect::table_inherits(session, table, parent)
            }
            Condition::TableConstraintExists { table, constraint } => {
                introspect::table_constraint_exists(session, table, constraint)
            }
            Condition::DomainConstraintExists { domain, constraint } => {
                introspect::domain_constraint_exists(session, domain, constraint)
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::SchemaExists(name) => write!(f, "schema {} exists", name),
            Condition::ExtensionExists(name) => write!(f, "extension {} exists", name),
            Condition::TableExists(t) => write!(f, "table {} exists", t),
            Condition::ColumnExists { table, column } => {
                write!(f, "column {}.{} exists", table, column)
            }
            Condition::IndexExists(i) => write!(f, "index {} exists", i),
            Condition::SequenceExists(s) => write!(f, "sequence {} exists", s),
            Condition::DomainExists(d) => write!(f, "domain {} exists", d),
            Condition::CompositeTypeExists(t) => write!(f, "type {} exists", t),
            Condition::TableInherits { table, parent } => {
                write!(f, "{} inherits {}", table, parent)
            }
            Condition::TableConstraintExists { table, constraint } => {
                write!(f, "constraint {} on {} exists", constraint, table)
            }
            Condition::DomainConstraintExists { domain, constraint } => {
                write!(f, "constraint {} on domain {} exists", constraint, domain)
            }
        }
    }
}

/// Evaluate positive and negated guards in order, stopping at the first miss.
pub fn guards_hold(
    session: &mut dyn Session,
    conditions: &[Condition],
    neg_conditions: &[Condition],
) -> Result<Option<String>, DbError> {
    for cond in conditions {
        if !cond.holds(session)? {
            return Ok(Some(format!("requires {}", cond)));
        }
    }
    for cond in neg_conditions {
        if cond.holds(session)? {
            return Ok(Some(format!("already {}", cond)));
        }
    }
    Ok(None)
}
