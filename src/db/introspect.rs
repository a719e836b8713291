//! Read-only catalog queries.
//!
//! Guards, the upgrade chain and the mapping-index maintainer read backend
//! state exclusively through these functions, so the query texts double as the
//! protocol the test session answers.

use super::escape::PgName;
use super::session::Session;
use super::value::SqlValue;
use super::DbError;

pub const SCHEMA_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_namespace \
     WHERE nspname = $1)";

pub const TABLE_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_class c \
     JOIN pg_catalog.pg_namespace ns ON ns.oid = c.relnamespace \
     WHERE ns.nspname = $1 AND c.relname = $2 AND c.relkind IN ('r', 'p'))";

pub const COLUMN_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM information_schema.columns \
     WHERE table_schema = $1 AND table_name = $2 AND column_name = $3)";

pub const INDEX_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_class c \
     JOIN pg_catalog.pg_namespace ns ON ns.oid = c.relnamespace \
     WHERE ns.nspname = $1 AND c.relname = $2 AND c.relkind = 'i')";

pub const SEQUENCE_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_class c \
     JOIN pg_catalog.pg_namespace ns ON ns.oid = c.relnamespace \
     WHERE ns.nspname = $1 AND c.relname = $2 AND c.relkind = 'S')";

pub const DOMAIN_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_type t \
     JOIN pg_catalog.pg_namespace ns ON ns.oid = t.typnamespace \
     WHERE ns.nspname = $1 AND t.typname = $2 AND t.typtype = 'd')";

pub const COMPOSITE_TYPE_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_type t \
     JOIN pg_catalog.pg_namespace ns ON ns.oid = t.typnamespace \
     JOIN pg_catalog.pg_class c ON c.oid = t.typrelid \
     WHERE ns.nspname = $1 AND t.typname = $2 AND t.typtype = 'c' AND c.relkind = 'c')";

pub const TABLE_INHERITS: &str = "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_inherits i \
     JOIN pg_catalog.pg_class c ON c.oid = i.inhrelid \
     JOIN pg_catalog.pg_namespace cns ON cns.oid = c.relnamespace \
     JOIN pg_catalog.pg_class p ON p.oid = i.inhparent \
     JOIN pg_catalog.pg_namespace pns ON pns.oid = p.relnamespace \
     WHERE cns.nspname = $1 AND c.relname = $2 AND pns.nspname = $3 AND p.relname = $4)";

pub const TABLE_CONSTRAINT_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_constraint con \
     JOIN pg_catalog.pg_class c ON c.oid = con.conrelid \
     JOIN pg_catalog.pg_namespace ns ON ns.oid = c.relnamespace \
     WHERE ns.nspname = $1 AND c.relname = $2 AND con.conname = $3)";

pub const DOMAIN_CONSTRAINT_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_constraint con \
     JOIN pg_catalog.pg_type t ON t.oid = con.contypid \
     JOIN pg_catalog.pg_namespace ns ON ns.oid = t.typnamespace \
     WHERE ns.nspname = $1 AND t.typname = $2 AND con.conname = $3)";

pub const EXTENSION_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_extension \
     WHERE extname = $1)";

pub const SCHEMAS_LIKE: &str = "SELECT nspname AS name FROM pg_catalog.pg_namespace \
     WHERE nspname LIKE $1 ORDER BY nspname";

pub const TABLES_LIKE: &str = "SELECT c.relname AS name FROM pg_catalog.pg_class c \
     JOIN pg_catalog.pg_namespace ns ON ns.oid = c.relnamespace \
     WHERE ns.nspname = $1 AND c.relname LIKE $2 AND c.relkind IN ('r', 'p') ORDER BY c.relname";

pub const COMPOSITE_TYPES_LIKE: &str = "SELECT t.typname AS name FROM pg_catalog.pg_type t \
     JOIN pg_catalog.pg_namespace ns ON ns.oid = t.typnamespace \
     JOIN pg_catalog.pg_class c ON c.oid = t.typrelid \
     WHERE ns.nspname = $1 AND t.typname LIKE $2 AND c.relkind = 'c' ORDER BY t.typname";

pub const TABLE_CONSTRAINTS_LIKE: &str = "SELECT con.conname AS name FROM pg_catalog.pg_constraint con \
     JOIN pg_catalog.pg_class c ON c.oid = con.conrelid \
     JOIN pg_catalog.pg_namespace ns ON ns.oid = c.relnamespace \
     WHERE ns.nspname = $1 AND c.relname = $2 AND con.conname LIKE $3 ORDER BY con.conname";

pub const INDEXES_LIKE: &str = "SELECT ns.nspname AS schema_name, t.relname AS table_name, \
     i.relname AS index_name, pg_catalog.pg_get_expr(ix.indpred, ix.indrelid) AS predicate \
     FROM pg_catalog.pg_index ix \
     JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid \
     JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid \
     JOIN pg_catalog.pg_namespace ns ON ns.oid = t.relnamespace \
     WHERE ns.nspname LIKE $1 AND i.relname LIKE $2 ORDER BY ns.nspname, t.relname, i.relname";

fn flag(session: &mut dyn Session, sql: &str, params: &[&str]) -> Result<bool, DbError> {
    let params: Vec<SqlValue> = params.iter().map(|p| SqlValue::from(*p)).collect();
    session.fetch_flag(sql, &params)
}

fn names(session: &mut dyn Session, sql: &str, params: &[&str]) -> Result<Vec<String>, DbError> {
    let params: Vec<SqlValue> = params.iter().map(|p| SqlValue::from(*p)).collect();
    session
        .fetch(sql, &params)?
        .iter()
        .map(|row| row.required_text("name"))
        .collect()
}

pub fn schema_exists(session: &mut dyn Session, schema: &str) -> Result<bool, DbError> {
    flag(session, SCHEMA_EXISTS, &[schema])
}

pub fn table_exists(session: &mut dyn Session, table: &PgName) -> Result<bool, DbError> {
    flag(session, TABLE_EXISTS, &[&table.schema, &table.name])
}

pub fn column_exists(session: &mut dyn Session, table: &PgName, column: &str) -> Result<bool, DbError> {
    flag(session, COLUMN_EXISTS, &[&table.schema, &table.name, column])
}

pub fn index_exists(session: &mut dyn Session, index: &PgName) -> Result<bool, DbError> {
    flag(session, INDEX_EXISTS, &[&index.schema, &index.name])
}

pub fn sequence_exists(session: &mut dyn Session, seq: &PgName) -> Result<bool, DbError> {
    flag(session, SEQUENCE_EXISTS, &[&seq.schema, &seq.name])
}

pub fn domain_exists(session: &mut dyn Session, domain: &PgName) -> Result<bool, DbError> {
    flag(session, DOMAIN_EXISTS, &[&domain.schema, &domain.name])
}

pub fn composite_type_exists(session: &mut dyn Session, ty: &PgName) -> Result<bool, DbError> {
    flag(session, COMPOSITE_TYPE_EXISTS, &[&ty.schema, &ty.name])
}

pub fn table_inherits(session: &mut dyn Session, table: &PgName, parent: &PgName) -> Result<bool, DbError> {
    flag(
        session,
        TABLE_INHERITS,
        &[&table.schema, &table.name, &parent.schema, &parent.name],
    )
}

pub fn table_constraint_exists(
    session: &mut dyn Session,
    table: &PgName,
    constraint: &str,
) -> Result<bool, DbError> {
    flag(session, TABLE_CONSTRAINT_EXISTS, &[&table.schema, &table.name, constraint])
}

pub fn domain_constraint_exists(
    session: &mut dyn Session,
    domain: &PgName,
    constraint: &str,
) -> Result<bool, DbError> {
    flag(session, DOMAIN_CONSTRAINT_EXISTS, &[&domain.schema, &domain.name, constraint])
}

pub fn extension_exists(session: &mut dyn Session, name: &str) -> Result<bool, DbError> {
    flag(session, EXTENSION_EXISTS, &[name])
}

/// Schemas whose name matches a `LIKE` pattern.
pub fn schemas_like(session: &mut dyn Session, pattern: &str) -> Result<Vec<String>, DbError> {
    names(session, SCHEMAS_LIKE, &[pattern])
}

pub fn tables_like(session: &mut dyn Session, schema: &str, pattern: &str) -> Result<Vec<String>, DbError> {
    names(session, TABLES_LIKE, &[schema, pattern])
}

pub fn composite_types_like(
    session: &mut dyn Session,
    schema: &str,
    pattern: &str,
) -> Result<Vec<String>, DbError> {
    names(session, COMPOSITE_TYPES_LIKE, &[schema, pattern])
}

pub fn table_constraints_like(
    session: &mut dyn Session,
    table: &PgName,
    pattern: &str,
) -> Result<Vec<String>, DbError> {
    names(session, TABLE_CONSTRAINTS_LIKE, &[&table.schema, &table.name, pattern])
}

/// Index with its partial-index predicate as the backend renders it.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub table: PgName,
    pub name: String,
    pub predicate: Option<String>,
}

pub fn indexes_like(
    session: &mut dyn Session,
    schema_pattern: &str,
    index_pattern: &str,
) -> Result<Vec<IndexInfo>, DbError> {
    let params = [SqlValue::from(schema_pattern), SqlValue::from(index_pattern)];
    session
        .fetch(INDEXES_LIKE, &params)?
        .iter()
        .map(|row| {
            Ok(IndexInfo {
                table: PgName::new(row.required_text("schema_name")?, row.required_text("table_name")?),
                name: row.required_text("index_name")?,
                predicate: row.text("predicate")?,
            })
        })
        .collect()
}
