//! Row-level DML against metadata tables.
//!
//! Values bind as `$n` parameters except SQL `NULL`, which is rendered inline
//! so the backend never has to infer a type for an untyped null parameter.

use crate::db::{quote_ident, PgName, SqlValue};

use super::table::ident_list;
use super::{PhysicalOp, Statement};

/// Ordered `(column, value)` pairs.
pub type Record = Vec<(String, SqlValue)>;

/// Build a record from borrowed column names.
pub fn record<I, V>(pairs: I) -> Record
where
    I: IntoIterator<Item = (&'static str, V)>,
    V: Into<SqlValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.into()))
        .collect()
}

/// Equality filter; a null value matches with `IS NULL`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: SqlValue,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

struct Binder {
    params: Vec<SqlValue>,
}

impl Binder {
    fn new() -> Self {
        Self { params: Vec::new() }
    }

    fn bind(&mut self, value: &SqlValue) -> String {
        if *value == SqlValue::Null {
            return "NULL".to_string();
        }
        self.params.push(value.clone());
        format!("${}", self.params.len())
    }

    fn assignments(&mut self, values: &Record) -> String {
        values
            .iter()
            .map(|(col, v)| format!("{} = {}", quote_ident(col), self.bind(v)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn where_clause(&mut self, filters: &[Filter]) -> String {
        if filters.is_empty() {
            return String::new();
        }
        let conds: Vec<String> = filters
            .iter()
            .map(|f| {
                if f.value == SqlValue::Null {
                    format!("{} IS NULL", quote_ident(&f.column))
                } else {
                    format!("{} = {}", quote_ident(&f.column), self.bind(&f.value))
                }
            })
            .collect();
        format!(" WHERE {}", conds.join(" AND "))
    }

    fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            params: self.params,
        }
    }
}

fn columns_of(record: &Record) -> Vec<String> {
    record.iter().map(|(c, _)| c.clone()).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: PgName,
    pub records: Vec<Record>,
}

impl Insert {
    pub fn one(table: PgName, record: Record) -> Self {
        Self {
            table,
            records: vec![record],
        }
    }
}

impl PhysicalOp for Insert {
    fn statements(&self) -> Vec<Statement> {
        let Some(first) = self.records.first() else {
            return Vec::new();
        };
        let mut binder = Binder::new();
        let rows: Vec<String> = self
            .records
            .iter()
            .map(|rec| {
                let vals: Vec<String> = rec.iter().map(|(_, v)| binder.bind(v)).collect();
                format!("({})", vals.join(", "))
            })
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table,
            ident_list(&columns_of(first)),
            rows.join(", ")
        );
        vec![binder.finish(sql)]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: PgName,
    pub values: Record,
    pub filters: Vec<Filter>,
}

impl PhysicalOp for Update {
    fn statements(&self) -> Vec<Statement> {
        if self.values.is_empty() {
            return Vec::new();
        }
        let mut binder = Binder::new();
        let set = binder.assignments(&self.values);
        let filter = binder.where_clause(&self.filters);
        let sql = format!("UPDATE {} SET {}{}", self.table, set, filter);
        vec![binder.finish(sql)]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: PgName,
    pub filters: Vec<Filter>,
}

impl PhysicalOp for Delete {
    fn statements(&self) -> Vec<Statement> {
        let mut binder = Binder::new();
        let filter = binder.where_clause(&self.filters);
        let sql = format!("DELETE FROM {}{}", self.table, filter);
        vec![binder.finish(sql)]
    }
}

/// Insert-or-update keyed on a unique column set. `update_when` restricts the
/// update branch; it may reference the stored row as `cur` and the proposed
/// one as `EXCLUDED`.
#[derive(Debug, Clone, PartialEq)]
pub struct Merge {
    pub table: PgName,
    pub key: Vec<String>,
    pub record: Record,
    pub update_when: Option<String>,
}

impl PhysicalOp for Merge {
    fn statements(&self) -> Vec<Statement> {
        let mut binder = Binder::new();
        let vals: Vec<String> = self.record.iter().map(|(_, v)| binder.bind(v)).collect();
        let updates: Vec<String> = self
            .record
            .iter()
            .filter(|(col, _)| !self.key.contains(col))
            .map(|(col, _)| format!("{} = EXCLUDED.{}", quote_ident(col), quote_ident(col)))
            .collect();
        let mut sql = format!(
            "INSERT INTO {} AS cur ({}) VALUES ({}) ON CONFLICT ({}) ",
            self.table,
            ident_list(&columns_of(&self.record)),
            vals.join(", "),
            ident_list(&self.key)
        );
        if updates.is_empty() {
            sql.push_str("DO NOTHING");
        } else {
            sql.push_str("DO UPDATE SET ");
            sql.push_str(&updates.join(", "));
            if let Some(cond) = &self.update_when {
                sql.push_str(" WHERE ");
                sql.push_str(cond);
            }
        }
        vec![binder.finish(sql)]
    }
}
