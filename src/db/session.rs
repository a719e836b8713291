//! Session abstraction over a backend connection.
//!
//! Physical operations render to SQL text with positional parameters and run
//! through [`Session::execute`]; guards and introspection read through
//! [`Session::fetch`]. One session serves one delta or one upgrade run.

use super::value::{DatabaseValue, SqlValue};
use super::DbError;

/// One fetched row with named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, SqlValue)>,
        K: Into<String>,
    {
        let (columns, values) = pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self { columns, values }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    pub fn first(&self) -> Option<&SqlValue> {
        self.values.first()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn require(&self, column: &str) -> Result<&SqlValue, DbError> {
        self.get(column).ok_or_else(|| DbError::MissingColumn {
            name: column.to_string(),
        })
    }

    /// Text column; null becomes `None`.
    pub fn text(&self, column: &str) -> Result<Option<String>, DbError> {
        Ok(self.require(column)?.as_string())
    }

    pub fn required_text(&self, column: &str) -> Result<String, DbError> {
        let value = self.require(column)?;
        value.as_string().ok_or_else(|| DbError::Protocol {
            message: format!("column '{}' is {}, expected text", column, value.type_name()),
        })
    }

    pub fn int(&self, column: &str) -> Result<Option<i64>, DbError> {
        Ok(self.require(column)?.as_i64())
    }
}

pub trait Session {
    /// Execute a statement, returning the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError>;

    /// Run a query and return all rows.
    fn fetch(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError>;

    /// Backend name for logs.
    fn backend_name(&self) -> &'static str;

    fn begin(&mut self) -> Result<(), DbError> {
        self.execute("BEGIN", &[]).map(|_| ())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.execute("COMMIT", &[]).map(|_| ())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.execute("ROLLBACK", &[]).map(|_| ())
    }

    /// First column of the first row, if any.
    fn fetch_value(&mut self, sql: &str, params: &[SqlValue]) -> Result<Option<SqlValue>, DbError> {
        let rows = self.fetch(sql, params)?;
        Ok(rows.first().and_then(Row::first).cloned())
    }

    /// Boolean answer of an `EXISTS` style query; no rows means false.
    fn fetch_flag(&mut self, sql: &str, params: &[SqlValue]) -> Result<bool, DbError> {
        Ok(self
            .fetch_value(sql, params)?
            .is_some_and(|v| v.as_bool_or(false)))
    }
}
