//! PostgreSQL session.

use std::time::Instant;

use postgres::types::{ToSql, Type};
use postgres::{Client, NoTls};
use tracing::{debug_span, trace};

use super::session::{Row, Session};
use super::value::SqlValue;
use super::DbError;

/// Session over a synchronous `postgres::Client`.
pub struct PostgresSession {
    client: Client,
}

impl PostgresSession {
    /// Connect using a libpq-style connection string or URL.
    pub fn connect(url: &str) -> Result<Self, DbError> {
        let client = Client::connect(url, NoTls).map_err(|e| DbError::ConnectFailed {
            message: e.to_string(),
        })?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn rejected(sql: &str, err: postgres::Error) -> DbError {
        let message = match err.as_db_error() {
            Some(db) => format!("{}: {}", db.code().code(), db.message()),
            None => err.to_string(),
        };
        DbError::Rejected {
            sql: sql.to_string(),
            message,
        }
    }
}

fn to_params(params: &[SqlValue]) -> Vec<Box<dyn ToSql + Sync>> {
    params
        .iter()
        .map(|p| -> Box<dyn ToSql + Sync> {
            match p {
                SqlValue::Null => Box::new(None::<String>),
                SqlValue::Bool(b) => Box::new(*b),
                SqlValue::Int(i) => match i32::try_from(*i) {
                    Ok(small) => Box::new(small),
                    Err(_) => Box::new(*i),
                },
                SqlValue::Float(f) => Box::new(*f),
                SqlValue::Text(s) => Box::new(s.clone()),
                SqlValue::TextArray(items) => Box::new(items.clone()),
                SqlValue::IntArray(items) => Box::new(items.clone()),
            }
        })
        .collect()
}

fn convert_row(row: &postgres::Row) -> Result<Row, DbError> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        let ty = column.type_();
        let value = if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(idx).map(|v| v.map(SqlValue::Bool))
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(idx)
                .map(|v| v.map(|i| SqlValue::Int(i64::from(i))))
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(idx)
                .map(|v| v.map(|i| SqlValue::Int(i64::from(i))))
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(idx).map(|v| v.map(SqlValue::Int))
        } else if *ty == Type::OID {
            row.try_get::<_, Option<u32>>(idx)
                .map(|v| v.map(|i| SqlValue::Int(i64::from(i))))
        } else if *ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(idx).map(|v| v.map(SqlValue::Float))
        } else if *ty == Type::TEXT_ARRAY || *ty == Type::NAME_ARRAY || *ty == Type::VARCHAR_ARRAY {
            row.try_get::<_, Option<Vec<String>>>(idx)
                .map(|v| v.map(SqlValue::TextArray))
        } else if *ty == Type::INT8_ARRAY {
            row.try_get::<_, Option<Vec<i64>>>(idx)
                .map(|v| v.map(SqlValue::IntArray))
        } else {
            row.try_get::<_, Option<String>>(idx).map(|v| v.map(SqlValue::Text))
        };
        let value = value.map_err(|e| DbError::Protocol {
            message: format!("column '{}': {}", column.name(), e),
        })?;
        values.push(value.unwrap_or(SqlValue::Null));
    }
    Ok(Row::new(columns, values))
}

impl Session for PostgresSession {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        let span = debug_span!("db.exec", duration_ms = tracing::field::Empty);
        let _guard = span.enter();
        let start = Instant::now();
        trace!(sql, "executing statement");

        let boxed = to_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = boxed.iter().map(|b| b.as_ref()).collect();
        let affected = if params.is_empty() {
            self.client
                .batch_execute(sql)
                .map(|_| 0)
                .map_err(|e| Self::rejected(sql, e))?
        } else {
            self.client
                .execute(sql, &refs)
                .map_err(|e| Self::rejected(sql, e))?
        };
        span.record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(affected)
    }

    fn fetch(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        let span = debug_span!("db.query", duration_ms = tracing::field::Empty);
        let _guard = span.enter();
        let start = Instant::now();

        let boxed = to_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = boxed.iter().map(|b| b.as_ref()).collect();
        let rows = self
            .client
            .query(sql, &refs)
            .map_err(|e| Self::rejected(sql, e))?;
        span.record("duration_ms", start.elapsed().as_millis() as u64);
        rows.iter().map(convert_row).collect()
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
