//! Backend values: statement parameters and fetched cells.
//!
//! `SqlValue` is what the compiler binds as `$n` parameters and what the
//! session hands back from catalog and metadata queries. The
//! `DatabaseValue` trait gives result processing a uniform extraction API.

use std::fmt::Debug;

/// Trait for database values that can be extracted to Rust types.
pub trait DatabaseValue: Clone + Debug {
    /// Extract as String if the value is string-like.
    fn as_string(&self) -> Option<String>;

    /// Extract as i64 if the value is an integer.
    fn as_i64(&self) -> Option<i64>;

    /// Extract as bool if the value is boolean.
    fn as_bool(&self) -> Option<bool>;

    /// Extract as a list of strings if the value is a text array.
    fn as_string_list(&self) -> Option<Vec<String>>;

    /// Type name for error messages.
    fn type_name(&self) -> &'static str;

    fn as_i64_or(&self, default: i64) -> i64 {
        self.as_i64().unwrap_or(default)
    }

    fn as_string_or(&self, default: &str) -> String {
        self.as_string().unwrap_or_else(|| default.to_string())
    }

    fn as_bool_or(&self, default: bool) -> bool {
        self.as_bool().unwrap_or(default)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    TextArray(Vec<String>),
    IntArray(Vec<i64>),
}

impl DatabaseValue for SqlValue {
    fn as_string(&self) -> Option<String> {
        match self {
            SqlValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn as_string_list(&self) -> Option<Vec<String>> {
        match self {
            SqlValue::TextArray(items) => Some(items.clone()),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::TextArray(_) => "text[]",
            SqlValue::IntArray(_) => "int[]",
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Bool(b)
    }
}

impl From<i64> for SqlValue {
    fn from(i: i64) -> Self {
        SqlValue::Int(i)
    }
}

impl From<i32> for SqlValue {
    fn from(i: i32) -> Self {
        SqlValue::Int(i64::from(i))
    }
}

impl From<Vec<String>> for SqlValue {
    fn from(items: Vec<String>) -> Self {
        SqlValue::TextArray(items)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}
