//! Serialized default-value payloads.
//!
//! The current format is a JSON list of tagged entries:
//!
//! ```text
//! [{"type": "literal", "value": 42}, {"type": "expr", "value": "std::now()"}]
//! ```
//!
//! Deployments written by older backend formats may still carry one of two
//! earlier encodings, which [`read_default`] accepts as well:
//!
//! - a JSON list where expressions are `{"query": "..."}` objects and literals
//!   are bare values (namespaced-expression form);
//! - a block list with one `- value` or `- query: expr` entry per line, where
//!   expressions still use a single colon between module and function
//!   (colon-delimited form).

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One entry of a default-value list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum DefaultItem {
    Literal(Value),
    Expr(String),
}

impl DefaultItem {
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            DefaultItem::Literal(v) => Some(v),
            DefaultItem::Expr(_) => None,
        }
    }
}

/// Which encoding a stored payload was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Tagged,
    NamespacedExpr,
    ColonDelimited,
}

#[derive(Error, Debug, PartialEq)]
pub enum PayloadError {
    #[error("Unrecognized default payload: {text}")]
    Unrecognized { text: String },

    #[error("Invalid entry in default payload: {entry}")]
    InvalidEntry { entry: String },
}

/// Serialize a default list in the current format.
pub fn write_default(items: &[DefaultItem]) -> String {
    // Serializing plain enums of JSON values cannot fail.
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Read a stored default list in any supported format.
pub fn read_default(text: &str) -> Result<(Vec<DefaultItem>, PayloadFormat), PayloadError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok((Vec::new(), PayloadFormat::Tagged));
    }

    if trimmed.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<DefaultItem>>(trimmed) {
            return Ok((items, PayloadFormat::Tagged));
        }
        let values: Vec<Value> =
            serde_json::from_str(trimmed).map_err(|_| PayloadError::Unrecognized {
                text: text.to_string(),
            })?;
        let items = values
            .into_iter()
            .map(namespaced_entry)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok((items, PayloadFormat::NamespacedExpr));
    }

    if trimmed.starts_with('-') {
        let items = trimmed
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(colon_entry)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok((items, PayloadFormat::ColonDelimited));
    }

    Err(PayloadError::Unrecognized {
        text: text.to_string(),
    })
}

fn namespaced_entry(value: Value) -> Result<DefaultItem, PayloadError> {
    match value {
        Value::Object(map) => match map.get("query") {
            Some(Value::String(query)) if map.len() == 1 => Ok(DefaultItem::Expr(query.clone())),
            _ => Err(PayloadError::InvalidEntry {
                entry: Value::Object(map).to_string(),
            }),
        },
        other => Ok(DefaultItem::Literal(other)),
    }
}

fn colon_entry(line: &str) -> Result<DefaultItem, PayloadError> {
    let body = line
        .strip_prefix('-')
        .map(str::trim)
        .ok_or_else(|| PayloadError::InvalidEntry {
            entry: line.to_string(),
        })?;

    if let Some(query) = body.strip_prefix("query:") {
        return Ok(DefaultItem::Expr(normalize_namespaces(query.trim())));
    }

    // Bare scalars keep their JSON reading when they have one ("42", "true").
    let literal = serde_json::from_str::<Value>(body)
        .unwrap_or_else(|_| Value::String(unquote(body).to_string()));
    Ok(DefaultItem::Literal(literal))
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .unwrap_or(s)
}

fn namespace_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w+):(\w+)\(").expect("valid namespace regex"))
}

/// Rewrite `module:func(` calls to `module::func(`.
///
/// Already-normalized text is returned unchanged.
pub fn normalize_namespaces(expr: &str) -> String {
    namespace_call_re()
        .replace_all(expr, "${1}::${2}(")
        .into_owned()
}
