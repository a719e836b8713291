//! Delta compiler: lowers logical schema commands into physical operations.
//!
//! Compilation walks the command tree once. Every command is first applied
//! to the in-memory snapshot (see [`crate::schema::apply`]) and then lowered
//! by the handler registered for its `(object kind, command kind)` pair.
//! Lowering never talks to the backend: the operations it produces carry
//! existence guards that the [`scheduler`] evaluates at execution time.
//!
//! # Type Decisions
//!
//! **Why a `fn` table instead of a trait object per object kind?** Handlers
//! share no state besides the [`context::CommandContext`] they receive, so a
//! plain lookup table keeps dispatch explicit and makes a missing pair a
//! reportable error rather than a compile-time hole.

pub mod atom;
pub mod batch;
pub mod command;
pub mod concept;
pub mod constraint;
pub mod context;
pub mod handlers;
pub mod index;
pub mod inheritance;
pub mod link;
pub mod mapping;
pub mod metadata;
pub mod module;
pub mod names;
pub mod property;
pub mod realm;
pub mod records;
pub mod scheduler;
pub mod storage;
#[cfg(test)]
mod scenarios;
pub mod typechange;

use serde_json::Value;
use tracing::info_span;

use crate::db::{quote_literal, Session};
use crate::error::DeltaError;
use crate::schema::payload::DefaultItem;
use crate::schema::{Schema, TypeRules};

pub use command::{Command, CommandKind, Delta, PgOp, PropValue, PropertyDelta};
pub use realm::RealmIntrospection;
pub use scheduler::ExecutionReport;

/// Turns a schema expression into a SQL fragment evaluated against `subject`.
///
/// Query compilation lives outside this crate; the delta compiler only needs
/// fragments for defaults, check expressions and index expressions.
pub trait ExpressionCompiler {
    fn compile(&self, expr: &str, subject: &str) -> Result<String, DeltaError>;
}

/// Uses expressions as SQL verbatim, substituting `$subject`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCompiler;

impl ExpressionCompiler for PassthroughCompiler {
    fn compile(&self, expr: &str, subject: &str) -> Result<String, DeltaError> {
        Ok(expr.replace("$subject", subject))
    }
}

/// SQL default expression for the first entry of a default list.
pub(crate) fn render_default(
    items: &[DefaultItem],
    expressions: &dyn ExpressionCompiler,
) -> Result<Option<String>, DeltaError> {
    let Some(first) = items.first() else {
        return Ok(None);
    };
    let sql = match first {
        DefaultItem::Expr(expr) => expressions.compile(expr, "VALUE")?,
        DefaultItem::Literal(Value::Null) => "NULL".to_string(),
        DefaultItem::Literal(Value::Bool(b)) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        DefaultItem::Literal(Value::Number(n)) => n.to_string(),
        DefaultItem::Literal(Value::String(s)) => quote_literal(s),
        DefaultItem::Literal(other) => quote_literal(&other.to_string()),
    };
    Ok(Some(sql))
}

pub struct DeltaCompiler {
    rules: TypeRules,
    expressions: Box<dyn ExpressionCompiler>,
}

impl Default for DeltaCompiler {
    fn default() -> Self {
        Self::new(TypeRules::standard(), Box::new(PassthroughCompiler))
    }
}

impl DeltaCompiler {
    pub fn new(rules: TypeRules, expressions: Box<dyn ExpressionCompiler>) -> Self {
        Self { rules, expressions }
    }

    /// Apply `delta` to `schema` and attach physical operations to every
    /// command and to the delta itself.
    pub fn compile(
        &self,
        schema: &mut Schema,
        delta: &mut Delta,
        backend: &RealmIntrospection,
    ) -> Result<(), DeltaError> {
        realm::compile_realm(schema, delta, backend, &self.rules, self.expressions.as_ref())
    }
}

/// Bring the backend to the current format, then compile `delta` against it
/// and execute it in one transaction.
///
/// A backend newer than this build is refused with
/// [`DeltaError::UnsupportedFormat`] before anything is compiled.
pub fn apply_delta(
    session: &mut dyn Session,
    schema: &mut Schema,
    delta: &mut Delta,
    compiler: &DeltaCompiler,
) -> Result<ExecutionReport, DeltaError> {
    let span = info_span!("delta", commands = delta.commands.len());
    let _guard = span.enter();
    crate::upgrade::upgrade(session)?;
    let backend = RealmIntrospection::load(session)?;
    compiler.compile(schema, delta, &backend)?;
    scheduler::execute(session, delta)
}
