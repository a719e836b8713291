//! Operator result-type rules.
//!
//! Rules are grouped by `(operator, arity)` and consulted in registration
//! order. The first rule whose parameter types accept the arguments decides
//! the result; a more specific rule registered later never overrides it.

use std::collections::BTreeMap;

use super::name::{qn, QualName};
use super::objects::Literal;
use super::snapshot::{SchemaLookup, BUILTIN_ATOMS};

/// Types known independently of any schema, ordered by a fixed hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NativeType {
    Any,
    Number,
    Integer,
    String,
    Bool,
    Uuid,
    DateTime,
    Bytes,
}

impl NativeType {
    fn parent(self) -> Option<NativeType> {
        match self {
            NativeType::Any => None,
            NativeType::Integer => Some(NativeType::Number),
            _ => Some(NativeType::Any),
        }
    }

    pub fn is_subtype_of(self, other: NativeType) -> bool {
        let mut current = Some(self);
        while let Some(t) = current {
            if t == other {
                return true;
            }
            current = t.parent();
        }
        false
    }

    /// Native type a builtin atom maps to.
    pub fn of_builtin(name: &QualName) -> Option<NativeType> {
        let native = match name.to_string().as_str() {
            "std::int16" | "std::int32" | "std::int64" => NativeType::Integer,
            "std::float" | "std::decimal" => NativeType::Number,
            "std::str" | "std::sequence" => NativeType::String,
            "std::bool" => NativeType::Bool,
            "std::uuid" => NativeType::Uuid,
            "std::datetime" | "std::date" | "std::time" => NativeType::DateTime,
            "std::bytes" => NativeType::Bytes,
            _ => return None,
        };
        Some(native)
    }

    pub fn of_literal(lit: &Literal) -> NativeType {
        match lit {
            Literal::Bool(_) => NativeType::Bool,
            Literal::Int(_) => NativeType::Integer,
            Literal::Float(_) => NativeType::Number,
            Literal::Str(_) => NativeType::String,
        }
    }
}

/// Argument or result type of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Native(NativeType),
    Named(QualName),
}

impl From<NativeType> for TypeRef {
    fn from(t: NativeType) -> Self {
        TypeRef::Native(t)
    }
}

impl From<QualName> for TypeRef {
    fn from(n: QualName) -> Self {
        TypeRef::Named(n)
    }
}

/// Declared rule result: either a concrete type or a schema name looked up
/// at resolution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleResult {
    Type(TypeRef),
    Name(QualName),
}

#[derive(Debug, Clone)]
struct Rule {
    params: Vec<TypeRef>,
    result: RuleResult,
}

#[derive(Debug, Clone, Default)]
pub struct TypeRules {
    rules: BTreeMap<(String, usize), Vec<Rule>>,
}

impl TypeRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules the compiler relies on for constraint checks.
    pub fn standard() -> Self {
        let mut rules = Self::new();
        let bool_result = || RuleResult::Name(qn("std::bool"));
        for op in [">=", "<=", ">", "<", "=", "!="] {
            rules.register(
                op,
                vec![NativeType::Number.into(), NativeType::Number.into()],
                bool_result(),
            );
            rules.register(
                op,
                vec![NativeType::String.into(), NativeType::String.into()],
                bool_result(),
            );
            rules.register(
                op,
                vec![NativeType::DateTime.into(), NativeType::DateTime.into()],
                bool_result(),
            );
        }
        rules.register(
            "~",
            vec![NativeType::String.into(), NativeType::String.into()],
            bool_result(),
        );
        rules.register(
            "char_length",
            vec![NativeType::String.into()],
            RuleResult::Name(qn("std::int64")),
        );
        for op in ["+", "-", "*"] {
            rules.register(
                op,
                vec![NativeType::Integer.into(), NativeType::Integer.into()],
                RuleResult::Type(NativeType::Integer.into()),
            );
            rules.register(
                op,
                vec![NativeType::Number.into(), NativeType::Number.into()],
                RuleResult::Type(NativeType::Number.into()),
            );
        }
        rules
    }

    /// Add a rule. Registering a signature again replaces its result and
    /// keeps its original position.
    pub fn register(&mut self, operator: &str, params: Vec<TypeRef>, result: RuleResult) {
        let rules = self.rules.entry((operator.to_string(), params.len())).or_default();
        match rules.iter_mut().find(|rule| rule.params == params) {
            Some(rule) => rule.result = result,
            None => rules.push(Rule { params, result }),
        }
    }

    /// Result type of `operator` applied to `args`, or `None` when no rule
    /// accepts them.
    pub fn resolve(
        &self,
        operator: &str,
        args: &[TypeRef],
        schema: &dyn SchemaLookup,
    ) -> Option<TypeRef> {
        let candidates = self.rules.get(&(operator.to_string(), args.len()))?;
        let rule = candidates.iter().find(|rule| {
            rule.params
                .iter()
                .zip(args)
                .all(|(param, arg)| accepts(schema, param, arg))
        })?;
        match &rule.result {
            RuleResult::Type(t) => Some(t.clone()),
            RuleResult::Name(name) => schema.get(name).map(|obj| TypeRef::Named(obj.name().clone())),
        }
    }
}

/// Native type of a schema atom, found through its builtin ancestor.
pub fn native_of(schema: &dyn SchemaLookup, name: &QualName) -> Option<NativeType> {
    BUILTIN_ATOMS
        .iter()
        .map(|(builtin, _)| qn(builtin))
        .find(|builtin| schema.issubclass(name, builtin))
        .and_then(|builtin| NativeType::of_builtin(&builtin))
}

fn accepts(schema: &dyn SchemaLookup, param: &TypeRef, arg: &TypeRef) -> bool {
    match (param, arg) {
        (TypeRef::Native(p), TypeRef::Native(a)) => a.is_subtype_of(*p),
        (TypeRef::Named(p), TypeRef::Named(a)) => schema.issubclass(a, p),
        (TypeRef::Native(p), TypeRef::Named(a)) => {
            native_of(schema, a).is_some_and(|n| n.is_subtype_of(*p))
        }
        (TypeRef::Named(_), TypeRef::Native(_)) => false,
    }
}
