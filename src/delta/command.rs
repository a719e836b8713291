//! Logical commands and the physical operations they own.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ops::Operation;
use crate::schema::name::QualName;
use crate::schema::objects::{ConstraintCheck, LinkMapping, ObjectKind};
use crate::schema::payload::DefaultItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Create,
    Rename,
    Rebase,
    Alter,
    Delete,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandKind::Create => "create",
            CommandKind::Rename => "rename",
            CommandKind::Rebase => "rebase",
            CommandKind::Alter => "alter",
            CommandKind::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Value carried by a property delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum PropValue {
    Bool(bool),
    Text(String),
    Texts(Vec<String>),
    Name(QualName),
    Names(Vec<QualName>),
    Mapping(LinkMapping),
    Default(Vec<DefaultItem>),
    Check(ConstraintCheck),
}

/// Old/new pair for one property of a schema object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDelta {
    pub name: String,
    pub old: Option<PropValue>,
    pub new: Option<PropValue>,
}

/// Entry of a command's physical operation list.
#[derive(Debug, Clone, PartialEq)]
pub enum PgOp {
    Op(Operation),
    /// Position at which the operations of child commands are spliced.
    Children,
}

/// One logical mutation of a schema object.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: CommandKind,
    pub object: ObjectKind,
    pub name: QualName,
    pub new_name: Option<QualName>,
    pub properties: Vec<PropertyDelta>,
    pub children: Vec<Command>,
    pub pgops: Vec<PgOp>,
}

impl Command {
    pub fn new(kind: CommandKind, object: ObjectKind, name: QualName) -> Self {
        Self {
            kind,
            object,
            name,
            new_name: None,
            properties: Vec::new(),
            children: Vec::new(),
            pgops: Vec::new(),
        }
    }

    pub fn create(object: ObjectKind, name: QualName) -> Self {
        Self::new(CommandKind::Create, object, name)
    }

    pub fn alter(object: ObjectKind, name: QualName) -> Self {
        Self::new(CommandKind::Alter, object, name)
    }

    pub fn delete(object: ObjectKind, name: QualName) -> Self {
        Self::new(CommandKind::Delete, object, name)
    }

    pub fn rename(object: ObjectKind, name: QualName, new_name: QualName) -> Self {
        let mut cmd = Self::new(CommandKind::Rename, object, name);
        cmd.new_name = Some(new_name);
        cmd
    }

    pub fn rebase(object: ObjectKind, name: QualName, old: Vec<QualName>, new: Vec<QualName>) -> Self {
        Self::new(CommandKind::Rebase, object, name).change(
            "bases",
            Some(PropValue::Names(old)),
            Some(PropValue::Names(new)),
        )
    }

    /// Set a property on a new object.
    pub fn with(self, name: &str, value: PropValue) -> Self {
        self.change(name, None, Some(value))
    }

    /// Record an old/new change of a property.
    pub fn change(mut self, name: &str, old: Option<PropValue>, new: Option<PropValue>) -> Self {
        self.properties.push(PropertyDelta {
            name: name.to_string(),
            old,
            new,
        });
        self
    }

    pub fn child(mut self, cmd: Command) -> Self {
        self.children.push(cmd);
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDelta> {
        self.properties.iter().rev().find(|p| p.name == name)
    }

    pub fn new_value(&self, name: &str) -> Option<&PropValue> {
        self.property(name).and_then(|p| p.new.as_ref())
    }

    /// Name of the object once this command has been applied.
    pub fn result_name(&self) -> &QualName {
        self.new_name.as_ref().unwrap_or(&self.name)
    }

    pub fn push_op(&mut self, op: Operation) {
        self.pgops.push(PgOp::Op(op));
    }

    pub fn extend_ops(&mut self, ops: impl IntoIterator<Item = Operation>) {
        self.pgops.extend(ops.into_iter().map(PgOp::Op));
    }

    /// Operations owned by this command alone, in discovery order.
    pub fn own_ops(&self) -> impl Iterator<Item = &Operation> {
        self.pgops.iter().filter_map(|op| match op {
            PgOp::Op(op) => Some(op),
            PgOp::Children => None,
        })
    }

    /// Walk this command and all descendants, depth first.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Command)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// Ordered set of commands forming one schema change transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
    pub commands: Vec<Command>,
    /// Realm-level operations: bootstrap, deferred index maintenance and the
    /// format marker update.
    pub pgops: Vec<PgOp>,
}

impl Delta {
    pub fn new(commands: Vec<Command>) -> Self {
        Self {
            commands,
            pgops: Vec::new(),
        }
    }

    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Command)) {
        for cmd in &self.commands {
            cmd.walk(visit);
        }
    }
}
