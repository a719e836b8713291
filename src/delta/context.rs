//! Explicit command context threaded through every lowering step.
//!
//! Handlers push a [`Frame`] before applying their children and pop it
//! afterwards; a child finds its container with [`CommandContext::nearest`].

use std::collections::{BTreeMap, BTreeSet};

use crate::db::PgName;
use crate::ops::{AlterItem, Priority};
use crate::schema::objects::SchemaObject;
use crate::schema::{ObjectKind, QualName, TypeRules};

use super::batch::TableBatcher;
use super::command::{Command, CommandKind, Delta};
use super::mapping::MappingMaintainer;
use super::names;
use super::ExpressionCompiler;

/// One level of the command stack.
#[derive(Debug)]
pub struct Frame {
    pub object: ObjectKind,
    pub kind: CommandKind,
    /// Name of the object once the command has been applied.
    pub name: QualName,
    pub original: Option<SchemaObject>,
    pub current: Option<SchemaObject>,
    /// Physical table of the object, when it has one.
    pub table: Option<PgName>,
    pub batcher: TableBatcher,
    /// Generic names of pointers created by child commands.
    pub created_pointers: BTreeSet<QualName>,
}

impl Frame {
    pub fn new(cmd: &Command, original: Option<SchemaObject>, current: Option<SchemaObject>) -> Self {
        Self {
            object: cmd.object,
            kind: cmd.kind,
            name: cmd.result_name().clone(),
            original,
            current,
            table: None,
            batcher: TableBatcher::new(),
            created_pointers: BTreeSet::new(),
        }
    }

    pub fn with_table(mut self, table: PgName) -> Self {
        self.table = Some(table);
        self
    }
}

/// Pre-scan of a whole delta: which objects it creates and renames.
///
/// Lowering consults it to skip work another command of the same delta
/// already covers.
#[derive(Debug, Clone, Default)]
pub struct DeltaSummary {
    created: BTreeSet<QualName>,
    deleted: BTreeSet<QualName>,
    /// Old name to new name.
    renamed: BTreeMap<QualName, QualName>,
}

impl DeltaSummary {
    pub fn scan(delta: &Delta) -> Self {
        let mut summary = Self::default();
        delta.walk(&mut |cmd| match cmd.kind {
            CommandKind::Create => {
                summary.created.insert(cmd.name.clone());
            }
            CommandKind::Delete => {
                summary.deleted.insert(cmd.name.clone());
            }
            CommandKind::Rename => {
                if let Some(new) = &cmd.new_name {
                    summary.renamed.insert(cmd.name.clone(), new.clone());
                }
            }
            CommandKind::Alter | CommandKind::Rebase => {}
        });
        summary
    }

    pub fn is_created(&self, name: &QualName) -> bool {
        self.created.contains(name)
    }

    pub fn is_deleted(&self, name: &QualName) -> bool {
        self.deleted.contains(name)
    }

    /// Whether `old` is renamed to `new` somewhere in the delta.
    pub fn is_rename(&self, old: &QualName, new: &QualName) -> bool {
        self.renamed.get(old) == Some(new)
    }

    /// Current name of something known under `name` before the delta.
    pub fn current_name(&self, name: &QualName) -> QualName {
        self.renamed.get(name).cloned().unwrap_or_else(|| name.clone())
    }

    /// Name an object had before the delta renamed it to `name`.
    pub fn previous_name(&self, name: &QualName) -> Option<&QualName> {
        self.renamed
            .iter()
            .find(|(_, new)| *new == name)
            .map(|(old, _)| old)
    }
}

pub struct CommandContext<'a> {
    frames: Vec<Frame>,
    pub summary: DeltaSummary,
    pub mappings: MappingMaintainer,
    pub rules: &'a TypeRules,
    pub expressions: &'a dyn ExpressionCompiler,
    /// Persisted link type ids by link name.
    link_ids: BTreeMap<QualName, i64>,
}

impl<'a> CommandContext<'a> {
    pub fn new(
        summary: DeltaSummary,
        rules: &'a TypeRules,
        expressions: &'a dyn ExpressionCompiler,
        link_ids: BTreeMap<QualName, i64>,
    ) -> Self {
        Self {
            frames: Vec::new(),
            summary,
            mappings: MappingMaintainer::new(),
            rules,
            expressions,
            link_ids,
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Innermost frame for an object of `kind`.
    pub fn nearest(&self, kind: ObjectKind) -> Option<&Frame> {
        self.frames.iter().rev().find(|f| f.object == kind)
    }

    pub fn nearest_mut(&mut self, kind: ObjectKind) -> Option<&mut Frame> {
        self.frames.iter_mut().rev().find(|f| f.object == kind)
    }

    /// Batcher of the innermost frame owning `table`.
    pub fn batcher_for(&mut self, table: &PgName) -> Option<&mut TableBatcher> {
        self.frames
            .iter_mut()
            .rev()
            .find(|f| f.table.as_ref() == Some(table))
            .map(|f| &mut f.batcher)
    }

    /// Queue `item` on the batch of the frame owning `table`, or on
    /// `fallback` when no enclosing command owns it.
    pub fn queue(
        &mut self,
        fallback: &mut TableBatcher,
        table: &PgName,
        priority: Priority,
        tag: Option<&'static str>,
        item: AlterItem,
    ) {
        let batcher = match self.batcher_for(table) {
            Some(batcher) => batcher,
            None => fallback,
        };
        batcher.get(table, priority, tag).push(item);
    }

    /// Type id of a link: the persisted one when the backend already knows
    /// the link (possibly under its pre-rename name), else a derived one.
    pub fn link_type_id(&self, name: &QualName) -> i64 {
        if let Some(id) = self.link_ids.get(name) {
            return *id;
        }
        if let Some(id) = self
            .summary
            .previous_name(name)
            .and_then(|old| self.link_ids.get(old))
        {
            return *id;
        }
        names::link_type_id(name)
    }
}
