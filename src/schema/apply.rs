//! Logical apply functions: the only way the snapshot changes.
//!
//! Each function updates the snapshot for one command and reports the object
//! before and after the change, which the physical lowering then diffs.

use crate::delta::command::{Command, CommandKind, PropValue};
use crate::error::DeltaError;

use super::name::QualName;
use super::objects::{Module, ObjectKind, SchemaObject};
use super::snapshot::{Schema, SchemaLookup};

/// Result of applying one command to the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub original: Option<SchemaObject>,
    pub current: Option<SchemaObject>,
}

impl Applied {
    /// The object as it is after the command, or as it was before a delete.
    pub fn object(&self) -> Option<&SchemaObject> {
        self.current.as_ref().or(self.original.as_ref())
    }
}

pub fn apply_module(
    schema: &mut Schema,
    cmd: &Command,
) -> Result<(Option<Module>, Option<Module>), DeltaError> {
    let name = cmd.name.module.clone();
    match cmd.kind {
        CommandKind::Create => {
            let imports = match cmd.new_value("imports") {
                Some(PropValue::Texts(imports)) => imports.clone(),
                _ => Vec::new(),
            };
            let module = Module { name, imports };
            schema.insert_module(module.clone());
            Ok((None, Some(module)))
        }
        CommandKind::Alter => {
            let original = schema
                .module(&name)
                .cloned()
                .ok_or_else(|| DeltaError::unknown(ObjectKind::Module, &cmd.name))?;
            let mut module = original.clone();
            if let Some(PropValue::Texts(imports)) = cmd.new_value("imports") {
                module.imports = imports.clone();
            }
            schema.insert_module(module.clone());
            Ok((Some(original), Some(module)))
        }
        CommandKind::Delete => {
            let original = schema
                .remove_module(&name)
                .ok_or_else(|| DeltaError::unknown(ObjectKind::Module, &cmd.name))?;
            Ok((Some(original), None))
        }
        CommandKind::Rename | CommandKind::Rebase => Err(DeltaError::UnsupportedCommand {
            command: cmd.kind.to_string(),
            kind: ObjectKind::Module,
        }),
    }
}

pub fn apply(schema: &mut Schema, cmd: &Command) -> Result<Applied, DeltaError> {
    match cmd.kind {
        CommandKind::Create => create(schema, cmd),
        CommandKind::Alter | CommandKind::Rebase => alter(schema, cmd),
        CommandKind::Rename => rename(schema, cmd),
        CommandKind::Delete => delete(schema, cmd),
    }
}

fn create(schema: &mut Schema, cmd: &Command) -> Result<Applied, DeltaError> {
    if schema.get(&cmd.name).is_some() {
        return Err(DeltaError::inconsistency(format!(
            "{} '{}' already exists",
            cmd.object, cmd.name
        )));
    }
    let mut obj = SchemaObject::empty(cmd.object, cmd.name.clone()).ok_or_else(|| {
        DeltaError::UnsupportedCommand {
            command: cmd.kind.to_string(),
            kind: cmd.object,
        }
    })?;
    for prop in &cmd.properties {
        set_property(&mut obj, &prop.name, prop.new.as_ref())?;
    }
    wire(schema, &obj)?;
    schema.insert(obj.clone());
    Ok(Applied {
        original: None,
        current: Some(obj),
    })
}

fn alter(schema: &mut Schema, cmd: &Command) -> Result<Applied, DeltaError> {
    let original = schema
        .get(&cmd.name)
        .cloned()
        .ok_or_else(|| DeltaError::unknown(cmd.object, &cmd.name))?;
    let mut obj = original.clone();
    for prop in &cmd.properties {
        set_property(&mut obj, &prop.name, prop.new.as_ref())?;
    }
    schema.insert(obj.clone());
    Ok(Applied {
        original: Some(original),
        current: Some(obj),
    })
}

fn rename(schema: &mut Schema, cmd: &Command) -> Result<Applied, DeltaError> {
    let new_name = cmd
        .new_name
        .clone()
        .ok_or_else(|| DeltaError::inconsistency(format!("rename of '{}' without a new name", cmd.name)))?;
    if schema.get(&new_name).is_some() {
        return Err(DeltaError::inconsistency(format!("'{}' already exists", new_name)));
    }
    let original = schema
        .remove(&cmd.name)
        .ok_or_else(|| DeltaError::unknown(cmd.object, &cmd.name))?;
    let mut obj = original.clone();
    obj.set_name(new_name.clone());
    schema.insert(obj);
    rename_references(schema, &cmd.name, &new_name);
    let current = schema.get(&new_name).cloned();
    Ok(Applied {
        original: Some(original),
        current,
    })
}

fn delete(schema: &mut Schema, cmd: &Command) -> Result<Applied, DeltaError> {
    let original = schema
        .remove(&cmd.name)
        .ok_or_else(|| DeltaError::unknown(cmd.object, &cmd.name))?;
    unwire(schema, &original);
    Ok(Applied {
        original: Some(original),
        current: None,
    })
}

/// Register a new pointer with its source.
fn wire(schema: &mut Schema, obj: &SchemaObject) -> Result<(), DeltaError> {
    match obj {
        SchemaObject::Link(link) => {
            if let Some(source) = &link.source {
                let normal = link.normal_name().clone();
                match schema.get_mut(source) {
                    Some(SchemaObject::Concept(c)) => {
                        c.pointers.insert(normal, link.name.clone());
                    }
                    _ => return Err(DeltaError::unknown(ObjectKind::Concept, source)),
                }
            }
        }
        SchemaObject::LinkProperty(prop) => {
            if let Some(source) = &prop.source {
                let normal = prop.normal_name().clone();
                match schema.get_mut(source) {
                    Some(SchemaObject::Link(l)) => {
                        l.properties.insert(normal, prop.name.clone());
                    }
                    _ => return Err(DeltaError::unknown(ObjectKind::Link, source)),
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn unwire(schema: &mut Schema, obj: &SchemaObject) {
    match obj {
        SchemaObject::Link(link) => {
            if let Some(SchemaObject::Concept(c)) =
                link.source.as_ref().and_then(|s| schema.get_mut(s))
            {
                c.pointers.retain(|_, spec| spec != &link.name);
            }
        }
        SchemaObject::LinkProperty(prop) => {
            if let Some(SchemaObject::Link(l)) =
                prop.source.as_ref().and_then(|s| schema.get_mut(s))
            {
                l.properties.retain(|_, spec| spec != &prop.name);
            }
        }
        _ => {}
    }
}

fn rename_references(schema: &mut Schema, old: &QualName, new: &QualName) {
    let swap = |n: &mut QualName| {
        if n == old {
            *n = new.clone();
        }
    };
    for obj in schema.objects_mut() {
        if let Some(bases) = obj.bases_mut() {
            bases.iter_mut().for_each(swap);
        }
        match obj {
            SchemaObject::Concept(c) => {
                c.pointers = std::mem::take(&mut c.pointers)
                    .into_iter()
                    .map(|(mut normal, mut spec)| {
                        swap(&mut normal);
                        swap(&mut spec);
                        (normal, spec)
                    })
                    .collect();
            }
            SchemaObject::Link(l) => {
                l.source.iter_mut().for_each(swap);
                l.target.iter_mut().for_each(swap);
                l.properties = std::mem::take(&mut l.properties)
                    .into_iter()
                    .map(|(mut normal, mut spec)| {
                        swap(&mut normal);
                        swap(&mut spec);
                        (normal, spec)
                    })
                    .collect();
            }
            SchemaObject::LinkProperty(p) => {
                p.source.iter_mut().for_each(swap);
                p.target.iter_mut().for_each(swap);
            }
            SchemaObject::Constraint(c) => c.subject.iter_mut().for_each(swap),
            SchemaObject::Index(i) => i.subject.iter_mut().for_each(swap),
            SchemaObject::Policy(p) => {
                p.subject.iter_mut().for_each(swap);
                p.event.iter_mut().for_each(swap);
                p.actions.iter_mut().for_each(swap);
            }
            SchemaObject::AttributeValue(v) => {
                v.subject.iter_mut().for_each(swap);
                v.attribute.iter_mut().for_each(swap);
            }
            _ => {}
        }
    }
}

fn bad_property(obj: &SchemaObject, name: &str) -> DeltaError {
    DeltaError::inconsistency(format!(
        "{} '{}' has no property '{}' of that type",
        obj.kind(),
        obj.name(),
        name
    ))
}

fn set_property(obj: &mut SchemaObject, name: &str, value: Option<&PropValue>) -> Result<(), DeltaError> {
    use PropValue as V;

    if name == "bases" {
        let bases = match value {
            Some(V::Names(names)) => names.clone(),
            None => Vec::new(),
            _ => return Err(bad_property(obj, name)),
        };
        return match obj.bases_mut() {
            Some(slot) => {
                *slot = bases;
                Ok(())
            }
            None => Err(bad_property(obj, name)),
        };
    }

    let text = |v: Option<&PropValue>| match v {
        Some(V::Text(t)) => Ok(Some(t.clone())),
        None => Ok(None),
        _ => Err(()),
    };
    let qual = |v: Option<&PropValue>| match v {
        Some(V::Name(n)) => Ok(Some(n.clone())),
        None => Ok(None),
        _ => Err(()),
    };
    let flag = |v: Option<&PropValue>| match v {
        Some(V::Bool(b)) => Ok(*b),
        None => Ok(false),
        _ => Err(()),
    };
    let default = |v: Option<&PropValue>| match v {
        Some(V::Default(items)) => Ok(items.clone()),
        None => Ok(Vec::new()),
        _ => Err(()),
    };

    let result: Result<(), ()> = match (&mut *obj, name) {
        (SchemaObject::Atom(a), "title") => text(value).map(|v| a.title = v),
        (SchemaObject::Atom(a), "is_abstract") => flag(value).map(|v| a.is_abstract = v),
        (SchemaObject::Atom(a), "default") => default(value).map(|v| a.default = v),

        (SchemaObject::Concept(c), "title") => text(value).map(|v| c.title = v),
        (SchemaObject::Concept(c), "is_abstract") => flag(value).map(|v| c.is_abstract = v),

        (SchemaObject::Link(l), "title") => text(value).map(|v| l.title = v),
        (SchemaObject::Link(l), "is_abstract") => flag(value).map(|v| l.is_abstract = v),
        (SchemaObject::Link(l), "source") => qual(value).map(|v| l.source = v),
        (SchemaObject::Link(l), "target") => qual(value).map(|v| l.target = v),
        (SchemaObject::Link(l), "required") => flag(value).map(|v| l.required = v),
        (SchemaObject::Link(l), "default") => default(value).map(|v| l.default = v),
        (SchemaObject::Link(l), "computable") => text(value).map(|v| l.computable = v),
        (SchemaObject::Link(l), "mapping") => match value {
            Some(V::Mapping(m)) => {
                l.mapping = *m;
                Ok(())
            }
            _ => Err(()),
        },

        (SchemaObject::LinkProperty(p), "title") => text(value).map(|v| p.title = v),
        (SchemaObject::LinkProperty(p), "source") => qual(value).map(|v| p.source = v),
        (SchemaObject::LinkProperty(p), "target") => qual(value).map(|v| p.target = v),
        (SchemaObject::LinkProperty(p), "required") => flag(value).map(|v| p.required = v),
        (SchemaObject::LinkProperty(p), "default") => default(value).map(|v| p.default = v),

        (SchemaObject::Constraint(c), "subject") => qual(value).map(|v| c.subject = v),
        (SchemaObject::Constraint(c), "check") => match value {
            Some(V::Check(check)) => {
                c.check = Some(check.clone());
                Ok(())
            }
            None => {
                c.check = None;
                Ok(())
            }
            _ => Err(()),
        },

        (SchemaObject::Index(i), "subject") => qual(value).map(|v| i.subject = v),
        (SchemaObject::Index(i), "expr") => text(value).map(|v| i.expr = v.unwrap_or_default()),

        (SchemaObject::Action(a), "title") => text(value).map(|v| a.title = v),
        (SchemaObject::Event(e), "title") => text(value).map(|v| e.title = v),

        (SchemaObject::Policy(p), "subject") => qual(value).map(|v| p.subject = v),
        (SchemaObject::Policy(p), "event") => qual(value).map(|v| p.event = v),
        (SchemaObject::Policy(p), "actions") => match value {
            Some(V::Names(names)) => {
                p.actions = names.clone();
                Ok(())
            }
            None => {
                p.actions.clear();
                Ok(())
            }
            _ => Err(()),
        },

        (SchemaObject::Attribute(a), "type") => text(value).map(|v| a.type_name = v.unwrap_or_default()),

        (SchemaObject::AttributeValue(v), "subject") => qual(value).map(|n| v.subject = n),
        (SchemaObject::AttributeValue(v), "attribute") => qual(value).map(|n| v.attribute = n),
        (SchemaObject::AttributeValue(v), "value") => text(value).map(|t| v.value = t.unwrap_or_default()),

        _ => Err(()),
    };
    result.map_err(|_| bad_property(obj, name))
}
