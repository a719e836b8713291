//! In-memory schema snapshot.
//!
//! [`SchemaLookup`] is the read interface the compiler consumes; [`Schema`] is
//! the concrete snapshot. Mutation goes through [`crate::schema::apply`] only.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::DeltaError;

use super::name::{qn, QualName};
use super::objects::{
    Atom, Concept, Link, LinkMapping, LinkProperty, Module, ObjectKind, SchemaObject,
};

/// Builtin scalar atoms and their native backend types.
pub const BUILTIN_ATOMS: &[(&str, &str)] = &[
    ("std::str", "text"),
    ("std::int16", "smallint"),
    ("std::int32", "integer"),
    ("std::int64", "bigint"),
    ("std::float", "double precision"),
    ("std::decimal", "numeric"),
    ("std::bool", "boolean"),
    ("std::uuid", "uuid"),
    ("std::datetime", "timestamp with time zone"),
    ("std::date", "date"),
    ("std::time", "time without time zone"),
    ("std::bytes", "bytea"),
    ("std::sequence", "text"),
];

pub const ROOT_CONCEPT: &str = "std::Object";
pub const ROOT_LINK: &str = "std::link";
pub const ID_LINK: &str = "std::id";
pub const SOURCE_PROPERTY: &str = "std::source";
pub const TARGET_PROPERTY: &str = "std::target";

/// Read/lookup interface over a schema snapshot.
pub trait SchemaLookup {
    fn get(&self, name: &QualName) -> Option<&SchemaObject>;

    fn objects_of_kind(&self, kind: ObjectKind) -> Vec<&SchemaObject>;

    fn modules(&self) -> Vec<&Module>;

    /// Whether `name` is `ancestor` or inherits from it.
    fn issubclass(&self, name: &QualName, ancestor: &QualName) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack = vec![name.clone()];
        while let Some(current) = stack.pop() {
            if &current == ancestor {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(obj) = self.get(&current) {
                stack.extend(obj.bases().iter().cloned());
            }
        }
        false
    }

    /// Objects of the same kind listing `name` as a direct base.
    fn children(&self, name: &QualName) -> Vec<&SchemaObject> {
        let Some(kind) = self.get(name).map(SchemaObject::kind) else {
            return Vec::new();
        };
        self.objects_of_kind(kind)
            .into_iter()
            .filter(|o| o.bases().contains(name))
            .collect()
    }

    fn descendants(&self, name: &QualName) -> Vec<&SchemaObject> {
        let mut result: Vec<&SchemaObject> = Vec::new();
        let mut seen = BTreeSet::new();
        let mut queue = vec![name.clone()];
        while let Some(current) = queue.pop() {
            for child in self.children(&current) {
                if seen.insert(child.name().clone()) {
                    queue.push(child.name().clone());
                    result.push(child);
                }
            }
        }
        result
    }
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    modules: BTreeMap<String, Module>,
    objects: BTreeMap<QualName, SchemaObject>,
}

impl SchemaLookup for Schema {
    fn get(&self, name: &QualName) -> Option<&SchemaObject> {
        self.objects.get(name)
    }

    fn objects_of_kind(&self, kind: ObjectKind) -> Vec<&SchemaObject> {
        self.objects.values().filter(|o| o.kind() == kind).collect()
    }

    fn modules(&self) -> Vec<&Module> {
        self.modules.values().collect()
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot holding the `std` module: builtin atoms, the root concept
    /// with its `id` pointer, and the root link with its endpoint properties.
    pub fn with_std() -> Self {
        let mut schema = Self::new();
        schema.modules.insert(
            "std".to_string(),
            Module {
                name: "std".to_string(),
                imports: Vec::new(),
            },
        );
        for (name, _) in BUILTIN_ATOMS {
            let name = qn(name);
            schema.objects.insert(
                name.clone(),
                SchemaObject::Atom(Atom {
                    name,
                    bases: Vec::new(),
                    default: Vec::new(),
                    is_abstract: false,
                    title: None,
                }),
            );
        }

        let root_link = Link {
            name: qn(ROOT_LINK),
            bases: Vec::new(),
            source: None,
            target: None,
            mapping: LinkMapping::ManyToMany,
            required: false,
            default: Vec::new(),
            computable: None,
            is_abstract: true,
            title: None,
            properties: BTreeMap::new(),
        };
        let mut id_link = root_link.clone();
        id_link.name = qn(ID_LINK);
        id_link.bases = vec![qn(ROOT_LINK)];
        id_link.is_abstract = false;
        id_link.mapping = LinkMapping::OneToOne;

        let id_spec = qn(ID_LINK).specialized_on(&qn(ROOT_CONCEPT));
        let mut id_on_object = id_link.clone();
        id_on_object.name = id_spec.clone();
        id_on_object.bases = vec![qn(ID_LINK)];
        id_on_object.source = Some(qn(ROOT_CONCEPT));
        id_on_object.target = Some(qn("std::uuid"));
        id_on_object.required = true;

        let mut pointers = BTreeMap::new();
        pointers.insert(qn(ID_LINK), id_spec);
        let object = Concept {
            name: qn(ROOT_CONCEPT),
            bases: Vec::new(),
            is_abstract: true,
            title: None,
            pointers,
        };

        for prop in [SOURCE_PROPERTY, TARGET_PROPERTY] {
            schema.objects.insert(
                qn(prop),
                SchemaObject::LinkProperty(LinkProperty {
                    name: qn(prop),
                    bases: Vec::new(),
                    source: None,
                    target: None,
                    required: false,
                    default: Vec::new(),
                    title: None,
                }),
            );
        }

        for obj in [
            SchemaObject::Link(root_link),
            SchemaObject::Link(id_link),
            SchemaObject::Link(id_on_object),
            SchemaObject::Concept(object),
        ] {
            schema.objects.insert(obj.name().clone(), obj);
        }
        schema
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn atom(&self, name: &QualName) -> Result<&Atom, DeltaError> {
        self.get(name)
            .and_then(SchemaObject::as_atom)
            .ok_or_else(|| DeltaError::unknown(ObjectKind::Atom, name))
    }

    pub fn concept(&self, name: &QualName) -> Result<&Concept, DeltaError> {
        self.get(name)
            .and_then(SchemaObject::as_concept)
            .ok_or_else(|| DeltaError::unknown(ObjectKind::Concept, name))
    }

    pub fn link(&self, name: &QualName) -> Result<&Link, DeltaError> {
        self.get(name)
            .and_then(SchemaObject::as_link)
            .ok_or_else(|| DeltaError::unknown(ObjectKind::Link, name))
    }

    pub fn link_property(&self, name: &QualName) -> Result<&LinkProperty, DeltaError> {
        self.get(name)
            .and_then(SchemaObject::as_link_property)
            .ok_or_else(|| DeltaError::unknown(ObjectKind::LinkProperty, name))
    }

    pub fn is_builtin_atom(&self, name: &QualName) -> bool {
        native_type_name(name).is_some()
    }

    pub fn is_atom(&self, name: &QualName) -> bool {
        matches!(self.get(name), Some(SchemaObject::Atom(_)))
    }

    /// C3 linearization of `name` and its ancestors.
    pub fn mro(&self, name: &QualName) -> Result<Vec<QualName>, DeltaError> {
        let obj = self
            .get(name)
            .ok_or_else(|| DeltaError::inconsistency(format!("unknown object '{}'", name)))?;
        let mut sequences: Vec<Vec<QualName>> = Vec::new();
        for base in obj.bases() {
            sequences.push(self.mro(base)?);
        }
        sequences.push(obj.bases().to_vec());

        let mut result = vec![name.clone()];
        loop {
            sequences.retain(|s| !s.is_empty());
            if sequences.is_empty() {
                return Ok(result);
            }
            let candidate = sequences
                .iter()
                .map(|s| &s[0])
                .find(|head| !sequences.iter().any(|s| s[1..].contains(*head)))
                .cloned()
                .ok_or_else(|| DeltaError::InconsistentBases { name: name.clone() })?;
            for seq in sequences.iter_mut() {
                if seq.first() == Some(&candidate) {
                    seq.remove(0);
                }
            }
            result.push(candidate);
        }
    }

    /// Own and inherited pointers of a concept, keyed by generic name.
    ///
    /// Specializations closer in the linearization win.
    pub fn pointers_of(&self, concept: &QualName) -> Result<BTreeMap<QualName, QualName>, DeltaError> {
        let mut result = BTreeMap::new();
        for ancestor in self.mro(concept)? {
            if let Some(SchemaObject::Concept(c)) = self.get(&ancestor) {
                for (normal, spec) in &c.pointers {
                    result.entry(normal.clone()).or_insert_with(|| spec.clone());
                }
            }
        }
        Ok(result)
    }

    /// Own and inherited properties of a link, keyed by generic name.
    pub fn properties_of(&self, link: &QualName) -> Result<BTreeMap<QualName, QualName>, DeltaError> {
        let mut result = BTreeMap::new();
        for ancestor in self.mro(link)? {
            if let Some(SchemaObject::Link(l)) = self.get(&ancestor) {
                for (normal, spec) in &l.properties {
                    result.entry(normal.clone()).or_insert_with(|| spec.clone());
                }
            }
        }
        Ok(result)
    }

    pub(crate) fn insert_module(&mut self, module: Module) {
        self.modules.insert(module.name.clone(), module);
    }

    pub(crate) fn remove_module(&mut self, name: &str) -> Option<Module> {
        self.modules.remove(name)
    }

    pub(crate) fn insert(&mut self, obj: SchemaObject) {
        self.objects.insert(obj.name().clone(), obj);
    }

    pub(crate) fn remove(&mut self, name: &QualName) -> Option<SchemaObject> {
        self.objects.remove(name)
    }

    pub(crate) fn get_mut(&mut self, name: &QualName) -> Option<&mut SchemaObject> {
        self.objects.get_mut(name)
    }

    pub(crate) fn objects_mut(&mut self) -> impl Iterator<Item = &mut SchemaObject> {
        self.objects.values_mut()
    }
}

/// Native backend type of a builtin atom.
pub fn native_type_name(name: &QualName) -> Option<&'static str> {
    let full = name.to_string();
    BUILTIN_ATOMS
        .iter()
        .find(|(atom, _)| *atom == full)
        .map(|(_, native)| *native)
}
