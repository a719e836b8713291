//! Schema object definitions.
//!
//! These are the logical entities a delta manipulates. They carry only what the
//! physical compiler needs: names, bases, pointer wiring and the few attributes
//! that influence storage (cardinality, required flags, defaults).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::name::QualName;
use super::payload::DefaultItem;

/// Kind of schema object a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Module,
    Atom,
    Concept,
    Link,
    LinkProperty,
    Constraint,
    Index,
    Action,
    Event,
    Policy,
    Attribute,
    AttributeValue,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectKind::Module => "module",
            ObjectKind::Atom => "atom",
            ObjectKind::Concept => "concept",
            ObjectKind::Link => "link",
            ObjectKind::LinkProperty => "link property",
            ObjectKind::Constraint => "constraint",
            ObjectKind::Index => "index",
            ObjectKind::Action => "action",
            ObjectKind::Event => "event",
            ObjectKind::Policy => "policy",
            ObjectKind::Attribute => "attribute",
            ObjectKind::AttributeValue => "attribute value",
        };
        f.write_str(s)
    }
}

/// Cardinality class of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LinkMapping {
    #[serde(rename = "11")]
    OneToOne,
    #[serde(rename = "1*")]
    OneToMany,
    #[serde(rename = "*1")]
    ManyToOne,
    #[serde(rename = "**")]
    ManyToMany,
}

impl LinkMapping {
    /// Two-character code used in metadata rows and index names.
    pub fn code(self) -> &'static str {
        match self {
            LinkMapping::OneToOne => "11",
            LinkMapping::OneToMany => "1*",
            LinkMapping::ManyToOne => "*1",
            LinkMapping::ManyToMany => "**",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "11" => Some(LinkMapping::OneToOne),
            "1*" => Some(LinkMapping::OneToMany),
            "*1" => Some(LinkMapping::ManyToOne),
            "**" => Some(LinkMapping::ManyToMany),
            _ => None,
        }
    }

    /// Whether a source object holds at most one target.
    pub fn is_singular(self) -> bool {
        matches!(self, LinkMapping::OneToOne | LinkMapping::ManyToOne)
    }
}

impl Default for LinkMapping {
    fn default() -> Self {
        LinkMapping::ManyToOne
    }
}

/// Literal argument of a value constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// What a constraint checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "arg")]
pub enum ConstraintCheck {
    MinValue(Literal),
    MaxValue(Literal),
    MinLength(i64),
    MaxLength(i64),
    Regexp(String),
    Unique,
    Expression(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub imports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub name: QualName,
    pub bases: Vec<QualName>,
    pub default: Vec<DefaultItem>,
    pub is_abstract: bool,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub name: QualName,
    pub bases: Vec<QualName>,
    pub is_abstract: bool,
    pub title: Option<String>,
    /// Own pointers: generic (normal) name to the specialization on this concept.
    pub pointers: BTreeMap<QualName, QualName>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub name: QualName,
    pub bases: Vec<QualName>,
    pub source: Option<QualName>,
    pub target: Option<QualName>,
    pub mapping: LinkMapping,
    pub required: bool,
    pub default: Vec<DefaultItem>,
    pub computable: Option<String>,
    pub is_abstract: bool,
    pub title: Option<String>,
    /// Own properties: generic name to the specialization on this link.
    pub properties: BTreeMap<QualName, QualName>,
}

impl Link {
    /// A generic link is defined without a concrete source.
    pub fn is_generic(&self) -> bool {
        self.source.is_none()
    }

    /// Name of the generic link this pointer specializes.
    pub fn normal_name(&self) -> &QualName {
        if self.is_generic() {
            &self.name
        } else {
            self.bases.first().unwrap_or(&self.name)
        }
    }

    pub fn is_pure_computable(&self) -> bool {
        self.computable.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkProperty {
    pub name: QualName,
    pub bases: Vec<QualName>,
    pub source: Option<QualName>,
    pub target: Option<QualName>,
    pub required: bool,
    pub default: Vec<DefaultItem>,
    pub title: Option<String>,
}

impl LinkProperty {
    pub fn is_generic(&self) -> bool {
        self.source.is_none()
    }

    pub fn normal_name(&self) -> &QualName {
        if self.is_generic() {
            &self.name
        } else {
            self.bases.first().unwrap_or(&self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: QualName,
    pub subject: Option<QualName>,
    pub check: Option<ConstraintCheck>,
}

/// Expression index defined on a concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceIndex {
    pub name: QualName,
    pub subject: Option<QualName>,
    pub expr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: QualName,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: QualName,
    pub bases: Vec<QualName>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub name: QualName,
    pub subject: Option<QualName>,
    pub event: Option<QualName>,
    pub actions: Vec<QualName>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: QualName,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub name: QualName,
    pub subject: Option<QualName>,
    pub attribute: Option<QualName>,
    pub value: String,
}

/// Any named schema entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaObject {
    Atom(Atom),
    Concept(Concept),
    Link(Link),
    LinkProperty(LinkProperty),
    Constraint(Constraint),
    Index(SourceIndex),
    Action(Action),
    Event(Event),
    Policy(Policy),
    Attribute(Attribute),
    AttributeValue(AttributeValue),
}

impl SchemaObject {
    /// Blank object of the given kind, ready to receive properties.
    pub fn empty(kind: ObjectKind, name: QualName) -> Option<Self> {
        let obj = match kind {
            ObjectKind::Module => return None,
            ObjectKind::Atom => SchemaObject::Atom(Atom {
                name,
                bases: Vec::new(),
                default: Vec::new(),
                is_abstract: false,
                title: None,
            }),
            ObjectKind::Concept => SchemaObject::Concept(Concept {
                name,
                bases: Vec::new(),
                is_abstract: false,
                title: None,
                pointers: BTreeMap::new(),
            }),
            ObjectKind::Link => SchemaObject::Link(Link {
                name,
                bases: Vec::new(),
                source: None,
                target: None,
                mapping: LinkMapping::default(),
                required: false,
                default: Vec::new(),
                computable: None,
                is_abstract: false,
                title: None,
                properties: BTreeMap::new(),
            }),
            ObjectKind::LinkProperty => SchemaObject::LinkProperty(LinkProperty {
                name,
                bases: Vec::new(),
                source: None,
                target: None,
                required: false,
                default: Vec::new(),
                title: None,
            }),
            ObjectKind::Constraint => SchemaObject::Constraint(Constraint {
                name,
                subject: None,
                check: None,
            }),
            ObjectKind::Index => SchemaObject::Index(SourceIndex {
                name,
                subject: None,
                expr: String::new(),
            }),
            ObjectKind::Action => SchemaObject::Action(Action { name, title: None }),
            ObjectKind::Event => SchemaObject::Event(Event {
                name,
                bases: Vec::new(),
                title: None,
            }),
            ObjectKind::Policy => SchemaObject::Policy(Policy {
                name,
                subject: None,
                event: None,
                actions: Vec::new(),
            }),
            ObjectKind::Attribute => SchemaObject::Attribute(Attribute {
                name,
                type_name: String::new(),
            }),
            ObjectKind::AttributeValue => SchemaObject::AttributeValue(AttributeValue {
                name,
                subject: None,
                attribute: None,
                value: String::new(),
            }),
        };
        Some(obj)
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            SchemaObject::Atom(_) => ObjectKind::Atom,
            SchemaObject::Concept(_) => ObjectKind::Concept,
            SchemaObject::Link(_) => ObjectKind::Link,
            SchemaObject::LinkProperty(_) => ObjectKind::LinkProperty,
            SchemaObject::Constraint(_) => ObjectKind::Constraint,
            SchemaObject::Index(_) => ObjectKind::Index,
            SchemaObject::Action(_) => ObjectKind::Action,
            SchemaObject::Event(_) => ObjectKind::Event,
            SchemaObject::Policy(_) => ObjectKind::Policy,
            SchemaObject::Attribute(_) => ObjectKind::Attribute,
            SchemaObject::AttributeValue(_) => ObjectKind::AttributeValue,
        }
    }

    pub fn name(&self) -> &QualName {
        match self {
            SchemaObject::Atom(o) => &o.name,
            SchemaObject::Concept(o) => &o.name,
            SchemaObject::Link(o) => &o.name,
            SchemaObject::LinkProperty(o) => &o.name,
            SchemaObject::Constraint(o) => &o.name,
            SchemaObject::Index(o) => &o.name,
            SchemaObject::Action(o) => &o.name,
            SchemaObject::Event(o) => &o.name,
            SchemaObject::Policy(o) => &o.name,
            SchemaObject::Attribute(o) => &o.name,
            SchemaObject::AttributeValue(o) => &o.name,
        }
    }

    pub fn set_name(&mut self, name: QualName) {
        match self {
            SchemaObject::Atom(o) => o.name = name,
            SchemaObject::Concept(o) => o.name = name,
            SchemaObject::Link(o) => o.name = name,
            SchemaObject::LinkProperty(o) => o.name = name,
            SchemaObject::Constraint(o) => o.name = name,
            SchemaObject::Index(o) => o.name = name,
            SchemaObject::Action(o) => o.name = name,
            SchemaObject::Event(o) => o.name = name,
            SchemaObject::Policy(o) => o.name = name,
            SchemaObject::Attribute(o) => o.name = name,
            SchemaObject::AttributeValue(o) => o.name = name,
        }
    }

    /// Direct bases, for the kinds that have them.
    pub fn bases(&self) -> &[QualName] {
        match self {
            SchemaObject::Atom(o) => &o.bases,
            SchemaObject::Concept(o) => &o.bases,
            SchemaObject::Link(o) => &o.bases,
            SchemaObject::LinkProperty(o) => &o.bases,
            SchemaObject::Event(o) => &o.bases,
            _ => &[],
        }
    }

    pub fn bases_mut(&mut self) -> Option<&mut Vec<QualName>> {
        match self {
            SchemaObject::Atom(o) => Some(&mut o.bases),
            SchemaObject::Concept(o) => Some(&mut o.bases),
            SchemaObject::Link(o) => Some(&mut o.bases),
            SchemaObject::LinkProperty(o) => Some(&mut o.bases),
            SchemaObject::Event(o) => Some(&mut o.bases),
            _ => None,
        }
    }

    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            SchemaObject::Atom(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_concept(&self) -> Option<&Concept> {
        match self {
            SchemaObject::Concept(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<&Link> {
        match self {
            SchemaObject::Link(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_link_property(&self) -> Option<&LinkProperty> {
        match self {
            SchemaObject::LinkProperty(p) => Some(p),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::name::qn;
    use rstest::rstest;

    #[rstest]
    #[case(LinkMapping::OneToOne, "11", true)]
    #[case(LinkMapping::OneToMany, "1*", false)]
    #[case(LinkMapping::ManyToOne, "*1", true)]
    #[case(LinkMapping::ManyToMany, "**", false)]
    fn test_mapping_codes(#[case] mapping: LinkMapping, #[case] code: &str, #[case] singular: bool) {
        assert_eq!(mapping.code(), code);
        assert_eq!(LinkMapping::from_code(code), Some(mapping));
        assert_eq!(mapping.is_singular(), singular);
    }

    #[test]
    fn test_normal_name_of_specialization() {
        let Some(SchemaObject::Link(mut link)) =
            SchemaObject::empty(ObjectKind::Link, qn("app::name@Person"))
        else {
            panic!("expected link");
        };
        link.source = Some(qn("app::Person"));
        link.bases = vec![qn("app::name")];
        assert!(!link.is_generic());
        assert_eq!(link.normal_name(), &qn("app::name"));
    }

    #[test]
    fn test_modules_have_no_object_form() {
        assert!(SchemaObject::empty(ObjectKind::Module, qn("app")).is_none());
    }

    #[test]
    fn test_constraint_check_serde() {
        let check = ConstraintCheck::MinValue(Literal::Int(0));
        let json = serde_json::to_string(&check).unwrap();
        assert_eq!(json, r#"{"kind":"min_value","arg":0}"#);
    }
}
