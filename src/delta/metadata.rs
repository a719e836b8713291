//! The `sd_meta` catalog: table definitions, bootstrap operations and the
//! row shape of each schema object.

use crate::db::SqlValue;
use crate::ops::{
    record, Column, Condition, CreateCompositeType, CreateExtension, CreateSchema, CreateTable,
    Delete, Filter, Insert, Merge, Operation, Record, TableConstraint, Update,
};
use crate::schema::objects::{
    Action, Atom, Attribute, AttributeValue, Concept, Constraint, Event, Link, LinkProperty, Module,
    Policy, SourceIndex,
};
use crate::schema::payload::write_default;
use crate::schema::snapshot::{ROOT_CONCEPT, ROOT_LINK};
use crate::schema::QualName;

use super::names::{self, meta_table, META_SCHEMA};

pub const UUID_EXTENSION: &str = "uuid-ossp";
pub const LINK_ENDPOINTS_TYPE: &str = "link_endpoints_t";

fn text(name: &str) -> Column {
    Column::new(name, "text")
}

fn flag(name: &str) -> Column {
    Column::new(name, "boolean")
        .required(true)
        .with_default(Some("false".to_string()))
}

fn texts(name: &str) -> Column {
    Column::new(name, "text[]")
}

fn named_table(table: &str, columns: Vec<Column>) -> CreateTable {
    let mut create = CreateTable::new(meta_table(table))
        .column(text("name").required(true))
        .constraint(TableConstraint::primary_key(format!("{}_pkey", table), &["name"]));
    for column in columns {
        create = create.column(column);
    }
    create
}

pub fn feature_table() -> CreateTable {
    named_table("feature", vec![text("class_name").required(true)])
}

pub fn backend_info_table() -> CreateTable {
    CreateTable::new(meta_table("backend_info"))
        .column(
            Column::new("id", "integer")
                .required(true)
                .with_default(Some("1".to_string())),
        )
        .column(Column::new("format_version", "integer").required(true))
        .constraint(TableConstraint::primary_key("backend_info_pkey", &["id"]))
        .constraint(TableConstraint::check("backend_info_single_row", "\"id\" = 1"))
}

pub fn module_table() -> CreateTable {
    named_table("module", vec![text("schema_name").required(true), texts("imports")])
}

pub fn atom_table() -> CreateTable {
    named_table(
        "atom",
        vec![text("title"), flag("is_abstract"), texts("bases"), text("default")],
    )
}

pub fn concept_table() -> CreateTable {
    named_table(
        "concept",
        vec![text("title"), flag("is_abstract"), texts("bases"), flag("automatic")],
    )
}

pub fn link_table() -> CreateTable {
    named_table(
        "link",
        vec![
            text("title"),
            flag("is_abstract"),
            texts("bases"),
            text("source"),
            text("target"),
            text("mapping").required(true),
            flag("required"),
            text("default"),
            text("computable"),
            Column::new("link_type_id", "integer").required(true),
            text("exposed_behaviour"),
            texts("spectargets"),
        ],
    )
}

pub fn link_property_table() -> CreateTable {
    named_table(
        "link_property",
        vec![
            text("title"),
            texts("bases"),
            text("source"),
            text("target"),
            flag("required"),
            text("default"),
        ],
    )
}

pub fn constraint_table() -> CreateTable {
    named_table("constraint", vec![text("subject"), text("check")])
}

pub fn index_table() -> CreateTable {
    named_table("index", vec![text("subject"), text("expr").required(true)])
}

pub fn action_table() -> CreateTable {
    named_table("action", vec![text("title")])
}

pub fn event_table() -> CreateTable {
    named_table("event", vec![text("title"), texts("bases")])
}

pub fn policy_table() -> CreateTable {
    named_table(
        "policy",
        vec![text("subject"), text("event"), texts("actions")],
    )
}

pub fn attribute_table() -> CreateTable {
    named_table("attribute", vec![text("type").required(true)])
}

pub fn attribute_value_table() -> CreateTable {
    named_table(
        "attribute_value",
        vec![text("subject"), text("attribute"), text("value")],
    )
}

pub fn link_endpoints_type() -> CreateCompositeType {
    CreateCompositeType {
        name: meta_table(LINK_ENDPOINTS_TYPE),
        attributes: vec![Column::new("source_id", "uuid"), Column::new("target_id", "uuid")],
    }
}

/// Tables holding one row per schema object, in creation order.
pub fn object_tables() -> Vec<CreateTable> {
    vec![
        module_table(),
        atom_table(),
        concept_table(),
        link_table(),
        link_property_table(),
        constraint_table(),
        index_table(),
        action_table(),
        event_table(),
        policy_table(),
        attribute_table(),
        attribute_value_table(),
    ]
}

/// Registers the uuid feature; replaying it leaves the row as it was.
pub fn uuid_feature() -> Merge {
    Merge {
        table: meta_table("feature"),
        key: vec!["name".into()],
        record: record([("name", "uuid"), ("class_name", "UuidFeature")]),
        update_when: None,
    }
}

/// Stores `version` in the single `backend_info` row unless a newer one is
/// already recorded.
pub fn version_merge(version: i32) -> Merge {
    Merge {
        table: meta_table("backend_info"),
        key: vec!["id".into()],
        record: record([
            ("id", SqlValue::Int(1)),
            ("format_version", SqlValue::Int(i64::from(version))),
        ]),
        update_when: Some("cur.\"format_version\" < EXCLUDED.\"format_version\"".into()),
    }
}

fn create_table_unless_exists(table: CreateTable, priority: i32) -> Operation {
    let name = table.name.clone();
    Operation::new(table)
        .at(priority)
        .unless(Condition::TableExists(name))
}

/// Physical tables of the `std` module that user tables inherit from.
pub fn std_tables() -> Vec<CreateTable> {
    let object = names::concept_table(&crate::schema::name::qn(ROOT_CONCEPT));
    let link = names::link_table(&crate::schema::name::qn(ROOT_LINK));
    vec![
        CreateTable::new(object.clone())
            .column(Column::new("id", "uuid").required(true))
            .constraint(TableConstraint::primary_key(format!("{}_pkey", object.name), &["id"])),
        CreateTable::new(link.clone())
            .column(Column::new("source_id", "uuid").required(true))
            .column(Column::new("target_id", "uuid"))
            .column(Column::new("link_type_id", "integer").required(true))
            .column(Column::new("link_id", "uuid"))
            .constraint(TableConstraint::unique(
                format!("{}_source_id_target_id_link_type_id_key", link.name),
                &["source_id", "target_id", "link_type_id"],
            )),
    ]
}

/// Everything a fresh deployment needs before the first user command runs.
///
/// DDL is guarded and rows are merged, so replaying the bootstrap against
/// an existing deployment leaves it as it was.
pub fn bootstrap() -> Vec<Operation> {
    let mut ops = vec![
        Operation::new(CreateSchema {
            name: META_SCHEMA.to_string(),
        })
        .at(-3)
        .unless(Condition::SchemaExists(META_SCHEMA.to_string())),
        create_table_unless_exists(feature_table(), -3),
        create_table_unless_exists(backend_info_table(), -3),
        Operation::new(CreateExtension {
            name: UUID_EXTENSION.to_string(),
            schema: META_SCHEMA.to_string(),
        })
        .at(-2)
        .unless(Condition::ExtensionExists(UUID_EXTENSION.to_string())),
        Operation::new(uuid_feature()).at(-2),
    ];
    ops.extend(object_tables().into_iter().map(|t| create_table_unless_exists(t, -1)));
    ops.push(
        Operation::new(link_endpoints_type())
            .at(-1)
            .unless(Condition::CompositeTypeExists(meta_table(LINK_ENDPOINTS_TYPE))),
    );

    let std_schema = names::module_schema("std");
    ops.push(
        Operation::new(CreateSchema {
            name: std_schema.clone(),
        })
        .at(-1)
        .unless(Condition::SchemaExists(std_schema)),
    );
    ops.push(
        Operation::new(Merge {
            table: meta_table("module"),
            key: vec!["name".into()],
            record: module_record(&Module {
                name: "std".to_string(),
                imports: Vec::new(),
            }),
            update_when: None,
        })
        .at(-1),
    );
    ops.extend(std_tables().into_iter().map(|t| create_table_unless_exists(t, -1)));
    ops
}

fn name_value(name: &QualName) -> SqlValue {
    SqlValue::from(name.to_string())
}

fn opt_name(name: &Option<QualName>) -> SqlValue {
    name.as_ref().map(name_value).unwrap_or(SqlValue::Null)
}

fn name_list(names: &[QualName]) -> SqlValue {
    SqlValue::TextArray(names.iter().map(ToString::to_string).collect())
}

fn default_value(items: &[crate::schema::payload::DefaultItem]) -> SqlValue {
    if items.is_empty() {
        SqlValue::Null
    } else {
        SqlValue::from(write_default(items))
    }
}

pub fn module_record(module: &Module) -> Record {
    record([
        ("name", SqlValue::from(module.name.clone())),
        ("schema_name", SqlValue::from(names::module_schema(&module.name))),
        ("imports", SqlValue::from(module.imports.clone())),
    ])
}

pub fn atom_record(atom: &Atom) -> Record {
    record([
        ("name", name_value(&atom.name)),
        ("title", SqlValue::from(atom.title.clone())),
        ("is_abstract", SqlValue::from(atom.is_abstract)),
        ("bases", name_list(&atom.bases)),
        ("default", default_value(&atom.default)),
    ])
}

pub fn concept_record(concept: &Concept) -> Record {
    record([
        ("name", name_value(&concept.name)),
        ("title", SqlValue::from(concept.title.clone())),
        ("is_abstract", SqlValue::from(concept.is_abstract)),
        ("bases", name_list(&concept.bases)),
    ])
}

pub fn link_record(link: &Link, link_type_id: i64) -> Record {
    record([
        ("name", name_value(&link.name)),
        ("title", SqlValue::from(link.title.clone())),
        ("is_abstract", SqlValue::from(link.is_abstract)),
        ("bases", name_list(&link.bases)),
        ("source", opt_name(&link.source)),
        ("target", opt_name(&link.target)),
        ("mapping", SqlValue::from(link.mapping.code())),
        ("required", SqlValue::from(link.required)),
        ("default", default_value(&link.default)),
        ("computable", SqlValue::from(link.computable.clone())),
        ("link_type_id", SqlValue::Int(link_type_id)),
    ])
}

pub fn link_property_record(prop: &LinkProperty) -> Record {
    record([
        ("name", name_value(&prop.name)),
        ("title", SqlValue::from(prop.title.clone())),
        ("bases", name_list(&prop.bases)),
        ("source", opt_name(&prop.source)),
        ("target", opt_name(&prop.target)),
        ("required", SqlValue::from(prop.required)),
        ("default", default_value(&prop.default)),
    ])
}

pub fn constraint_record(constraint: &Constraint) -> Record {
    let check = constraint
        .check
        .as_ref()
        .and_then(|c| serde_json::to_string(c).ok());
    record([
        ("name", name_value(&constraint.name)),
        ("subject", opt_name(&constraint.subject)),
        ("check", SqlValue::from(check)),
    ])
}

pub fn index_record(index: &SourceIndex) -> Record {
    record([
        ("name", name_value(&index.name)),
        ("subject", opt_name(&index.subject)),
        ("expr", SqlValue::from(index.expr.clone())),
    ])
}

pub fn action_record(action: &Action) -> Record {
    record([
        ("name", name_value(&action.name)),
        ("title", SqlValue::from(action.title.clone())),
    ])
}

pub fn event_record(event: &Event) -> Record {
    record([
        ("name", name_value(&event.name)),
        ("title", SqlValue::from(event.title.clone())),
        ("bases", name_list(&event.bases)),
    ])
}

pub fn policy_record(policy: &Policy) -> Record {
    record([
        ("name", name_value(&policy.name)),
        ("subject", opt_name(&policy.subject)),
        ("event", opt_name(&policy.event)),
        ("actions", name_list(&policy.actions)),
    ])
}

pub fn attribute_record(attribute: &Attribute) -> Record {
    record([
        ("name", name_value(&attribute.name)),
        ("type", SqlValue::from(attribute.type_name.clone())),
    ])
}

pub fn attribute_value_record(value: &AttributeValue) -> Record {
    record([
        ("name", name_value(&value.name)),
        ("subject", opt_name(&value.subject)),
        ("attribute", opt_name(&value.attribute)),
        ("value", SqlValue::from(value.value.clone())),
    ])
}

pub fn insert_row(table: &str, row: Record) -> Insert {
    Insert::one(meta_table(table), row)
}

/// Update every column of the row named `name` except the name itself.
pub fn update_row(table: &str, name: &str, row: Record) -> Update {
    Update {
        table: meta_table(table),
        values: row.into_iter().filter(|(col, _)| col != "name").collect(),
        filters: vec![Filter::eq("name", name)],
    }
}

pub fn rename_row(table: &str, old: &str, new: &str) -> Update {
    Update {
        table: meta_table(table),
        values: record([("name", new)]),
        filters: vec![Filter::eq("name", old)],
    }
}

pub fn delete_row(table: &str, name: &str) -> Delete {
    Delete {
        table: meta_table(table),
        filters: vec![Filter::eq("name", name)],
    }
}
