//! Whole deltas compiled and executed against the in-memory session.

use std::collections::BTreeMap;

use crate::db::sim::SimSession;
use crate::db::{PgName, SqlValue};
use crate::error::DeltaError;
use crate::ops::{AlterAction, OpKind, Operation};
use crate::schema::name::qn;
use crate::schema::objects::{Atom, Concept, Link, Module, SchemaObject};
use crate::schema::{LinkMapping, ObjectKind, QualName, Schema, SchemaLookup};
use crate::upgrade::{self, BACKEND_FORMAT_VERSION};

use super::command::{Command, Delta, PropValue};
use super::metadata;
use super::names;
use super::realm::RealmIntrospection;
use super::scheduler::{execute, plan};
use super::{apply_delta, DeltaCompiler};

fn app_schema() -> Schema {
    let mut schema = Schema::with_std();
    schema.insert_module(Module {
        name: "app".to_string(),
        imports: vec!["std".to_string()],
    });
    schema
}

fn deployed() -> SimSession {
    let mut session = SimSession::new();
    session.add_schema("sdm_app");
    session
}

fn generic_link(name: &str, target: &str, mapping: LinkMapping) -> Command {
    Command::create(ObjectKind::Link, qn(name))
        .with("bases", PropValue::Names(vec![qn("std::link")]))
        .with("target", PropValue::Name(qn(target)))
        .with("mapping", PropValue::Mapping(mapping))
}

fn pointer(generic: &str, source: &str, target: &str, mapping: LinkMapping) -> Command {
    let name = qn(generic).specialized_on(&qn(source));
    Command::create(ObjectKind::Link, name)
        .with("bases", PropValue::Names(vec![qn(generic)]))
        .with("source", PropValue::Name(qn(source)))
        .with("target", PropValue::Name(qn(target)))
        .with("mapping", PropValue::Mapping(mapping))
}

fn concept(name: &str, pointers: Vec<Command>) -> Command {
    concept_on(name, &["std::Object"], pointers)
}

fn concept_on(name: &str, bases: &[&str], pointers: Vec<Command>) -> Command {
    let mut cmd = Command::create(ObjectKind::Concept, qn(name))
        .with("bases", PropValue::Names(bases.iter().map(|b| qn(b)).collect()));
    cmd.children = pointers;
    cmd
}

fn person_with_name() -> Vec<Command> {
    vec![
        generic_link("app::name", "std::str", LinkMapping::ManyToOne),
        concept(
            "app::Person",
            vec![pointer("app::name", "app::Person", "std::str", LinkMapping::ManyToOne)],
        ),
    ]
}

/// Compile `commands` against what `session` already holds and run them.
fn run(schema: &mut Schema, session: &mut SimSession, commands: Vec<Command>) -> Delta {
    let backend = RealmIntrospection::load(session).unwrap();
    let mut delta = Delta::new(commands);
    DeltaCompiler::default().compile(schema, &mut delta, &backend).unwrap();
    execute(session, &delta).unwrap();
    delta
}

fn names_of(list: &[&str]) -> Vec<QualName> {
    list.iter().map(|n| qn(n)).collect()
}

/// Operations the commands produced, without the bootstrap and the
/// closing version merge of the realm.
fn command_ops(delta: &Delta) -> Vec<&Operation> {
    plan(delta)
        .into_iter()
        .filter(|op| op.priority >= 0 && !matches!(op.kind, OpKind::Merge(_)))
        .collect()
}

fn is_index_op(op: &Operation) -> bool {
    matches!(op.kind, OpKind::CreateIndex(_) | OpKind::DropIndex(_) | OpKind::OpGroup(_))
}

fn sql(ops: &[&Operation]) -> Vec<String> {
    ops.iter().flat_map(|op| op.statements()).map(|s| s.sql).collect()
}

fn added_columns(ops: &[&Operation]) -> Vec<String> {
    ops.iter()
        .filter_map(|op| match &op.kind {
            OpKind::AlterTable(alter) => Some(alter),
            _ => None,
        })
        .flat_map(|alter| alter.items.iter())
        .filter_map(|item| match &item.action {
            AlterAction::AddColumn(column) => Some(column.name.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_person_with_name() {
    let mut schema = app_schema();
    let mut delta = Delta::new(person_with_name());
    DeltaCompiler::default()
        .compile(&mut schema, &mut delta, &RealmIntrospection::default())
        .unwrap();

    let ops = command_ops(&delta);
    let tables: Vec<&Operation> = ops
        .iter()
        .copied()
        .filter(|op| matches!(op.kind, OpKind::CreateTable(_)))
        .collect();
    assert_eq!(tables.len(), 1);
    assert_eq!(added_columns(&ops), vec!["name".to_string()]);

    let priority_one_inserts = ops
        .iter()
        .filter(|op| op.priority == 1 && matches!(op.kind, OpKind::Insert(_)))
        .count();
    assert_eq!(priority_one_inserts, 1);
    assert!(!plan(&delta).into_iter().any(is_index_op));

    let mut session = deployed();
    execute(&mut session, &delta).unwrap();
    let person = PgName::new("sdm_app", "Person_data");
    assert_eq!(session.columns(&person), vec!["id", "name"]);
    assert_eq!(session.parents(&person), vec![PgName::new("sdm_std", "Object_data")]);
    assert_eq!(session.rows(&names::meta_table("concept")).len(), 1);
}

fn age_schema() -> Schema {
    let mut schema = app_schema();
    for (name, base) in [("app::Age", "std::int16"), ("app::PositiveAge", "app::Age")] {
        schema.insert(SchemaObject::Atom(Atom {
            name: qn(name),
            bases: vec![qn(base)],
            default: Vec::new(),
            is_abstract: false,
            title: None,
        }));
    }
    let generic = Link {
        name: qn("app::age"),
        bases: vec![qn("std::link")],
        source: None,
        target: Some(qn("app::Age")),
        mapping: LinkMapping::ManyToOne,
        required: false,
        default: Vec::new(),
        computable: None,
        is_abstract: false,
        title: None,
        properties: BTreeMap::new(),
    };
    let mut specialized = generic.clone();
    specialized.name = qn("app::age@Person");
    specialized.bases = vec![qn("app::age")];
    specialized.source = Some(qn("app::Person"));

    let mut pointers = BTreeMap::new();
    pointers.insert(qn("app::age"), specialized.name.clone());
    schema.insert(SchemaObject::Concept(Concept {
        name: qn("app::Person"),
        bases: vec![qn("std::Object")],
        is_abstract: false,
        title: None,
        pointers,
    }));
    schema.insert(SchemaObject::Link(generic));
    schema.insert(SchemaObject::Link(specialized));
    schema
}

#[test]
fn test_age_base_change_ordering() {
    let mut schema = age_schema();

    let mut delta = Delta::new(vec![Command::rebase(
        ObjectKind::Atom,
        qn("app::Age"),
        vec![qn("std::int16")],
        vec![qn("std::int32")],
    )]);
    DeltaCompiler::default()
        .compile(&mut schema, &mut delta, &RealmIntrospection::default())
        .unwrap();

    let planned = plan(&delta);
    let statements: Vec<String> = sql(&planned)
        .into_iter()
        .filter(|s| s.contains("Age_domain") && !s.starts_with("INSERT") && !s.starts_with("UPDATE"))
        .collect();
    assert_eq!(
        statements,
        vec![
            "ALTER DOMAIN \"sdm_app\".\"Age_domain\" RENAME TO \"Age_domain_tmp\"",
            "CREATE DOMAIN \"sdm_app\".\"Age_domain\" AS integer",
            "ALTER TABLE \"sdm_app\".\"Person_data\" ALTER COLUMN \"age\" SET DATA TYPE \
             \"sdm_app\".\"Age_domain\" USING \"age\"::\"sdm_app\".\"Age_domain\"",
            "ALTER DOMAIN \"sdm_app\".\"PositiveAge_domain\" RENAME TO \"PositiveAge_domain_tmp\"",
            "CREATE DOMAIN \"sdm_app\".\"PositiveAge_domain\" AS \"sdm_app\".\"Age_domain\"",
            "DROP DOMAIN \"sdm_app\".\"PositiveAge_domain_tmp\"",
            "DROP DOMAIN \"sdm_app\".\"Age_domain_tmp\"",
        ]
    );

    let mut session = deployed();
    session.add_domain(&PgName::new("sdm_app", "Age_domain"), &[]);
    session.add_domain(&PgName::new("sdm_app", "PositiveAge_domain"), &[]);
    session.add_table(&PgName::new("sdm_app", "Person_data"), &["id", "age"]);
    execute(&mut session, &delta).unwrap();
    assert!(session.has_domain(&PgName::new("sdm_app", "Age_domain")));
    assert!(!session.has_domain(&PgName::new("sdm_app", "Age_domain_tmp")));
    assert!(!session.has_domain(&PgName::new("sdm_app", "PositiveAge_domain_tmp")));
}

#[test]
fn test_unchanged_base_is_not_migrated() {
    let mut schema = age_schema();
    let mut delta = Delta::new(vec![Command::alter(ObjectKind::Atom, qn("app::Age")).change(
        "title",
        None,
        Some(PropValue::Text("Age in years".into())),
    )]);
    DeltaCompiler::default()
        .compile(&mut schema, &mut delta, &RealmIntrospection::default())
        .unwrap();
    let ops = command_ops(&delta);
    assert_eq!(ops.len(), 1);
    assert!(matches!(ops[0].kind, OpKind::Update(_)));
}

#[test]
fn test_mapping_index_follows_link() {
    let mut schema = app_schema();
    let friends = qn("app::friends@Person");
    let mut delta = Delta::new(vec![
        generic_link("app::friends", "app::Person", LinkMapping::ManyToOne),
        concept(
            "app::Person",
            vec![pointer("app::friends", "app::Person", "app::Person", LinkMapping::ManyToOne)],
        ),
    ]);
    let compiler = DeltaCompiler::default();
    compiler
        .compile(&mut schema, &mut delta, &RealmIntrospection::default())
        .unwrap();

    let mut session = deployed();
    execute(&mut session, &delta).unwrap();
    let link_table = names::link_table(&friends);
    let index = link_table.with_name(names::mapping_index_name(&link_table, "source", LinkMapping::ManyToOne));
    assert_eq!(
        session.index_predicate(&index),
        Some(Some(format!("(link_type_id = {})", names::link_type_id(&friends))))
    );

    // A later delta that leaves the link alone keeps the index untouched.
    let backend = RealmIntrospection::load(&mut session).unwrap();
    assert_eq!(backend.link_ids.get(&friends), Some(&names::link_type_id(&friends)));
    let mut next = Delta::new(vec![Command::alter(ObjectKind::Concept, qn("app::Person")).change(
        "title",
        None,
        Some(PropValue::Text("Person".into())),
    )]);
    compiler.compile(&mut schema, &mut next, &backend).unwrap();
    assert!(!plan(&next).into_iter().any(is_index_op));
}

fn at_version(version: i32) -> SimSession {
    let mut session = deployed();
    for op in metadata::bootstrap() {
        op.execute(&mut session).unwrap();
    }
    Operation::new(metadata::version_merge(version)).execute(&mut session).unwrap();
    session.clear_log();
    session
}

fn is_version_merge(op: &Operation) -> bool {
    matches!(&op.kind, OpKind::Merge(merge) if merge.table == names::meta_table("backend_info"))
}

#[test]
fn test_first_delta_records_current_format() {
    let mut session = deployed();
    let mut schema = app_schema();
    let mut delta = Delta::new(person_with_name());
    apply_delta(&mut session, &mut schema, &mut delta, &DeltaCompiler::default()).unwrap();

    assert!(plan(&delta).into_iter().any(is_version_merge));
    assert_eq!(upgrade::format_version(&mut session).unwrap(), Some(BACKEND_FORMAT_VERSION));
}

#[test]
fn test_old_deployment_is_upgraded_before_the_delta() {
    let mut session = at_version(12);
    session.add_row(
        &names::meta_table("atom"),
        &[
            ("name", SqlValue::from("app::Score")),
            ("default", SqlValue::from("[1]")),
        ],
    );
    let mut schema = app_schema();
    let mut delta = Delta::new(person_with_name());
    apply_delta(&mut session, &mut schema, &mut delta, &DeltaCompiler::default()).unwrap();

    // Step 13 rewrote the legacy payload; stamping the version alone would not.
    let atoms = session.rows(&names::meta_table("atom"));
    assert_eq!(
        atoms[0].get("default"),
        Some(&SqlValue::from("[{\"type\":\"literal\",\"value\":1}]"))
    );
    assert_eq!(upgrade::format_version(&mut session).unwrap(), Some(BACKEND_FORMAT_VERSION));
    assert!(!plan(&delta).into_iter().any(is_version_merge));
    assert!(session.columns(&PgName::new("sdm_app", "Person_data")).contains(&"name".to_string()));
}

#[test]
fn test_newer_deployment_is_refused_before_compiling() {
    let mut session = at_version(BACKEND_FORMAT_VERSION + 1);
    let mut schema = app_schema();
    let mut delta = Delta::new(person_with_name());
    let err = apply_delta(&mut session, &mut schema, &mut delta, &DeltaCompiler::default()).unwrap_err();

    assert!(matches!(err, DeltaError::UnsupportedFormat { found: 17, current: 16 }));
    assert!(session.transcript().is_empty());
    assert!(schema.get(&qn("app::Person")).is_none());
}

fn dropped_columns(ops: &[&Operation]) -> Vec<(i32, String)> {
    ops.iter()
        .filter_map(|op| match &op.kind {
            OpKind::AlterTable(alter) => Some((op.priority, alter)),
            _ => None,
        })
        .flat_map(|(priority, alter)| {
            alter.items.iter().filter_map(move |item| match &item.action {
                AlterAction::DropColumn(column) => Some((priority, column.clone())),
                _ => None,
            })
        })
        .collect()
}

fn named_and_person() -> Vec<Command> {
    vec![
        generic_link("app::name", "std::str", LinkMapping::ManyToOne),
        concept(
            "app::Named",
            vec![pointer("app::name", "app::Named", "std::str", LinkMapping::ManyToOne)],
        ),
        concept("app::Person", Vec::new()),
    ]
}

#[test]
fn test_rebase_adds_inherited_columns_before_inheriting() {
    let mut schema = app_schema();
    let mut session = deployed();
    run(&mut schema, &mut session, named_and_person());

    let delta = run(
        &mut schema,
        &mut session,
        vec![Command::rebase(
            ObjectKind::Concept,
            qn("app::Person"),
            names_of(&["std::Object"]),
            names_of(&["std::Object", "app::Named"]),
        )],
    );

    assert_eq!(added_columns(&command_ops(&delta)), vec!["name"]);
    let person = PgName::new("sdm_app", "Person_data");
    assert_eq!(session.columns(&person), vec!["id", "name"]);
    assert_eq!(
        session.parents(&person),
        vec![PgName::new("sdm_std", "Object_data"), PgName::new("sdm_app", "Named_data")]
    );
}

#[test]
fn test_rebase_skips_pointers_created_alongside() {
    let mut schema = app_schema();
    let mut session = deployed();
    run(&mut schema, &mut session, named_and_person());

    let rebase = Command::rebase(
        ObjectKind::Concept,
        qn("app::Person"),
        names_of(&["std::Object"]),
        names_of(&["std::Object", "app::Named"]),
    )
    .child(pointer("app::name", "app::Person", "std::str", LinkMapping::ManyToOne));
    let delta = run(&mut schema, &mut session, vec![rebase]);

    assert_eq!(added_columns(&command_ops(&delta)), vec!["name"]);
    assert_eq!(
        schema.pointers_of(&qn("app::Person")).unwrap().get(&qn("app::name")),
        Some(&qn("app::name@Person"))
    );
    let person = PgName::new("sdm_app", "Person_data");
    assert_eq!(session.columns(&person), vec!["id", "name"]);
    assert!(session.parents(&person).contains(&PgName::new("sdm_app", "Named_data")));
}

#[test]
fn test_rebase_drops_unreachable_columns_only() {
    let mut schema = app_schema();
    let mut session = deployed();
    run(
        &mut schema,
        &mut session,
        vec![
            generic_link("app::name", "std::str", LinkMapping::ManyToOne),
            generic_link("app::note", "std::str", LinkMapping::ManyToOne),
            concept(
                "app::Named",
                vec![pointer("app::name", "app::Named", "std::str", LinkMapping::ManyToOne)],
            ),
            concept(
                "app::Noted",
                vec![
                    pointer("app::name", "app::Noted", "std::str", LinkMapping::ManyToOne),
                    pointer("app::note", "app::Noted", "std::str", LinkMapping::ManyToOne),
                ],
            ),
            concept_on("app::Person", &["std::Object", "app::Noted"], Vec::new()),
        ],
    );
    let person = PgName::new("sdm_app", "Person_data");
    assert!(session.columns(&person).contains(&"note".to_string()));

    let delta = run(
        &mut schema,
        &mut session,
        vec![Command::rebase(
            ObjectKind::Concept,
            qn("app::Person"),
            names_of(&["std::Object", "app::Noted"]),
            names_of(&["std::Object", "app::Named"]),
        )],
    );

    let ops = command_ops(&delta);
    assert!(added_columns(&ops).is_empty());
    assert_eq!(dropped_columns(&ops), vec![(2, "note".to_string())]);
    assert_eq!(session.columns(&person), vec!["id", "name"]);
    assert_eq!(
        session.parents(&person),
        vec![PgName::new("sdm_std", "Object_data"), PgName::new("sdm_app", "Named_data")]
    );
}

#[test]
fn test_link_rebase_reparents_its_table() {
    let mut schema = app_schema();
    let mut session = deployed();
    run(
        &mut schema,
        &mut session,
        vec![
            generic_link("app::knows", "app::Person", LinkMapping::ManyToMany),
            generic_link("app::friends", "app::Person", LinkMapping::ManyToMany),
            concept(
                "app::Person",
                vec![
                    pointer("app::knows", "app::Person", "app::Person", LinkMapping::ManyToMany),
                    pointer("app::friends", "app::Person", "app::Person", LinkMapping::ManyToMany),
                ],
            ),
        ],
    );
    let friends = names::link_table(&qn("app::friends"));
    let root = names::link_table(&qn("std::link"));
    assert_eq!(session.parents(&friends), vec![root.clone()]);

    let delta = run(
        &mut schema,
        &mut session,
        vec![Command::rebase(
            ObjectKind::Link,
            qn("app::friends"),
            names_of(&["std::link"]),
            names_of(&["app::knows"]),
        )],
    );

    let statements = sql(&command_ops(&delta));
    assert!(statements.iter().any(|s| s.contains(&format!("NO INHERIT {}", root))));
    let knows = names::link_table(&qn("app::knows"));
    assert_eq!(session.parents(&friends), vec![knows]);
}

fn generic_property(name: &str, target: &str) -> Command {
    Command::create(ObjectKind::LinkProperty, qn(name)).with("target", PropValue::Name(qn(target)))
}

fn link_property(generic: &str, link: &str, target: &str) -> Command {
    Command::create(ObjectKind::LinkProperty, qn(generic).specialized_on(&qn(link)))
        .with("bases", PropValue::Names(vec![qn(generic)]))
        .with("source", PropValue::Name(qn(link)))
        .with("target", PropValue::Name(qn(target)))
}

/// `app::name@Person` now lives in its own table, mapping index included.
fn assert_name_in_own_table(session: &SimSession, delta: &Delta) {
    let link = qn("app::name@Person");
    let person = PgName::new("sdm_app", "Person_data");
    assert_eq!(session.columns(&person), vec!["id"]);
    assert_eq!(dropped_columns(&command_ops(delta)), vec![(2, "name".to_string())]);

    let table = names::link_table(&link);
    let columns = session.columns(&table);
    assert!(columns.contains(&"target_value".to_string()));
    assert!(columns.contains(&"note".to_string()));
    assert_eq!(session.parents(&table), vec![names::link_table(&qn("app::name"))]);

    let index = table.with_name(names::mapping_index_name(&table, "source", LinkMapping::ManyToOne));
    assert_eq!(
        session.index_predicate(&index),
        Some(Some(format!("(link_type_id = {})", names::link_type_id(&link))))
    );
}

#[test]
fn test_link_altered_with_first_property_moves_to_own_table() {
    let mut schema = app_schema();
    let mut session = deployed();
    run(&mut schema, &mut session, person_with_name());

    let alter = Command::alter(ObjectKind::Link, qn("app::name@Person"))
        .child(link_property("app::note", "app::name@Person", "std::str"));
    let delta = run(
        &mut schema,
        &mut session,
        vec![generic_property("app::note", "std::str"), alter],
    );
    assert_name_in_own_table(&session, &delta);
}

fn person_with_noted_name(schema: &mut Schema, session: &mut SimSession) -> Delta {
    run(schema, session, person_with_name());
    run(
        schema,
        session,
        vec![
            generic_property("app::note", "std::str"),
            link_property("app::note", "app::name@Person", "std::str"),
        ],
    )
}

#[test]
fn test_first_property_on_its_own_moves_link() {
    let mut schema = app_schema();
    let mut session = deployed();
    let delta = person_with_noted_name(&mut schema, &mut session);
    assert_name_in_own_table(&session, &delta);

    let created = command_ops(&delta)
        .into_iter()
        .filter(|op| matches!(&op.kind, OpKind::CreateTable(t) if t.name == names::link_table(&qn("app::name@Person"))))
        .count();
    assert_eq!(created, 1);
}

#[test]
fn test_property_required_change_follows_row_updates() {
    let mut schema = app_schema();
    let mut session = deployed();
    person_with_noted_name(&mut schema, &mut session);
    session.clear_log();

    let note = qn("app::note").specialized_on(&qn("app::name@Person"));
    let delta = run(
        &mut schema,
        &mut session,
        vec![Command::alter(ObjectKind::LinkProperty, note).change(
            "required",
            Some(PropValue::Bool(false)),
            Some(PropValue::Bool(true)),
        )],
    );

    let ops = command_ops(&delta);
    let row_updates: Vec<i32> = ops
        .iter()
        .filter(|op| matches!(op.kind, OpKind::Update(_)))
        .map(|op| op.priority)
        .collect();
    assert_eq!(row_updates, vec![4]);
    let not_null: Vec<i32> = ops
        .iter()
        .filter(|op| match &op.kind {
            OpKind::AlterTable(alter) => alter.items.iter().any(|item| {
                matches!(&item.action, AlterAction::SetNotNull { column, required: true } if column == "note")
            }),
            _ => false,
        })
        .map(|op| op.priority)
        .collect();
    assert_eq!(not_null, vec![5]);

    let executed = session.executed();
    let update = executed
        .iter()
        .position(|s| s.starts_with("UPDATE \"sd_meta\".\"link_property\""));
    let set_not_null = executed.iter().position(|s| s.contains("SET NOT NULL"));
    assert!(update.is_some() && set_not_null.is_some());
    assert!(update < set_not_null);
}
