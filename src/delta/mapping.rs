//! Link cardinality enforced through partial unique indexes.
//!
//! Link commands only schedule work here; the realm reconciles everything at
//! the end of the delta against the indexes the backend already has. One
//! index set exists per (link table, mapping) and its predicate lists the
//! type ids of every link sharing it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::db::introspect::IndexInfo;
use crate::db::{quote_ident, PgName};
use crate::error::DeltaError;
use crate::ops::{Condition, CreateIndex, DropIndex, OpGroup, Operation, Priority};
use crate::schema::{LinkMapping, QualName};

use super::names::mapping_index_name;

pub const MAPPING_INDEX_PRIORITY: Priority = 3;

fn index_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?P<mapping>[1*]{2})_link_mapping_idx$").expect("valid index name regex")
    })
}

fn predicate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\(\s*link_type_id\s*=\s*(?:ANY\s*\(\s*ARRAY\s*\[(\d+(?:\s*,\s*\d+)*)\s*\]\s*\)\s*|(\d+))\s*\)",
        )
        .expect("valid index predicate regex")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingAction {
    Create,
    /// The link may have been known under `old_name` by the backend.
    Alter { old_name: QualName },
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
struct Scheduled {
    action: MappingAction,
    table: PgName,
    mapping: LinkMapping,
    link_type_id: i64,
}

/// Columns the unique indexes of a mapping cover, besides `link_type_id`.
pub fn index_sides(mapping: LinkMapping) -> &'static [&'static str] {
    match mapping {
        LinkMapping::OneToOne => &["source", "target"],
        LinkMapping::OneToMany => &["target"],
        LinkMapping::ManyToOne => &["source"],
        LinkMapping::ManyToMany => &[],
    }
}

pub fn render_predicate(ids: &[i64]) -> String {
    match ids {
        [single] => format!("(link_type_id = {})", single),
        _ => {
            let list: Vec<String> = ids.iter().map(i64::to_string).collect();
            format!("(link_type_id = ANY (ARRAY[{}]))", list.join(", "))
        }
    }
}

/// Mapping encoded in an index name, and the type ids in its predicate.
pub fn parse_index(name: &str, predicate: Option<&str>) -> Result<(LinkMapping, Vec<i64>), DeltaError> {
    let unparsable = || DeltaError::UnparsableIndex {
        name: name.to_string(),
        predicate: predicate.unwrap_or_default().to_string(),
    };
    let mapping = index_name_re()
        .captures(name)
        .and_then(|c| LinkMapping::from_code(&c["mapping"]))
        .ok_or_else(unparsable)?;
    let caps = predicate
        .and_then(|p| predicate_re().captures(p))
        .ok_or_else(unparsable)?;
    let raw = caps.get(1).or_else(|| caps.get(2)).ok_or_else(unparsable)?;
    let ids = raw
        .as_str()
        .split(',')
        .map(|id| id.trim().parse::<i64>().map_err(|_| unparsable()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((mapping, ids))
}

#[derive(Debug, Clone, Default)]
struct IndexSet {
    existing: Vec<String>,
    before: BTreeMap<QualName, i64>,
    after: BTreeMap<QualName, i64>,
}

/// Collects mapping changes of specialized links during a delta.
#[derive(Debug, Clone, Default)]
pub struct MappingMaintainer {
    links: Vec<(QualName, Vec<Scheduled>)>,
}

impl MappingMaintainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(
        &mut self,
        link: &QualName,
        action: MappingAction,
        table: PgName,
        mapping: LinkMapping,
        link_type_id: i64,
    ) {
        let entry = Scheduled {
            action,
            table,
            mapping,
            link_type_id,
        };
        match self.links.iter_mut().find(|(name, _)| name == link) {
            Some((_, entries)) => entries.push(entry),
            None => self.links.push((link.clone(), vec![entry])),
        }
    }

    /// Forget everything scheduled for `link`.
    pub fn cancel(&mut self, link: &QualName) {
        self.links.retain(|(name, _)| name != link);
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Index operations bringing the backend in line with the scheduled
    /// changes. `indexes` are the existing mapping indexes and `link_names`
    /// resolves their predicate ids; ids it does not know are ignored.
    pub fn reconcile(
        &self,
        indexes: &[IndexInfo],
        link_names: &BTreeMap<i64, QualName>,
    ) -> Result<Vec<Operation>, DeltaError> {
        if self.links.is_empty() {
            return Ok(Vec::new());
        }
        let tables: BTreeSet<&PgName> = self
            .links
            .iter()
            .flat_map(|(_, entries)| entries.iter().map(|e| &e.table))
            .collect();

        let mut sets: BTreeMap<(PgName, LinkMapping), IndexSet> = BTreeMap::new();
        for index in indexes.iter().filter(|i| tables.contains(&i.table)) {
            let (mapping, ids) = parse_index(&index.name, index.predicate.as_deref())?;
            let set = sets.entry((index.table.clone(), mapping)).or_default();
            set.existing.push(index.name.clone());
            for id in ids {
                if let Some(name) = link_names.get(&id) {
                    set.before.insert(name.clone(), id);
                    set.after.insert(name.clone(), id);
                }
            }
        }

        for (name, entries) in &self.links {
            let Some(last) = entries.last() else {
                continue;
            };
            let mut known_as: BTreeSet<&QualName> = BTreeSet::new();
            known_as.insert(name);
            for entry in entries {
                if let MappingAction::Alter { old_name } = &entry.action {
                    known_as.insert(old_name);
                }
            }
            for ((table, _), set) in sets.iter_mut() {
                if table == &last.table {
                    set.after.retain(|member, _| !known_as.contains(member));
                }
            }
            if last.action != MappingAction::Delete && last.mapping != LinkMapping::ManyToMany {
                sets.entry((last.table.clone(), last.mapping))
                    .or_default()
                    .after
                    .insert(name.clone(), last.link_type_id);
            }
        }

        let mut drops = Vec::new();
        let mut creates = Vec::new();
        for ((table, mapping), set) in &sets {
            if set.before == set.after && !set.existing.is_empty() {
                continue;
            }
            if !set.existing.is_empty() {
                debug!(table = %table, mapping = mapping.code(), "dropping mapping indexes");
                drops.push(drop_set(table, &set.existing));
            }
            if !set.after.is_empty() {
                let mut ids: Vec<i64> = set.after.values().copied().collect();
                ids.sort_unstable();
                ids.dedup();
                creates.push(create_set(table, *mapping, &ids));
            }
        }
        drops.extend(creates);
        Ok(drops)
    }
}

fn drop_set(table: &PgName, names: &[String]) -> Operation {
    let ops = names
        .iter()
        .map(|name| {
            let index = table.with_name(name.clone());
            Operation::new(DropIndex {
                name: index.clone(),
            })
            .at(MAPPING_INDEX_PRIORITY)
            .when(Condition::IndexExists(index))
        })
        .collect();
    Operation::new(OpGroup::new(ops))
        .at(MAPPING_INDEX_PRIORITY)
        .when(Condition::TableExists(table.clone()))
}

fn create_set(table: &PgName, mapping: LinkMapping, ids: &[i64]) -> Operation {
    let predicate = render_predicate(ids);
    let ops = index_sides(mapping)
        .iter()
        .map(|side| {
            let index = CreateIndex {
                name: mapping_index_name(table, side, mapping),
                table: table.clone(),
                columns: vec![quote_ident(&format!("{}_id", side)), quote_ident("link_type_id")],
                unique: true,
                predicate: Some(predicate.clone()),
            };
            let qualified = index.qualified_name();
            Operation::new(index)
                .at(MAPPING_INDEX_PRIORITY)
                .unless(Condition::IndexExists(qualified))
        })
        .collect();
    Operation::new(OpGroup::new(ops))
        .at(MAPPING_INDEX_PRIORITY)
        .when(Condition::TableExists(table.clone()))
}
