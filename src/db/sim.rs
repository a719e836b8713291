//! In-memory session for unit tests.
//!
//! `SimSession` keeps a small catalog (schemas, tables with columns, parents,
//! constraints and rows, indexes with predicates, domains, composite types,
//! sequences), interprets the SQL our operations render, and answers the
//! queries in [`super::introspect`]. Statements it does not understand are
//! rejected so that tests notice new renderings.

use std::collections::{BTreeMap, BTreeSet};

use regex::{Captures, Regex};

use super::escape::PgName;
use super::introspect;
use super::session::{Row, Session};
use super::value::{DatabaseValue, SqlValue};
use super::DbError;

const QN: &str = r#""((?:[^"]|"")*)"\."((?:[^"]|"")*)""#;
const ID: &str = r#""((?:[^"]|"")*)""#;

type SimRow = BTreeMap<String, SqlValue>;

#[derive(Debug, Clone, Default)]
struct SimTable {
    columns: Vec<String>,
    parents: Vec<PgName>,
    constraints: BTreeSet<String>,
    rows: Vec<SimRow>,
}

#[derive(Debug, Clone)]
struct SimIndex {
    table: PgName,
    predicate: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Catalog {
    schemas: BTreeSet<String>,
    extensions: BTreeSet<String>,
    tables: BTreeMap<PgName, SimTable>,
    indexes: BTreeMap<PgName, SimIndex>,
    domains: BTreeMap<PgName, BTreeSet<String>>,
    types: BTreeSet<PgName>,
    sequences: BTreeSet<PgName>,
}

#[derive(Debug, Default)]
pub struct SimSession {
    catalog: Catalog,
    snapshot: Option<Catalog>,
    transcript: Vec<String>,
    fail_on: Option<String>,
}

fn re(pattern: &str) -> Regex {
    let pattern = pattern.replace("{QN}", QN).replace("{ID}", ID);
    Regex::new(&pattern).unwrap()
}

fn unquote(s: &str) -> String {
    s.replace("\"\"", "\"")
}

fn qn(caps: &Captures, first: usize) -> PgName {
    PgName::new(unquote(&caps[first]), unquote(&caps[first + 1]))
}

/// Split on `sep` outside parentheses and quotes.
fn split_top(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut dquote = false;
    let mut squote = false;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            '"' if !squote => dquote = !dquote,
            '\'' if !dquote => squote = !squote,
            '(' if !dquote && !squote => depth += 1,
            ')' if !dquote && !squote => depth -= 1,
            _ => {}
        }
        if c == sep && depth == 0 && !dquote && !squote {
            parts.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(c);
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Given text starting with `(`, return the balanced inner part and the rest.
fn take_parens(s: &str) -> Option<(&str, &str)> {
    if !s.starts_with('(') {
        return None;
    }
    let mut depth = 0i32;
    let mut dquote = false;
    for (idx, c) in s.char_indices() {
        match c {
            '"' => dquote = !dquote,
            '(' if !dquote => depth += 1,
            ')' if !dquote => {
                depth -= 1;
                if depth == 0 {
                    return Some((&s[1..idx], &s[idx + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}

fn like(pattern: &str, text: &str) -> bool {
    fn go(p: &[char], t: &[char]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some('%') => (0..=t.len()).any(|i| go(&p[1..], &t[i..])),
            Some('_') => !t.is_empty() && go(&p[1..], &t[1..]),
            Some(c) => t.first() == Some(c) && go(&p[1..], &t[1..]),
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    go(&p, &t)
}

fn value_token(token: &str, params: &[SqlValue]) -> Result<SqlValue, String> {
    let token = token.trim();
    if token == "NULL" {
        return Ok(SqlValue::Null);
    }
    if let Some(idx) = token.strip_prefix('$') {
        let idx: usize = idx.parse().map_err(|_| format!("bad parameter {}", token))?;
        return params
            .get(idx - 1)
            .cloned()
            .ok_or_else(|| format!("missing parameter {}", token));
    }
    if let Ok(i) = token.parse::<i64>() {
        return Ok(SqlValue::Int(i));
    }
    Err(format!("unsupported value token {}", token))
}

fn ident_list(s: &str) -> Vec<String> {
    split_top(s, ',')
        .iter()
        .map(|c| unquote(c.trim_matches('"')))
        .collect()
}

type Predicate = Vec<(String, SqlValue)>;

fn parse_where(clause: Option<&str>, params: &[SqlValue]) -> Result<Predicate, String> {
    let Some(clause) = clause else {
        return Ok(Vec::new());
    };
    let eq = re(r"^{ID} = (\S+)$");
    let null = re(r"^{ID} IS NULL$");
    clause
        .split(" AND ")
        .map(|cond| {
            if let Some(c) = null.captures(cond) {
                Ok((unquote(&c[1]), SqlValue::Null))
            } else if let Some(c) = eq.captures(cond) {
                Ok((unquote(&c[1]), value_token(&c[2], params)?))
            } else {
                Err(format!("unsupported condition {}", cond))
            }
        })
        .collect()
}

fn matches(row: &SimRow, pred: &Predicate) -> bool {
    pred.iter()
        .all(|(col, v)| row.get(col).unwrap_or(&SqlValue::Null) == v)
}

impl Catalog {
    fn table(&self, name: &PgName) -> Result<&SimTable, String> {
        self.tables
            .get(name)
            .ok_or_else(|| format!("relation {} does not exist", name))
    }

    fn table_mut(&mut self, name: &PgName) -> Result<&mut SimTable, String> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| format!("relation {} does not exist", name))
    }

    fn children_of(&self, name: &PgName) -> Vec<PgName> {
        self.tables
            .iter()
            .filter(|(_, t)| t.parents.contains(name))
            .map(|(n, _)| n.clone())
            .collect()
    }

    fn descendants_of(&self, name: &PgName) -> Vec<PgName> {
        let mut out = Vec::new();
        let mut stack = self.children_of(name);
        while let Some(child) = stack.pop() {
            if !out.contains(&child) {
                stack.extend(self.children_of(&child));
                out.push(child);
            }
        }
        out
    }

    fn schema_is_empty(&self, schema: &str) -> bool {
        !self.tables.keys().any(|n| n.schema == schema)
            && !self.domains.keys().any(|n| n.schema == schema)
            && !self.types.iter().any(|n| n.schema == schema)
            && !self.sequences.iter().any(|n| n.schema == schema)
    }

    fn require_schema(&self, schema: &str) -> Result<(), String> {
        if self.schemas.contains(schema) {
            Ok(())
        } else {
            Err(format!("schema \"{}\" does not exist", schema))
        }
    }

    fn rename_table(&mut self, old: &PgName, new: PgName) -> Result<(), String> {
        self.require_schema(&new.schema)?;
        if self.tables.contains_key(&new) {
            return Err(format!("relation {} already exists", new));
        }
        let table = self
            .tables
            .remove(old)
            .ok_or_else(|| format!("relation {} does not exist", old))?;
        self.tables.insert(new.clone(), table);
        for t in self.tables.values_mut() {
            for p in t.parents.iter_mut() {
                if p == old {
                    *p = new.clone();
                }
            }
        }
        let moved: Vec<PgName> = self
            .indexes
            .iter()
            .filter(|(_, idx)| &idx.table == old)
            .map(|(n, _)| n.clone())
            .collect();
        for name in moved {
            if let Some(mut idx) = self.indexes.remove(&name) {
                idx.table = new.clone();
                self.indexes.insert(PgName::new(new.schema.clone(), name.name), idx);
            }
        }
        Ok(())
    }

    fn alter_clause(&mut self, table: &PgName, clause: &str) -> Result<(), String> {
        if let Some(c) = re(r"^ADD COLUMN {ID} (.+)$").captures(clause) {
            let column = unquote(&c[1]);
            let t = self.table_mut(table)?;
            if t.columns.contains(&column) {
                return Err(format!("column \"{}\" of relation {} already exists", column, table));
            }
            t.columns.push(column.clone());
            for desc in self.descendants_of(table) {
                let d = self.table_mut(&desc)?;
                if !d.columns.contains(&column) {
                    d.columns.push(column.clone());
                }
            }
            return Ok(());
        }
        if let Some(c) = re(r"^DROP COLUMN {ID}$").captures(clause) {
            let column = unquote(&c[1]);
            let t = self.table_mut(table)?;
            if !t.columns.contains(&column) {
                return Err(format!("column \"{}\" of relation {} does not exist", column, table));
            }
            t.columns.retain(|col| col != &column);
            for row in t.rows.iter_mut() {
                row.remove(&column);
            }
            for desc in self.descendants_of(table) {
                self.table_mut(&desc)?.columns.retain(|col| col != &column);
            }
            return Ok(());
        }
        if let Some(c) = re(r"^ALTER COLUMN {ID} .+$").captures(clause) {
            let column = unquote(&c[1]);
            if !self.table(table)?.columns.contains(&column) {
                return Err(format!("column \"{}\" of relation {} does not exist", column, table));
            }
            return Ok(());
        }
        if let Some(c) = re(r"^ADD CONSTRAINT {ID} .+$").captures(clause) {
            let name = unquote(&c[1]);
            if !self.table_mut(table)?.constraints.insert(name.clone()) {
                return Err(format!("constraint \"{}\" already exists", name));
            }
            return Ok(());
        }
        if let Some(c) = re(r"^DROP CONSTRAINT {ID}$").captures(clause) {
            let name = unquote(&c[1]);
            if !self.table_mut(table)?.constraints.remove(&name) {
                return Err(format!("constraint \"{}\" does not exist", name));
            }
            return Ok(());
        }
        if let Some(c) = re(r"^NO INHERIT {QN}$").captures(clause) {
            let parent = qn(&c, 1);
            let t = self.table_mut(table)?;
            if !t.parents.contains(&parent) {
                return Err(format!("relation {} is not a parent of {}", parent, table));
            }
            t.parents.retain(|p| p != &parent);
            return Ok(());
        }
        if let Some(c) = re(r"^INHERIT {QN}$").captures(clause) {
            let parent = qn(&c, 1);
            let parent_cols = self.table(&parent)?.columns.clone();
            let t = self.table_mut(table)?;
            if let Some(missing) = parent_cols.iter().find(|col| !t.columns.contains(col)) {
                return Err(format!("child table is missing column \"{}\"", missing));
            }
            if t.parents.contains(&parent) {
                return Err(format!("relation {} would be inherited more than once", parent));
            }
            t.parents.push(parent);
            return Ok(());
        }
        Err(format!("unsupported ALTER TABLE clause: {}", clause))
    }

    fn create_table(&mut self, rest: &str) -> Result<(), String> {
        let head = re(r"^{QN} ");
        let c = head.captures(rest).ok_or("malformed CREATE TABLE")?;
        let name = qn(&c, 1);
        let after = &rest[c[0].len()..];
        let (body, tail) = take_parens(after).ok_or("malformed CREATE TABLE body")?;
        self.require_schema(&name.schema)?;
        if self.tables.contains_key(&name) {
            return Err(format!("relation {} already exists", name));
        }
        let mut table = SimTable::default();
        let tail = tail.trim();
        if let Some(parents) = tail.strip_prefix("INHERITS ") {
            let (inner, _) = take_parens(parents).ok_or("malformed INHERITS")?;
            for p in split_top(inner, ',') {
                let pc = re(r"^{QN}$").captures(&p).ok_or("malformed parent")?;
                let parent = qn(&pc, 1);
                for col in &self.table(&parent)?.columns {
                    if !table.columns.contains(col) {
                        table.columns.push(col.clone());
                    }
                }
                table.parents.push(parent);
            }
        }
        let constraint = re(r"^CONSTRAINT {ID} ");
        let column = re(r"^{ID} ");
        for item in split_top(body, ',') {
            if let Some(cc) = constraint.captures(&item) {
                table.constraints.insert(unquote(&cc[1]));
            } else if let Some(cc) = column.captures(&item) {
                let col = unquote(&cc[1]);
                if !table.columns.contains(&col) {
                    table.columns.push(col);
                }
            } else {
                return Err(format!("unsupported table element {}", item));
            }
        }
        self.tables.insert(name, table);
        Ok(())
    }

    fn insert(&mut self, caps: &Captures, params: &[SqlValue]) -> Result<u64, String> {
        let name = qn(caps, 1);
        let columns = ident_list(&caps[3]);
        let mut rest = caps[4].trim();
        let mut records = Vec::new();
        while let Some((inner, tail)) = take_parens(rest) {
            let values = split_top(inner, ',')
                .iter()
                .map(|tok| value_token(tok, params))
                .collect::<Result<Vec<_>, _>>()?;
            if values.len() != columns.len() {
                return Err("INSERT has more expressions than target columns".into());
            }
            records.push(columns.iter().cloned().zip(values).collect::<SimRow>());
            rest = tail.trim_start_matches(',').trim();
        }
        let table = self.table_mut(&name)?;
        for col in &columns {
            if !table.columns.contains(col) {
                return Err(format!("column \"{}\" of relation {} does not exist", col, name));
            }
        }
        if rest.is_empty() {
            let n = records.len() as u64;
            table.rows.extend(records);
            return Ok(n);
        }
        let conflict = re(r"^ON CONFLICT \((.*?)\) DO (NOTHING|UPDATE SET .*?)(?: WHERE cur\.{ID} < EXCLUDED\.{ID})?$");
        let c = conflict.captures(rest).ok_or_else(|| format!("unsupported INSERT tail {}", rest))?;
        let key = ident_list(&c[1]);
        let do_nothing = &c[2] == "NOTHING";
        let guard = c.get(3).map(|m| unquote(m.as_str()));
        let mut affected = 0;
        for record in records {
            let existing = table
                .rows
                .iter_mut()
                .find(|row| key.iter().all(|k| row.get(k) == record.get(k)));
            match existing {
                None => {
                    table.rows.push(record);
                    affected += 1;
                }
                Some(_) if do_nothing => {}
                Some(row) => {
                    if let Some(col) = &guard {
                        let cur = row.get(col).and_then(|v| match v {
                            SqlValue::Int(i) => Some(*i),
                            _ => None,
                        });
                        let new = record.get(col).and_then(|v| match v {
                            SqlValue::Int(i) => Some(*i),
                            _ => None,
                        });
                        if !matches!((cur, new), (Some(a), Some(b)) if a < b) {
                            continue;
                        }
                    }
                    for (k, v) in record {
                        if !key.contains(&k) {
                            row.insert(k, v);
                        }
                    }
                    affected += 1;
                }
            }
        }
        Ok(affected)
    }

    fn update(&mut self, caps: &Captures, params: &[SqlValue]) -> Result<u64, String> {
        let name = qn(caps, 1);
        let assign = re(r"^{ID} = (\S+)$");
        let sets = split_top(&caps[3], ',')
            .iter()
            .map(|a| {
                let c = assign.captures(a).ok_or_else(|| format!("unsupported assignment {}", a))?;
                Ok((unquote(&c[1]), value_token(&c[2], params)?))
            })
            .collect::<Result<Vec<_>, String>>()?;
        let pred = parse_where(caps.get(4).map(|m| m.as_str()), params)?;
        let table = self.table_mut(&name)?;
        for (col, _) in &sets {
            if !table.columns.contains(col) {
                return Err(format!("column \"{}\" of relation {} does not exist", col, name));
            }
        }
        let mut affected = 0;
        for row in table.rows.iter_mut().filter(|r| matches(r, &pred)) {
            for (col, v) in &sets {
                row.insert(col.clone(), v.clone());
            }
            affected += 1;
        }
        Ok(affected)
    }

    fn apply(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, String> {
        if let Some(c) = re(r"^CREATE SCHEMA {ID}$").captures(sql) {
            let name = unquote(&c[1]);
            if !self.schemas.insert(name.clone()) {
                return Err(format!("schema \"{}\" already exists", name));
            }
            return Ok(0);
        }
        if let Some(c) = re(r"^DROP SCHEMA {ID}$").captures(sql) {
            let name = unquote(&c[1]);
            self.require_schema(&name)?;
            if !self.schema_is_empty(&name) {
                return Err(format!("cannot drop schema {} because other objects depend on it", name));
            }
            self.schemas.remove(&name);
            return Ok(0);
        }
        if let Some(c) = re(r"^CREATE EXTENSION {ID} WITH SCHEMA {ID}$").captures(sql) {
            self.require_schema(&unquote(&c[2]))?;
            if !self.extensions.insert(unquote(&c[1])) {
                return Err(format!("extension \"{}\" already exists", &c[1]));
            }
            return Ok(0);
        }
        if let Some(rest) = sql.strip_prefix("CREATE TABLE ") {
            self.create_table(rest)?;
            return Ok(0);
        }
        if let Some(c) = re(r"^DROP TABLE {QN}$").captures(sql) {
            let name = qn(&c, 1);
            self.table(&name)?;
            if !self.children_of(&name).is_empty() {
                return Err(format!("cannot drop table {} because other objects depend on it", name));
            }
            self.tables.remove(&name);
            self.indexes.retain(|_, idx| idx.table != name);
            return Ok(0);
        }
        if let Some(c) = re(r"^ALTER TABLE {QN} (.+)$").captures(sql) {
            let name = qn(&c, 1);
            let rest = &c[3];
            self.table(&name)?;
            if let Some(s) = re(r"^SET SCHEMA {ID}$").captures(rest) {
                let target = PgName::new(unquote(&s[1]), name.name.clone());
                self.rename_table(&name, target)?;
            } else if let Some(s) = re(r"^RENAME TO {ID}$").captures(rest) {
                let target = name.with_name(unquote(&s[1]));
                self.rename_table(&name, target)?;
            } else if let Some(s) = re(r"^RENAME COLUMN {ID} TO {ID}$").captures(rest) {
                let (old, new) = (unquote(&s[1]), unquote(&s[2]));
                let t = self.table_mut(&name)?;
                let pos = t
                    .columns
                    .iter()
                    .position(|col| col == &old)
                    .ok_or_else(|| format!("column \"{}\" does not exist", old))?;
                t.columns[pos] = new.clone();
                for row in t.rows.iter_mut() {
                    if let Some(v) = row.remove(&old) {
                        row.insert(new.clone(), v);
                    }
                }
            } else if let Some(s) = re(r"^RENAME CONSTRAINT {ID} TO {ID}$").captures(rest) {
                let t = self.table_mut(&name)?;
                if !t.constraints.remove(&unquote(&s[1])) {
                    return Err(format!("constraint \"{}\" does not exist", &s[1]));
                }
                t.constraints.insert(unquote(&s[2]));
            } else {
                for clause in split_top(rest, ',') {
                    self.alter_clause(&name, &clause)?;
                }
            }
            return Ok(0);
        }
        if let Some(c) = re(r"^CREATE DOMAIN {QN} AS (.+)$").captures(sql) {
            let name = qn(&c, 1);
            self.require_schema(&name.schema)?;
            if self.domains.contains_key(&name) {
                return Err(format!("type {} already exists", name));
            }
            let checks = re(r"CONSTRAINT {ID} CHECK")
                .captures_iter(&c[3])
                .map(|cc| unquote(&cc[1]))
                .collect();
            self.domains.insert(name, checks);
            return Ok(0);
        }
        if let Some(c) = re(r"^ALTER DOMAIN {QN} (.+)$").captures(sql) {
            let name = qn(&c, 1);
            let rest = &c[3];
            if !self.domains.contains_key(&name) {
                return Err(format!("type {} does not exist", name));
            }
            let target = if let Some(s) = re(r"^SET SCHEMA {ID}$").captures(rest) {
                Some(PgName::new(unquote(&s[1]), name.name.clone()))
            } else {
                re(r"^RENAME TO {ID}$")
                    .captures(rest)
                    .map(|s| name.with_name(unquote(&s[1])))
            };
            if let Some(target) = target {
                self.require_schema(&target.schema)?;
                if self.domains.contains_key(&target) {
                    return Err(format!("type {} already exists", target));
                }
                if let Some(checks) = self.domains.remove(&name) {
                    self.domains.insert(target, checks);
                }
                return Ok(0);
            }
            let checks = self.domains.get_mut(&name).ok_or("domain vanished")?;
            if let Some(s) = re(r"^ADD CONSTRAINT {ID} ").captures(rest) {
                if !checks.insert(unquote(&s[1])) {
                    return Err(format!("constraint \"{}\" already exists", &s[1]));
                }
            } else if let Some(s) = re(r"^DROP CONSTRAINT {ID}$").captures(rest) {
                if !checks.remove(&unquote(&s[1])) {
                    return Err(format!("constraint \"{}\" does not exist", &s[1]));
                }
            } else if !(rest.starts_with("SET DEFAULT ") || rest == "DROP DEFAULT") {
                return Err(format!("unsupported ALTER DOMAIN: {}", rest));
            }
            return Ok(0);
        }
        if let Some(c) = re(r"^DROP DOMAIN {QN}$").captures(sql) {
            let name = qn(&c, 1);
            if self.domains.remove(&name).is_none() {
                return Err(format!("type {} does not exist", name));
            }
            return Ok(0);
        }
        if let Some(c) = re(r"^CREATE (?:UNIQUE )?INDEX {ID} ON {QN} \((.*?)\)(?: WHERE (.+))?$").captures(sql) {
            let table = qn(&c, 2);
            self.table(&table)?;
            let name = table.with_name(unquote(&c[1]));
            if self.indexes.contains_key(&name) {
                return Err(format!("relation {} already exists", name));
            }
            let predicate = c.get(5).map(|m| m.as_str().to_string());
            self.indexes.insert(name, SimIndex { table, predicate });
            return Ok(0);
        }
        if let Some(c) = re(r"^DROP INDEX {QN}$").captures(sql) {
            let name = qn(&c, 1);
            if self.indexes.remove(&name).is_none() {
                return Err(format!("index {} does not exist", name));
            }
            return Ok(0);
        }
        if let Some(c) = re(r"^ALTER INDEX {QN} RENAME TO {ID}$").captures(sql) {
            let name = qn(&c, 1);
            let idx = self
                .indexes
                .remove(&name)
                .ok_or_else(|| format!("index {} does not exist", name))?;
            self.indexes.insert(name.with_name(unquote(&c[3])), idx);
            return Ok(0);
        }
        if let Some(c) = re(r"^CREATE TYPE {QN} AS \(.*\)$").captures(sql) {
            let name = qn(&c, 1);
            self.require_schema(&name.schema)?;
            if !self.types.insert(name.clone()) {
                return Err(format!("type {} already exists", name));
            }
            return Ok(0);
        }
        if let Some(c) = re(r"^DROP TYPE {QN}(?: CASCADE)?$").captures(sql) {
            let name = qn(&c, 1);
            if !self.types.remove(&name) {
                return Err(format!("type {} does not exist", name));
            }
            return Ok(0);
        }
        if let Some(c) = re(r"^CREATE SEQUENCE {QN}$").captures(sql) {
            let name = qn(&c, 1);
            self.require_schema(&name.schema)?;
            if !self.sequences.insert(name.clone()) {
                return Err(format!("relation {} already exists", name));
            }
            return Ok(0);
        }
        if let Some(c) = re(r"^ALTER SEQUENCE {QN} (SET SCHEMA|RENAME TO) {ID}$").captures(sql) {
            let name = qn(&c, 1);
            if !self.sequences.remove(&name) {
                return Err(format!("relation {} does not exist", name));
            }
            let target = if &c[3] == "SET SCHEMA" {
                PgName::new(unquote(&c[4]), name.name.clone())
            } else {
                name.with_name(unquote(&c[4]))
            };
            self.sequences.insert(target);
            return Ok(0);
        }
        if let Some(c) = re(r"^DROP SEQUENCE {QN}$").captures(sql) {
            let name = qn(&c, 1);
            if !self.sequences.remove(&name) {
                return Err(format!("relation {} does not exist", name));
            }
            return Ok(0);
        }
        if let Some(c) = re(r"^INSERT INTO {QN}(?: AS cur)? \((.*?)\) VALUES (.+)$").captures(sql) {
            return self.insert(&c, params);
        }
        if let Some(c) = re(r"^UPDATE {QN} SET (.+?)(?: WHERE (.+))?$").captures(sql) {
            return self.update(&c, params);
        }
        if let Some(c) = re(r"^DELETE FROM {QN}(?: WHERE (.+))?$").captures(sql) {
            let name = qn(&c, 1);
            let pred = parse_where(c.get(3).map(|m| m.as_str()), params)?;
            let table = self.table_mut(&name)?;
            let before = table.rows.len();
            table.rows.retain(|r| !matches(r, &pred));
            return Ok((before - table.rows.len()) as u64);
        }
        Err(format!("unsupported statement: {}", sql))
    }

    fn flag(&self, sql: &str, p: &[String]) -> Option<bool> {
        let name = |i: usize| PgName::new(p[i].clone(), p[i + 1].clone());
        let answer = match sql {
            introspect::SCHEMA_EXISTS => self.schemas.contains(&p[0]),
            introspect::EXTENSION_EXISTS => self.extensions.contains(&p[0]),
            introspect::TABLE_EXISTS => self.tables.contains_key(&name(0)),
            introspect::COLUMN_EXISTS => self
                .tables
                .get(&name(0))
                .is_some_and(|t| t.columns.contains(&p[2])),
            introspect::INDEX_EXISTS => self.indexes.contains_key(&name(0)),
            introspect::SEQUENCE_EXISTS => self.sequences.contains(&name(0)),
            introspect::DOMAIN_EXISTS => self.domains.contains_key(&name(0)),
            introspect::COMPOSITE_TYPE_EXISTS => self.types.contains(&name(0)),
            introspect::TABLE_INHERITS => self
                .tables
                .get(&name(0))
                .is_some_and(|t| t.parents.contains(&name(2))),
            introspect::TABLE_CONSTRAINT_EXISTS => self
                .tables
                .get(&name(0))
                .is_some_and(|t| t.constraints.contains(&p[2])),
            introspect::DOMAIN_CONSTRAINT_EXISTS => self
                .domains
                .get(&name(0))
                .is_some_and(|c| c.contains(&p[2])),
            _ => return None,
        };
        Some(answer)
    }

    fn names(&self, sql: &str, p: &[String]) -> Option<Vec<String>> {
        let names = match sql {
            introspect::SCHEMAS_LIKE => self.schemas.iter().filter(|s| like(&p[0], s)).cloned().collect(),
            introspect::TABLES_LIKE => self
                .tables
                .keys()
                .filter(|n| n.schema == p[0] && like(&p[1], &n.name))
                .map(|n| n.name.clone())
                .collect(),
            introspect::COMPOSITE_TYPES_LIKE => self
                .types
                .iter()
                .filter(|n| n.schema == p[0] && like(&p[1], &n.name))
                .map(|n| n.name.clone())
                .collect(),
            introspect::TABLE_CONSTRAINTS_LIKE => self
                .tables
                .get(&PgName::new(p[0].clone(), p[1].clone()))
                .map(|t| t.constraints.iter().filter(|c| like(&p[2], c)).cloned().collect())
                .unwrap_or_default(),
            _ => return None,
        };
        Some(names)
    }

    fn select(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, String> {
        let c = re(r"^SELECT (.+?) FROM {QN}(?: WHERE (.+))?$")
            .captures(sql)
            .ok_or_else(|| format!("unsupported query: {}", sql))?;
        let columns = ident_list(&c[1]);
        let name = qn(&c, 2);
        let pred = parse_where(c.get(4).map(|m| m.as_str()), params)?;
        let table = self.table(&name)?;
        for col in &columns {
            if !table.columns.contains(col) {
                return Err(format!("column \"{}\" does not exist", col));
            }
        }
        Ok(table
            .rows
            .iter()
            .filter(|r| matches(r, &pred))
            .map(|r| {
                Row::from_pairs(
                    columns
                        .iter()
                        .map(|col| (col.clone(), r.get(col).cloned().unwrap_or(SqlValue::Null))),
                )
            })
            .collect())
    }
}

impl SimSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any statement containing `fragment`.
    pub fn fail_on(&mut self, fragment: &str) {
        self.fail_on = Some(fragment.to_string());
    }

    /// Statements executed, transaction control excluded.
    pub fn executed(&self) -> Vec<String> {
        self.transcript
            .iter()
            .filter(|s| !matches!(s.as_str(), "BEGIN" | "COMMIT" | "ROLLBACK"))
            .cloned()
            .collect()
    }

    /// Every statement, transaction control included.
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn clear_log(&mut self) {
        self.transcript.clear();
    }

    pub fn add_schema(&mut self, name: &str) {
        self.catalog.schemas.insert(name.to_string());
    }

    pub fn add_table(&mut self, name: &PgName, columns: &[&str]) {
        self.add_schema(&name.schema);
        let table = self.catalog.tables.entry(name.clone()).or_default();
        for col in columns {
            if !table.columns.iter().any(|c| c == col) {
                table.columns.push(col.to_string());
            }
        }
    }

    pub fn add_parent(&mut self, table: &PgName, parent: &PgName) {
        if let Some(t) = self.catalog.tables.get_mut(table) {
            t.parents.push(parent.clone());
        }
    }

    pub fn add_table_constraint(&mut self, table: &PgName, constraint: &str) {
        if let Some(t) = self.catalog.tables.get_mut(table) {
            t.constraints.insert(constraint.to_string());
        }
    }

    pub fn add_row(&mut self, table: &PgName, values: &[(&str, SqlValue)]) {
        if let Some(t) = self.catalog.tables.get_mut(table) {
            t.rows
                .push(values.iter().map(|(k, v)| (k.to_string(), v.clone())).collect());
        }
    }

    pub fn add_domain(&mut self, name: &PgName, constraints: &[&str]) {
        self.add_schema(&name.schema);
        self.catalog
            .domains
            .insert(name.clone(), constraints.iter().map(|c| c.to_string()).collect());
    }

    pub fn add_index(&mut self, table: &PgName, name: &str, predicate: Option<&str>) {
        self.catalog.indexes.insert(
            table.with_name(name),
            SimIndex {
                table: table.clone(),
                predicate: predicate.map(str::to_string),
            },
        );
    }

    pub fn add_type(&mut self, name: &PgName) {
        self.add_schema(&name.schema);
        self.catalog.types.insert(name.clone());
    }

    pub fn add_sequence(&mut self, name: &PgName) {
        self.catalog.sequences.insert(name.clone());
    }

    pub fn has_schema(&self, name: &str) -> bool {
        self.catalog.schemas.contains(name)
    }

    pub fn has_table(&self, name: &PgName) -> bool {
        self.catalog.tables.contains_key(name)
    }

    pub fn columns(&self, table: &PgName) -> Vec<String> {
        self.catalog
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default()
    }

    pub fn parents(&self, table: &PgName) -> Vec<PgName> {
        self.catalog
            .tables
            .get(table)
            .map(|t| t.parents.clone())
            .unwrap_or_default()
    }

    pub fn table_constraints(&self, table: &PgName) -> Vec<String> {
        self.catalog
            .tables
            .get(table)
            .map(|t| t.constraints.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn rows(&self, table: &PgName) -> Vec<BTreeMap<String, SqlValue>> {
        self.catalog
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn has_domain(&self, name: &PgName) -> bool {
        self.catalog.domains.contains_key(name)
    }

    pub fn domain_constraints(&self, name: &PgName) -> Vec<String> {
        self.catalog
            .domains
            .get(name)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Predicate of an index, `None` when the index does not exist.
    pub fn index_predicate(&self, name: &PgName) -> Option<Option<String>> {
        self.catalog.indexes.get(name).map(|i| i.predicate.clone())
    }

    pub fn index_names(&self) -> Vec<PgName> {
        self.catalog.indexes.keys().cloned().collect()
    }

    pub fn has_type(&self, name: &PgName) -> bool {
        self.catalog.types.contains(name)
    }

    pub fn has_sequence(&self, name: &PgName) -> bool {
        self.catalog.sequences.contains(name)
    }

    fn rejected(sql: &str, message: String) -> DbError {
        DbError::Rejected {
            sql: sql.to_string(),
            message,
        }
    }
}

impl Session for SimSession {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        self.transcript.push(sql.to_string());
        match sql {
            "BEGIN" => {
                self.snapshot = Some(self.catalog.clone());
                return Ok(0);
            }
            "COMMIT" => {
                self.snapshot = None;
                return Ok(0);
            }
            "ROLLBACK" => {
                if let Some(saved) = self.snapshot.take() {
                    self.catalog = saved;
                }
                return Ok(0);
            }
            _ => {}
        }
        if let Some(fragment) = &self.fail_on {
            if sql.contains(fragment.as_str()) {
                return Err(Self::rejected(sql, "injected failure".into()));
            }
        }
        self.catalog
            .apply(sql, params)
            .map_err(|message| Self::rejected(sql, message))
    }

    fn fetch(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        let text: Vec<String> = params.iter().map(|p| p.as_string_or("")).collect();
        if let Some(flag) = self.catalog.flag(sql, &text) {
            return Ok(vec![Row::from_pairs([("exists", SqlValue::Bool(flag))])]);
        }
        if let Some(names) = self.catalog.names(sql, &text) {
            return Ok(names
                .into_iter()
                .map(|n| Row::from_pairs([("name", SqlValue::Text(n))]))
                .collect());
        }
        if sql == introspect::INDEXES_LIKE {
            return Ok(self
                .catalog
                .indexes
                .iter()
                .filter(|(n, _)| like(&text[0], &n.schema) && like(&text[1], &n.name))
                .map(|(n, idx)| {
                    Row::from_pairs([
                        ("schema_name", SqlValue::Text(idx.table.schema.clone())),
                        ("table_name", SqlValue::Text(idx.table.name.clone())),
                        ("index_name", SqlValue::Text(n.name.clone())),
                        ("predicate", idx.predicate.clone().map_or(SqlValue::Null, SqlValue::Text)),
                    ])
                })
                .collect());
        }
        self.catalog
            .select(sql, params)
            .map_err(|message| Self::rejected(sql, message))
    }

    fn backend_name(&self) -> &'static str {
        "sim"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_patterns() {
        assert!(like("sdm_%", "sdm_app"));
        assert!(like("%_link_mapping_idx", "name_link_source_*1_link_mapping_idx"));
        assert!(!like("sdm_%", "sd_meta"));
    }

    #[test]
    fn test_rollback_restores_catalog() {
        let mut s = SimSession::new();
        s.begin().unwrap();
        s.execute("CREATE SCHEMA \"sdm_app\"", &[]).unwrap();
        assert!(s.has_schema("sdm_app"));
        s.rollback().unwrap();
        assert!(!s.has_schema("sdm_app"));
    }

    #[test]
    fn test_inherit_requires_parent_columns() {
        let mut s = SimSession::new();
        let parent = PgName::new("sdm_app", "Named_data");
        let child = PgName::new("sdm_app", "Person_data");
        s.add_table(&parent, &["id", "name"]);
        s.add_table(&child, &["id"]);
        let err = s
            .execute("ALTER TABLE \"sdm_app\".\"Person_data\" INHERIT \"sdm_app\".\"Named_data\"", &[])
            .unwrap_err();
        assert!(err.to_string().contains("missing column"));
    }

    #[test]
    fn test_select_and_update_rows() {
        let mut s = SimSession::new();
        let t = PgName::new("sd_meta", "link");
        s.add_table(&t, &["name", "link_type_id"]);
        s.add_row(&t, &[("name", SqlValue::from("app::name")), ("link_type_id", SqlValue::Int(3))]);
        s.execute(
            "UPDATE \"sd_meta\".\"link\" SET \"link_type_id\" = $1 WHERE \"name\" = $2",
            &[SqlValue::Int(4), SqlValue::from("app::name")],
        )
        .unwrap();
        let rows = s
            .fetch("SELECT \"link_type_id\" FROM \"sd_meta\".\"link\"", &[])
            .unwrap();
        assert_eq!(rows[0].int("link_type_id").unwrap(), Some(4));
    }

    #[test]
    fn test_unknown_statement_rejected() {
        let mut s = SimSession::new();
        assert!(s.execute("VACUUM", &[]).is_err());
    }
}
