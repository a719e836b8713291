//! Where a pointer's values live.
//!
//! A specialized link is either a column of its source concept's table or
//! rows of its own link table. Link properties are always columns of the
//! link's table. Nothing here is cached; every call reads the snapshot.

use crate::db::PgName;
use crate::error::DeltaError;
use crate::schema::objects::{Link, LinkProperty, SchemaObject};
use crate::schema::snapshot::{native_type_name, ROOT_LINK, SOURCE_PROPERTY, TARGET_PROPERTY};
use crate::schema::{ObjectKind, QualName, Schema, SchemaLookup};

use super::names;

/// Column holding the target of an own-table link pointing at a concept.
pub const TARGET_ID_COLUMN: &str = "target_id";
/// Column holding the target of an own-table link pointing at an atom.
pub const TARGET_VALUE_COLUMN: &str = "target_value";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableType {
    /// Column of the source concept's table.
    Concept,
    /// Own relation table.
    Link,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerStorage {
    pub table: PgName,
    pub column: String,
    pub column_type: String,
    pub table_type: TableType,
}

/// Backend type of a column holding values of `target`.
pub fn column_type(schema: &Schema, target: &QualName) -> Result<String, DeltaError> {
    if let Some(native) = native_type_name(target) {
        return Ok(native.to_string());
    }
    match schema.get(target) {
        Some(SchemaObject::Atom(_)) => Ok(names::atom_domain(target).to_string()),
        Some(SchemaObject::Concept(_)) => Ok("uuid".to_string()),
        _ => Err(DeltaError::inconsistency(format!(
            "'{}' is neither an atom nor a concept",
            target
        ))),
    }
}

pub fn is_atomic(schema: &Schema, link: &Link) -> bool {
    link.target.as_ref().is_some_and(|t| schema.is_atom(t))
}

/// Whether the link carries properties beyond the builtin endpoints.
pub fn has_user_properties(schema: &Schema, link: &Link) -> Result<bool, DeltaError> {
    let is_user = |normal: &QualName| {
        let full = normal.to_string();
        full != SOURCE_PROPERTY && full != TARGET_PROPERTY
    };
    if link.properties.keys().any(is_user) {
        return Ok(true);
    }
    // The link itself may already be gone from the snapshot, so walk from
    // its bases.
    for base in &link.bases {
        if schema.get(base).is_some() && schema.properties_of(base)?.keys().any(is_user) {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn has_table(schema: &Schema, link: &Link) -> Result<bool, DeltaError> {
    if link.is_pure_computable() {
        return Ok(false);
    }
    if !link.is_generic() {
        return Ok(!is_atomic(schema, link)
            || !link.mapping.is_singular()
            || has_user_properties(schema, link)?);
    }
    if link.name.to_string() == ROOT_LINK || has_user_properties(schema, link)? {
        return Ok(true);
    }
    for child in schema.descendants(&link.name) {
        if let SchemaObject::Link(child) = child {
            if !child.is_generic() && has_table(schema, child)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Location of a specialized link, or `None` for generic and pure
/// computable links.
pub fn resolve(schema: &Schema, link: &Link) -> Result<Option<PointerStorage>, DeltaError> {
    if link.is_generic() || link.is_pure_computable() {
        return Ok(None);
    }
    let target = link
        .target
        .as_ref()
        .ok_or_else(|| DeltaError::inconsistency(format!("link '{}' has no target", link.name)))?;
    let atomic = is_atomic(schema, link);

    if atomic && link.mapping.is_singular() && !has_user_properties(schema, link)? {
        let source = link.source.as_ref().ok_or_else(|| {
            DeltaError::inconsistency(format!("link '{}' has no source", link.name))
        })?;
        return Ok(Some(PointerStorage {
            table: names::concept_table(source),
            column: names::pointer_column(link.normal_name()),
            column_type: column_type(schema, target)?,
            table_type: TableType::Concept,
        }));
    }

    let (column, column_type) = if atomic {
        (TARGET_VALUE_COLUMN, column_type(schema, target)?)
    } else {
        (TARGET_ID_COLUMN, "uuid".to_string())
    };
    Ok(Some(PointerStorage {
        table: names::link_table(&link.name),
        column: column.to_string(),
        column_type,
        table_type: TableType::Link,
    }))
}

/// Location of a link property: a column of its link's table.
pub fn resolve_property(schema: &Schema, prop: &LinkProperty) -> Result<Option<PointerStorage>, DeltaError> {
    let Some(source) = &prop.source else {
        return Ok(None);
    };
    let target = prop.target.as_ref().ok_or_else(|| {
        DeltaError::inconsistency(format!("link property '{}' has no target", prop.name))
    })?;
    if schema.get(source).map(SchemaObject::kind) != Some(ObjectKind::Link) {
        return Err(DeltaError::unknown(ObjectKind::Link, source));
    }
    Ok(Some(PointerStorage {
        table: names::link_table(source),
        column: names::pointer_column(prop.normal_name()),
        column_type: column_type(schema, target)?,
        table_type: TableType::Link,
    }))
}
