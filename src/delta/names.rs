//! Deterministic physical names derived from qualified schema names.

use sha2::{Digest, Sha256};

use crate::db::PgName;
use crate::schema::objects::LinkMapping;
use crate::schema::QualName;

/// Schema holding the compiler's own metadata tables.
pub const META_SCHEMA: &str = "sd_meta";

const MODULE_SCHEMA_PREFIX: &str = "sdm_";

/// PostgreSQL truncates identifiers beyond this many bytes.
pub const MAX_IDENT_LEN: usize = 63;

const HASH_PREFIX_LEN: usize = 12;

/// Join `base` and `suffix` into an identifier that fits the backend limit.
///
/// Overlong names are replaced by a hash of the full name followed by as
/// much of `base` as fits, so the suffix (which carries meaning such as
/// `_link_mapping_idx`) always survives.
pub fn pg_ident(base: &str, suffix: &str) -> String {
    let full = format!("{}{}", base, suffix);
    if full.len() <= MAX_IDENT_LEN {
        return full;
    }
    let digest = hex::encode(Sha256::digest(full.as_bytes()));
    let budget = MAX_IDENT_LEN.saturating_sub(HASH_PREFIX_LEN + 1 + suffix.len());
    let mut cut = budget.min(base.len());
    while !base.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}_{}{}", &digest[..HASH_PREFIX_LEN], &base[..cut], suffix)
}

pub fn module_schema(module: &str) -> String {
    pg_ident(MODULE_SCHEMA_PREFIX, module)
}

fn in_module(name: &QualName, suffix: &str) -> PgName {
    PgName::new(module_schema(&name.module), pg_ident(name.local(), suffix))
}

pub fn concept_table(name: &QualName) -> PgName {
    in_module(name, "_data")
}

pub fn link_table(name: &QualName) -> PgName {
    in_module(name, "_link")
}

pub fn atom_domain(name: &QualName) -> PgName {
    in_module(name, "_domain")
}

/// Temporary name a domain takes while its replacement is built.
pub fn atom_tmp_domain(name: &QualName) -> PgName {
    in_module(name, "_domain_tmp")
}

pub fn atom_sequence(name: &QualName) -> PgName {
    in_module(name, "_sequence")
}

/// Column of a pointer, named after its generic link.
pub fn pointer_column(normal: &QualName) -> String {
    pg_ident(normal.local(), "")
}

pub fn meta_table(name: &str) -> PgName {
    PgName::new(META_SCHEMA, name)
}

/// Stable 31-bit identifier for a link that has no persisted id yet.
pub fn link_type_id(name: &QualName) -> i64 {
    let digest = Sha256::digest(name.to_string().as_bytes());
    let raw = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    i64::from(raw & 0x7fff_ffff)
}

pub fn mapping_index_name(table: &PgName, side: &str, mapping: LinkMapping) -> String {
    pg_ident(
        &format!("{}_{}", table.name, side),
        &format!("_{}_link_mapping_idx", mapping.code()),
    )
}

/// Name of a table-level constraint derived from a schema constraint.
pub fn table_constraint_name(table: &PgName, constraint: &QualName) -> String {
    pg_ident(&format!("{}_{}", table.name, constraint.local()), "")
}

pub fn domain_constraint_name(constraint: &QualName) -> String {
    pg_ident(constraint.local(), "")
}

/// Name of an expression index declared on a concept.
pub fn source_index_name(table: &PgName, index: &QualName) -> String {
    pg_ident(&format!("{}_{}", table.name, index.local()), "_idx")
}
