//! Logical schema model consumed by the delta compiler.
//!
//! The compiler only reads the snapshot through [`SchemaLookup`] and changes it
//! through the functions in [`apply`]. Everything physical lives elsewhere.

pub mod apply;
pub mod name;
pub mod objects;
pub mod payload;
pub mod snapshot;
pub mod types;

pub use name::QualName;
pub use objects::{LinkMapping, ObjectKind, SchemaObject};
pub use snapshot::{Schema, SchemaLookup};
pub use types::{NativeType, RuleResult, TypeRef, TypeRules};
