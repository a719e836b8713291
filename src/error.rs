//! Errors raised while compiling deltas or upgrading a deployment.

use thiserror::Error;

use crate::db::DbError;
use crate::schema::name::QualName;
use crate::schema::objects::ObjectKind;

#[derive(Error, Debug)]
pub enum DeltaError {
    /// The schema snapshot does not agree with what a command expects.
    #[error("Schema inconsistency: {0}")]
    SchemaInconsistency(String),

    #[error("Unknown {kind} '{name}'")]
    UnknownObject { kind: ObjectKind, name: QualName },

    #[error("Cannot parse mapping index '{name}' with predicate '{predicate}'")]
    UnparsableIndex { name: String, predicate: String },

    #[error("Cannot create a consistent base order for '{name}'")]
    InconsistentBases { name: QualName },

    #[error("No handler for {command} {kind}")]
    UnsupportedCommand { command: String, kind: ObjectKind },

    #[error("Backend format version {found} is newer than supported version {current}")]
    UnsupportedFormat { found: i32, current: i32 },

    #[error("Upgrade step {version} failed: {source}")]
    Upgrade {
        version: i32,
        #[source]
        source: Box<DeltaError>,
    },

    /// The backend rejected a statement; propagated unchanged.
    #[error(transparent)]
    Backend(#[from] DbError),
}

impl DeltaError {
    pub fn inconsistency(msg: impl Into<String>) -> Self {
        DeltaError::SchemaInconsistency(msg.into())
    }

    pub fn unknown(kind: ObjectKind, name: &QualName) -> Self {
        DeltaError::UnknownObject {
            kind,
            name: name.clone(),
        }
    }

    /// Whether this error came from the backend refusing a statement.
    pub fn is_backend_rejection(&self) -> bool {
        match self {
            DeltaError::Backend(DbError::Rejected { .. }) => true,
            DeltaError::Upgrade { source, .. } => source.is_backend_rejection(),
            _ => false,
        }
    }
}
