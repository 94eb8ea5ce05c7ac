use core::fmt;

use thiserror::Error;

use crate::version::SchemaVersion;

/// Error during migration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MigrationError {
    /// No step is registered for the dump's version and it is not current.
    #[error("no migration step registered for v{from} (running v{current})")]
    MigrationGap {
        from: SchemaVersion,
        current: SchemaVersion,
    },
    /// A step upgrades to a version that is neither current nor the source
    /// of another step.
    #[error("missing migration step for v{missing}")]
    GapInChain { missing: SchemaVersion },
    /// Two steps claim the same source version.
    #[error("more than one migration step registered for v{from}")]
    DuplicateStep { from: SchemaVersion },
    /// A step does not strictly advance the version.
    #[error("migration step v{from}→v{to} does not advance the schema version")]
    NonAdvancingStep {
        from: SchemaVersion,
        to: SchemaVersion,
    },
    /// A step upgrades past the running version.
    #[error("migration step targets v{to}, beyond running v{current}")]
    Overshoot {
        to: SchemaVersion,
        current: SchemaVersion,
    },
    /// The dump is newer than the running schema.
    #[error("data version v{found} is newer than running v{current}")]
    FutureVersion {
        found: SchemaVersion,
        current: SchemaVersion,
    },
    /// A row lacks a field, carries an unexpected one, or a value has the
    /// wrong type.
    #[error("{kind}: {problem}")]
    FieldShape { kind: String, problem: ShapeProblem },
    /// A legacy enumeration code has no mapping.
    #[error("unrecognized code {code:?} in choice list {list}")]
    UnrecognizedEnumerationCode { list: String, code: String },
    /// A version token could not be parsed.
    #[error("invalid schema version {0:?}")]
    InvalidVersion(String),
    /// A lookup collaborator failed.
    #[error("lookup failed: {0}")]
    Lookup(String),
}

impl MigrationError {
    pub(crate) fn shape(kind: &str, problem: ShapeProblem) -> Self {
        Self::FieldShape {
            kind: kind.to_string(),
            problem,
        }
    }
}

/// What is wrong with a row's fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeProblem {
    /// Required fields that are absent.
    Missing(Vec<String>),
    /// Fields that the accepting shape does not declare.
    Unexpected(Vec<String>),
    /// A field holds a value of the wrong type.
    WrongType {
        field: String,
        expected: &'static str,
    },
}

impl fmt::Display for ShapeProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(fields) => write!(f, "missing field(s) {}", fields.join(", ")),
            Self::Unexpected(fields) => write!(f, "unexpected field(s) {}", fields.join(", ")),
            Self::WrongType { field, expected } => {
                write!(f, "field {field} is not {expected}")
            }
        }
    }
}
