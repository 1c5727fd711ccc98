use crate::types::EntityId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("step has format error: {step}")]
    FormatError { step: String },

    #[error("unsupported code entity kind: {0}")]
    UnsupportedKind(String),

    #[error("usage edge references unknown entity: {0}")]
    UnknownEntity(String),

    #[error("malformed usage edge for `{consumer}`: {reason}")]
    MalformedEdge { consumer: String, reason: String },

    #[error("cyclic dependency: {} of the planned entities cannot be ordered (cycle: {})", .unresolved.len(), .cycle.join(" -> "))]
    CyclicDependency {
        /// Every entity left out of the order, in graph order.
        unresolved: Vec<String>,
        /// One concrete cycle among the unresolved entities; each entity
        /// uses the next one.
        cycle: Vec<String>,
    },

    #[error("invalid entity name `{0}`: expected a letter or `_` followed by letters, digits or `_`")]
    InvalidName(String),

    #[error("duplicate qualifier name: {0}")]
    DuplicateQualifierName(String),

    #[error("entity `{entity}` cannot be nested under `{parent}`")]
    InvalidNesting { entity: String, parent: String },

    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("invalid plan source {path}: {reason}")]
    InvalidPlanSource { path: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}
