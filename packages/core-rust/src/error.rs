//! Error taxonomy shared by every entitygraph operation.

/// Errors raised by registry, write, remove, and read operations.
///
/// Only [`ModelError::MissingId`] is recoverable inside a write: the offending
/// record is skipped and the rest of the batch proceeds. Every other variant
/// aborts the current call and leaves stored state untouched.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model name already registered: {name}")]
    DuplicateModel { name: String },
    #[error("model name not registered: {name}")]
    UnknownModel { name: String },
    #[error("record of model {model} is missing its id attribute `{id_attr}`")]
    MissingId { model: String, id_attr: String },
    #[error("remove target for model {model} is undefined")]
    InvalidRemoveTarget { model: String },
    #[error("model {model} references itself through its relations; deep reads are unbounded")]
    CyclicSchema { model: String },
    #[error("field `{field}` of model {model} holds nested data but is not a declared relation")]
    UndeclaredRelation { model: String, field: String },
    #[error("relation field `{field}` of model {model} holds neither nested records nor ids")]
    InvalidRelation { model: String, field: String },
    #[error("payload for model {model} must be an object or a list of objects")]
    InvalidPayload { model: String },
    #[error("invalid schema definition: {0}")]
    InvalidSchema(#[from] serde_json::Error),
}

impl ModelError {
    pub(crate) fn unknown_model(name: &str) -> Self {
        Self::UnknownModel {
            name: name.to_string(),
        }
    }
}

/// Result alias for entitygraph operations.
pub type Result<T> = std::result::Result<T, ModelError>;
