//! Error types for the persistence layer.

use thiserror::Error;

/// Errors that can occur in the state persistence layer.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Database connection failed: {0}")]
    Connection(String),

    #[error("Database query failed: {0}")]
    Query(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    #[error("Commit not found: {0}")]
    CommitNotFound(String),

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("Tree not found: {0}")]
    TreeNotFound(String),

    #[error("Invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),

    #[error("Lock '{0}' already held")]
    LockHeld(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Folds persistence errors into the engine's closed error taxonomy so
/// callers above `schemavcs-state` only ever match on `EngineError`.
impl From<StateError> for schemavcs_core::EngineError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::LockHeld(name) => schemavcs_core::EngineError::LockTimeout {
                lock_name: name,
                timeout_ms: 0,
            },
            StateError::CommitNotFound(id) => {
                schemavcs_core::EngineError::ValidationError(format!("commit not found: {id}"))
            }
            StateError::BlobNotFound(id) => {
                schemavcs_core::EngineError::ValidationError(format!("blob not found: {id}"))
            }
            StateError::TreeNotFound(id) => {
                schemavcs_core::EngineError::ValidationError(format!("tree not found: {id}"))
            }
            StateError::BranchNotFound(name) => {
                schemavcs_core::EngineError::ValidationError(format!("branch not found: {name}"))
            }
            StateError::InvalidObjectId(id) => {
                schemavcs_core::EngineError::ValidationError(format!("invalid object id: {id}"))
            }
            other => schemavcs_core::EngineError::CorruptionDetected(other.to_string()),
        }
    }
}
