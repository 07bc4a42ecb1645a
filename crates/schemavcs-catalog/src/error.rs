use thiserror::Error;

/// Errors surfaced by a [`crate::CatalogReader`] implementation.
///
/// Kept separate from `schemavcs_core::EngineError` — the core wraps these
/// via `#[from]` rather than duplicating connection/query concerns per
/// backend (mirrors `StateError`/`StorageError` split in the teacher's
/// persistence crate).
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog connection failed: {0}")]
    Connection(String),

    #[error("catalog query failed: {0}")]
    Query(String),

    #[error("object not found: {schema}.{name}")]
    ObjectNotFound { schema: String, name: String },

    #[error("ddl execution failed for {target}: {reason}")]
    DdlExecutionFailed { target: String, reason: String },

    #[error("statement timed out after {timeout_ms}ms: {target}")]
    StatementTimeout { target: String, timeout_ms: u64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
