//! SurrealDB-backed persistence for the schemavcs object store.
//!
//! Implements every repository trait declared in `schemavcs-core` against a
//! single `Surreal<Db>` connection, plus the ambient config layer.
//!
//! ## Key components
//!
//! - [`SurrealHandle`]: connection, schema setup, and every repository trait
//! - [`config::EngineConfig`]: YAML + env-var configuration

pub mod config;
mod error;
mod handle;
mod schema;

pub use config::EngineConfig;
pub use error::StateError;
pub use handle::SurrealHandle;
pub use schema::{
    BlobDoc, BranchDoc, CommitDoc, ConflictResolutionDoc, ErrorLogDoc, HeadDoc, OperationLockDoc,
    TreeDoc,
};

/// Result type for schemavcs-state operations.
pub type Result<T> = std::result::Result<T, StateError>;
