use async_trait::async_trait;

use crate::ddl::DdlStatement;
use crate::descriptor::{CatalogObjectDescriptor, TableDescriptor};
use crate::error::CatalogError;

/// Outcome of executing a [`DdlStatement`] inside a savepoint (`spec.md`
/// §4.8: the applier wraps each step in a savepoint so a failing step can be
/// rolled back without aborting the whole migration).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SavepointOutcome {
    Committed,
    RolledBack { reason: String },
}

/// The single seam the rest of the engine uses to talk to the host
/// database's information schema. Every other module — diff, planner,
/// applier — depends on this trait, never on a concrete driver.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// List every object visible in `schema`, as reported by the host's
    /// information schema.
    async fn list_objects(
        &self,
        schema: &str,
    ) -> Result<Vec<CatalogObjectDescriptor>, CatalogError>;

    /// Fetch the structured descriptor for a single table, used by the fine
    /// diff to compare columns/constraints/indexes directly.
    async fn get_table_descriptor(
        &self,
        schema: &str,
        name: &str,
    ) -> Result<TableDescriptor, CatalogError>;

    /// Execute one `DdlStatement` inside a savepoint and report whether it
    /// committed or was rolled back. Implementations must never execute raw
    /// strings that did not arrive as a `DdlStatement`.
    async fn execute_in_savepoint(
        &self,
        statement: &DdlStatement,
    ) -> Result<SavepointOutcome, CatalogError>;
}
