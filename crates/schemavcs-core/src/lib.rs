//! Schema version-control engine core: object store, dependency graph,
//! diff, merge, migration planner, and operation controller.
//!
//! Catalog access (introspection, DDL execution) is never done directly
//! here — every module that needs it takes a `&dyn schemavcs_catalog::CatalogReader`.

pub mod blob;
pub mod commit;
pub mod controller;
pub mod diff;
pub mod error;
pub mod graph;
pub mod ids;
pub mod merge;
pub mod planner;
pub mod refs;
pub mod retry;
pub mod telemetry;
pub mod tree;
pub mod verbs;

pub use blob::{Blob, BlobRepository};
pub use commit::{Commit, CommitRepository, NewCommit};
pub use controller::{ErrorLog, LockGuard, LockManager, OperationController};
pub use error::{EngineError, RecoveryPolicy, Severity};
pub use graph::{
    DependencyEdge, DependencyGraph, DependencyType, Direction, GraphError, ImpactLevel,
    ImpactRow, OrderingResult, ValidationIssue, ValidationIssueKind,
};
pub use ids::ObjectId;
pub use merge::{MergeOutcome, MergeStrategy};
pub use planner::{ApplyResult, PlanPolicy, PlanStep, Risk};
pub use refs::{Ref, RefKind, RefStore};
pub use tree::{Tree, TreeRepository};
pub use verbs::{
    MergeStrategyArg, MergeVerbOutcome, StagedChange, StagedChangeType, StatusReport,
};

pub type Result<T> = std::result::Result<T, EngineError>;
