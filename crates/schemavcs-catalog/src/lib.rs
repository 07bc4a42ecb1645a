//! `CatalogReader`: the single seam that talks to the host database's
//! information schema.
//!
//! Catalog introspection used to live as inline procedural queries
//! scattered through the planner and diff code; here it is a closed
//! trait so the rest of the engine can be tested against [`InMemoryCatalog`]
//! without a live database.

mod ddl;
mod descriptor;
mod error;
mod mock;
mod object_type;
mod reader;

pub use ddl::{DdlKind, DdlStatement, SafetyFlags};
pub use descriptor::{
    CatalogObjectDescriptor, ColumnDef, ConstraintDef, ConstraintKind, IndexDef, TableDescriptor,
};
pub use error::CatalogError;
pub use mock::InMemoryCatalog;
pub use object_type::ObjectType;
pub use reader::{CatalogReader, SavepointOutcome};

pub type Result<T> = std::result::Result<T, CatalogError>;
