use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::object_type::ObjectType;

/// One column in a structured table descriptor, as supplied by the
/// collaborator that captures DDL events (`spec.md` §1: DDL arrives as
/// opaque text *plus* a structured descriptor — the core never parses SQL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub ordinal: u32,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
    NotNull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDef {
    pub kind: ConstraintKind,
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub definition: String,
    pub unique: bool,
}

/// Structured view of a table, used by the fine diff (`spec.md` §4.6) to
/// iterate columns/constraints/indexes without re-parsing DDL text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub constraints: Vec<ConstraintDef>,
    pub indexes: Vec<IndexDef>,
}

impl TableDescriptor {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// One object as reported by catalog introspection (`spec.md` §2: "Data
/// flow: catalog introspection → normalized definitions → blobs").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogObjectDescriptor {
    pub object_type: ObjectType,
    pub schema: String,
    pub name: String,
    pub raw_definition: String,
    pub dependencies: BTreeSet<String>,
    /// Present only for `ObjectType::Table`.
    pub table: Option<TableDescriptor>,
}

impl CatalogObjectDescriptor {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}
