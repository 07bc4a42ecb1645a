//! Blobs: the leaf objects of the store, one per schema object definition.

mod canon;

use async_trait::async_trait;
use schemavcs_catalog::{CatalogObjectDescriptor, ObjectType, TableDescriptor};
use serde::{Deserialize, Serialize};

pub use canon::canonicalize;
use canon::canonicalize_table;

use crate::error::EngineError;
use crate::ids::ObjectId;

pub const DEFAULT_MAX_DDL_BYTES: usize = 100_000;

/// A single schema object definition, content-addressed by
/// `sha256(object_type_tag || canonical_text)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub id: ObjectId,
    pub object_type: ObjectType,
    pub schema: String,
    pub name: String,
    pub canonical_text: String,
    /// Structured column/constraint/index view, present only when the
    /// catalog reported one (tables). Lets `merge::reconcile_table_conflict`
    /// diff two versions of a table without re-parsing `canonical_text`.
    pub table: Option<TableDescriptor>,
}

impl Blob {
    /// Builds a blob from a catalog-reported object. Tables with a
    /// structured descriptor go through [`Self::from_table_descriptor`],
    /// which canonicalizes by sorting the structured fields directly rather
    /// than normalizing `raw_definition` as text; everything else is
    /// canonicalized as text.
    pub fn from_descriptor(
        descriptor: &CatalogObjectDescriptor,
        max_ddl_bytes: usize,
    ) -> Result<Self, EngineError> {
        if descriptor.object_type == ObjectType::Table {
            if let Some(table) = &descriptor.table {
                return Ok(Self::from_table_descriptor(table));
            }
        }

        let canonical_text =
            canonicalize(descriptor.object_type, &descriptor.raw_definition, max_ddl_bytes)?;
        let id = hash_blob(descriptor.object_type, &canonical_text);
        Ok(Self {
            id,
            object_type: descriptor.object_type,
            schema: descriptor.schema.clone(),
            name: descriptor.name.clone(),
            canonical_text,
            table: None,
        })
    }

    /// Builds a table blob directly from its structured descriptor, sorting
    /// column lists by ordinal, constraints by `(kind, name)`, and indexes
    /// by name (`spec.md` §4.1) so two definitions differing only in clause
    /// order hash identically.
    pub fn from_table_descriptor(table: &TableDescriptor) -> Self {
        let canonical_text = canonicalize_table(table);
        let id = hash_blob(ObjectType::Table, &canonical_text);
        Self {
            id,
            object_type: ObjectType::Table,
            schema: table.schema.clone(),
            name: table.name.clone(),
            canonical_text,
            table: Some(table.clone()),
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// `blob_id = sha256(object_type_tag || canonical_text)`.
pub fn hash_blob(object_type: ObjectType, canonical_text: &str) -> ObjectId {
    let mut input = Vec::with_capacity(canonical_text.len() + 1);
    input.push(object_type.tag_byte());
    input.extend_from_slice(canonical_text.as_bytes());
    ObjectId::hash_sha256(&input)
}

#[async_trait]
pub trait BlobRepository: Send + Sync {
    async fn put_blob(&self, blob: &Blob) -> Result<(), EngineError>;
    async fn get_blob(&self, id: &ObjectId) -> Result<Option<Blob>, EngineError>;
    async fn has_blob(&self, id: &ObjectId) -> Result<bool, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn descriptor(object_type: ObjectType, raw: &str) -> CatalogObjectDescriptor {
        CatalogObjectDescriptor {
            object_type,
            schema: "public".to_string(),
            name: "users".to_string(),
            raw_definition: raw.to_string(),
            dependencies: BTreeSet::new(),
            table: None,
        }
    }

    #[test]
    fn same_canonical_text_same_type_same_id() {
        let a = hash_blob(ObjectType::Table, "create table users (id int)");
        let b = hash_blob(ObjectType::Table, "create table users (id int)");
        assert_eq!(a, b);
    }

    #[test]
    fn different_object_type_different_id_for_same_text() {
        let a = hash_blob(ObjectType::Table, "x");
        let b = hash_blob(ObjectType::View, "x");
        assert_ne!(a, b);
    }

    #[test]
    fn from_descriptor_prefers_structured_table_over_raw_text() {
        use schemavcs_catalog::ColumnDef;

        let table = TableDescriptor {
            schema: "public".to_string(),
            name: "users".to_string(),
            columns: vec![ColumnDef {
                name: "id".to_string(),
                ordinal: 1,
                data_type: "integer".to_string(),
                nullable: false,
                default: None,
            }],
            constraints: vec![],
            indexes: vec![],
        };
        let d = CatalogObjectDescriptor {
            object_type: ObjectType::Table,
            schema: "public".to_string(),
            name: "users".to_string(),
            raw_definition: "this text is never parsed".to_string(),
            dependencies: BTreeSet::new(),
            table: Some(table.clone()),
        };
        let blob = Blob::from_descriptor(&d, DEFAULT_MAX_DDL_BYTES).unwrap();
        assert_eq!(blob, Blob::from_table_descriptor(&table));
    }

    #[test]
    fn from_descriptor_canonicalizes_before_hashing() {
        let d1 = descriptor(ObjectType::Table, "CREATE TABLE users (id int)");
        let d2 = descriptor(ObjectType::Table, "create   table users (id int)");
        let b1 = Blob::from_descriptor(&d1, DEFAULT_MAX_DDL_BYTES).unwrap();
        let b2 = Blob::from_descriptor(&d2, DEFAULT_MAX_DDL_BYTES).unwrap();
        assert_eq!(b1.id, b2.id);
    }
}
