//! Trees: a snapshot of every blob present at a commit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::ids::ObjectId;

/// JSON shape hashed to produce a tree's id. Field order matters: serde_json
/// preserves struct field order for non-alphabetic serialization, so this
/// struct's field order is part of the hash format.
#[derive(Serialize)]
struct TreeHashInput<'a> {
    blobs: &'a [String],
    object_count: usize,
    incremental_parent: Option<String>,
}

/// A tree object: the sorted set of blob ids present at a commit.
///
/// `incremental_parent` is carried but never populated — incremental trees
/// (storing only a diff against a parent tree) were considered and rejected
/// for v1 (see DESIGN.md Open Question 1); the field stays so a future
/// incremental-tree format doesn't need a new object shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub id: ObjectId,
    pub blob_ids: Vec<ObjectId>,
    pub incremental_parent: Option<ObjectId>,
}

impl Tree {
    pub fn object_count(&self) -> usize {
        self.blob_ids.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TreeBuildError {
    #[error("tree references blob not present in the object store: {0}")]
    MissingBlob(ObjectId),
}

/// Builds a tree from a set of blob ids, sorting for determinism before
/// hashing so blob discovery order never affects the resulting id.
pub fn build_tree(mut blob_ids: Vec<ObjectId>) -> Tree {
    blob_ids.sort();
    blob_ids.dedup();
    let id = hash_tree(&blob_ids, None);
    Tree {
        id,
        blob_ids,
        incremental_parent: None,
    }
}

pub fn hash_tree(sorted_blob_ids: &[ObjectId], incremental_parent: Option<ObjectId>) -> ObjectId {
    let blobs: Vec<String> = sorted_blob_ids.iter().map(|id| id.to_hex()).collect();
    let input = TreeHashInput {
        blobs: &blobs,
        object_count: blobs.len(),
        incremental_parent: incremental_parent.map(|id| id.to_hex()),
    };
    let json = serde_json::to_vec(&input).expect("TreeHashInput is always serializable");
    ObjectId::hash_sha256(&json)
}

#[async_trait]
pub trait TreeRepository: Send + Sync {
    async fn put_tree(&self, tree: &Tree) -> Result<(), EngineError>;
    async fn get_tree(&self, id: &ObjectId) -> Result<Option<Tree>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_blob_set_same_id_regardless_of_input_order() {
        let a = ObjectId::hash_sha256(b"a");
        let b = ObjectId::hash_sha256(b"b");
        let t1 = build_tree(vec![a, b]);
        let t2 = build_tree(vec![b, a]);
        assert_eq!(t1.id, t2.id);
        assert_eq!(t1.blob_ids, t2.blob_ids);
    }

    #[test]
    fn dedupes_repeated_blob_ids() {
        let a = ObjectId::hash_sha256(b"a");
        let t = build_tree(vec![a, a]);
        assert_eq!(t.object_count(), 1);
    }

    #[test]
    fn empty_tree_is_deterministic() {
        let t1 = build_tree(vec![]);
        let t2 = build_tree(vec![]);
        assert_eq!(t1.id, t2.id);
        assert_eq!(t1.object_count(), 0);
    }

    #[test]
    fn different_blob_sets_different_ids() {
        let a = ObjectId::hash_sha256(b"a");
        let b = ObjectId::hash_sha256(b"b");
        let t1 = build_tree(vec![a]);
        let t2 = build_tree(vec![a, b]);
        assert_ne!(t1.id, t2.id);
    }
}
