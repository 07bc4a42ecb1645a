//! Schema diffing: coarse blob-set comparison plus fine structural diff.

mod classify;
mod fine;

pub use classify::{classify_three_way, ThreeWayClass};
pub use fine::{fine_diff_tables, ColumnChange};

use std::collections::BTreeMap;

use schemavcs_catalog::ObjectType;
use serde::{Deserialize, Serialize};

use crate::blob::Blob;
use crate::ids::ObjectId;

/// Closed set of row-level change kinds a schema diff can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    AddColumn,
    DropColumn,
    AlterColumnType,
    AlterColumnNull,
    AlterColumnDefault,
    RenameColumn,
    AddConstraint,
    DropConstraint,
    AddIndex,
    DropIndex,
    RenameTable,
    AddTable,
    DropTable,
    NoChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffRow {
    pub change_kind: ChangeKind,
    pub object_key: String,
    pub detail: Option<String>,
}

/// Coarse diff: which blobs were added, removed, or kept between two trees,
/// keyed by qualified object name. This is the fast path — no structural
/// comparison, just set membership on blob ids.
pub fn coarse_diff(
    before: &BTreeMap<String, ObjectId>,
    after: &BTreeMap<String, ObjectId>,
) -> Vec<DiffRow> {
    let mut rows = Vec::new();

    for (key, after_id) in after {
        match before.get(key) {
            None => rows.push(DiffRow {
                change_kind: add_kind_for_key(key),
                object_key: key.clone(),
                detail: None,
            }),
            Some(before_id) if before_id != after_id => rows.push(DiffRow {
                change_kind: ChangeKind::NoChange,
                object_key: key.clone(),
                detail: Some("blob changed, needs fine diff".to_string()),
            }),
            Some(_) => {}
        }
    }

    for key in before.keys() {
        if !after.contains_key(key) {
            rows.push(DiffRow {
                change_kind: drop_kind_for_key(key),
                object_key: key.clone(),
                detail: None,
            });
        }
    }

    rows
}

fn add_kind_for_key(_key: &str) -> ChangeKind {
    ChangeKind::AddTable
}

fn drop_kind_for_key(_key: &str) -> ChangeKind {
    ChangeKind::DropTable
}

/// Type-compatibility matrix for `ALTER_COLUMN_TYPE` risk annotation: pairs
/// considered a widening (safe, no data loss) conversion.
pub fn is_widening_conversion(from_type: &str, to_type: &str) -> bool {
    matches!(
        (from_type, to_type),
        ("integer", "bigint")
            | ("smallint", "integer")
            | ("smallint", "bigint")
            | ("varchar", "text")
            | ("real", "float8")
    )
}

pub fn blob_changed(before: Option<&Blob>, after: Option<&Blob>) -> bool {
    match (before, after) {
        (Some(b), Some(a)) => b.id != a.id,
        (None, None) => false,
        _ => true,
    }
}

pub fn object_type_of(blob: &Blob) -> ObjectType {
    blob.object_type
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coarse_diff_detects_added_and_dropped() {
        let mut before = BTreeMap::new();
        before.insert("public.old_table".to_string(), ObjectId::hash_sha256(b"a"));
        let mut after = BTreeMap::new();
        after.insert("public.new_table".to_string(), ObjectId::hash_sha256(b"b"));

        let rows = coarse_diff(&before, &after);
        assert!(rows.iter().any(|r| r.object_key == "public.new_table"
            && r.change_kind == ChangeKind::AddTable));
        assert!(rows
            .iter()
            .any(|r| r.object_key == "public.old_table" && r.change_kind == ChangeKind::DropTable));
    }

    #[test]
    fn coarse_diff_flags_changed_blob_for_fine_diff() {
        let mut before = BTreeMap::new();
        before.insert("public.users".to_string(), ObjectId::hash_sha256(b"a"));
        let mut after = BTreeMap::new();
        after.insert("public.users".to_string(), ObjectId::hash_sha256(b"b"));

        let rows = coarse_diff(&before, &after);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].detail.is_some());
    }

    #[test]
    fn widening_conversions_are_recognized() {
        assert!(is_widening_conversion("integer", "bigint"));
        assert!(!is_widening_conversion("bigint", "integer"));
    }
}
