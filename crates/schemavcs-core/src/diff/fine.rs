//! Fine structural diff over `TableDescriptor`s: column/constraint/index
//! level changes, consumed when the coarse diff flags a changed blob.

use schemavcs_catalog::TableDescriptor;
use serde::{Deserialize, Serialize};

use super::ChangeKind;
use super::DiffRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnChange {
    pub column: String,
    pub kind: ChangeKind,
    pub detail: String,
}

/// Compares two versions of the same table, ordinal-by-ordinal for columns
/// and name-sorted for constraints/indexes (descriptors already arrive
/// sorted per `spec.md` §4.1, but this does not assume it).
pub fn fine_diff_tables(before: &TableDescriptor, after: &TableDescriptor) -> Vec<DiffRow> {
    let mut rows = Vec::new();

    let mut before_cols: Vec<_> = before.columns.clone();
    before_cols.sort_by_key(|c| c.ordinal);
    let mut after_cols: Vec<_> = after.columns.clone();
    after_cols.sort_by_key(|c| c.ordinal);

    for ac in &after_cols {
        match before_cols.iter().find(|bc| bc.name == ac.name) {
            None => rows.push(row(
                ChangeKind::AddColumn,
                &ac.name,
                Some(format!("nullable={} default={}", ac.nullable, ac.default.is_some())),
            )),
            Some(bc) => {
                if bc.data_type != ac.data_type {
                    rows.push(row(
                        ChangeKind::AlterColumnType,
                        &ac.name,
                        Some(format!("{} -> {}", bc.data_type, ac.data_type)),
                    ));
                }
                if bc.nullable != ac.nullable {
                    rows.push(row(
                        ChangeKind::AlterColumnNull,
                        &ac.name,
                        Some(format!("{} -> {}", bc.nullable, ac.nullable)),
                    ));
                }
                if bc.default != ac.default {
                    rows.push(row(ChangeKind::AlterColumnDefault, &ac.name, None));
                }
            }
        }
    }
    for bc in &before_cols {
        if !after_cols.iter().any(|ac| ac.name == bc.name) {
            rows.push(row(ChangeKind::DropColumn, &bc.name, None));
        }
    }

    let mut before_constraints: Vec<_> = before.constraints.clone();
    before_constraints.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));
    let mut after_constraints: Vec<_> = after.constraints.clone();
    after_constraints.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));

    for ac in &after_constraints {
        if !before_constraints.iter().any(|bc| bc.name == ac.name) {
            rows.push(row(ChangeKind::AddConstraint, &ac.name, None));
        }
    }
    for bc in &before_constraints {
        if !after_constraints.iter().any(|ac| ac.name == bc.name) {
            rows.push(row(ChangeKind::DropConstraint, &bc.name, None));
        }
    }

    let mut before_idx: Vec<_> = before.indexes.clone();
    before_idx.sort_by(|a, b| a.name.cmp(&b.name));
    let mut after_idx: Vec<_> = after.indexes.clone();
    after_idx.sort_by(|a, b| a.name.cmp(&b.name));

    for ai in &after_idx {
        if !before_idx.iter().any(|bi| bi.name == ai.name) {
            rows.push(row(ChangeKind::AddIndex, &ai.name, None));
        }
    }
    for bi in &before_idx {
        if !after_idx.iter().any(|ai| ai.name == bi.name) {
            rows.push(row(ChangeKind::DropIndex, &bi.name, None));
        }
    }

    rows
}

fn row(kind: ChangeKind, key: &str, detail: Option<String>) -> DiffRow {
    DiffRow {
        change_kind: kind,
        object_key: key.to_string(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemavcs_catalog::{ColumnDef, ConstraintDef, ConstraintKind, IndexDef};

    fn table(columns: Vec<ColumnDef>) -> TableDescriptor {
        TableDescriptor {
            schema: "public".to_string(),
            name: "users".to_string(),
            columns,
            constraints: vec![],
            indexes: vec![],
        }
    }

    #[test]
    fn detects_added_column() {
        let before = table(vec![]);
        let after = table(vec![ColumnDef {
            name: "email".to_string(),
            ordinal: 1,
            data_type: "varchar(255)".to_string(),
            nullable: true,
            default: None,
        }]);
        let rows = fine_diff_tables(&before, &after);
        assert!(rows.iter().any(|r| r.change_kind == ChangeKind::AddColumn));
    }

    #[test]
    fn detects_type_change() {
        let before = table(vec![ColumnDef {
            name: "age".to_string(),
            ordinal: 1,
            data_type: "integer".to_string(),
            nullable: true,
            default: None,
        }]);
        let after = table(vec![ColumnDef {
            name: "age".to_string(),
            ordinal: 1,
            data_type: "bigint".to_string(),
            nullable: true,
            default: None,
        }]);
        let rows = fine_diff_tables(&before, &after);
        assert!(rows
            .iter()
            .any(|r| r.change_kind == ChangeKind::AlterColumnType));
    }

    #[test]
    fn detects_constraint_and_index_changes() {
        let mut before = table(vec![]);
        before.constraints.push(ConstraintDef {
            kind: ConstraintKind::Unique,
            name: "uniq_email".to_string(),
            definition: "UNIQUE (email)".to_string(),
        });
        let mut after = table(vec![]);
        after.indexes.push(IndexDef {
            name: "idx_email".to_string(),
            definition: "(email)".to_string(),
            unique: false,
        });

        let rows = fine_diff_tables(&before, &after);
        assert!(rows
            .iter()
            .any(|r| r.change_kind == ChangeKind::DropConstraint));
        assert!(rows.iter().any(|r| r.change_kind == ChangeKind::AddIndex));
    }
}
