use serde::{Deserialize, Serialize};

/// Closed tagged variant of schema object kinds (`spec.md` §3).
///
/// Extensibility for kinds the normalizer doesn't understand is handled by
/// storing them opaquely rather than by growing this enum (`spec.md` §9) —
/// new first-class kinds require a deliberate change here, not a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectType {
    Table,
    View,
    MaterializedView,
    Function,
    Procedure,
    Trigger,
    Index,
    Constraint,
    Type,
    Sequence,
    Partition,
    Schema,
}

impl ObjectType {
    /// Byte prepended to canonical text before hashing, so that a table and
    /// a view with byte-identical definitions never collide (`spec.md` §6:
    /// "Blob id = SHA-256 hex over `object_type_tag || canonical_text`").
    pub fn tag_byte(self) -> u8 {
        match self {
            ObjectType::Table => 0,
            ObjectType::View => 1,
            ObjectType::MaterializedView => 2,
            ObjectType::Function => 3,
            ObjectType::Procedure => 4,
            ObjectType::Trigger => 5,
            ObjectType::Index => 6,
            ObjectType::Constraint => 7,
            ObjectType::Type => 8,
            ObjectType::Sequence => 9,
            ObjectType::Partition => 10,
            ObjectType::Schema => 11,
        }
    }

    /// First-class kinds the canonicalizer knows how to normalize
    /// (`spec.md` §4.1): everything else is stored opaquely.
    pub fn is_first_class_for_hashing(self) -> bool {
        matches!(
            self,
            ObjectType::Table
                | ObjectType::View
                | ObjectType::MaterializedView
                | ObjectType::Function
                | ObjectType::Procedure
                | ObjectType::Index
                | ObjectType::Sequence
        )
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ObjectType::Table => "TABLE",
            ObjectType::View => "VIEW",
            ObjectType::MaterializedView => "MATERIALIZED_VIEW",
            ObjectType::Function => "FUNCTION",
            ObjectType::Procedure => "PROCEDURE",
            ObjectType::Trigger => "TRIGGER",
            ObjectType::Index => "INDEX",
            ObjectType::Constraint => "CONSTRAINT",
            ObjectType::Type => "TYPE",
            ObjectType::Sequence => "SEQUENCE",
            ObjectType::Partition => "PARTITION",
            ObjectType::Schema => "SCHEMA",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_bytes_are_unique() {
        let all = [
            ObjectType::Table,
            ObjectType::View,
            ObjectType::MaterializedView,
            ObjectType::Function,
            ObjectType::Procedure,
            ObjectType::Trigger,
            ObjectType::Index,
            ObjectType::Constraint,
            ObjectType::Type,
            ObjectType::Sequence,
            ObjectType::Partition,
            ObjectType::Schema,
        ];
        let mut tags: Vec<u8> = all.iter().map(|t| t.tag_byte()).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), all.len());
    }

    #[test]
    fn only_documented_kinds_are_first_class() {
        assert!(ObjectType::Table.is_first_class_for_hashing());
        assert!(!ObjectType::Trigger.is_first_class_for_hashing());
        assert!(!ObjectType::Schema.is_first_class_for_hashing());
    }
}
