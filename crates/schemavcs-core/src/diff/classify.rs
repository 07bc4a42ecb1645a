//! Three-way per-object classification, feeding the merge engine.

use serde::{Deserialize, Serialize};

use crate::ids::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreeWayClass {
    NoChange,
    TakeOurs,
    TakeTheirs,
    BothSame,
    Conflict,
    DeleteModifyConflict,
    ModifyDeleteConflict,
    AddOurs,
    AddTheirs,
    BothDeleted,
}

/// Classifies one object given its blob id at the merge base, on `ours`,
/// and on `theirs` (`None` meaning the object doesn't exist on that side).
pub fn classify_three_way(
    base: Option<ObjectId>,
    ours: Option<ObjectId>,
    theirs: Option<ObjectId>,
) -> ThreeWayClass {
    match (base, ours, theirs) {
        (None, None, None) => ThreeWayClass::NoChange,
        (None, Some(o), None) => {
            let _ = o;
            ThreeWayClass::AddOurs
        }
        (None, None, Some(t)) => {
            let _ = t;
            ThreeWayClass::AddTheirs
        }
        (None, Some(o), Some(t)) => {
            if o == t {
                ThreeWayClass::BothSame
            } else {
                ThreeWayClass::Conflict
            }
        }
        (Some(b), Some(o), Some(t)) => {
            if o == t {
                if b == o {
                    ThreeWayClass::NoChange
                } else {
                    ThreeWayClass::BothSame
                }
            } else if b == o {
                ThreeWayClass::TakeTheirs
            } else if b == t {
                ThreeWayClass::TakeOurs
            } else {
                ThreeWayClass::Conflict
            }
        }
        (Some(b), Some(o), None) => {
            if b == o {
                ThreeWayClass::TakeTheirs
            } else {
                ThreeWayClass::ModifyDeleteConflict
            }
        }
        (Some(b), None, Some(t)) => {
            if b == t {
                ThreeWayClass::TakeOurs
            } else {
                ThreeWayClass::DeleteModifyConflict
            }
        }
        (Some(_), None, None) => ThreeWayClass::BothDeleted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ObjectId {
        ObjectId::hash_sha256(s.as_bytes())
    }

    #[test]
    fn unchanged_on_both_sides_is_no_change() {
        let b = Some(id("a"));
        assert_eq!(classify_three_way(b, b, b), ThreeWayClass::NoChange);
    }

    #[test]
    fn only_ours_changed_takes_ours() {
        let base = Some(id("a"));
        let ours = Some(id("b"));
        assert_eq!(
            classify_three_way(base, ours, base),
            ThreeWayClass::TakeOurs
        );
    }

    #[test]
    fn both_changed_differently_is_conflict() {
        let base = Some(id("a"));
        assert_eq!(
            classify_three_way(base, Some(id("b")), Some(id("c"))),
            ThreeWayClass::Conflict
        );
    }

    #[test]
    fn ours_deleted_theirs_modified_is_modify_delete_conflict() {
        let base = Some(id("a"));
        assert_eq!(
            classify_three_way(base, None, Some(id("b"))),
            ThreeWayClass::DeleteModifyConflict
        );
    }

    #[test]
    fn both_deleted_object_resolves_cleanly() {
        let base = Some(id("a"));
        assert_eq!(classify_three_way(base, None, None), ThreeWayClass::BothDeleted);
    }

    #[test]
    fn added_independently_with_same_content_is_both_same() {
        let ours = Some(id("a"));
        assert_eq!(
            classify_three_way(None, ours, ours),
            ThreeWayClass::BothSame
        );
    }
}
