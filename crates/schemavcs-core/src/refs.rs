//! Branch refs and HEAD.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::ObjectId;

static BRANCH_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn branch_name_re() -> &'static Regex {
    BRANCH_NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9/_-]+$").expect("static regex is valid"))
}

#[derive(Debug, Error)]
pub enum RefError {
    #[error("invalid branch name '{0}': must match [A-Za-z0-9/_-]+")]
    InvalidName(String),
    #[error("branch already exists: {0}")]
    BranchExists(String),
    #[error("source branch not found: {0}")]
    SourceMissing(String),
    #[error("branch not found: {0}")]
    NotFound(String),
}

pub fn validate_branch_name(name: &str) -> Result<(), RefError> {
    if name.is_empty() || !branch_name_re().is_match(name) {
        return Err(RefError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// `spec.md` §3: a ref's `ref_type` distinguishes a mutable branch pointer
/// from an immutable tag. Both live in the same ref registry; only tags get
/// an insert-only `create_tag` with no corresponding update path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Branch,
    Tag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ref {
    pub branch: String,
    pub ref_type: RefKind,
    pub commit_id: ObjectId,
}

#[async_trait]
pub trait RefStore: Send + Sync {
    async fn create_branch(
        &self,
        name: &str,
        from_commit: ObjectId,
    ) -> Result<Ref, RefError>;

    async fn get_branch(&self, name: &str) -> Result<Option<Ref>, RefError>;

    async fn update_branch(&self, name: &str, new_commit: ObjectId) -> Result<(), RefError>;

    async fn list_branches(&self) -> Result<Vec<Ref>, RefError>;

    /// Inserts an immutable tag pointing at `commit_id`. Fails with
    /// `BranchExists` when a ref of either kind already owns `name`; there is
    /// deliberately no `update_tag`.
    async fn create_tag(&self, name: &str, commit_id: ObjectId) -> Result<Ref, RefError>;

    async fn get_tag(&self, name: &str) -> Result<Option<Ref>, RefError>;

    async fn list_tags(&self) -> Result<Vec<Ref>, RefError>;

    async fn get_head(&self) -> Result<Option<String>, RefError>;

    async fn set_head(&self, branch: &str) -> Result<(), RefError>;

    /// `spec.md` §3: HEAD also names the working schema the next checkout
    /// materializes into; `None` until the first checkout sets one.
    async fn get_working_schema(&self) -> Result<Option<String>, RefError>;

    async fn set_working_schema(&self, name: &str) -> Result<(), RefError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_slashes_underscores_and_dashes() {
        assert!(validate_branch_name("feature/add-column_x").is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        assert!(validate_branch_name("").is_err());
    }

    #[test]
    fn rejects_whitespace() {
        assert!(validate_branch_name("bad name").is_err());
    }

    #[test]
    fn rejects_special_characters() {
        assert!(validate_branch_name("feature@1").is_err());
    }
}
