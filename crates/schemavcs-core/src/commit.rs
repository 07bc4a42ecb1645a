//! Commits: an immutable snapshot pointer with parent lineage.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::ids::ObjectId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: ObjectId,
    pub tree_id: ObjectId,
    pub parent_ids: Vec<ObjectId>,
    pub author: String,
    pub committer: String,
    pub authored_at: DateTime<Utc>,
    pub committed_at: DateTime<Utc>,
    pub message: String,
    /// Three-way merge base, set only on merge commits. Not part of the
    /// content address — two merges of the same trees over different bases
    /// still collide if everything else matches, which is the point.
    pub merge_base_id: Option<ObjectId>,
    /// Free-form annotations (`revert: true`/`reverted_commit`, source
    /// branch name, etc.), excluded from `hash_commit`'s preimage.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// `commit_id = sha256(tree_id | sorted(parent_ids) | author | committer |
/// authored_at(RFC3339) | committed_at(RFC3339) | message)`.
///
/// Parent ids are sorted before joining so the hash is independent of the
/// order parents were supplied in (matters for merge commits with 2+
/// parents).
pub fn hash_commit(
    tree_id: &ObjectId,
    parent_ids: &[ObjectId],
    author: &str,
    committer: &str,
    authored_at: DateTime<Utc>,
    committed_at: DateTime<Utc>,
    message: &str,
) -> ObjectId {
    let mut sorted_parents = parent_ids.to_vec();
    sorted_parents.sort();
    let parents_joined = sorted_parents
        .iter()
        .map(|id| id.to_hex())
        .collect::<Vec<_>>()
        .join(",");

    let preimage = format!(
        "{}|{}|{}|{}|{}|{}|{}",
        tree_id.to_hex(),
        parents_joined,
        author,
        committer,
        authored_at.to_rfc3339(),
        committed_at.to_rfc3339(),
        message,
    );
    ObjectId::hash_sha256(preimage.as_bytes())
}

#[derive(Debug, Clone)]
pub struct NewCommit {
    pub tree_id: ObjectId,
    pub parent_ids: Vec<ObjectId>,
    pub author: String,
    pub committer: String,
    pub authored_at: DateTime<Utc>,
    pub committed_at: DateTime<Utc>,
    pub message: String,
    pub merge_base_id: Option<ObjectId>,
    pub metadata: BTreeMap<String, String>,
}

impl NewCommit {
    /// Computes the id and assembles the final `Commit`. Calling this twice
    /// with identical fields yields the same id, so replaying a commit
    /// creation request (e.g. after a lock-timeout retry) is idempotent.
    pub fn finalize(self) -> Commit {
        let id = hash_commit(
            &self.tree_id,
            &self.parent_ids,
            &self.author,
            &self.committer,
            self.authored_at,
            self.committed_at,
            &self.message,
        );
        Commit {
            id,
            tree_id: self.tree_id,
            parent_ids: self.parent_ids,
            author: self.author,
            committer: self.committer,
            authored_at: self.authored_at,
            committed_at: self.committed_at,
            message: self.message,
            merge_base_id: self.merge_base_id,
            metadata: self.metadata,
        }
    }
}

#[async_trait]
pub trait CommitRepository: Send + Sync {
    async fn put_commit(&self, commit: &Commit) -> Result<(), EngineError>;
    async fn get_commit(&self, id: &ObjectId) -> Result<Option<Commit>, EngineError>;
    async fn get_parents(&self, id: &ObjectId) -> Result<Vec<ObjectId>, EngineError>;
}

/// Bounded breadth-first walk of a commit's ancestry, nearest-first.
/// `max_depth` bounds both the BFS frontier expansions and the result size,
/// matching `EngineConfig::walk_ancestors_default_depth`.
pub async fn walk_ancestors(
    repo: &dyn CommitRepository,
    start: ObjectId,
    max_depth: usize,
) -> Result<Vec<ObjectId>, EngineError> {
    let mut visited = std::collections::HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back((start, 0usize));
    visited.insert(start);
    let mut result = Vec::new();

    while let Some((id, depth)) = queue.pop_front() {
        if depth > 0 {
            result.push(id);
        }
        if depth >= max_depth {
            continue;
        }
        for parent in repo.get_parents(&id).await? {
            if visited.insert(parent) {
                queue.push_back((parent, depth + 1));
            }
        }
    }
    Ok(result)
}

/// Finds the lowest common ancestor of two commits via depth-labelled BFS
/// from both sides; ties (multiple candidates at the same depth) are broken
/// by the most recently committed wall-clock time.
pub async fn find_merge_base(
    repo: &dyn CommitRepository,
    a: ObjectId,
    b: ObjectId,
) -> Result<Option<ObjectId>, EngineError> {
    if a == b {
        return Ok(Some(a));
    }

    let depth_limit = 10_000;
    let mut depths_a = std::collections::HashMap::new();
    depths_a.insert(a, 0usize);
    let mut queue = VecDeque::new();
    queue.push_back(a);
    while let Some(id) = queue.pop_front() {
        let d = depths_a[&id];
        if d >= depth_limit {
            continue;
        }
        for parent in repo.get_parents(&id).await? {
            if !depths_a.contains_key(&parent) {
                depths_a.insert(parent, d + 1);
                queue.push_back(parent);
            }
        }
    }

    let mut visited_b = std::collections::HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back((b, 0usize));
    visited_b.insert(b);
    let mut candidates: Vec<(ObjectId, usize)> = Vec::new();

    while let Some((id, depth_b)) = queue.pop_front() {
        if let Some(&depth_a) = depths_a.get(&id) {
            candidates.push((id, depth_a + depth_b));
        }
        if depth_b >= depth_limit {
            continue;
        }
        for parent in repo.get_parents(&id).await? {
            if visited_b.insert(parent) {
                queue.push_back((parent, depth_b + 1));
            }
        }
    }

    if candidates.is_empty() {
        return Ok(None);
    }

    candidates.sort_by_key(|(_, combined_depth)| *combined_depth);
    let best_depth = candidates[0].1;
    let mut tied: Vec<ObjectId> = candidates
        .iter()
        .filter(|(_, d)| *d == best_depth)
        .map(|(id, _)| *id)
        .collect();

    if tied.len() == 1 {
        return Ok(Some(tied[0]));
    }

    let mut best: Option<(ObjectId, DateTime<Utc>)> = None;
    for id in tied.drain(..) {
        if let Some(commit) = repo.get_commit(&id).await? {
            if best.as_ref().map(|(_, t)| commit.committed_at > *t).unwrap_or(true) {
                best = Some((id, commit.committed_at));
            }
        }
    }
    Ok(best.map(|(id, _)| id))
}

/// Builds the `NewCommit` for a revert: a new commit whose tree matches
/// `target`'s *parent's* tree (undoing exactly what `target` changed),
/// parented on the current HEAD. `reverted_tree_id` is the caller's
/// responsibility to resolve (`target.parent_ids.first()`'s tree) since this
/// function has no repository access of its own.
pub fn revert(
    target: &Commit,
    reverted_tree_id: ObjectId,
    current_head: ObjectId,
    author: String,
    committer: String,
    now: DateTime<Utc>,
) -> NewCommit {
    let mut metadata = BTreeMap::new();
    metadata.insert("revert".to_string(), "true".to_string());
    metadata.insert("reverted_commit".to_string(), target.id.to_hex());
    NewCommit {
        tree_id: reverted_tree_id,
        parent_ids: vec![current_head],
        author,
        committer,
        authored_at: now,
        committed_at: now,
        message: format!("Revert \"{}\"", target.message),
        merge_base_id: None,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn hash_is_stable_under_parent_reordering() {
        let tree = ObjectId::hash_sha256(b"tree");
        let p1 = ObjectId::hash_sha256(b"p1");
        let p2 = ObjectId::hash_sha256(b"p2");
        let h1 = hash_commit(&tree, &[p1, p2], "a", "a", ts(), ts(), "m");
        let h2 = hash_commit(&tree, &[p2, p1], "a", "a", ts(), ts(), "m");
        assert_eq!(h1, h2);
    }

    #[test]
    fn creating_same_commit_twice_is_idempotent() {
        let tree = ObjectId::hash_sha256(b"tree");
        let nc = || NewCommit {
            tree_id: tree,
            parent_ids: vec![],
            author: "a".to_string(),
            committer: "a".to_string(),
            authored_at: ts(),
            committed_at: ts(),
            message: "init".to_string(),
            merge_base_id: None,
            metadata: BTreeMap::new(),
        };
        assert_eq!(nc().finalize().id, nc().finalize().id);
    }

    #[test]
    fn different_message_different_id() {
        let tree = ObjectId::hash_sha256(b"tree");
        let h1 = hash_commit(&tree, &[], "a", "a", ts(), ts(), "m1");
        let h2 = hash_commit(&tree, &[], "a", "a", ts(), ts(), "m2");
        assert_ne!(h1, h2);
    }

    #[test]
    fn revert_reproduces_targets_parent_tree_not_targets_own_tree() {
        let parent_tree = ObjectId::hash_sha256(b"c1-tree");
        let target_tree = ObjectId::hash_sha256(b"c2-tree");
        let target = NewCommit {
            tree_id: target_tree,
            parent_ids: vec![ObjectId::hash_sha256(b"c1")],
            author: "a".to_string(),
            committer: "a".to_string(),
            authored_at: ts(),
            committed_at: ts(),
            message: "widen users".to_string(),
            merge_base_id: None,
            metadata: BTreeMap::new(),
        }
        .finalize();

        let reverted = revert(&target, parent_tree, target.id, "a".to_string(), "a".to_string(), ts())
            .finalize();

        assert_eq!(reverted.tree_id, parent_tree);
        assert_ne!(reverted.tree_id, target.tree_id);
        assert_eq!(reverted.parent_ids, vec![target.id]);
        assert_eq!(reverted.metadata.get("revert"), Some(&"true".to_string()));
        assert_eq!(
            reverted.metadata.get("reverted_commit"),
            Some(&target.id.to_hex())
        );
    }
}
