//! The public verb surface (`spec.md` §6), implemented as inherent async
//! methods on `OperationController` so every verb goes through the same
//! lock/log/recover wrapper (`spec.md` §4.9) and never lets a caller
//! bypass it by calling the object store directly.
//!
//! Every method takes the repository traits it needs as separate
//! `&dyn Trait` parameters rather than one bundled object, so a caller
//! holding a single concrete handle (e.g. `SurrealHandle`) passes the same
//! reference several times, each an ordinary concrete-to-trait-object
//! coercion rather than trait-object-to-trait-object upcasting.

use std::collections::BTreeMap;
use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use schemavcs_catalog::{CatalogObjectDescriptor, CatalogReader, ObjectType};
use serde::{Deserialize, Serialize};

use crate::blob::{Blob, BlobRepository};
use crate::commit::{revert, Commit, CommitRepository, NewCommit};
use crate::controller::{ErrorLog, LockManager, OperationController};
use crate::diff::{coarse_diff, DiffRow};
use crate::error::EngineError;
use crate::graph::{
    CascadeBehavior, DependencyEdge, DependencyGraph, DependencyType, Direction, ImpactRow,
    ValidationIssue,
};
use crate::ids::ObjectId;
use crate::merge::{create_merge_commit, merge_trees, reconcile_table_conflict, MergeConflictEntry};
use crate::planner::{build_plan, ApplyResult, CatalogApplier, MigrationApplier, PlanPolicy};
use crate::refs::{validate_branch_name, Ref, RefKind, RefStore};
use crate::tree::{build_tree, TreeRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StagedChangeType {
    Add,
    Modify,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedChange {
    pub object_name: String,
    pub change_type: StagedChangeType,
    pub old_hash: Option<String>,
    pub new_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub branch: String,
    pub staged_count: usize,
    pub current_commit: Option<ObjectId>,
    pub last_message: Option<String>,
}

/// Conflict-resolution strategy requested by the caller, distinct from
/// [`crate::merge::MergeStrategy`] (which records what the engine actually
/// did — fast-forward or three-way).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeStrategyArg {
    Auto,
    Strict,
    Ours,
    Theirs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MergeVerbOutcome {
    AlreadyUpToDate,
    FastForwarded { new_commit: ObjectId },
    Merged { commit: Commit },
    Conflicts(Vec<MergeConflictEntry>),
}

impl<L, E> OperationController<L, E>
where
    L: LockManager,
    E: ErrorLog,
{
    /// `create_branch(name, from=current)`.
    pub async fn create_branch(
        &self,
        refs: &dyn RefStore,
        name: &str,
        from: &str,
    ) -> Result<Ref, EngineError> {
        self.run(name, "create_branch", || async {
            validate_branch_name(name).map_err(ref_err)?;
            if refs.get_branch(name).await.map_err(ref_err)?.is_some() {
                return Err(EngineError::ValidationError(format!(
                    "branch already exists: {name}"
                )));
            }
            let source = refs
                .get_branch(from)
                .await
                .map_err(ref_err)?
                .ok_or_else(|| branch_not_found(from))?;
            refs.create_branch(name, source.commit_id).await.map_err(ref_err)
        })
        .await
    }

    /// `checkout(name, create_new=false)`. Only moves HEAD; materializing
    /// the target tree onto the live catalog is `apply_tree_state`'s job.
    pub async fn checkout(
        &self,
        refs: &dyn RefStore,
        name: &str,
        create_new: bool,
    ) -> Result<Ref, EngineError> {
        self.run(name, "checkout", || async {
            let existing = refs.get_branch(name).await.map_err(ref_err)?;
            let target = match existing {
                Some(r) => r,
                None if create_new => {
                    let current = current_branch(refs).await?;
                    let source = refs
                        .get_branch(&current)
                        .await
                        .map_err(ref_err)?
                        .ok_or_else(|| branch_not_found(&current))?;
                    refs.create_branch(name, source.commit_id).await.map_err(ref_err)?
                }
                None => return Err(branch_not_found(name)),
            };
            refs.set_head(name).await.map_err(ref_err)?;
            Ok(target)
        })
        .await
    }

    /// `stage_changes()`: diffs the live catalog against the current
    /// branch's committed tree, returning coarse per-object change rows.
    pub async fn stage_changes(
        &self,
        blobs: &dyn BlobRepository,
        trees: &dyn TreeRepository,
        commits: &dyn CommitRepository,
        refs: &dyn RefStore,
        catalog: &dyn CatalogReader,
        schema: &str,
        max_blob_bytes: usize,
    ) -> Result<Vec<StagedChange>, EngineError> {
        let branch = current_branch(refs).await?;
        self.run(&branch, "stage_changes", || async {
            let (before, after) =
                blob_maps(blobs, trees, commits, refs, catalog, &branch, schema, max_blob_bytes)
                    .await?;
            Ok(staged_changes_from(&before, &after))
        })
        .await
    }

    /// `commit(message)`: stages, builds the tree and commit, advances the
    /// branch ref. Returns `Ok(None)` when nothing is staged.
    #[allow(clippy::too_many_arguments)]
    pub async fn commit(
        &self,
        blobs: &dyn BlobRepository,
        trees: &dyn TreeRepository,
        commits: &dyn CommitRepository,
        refs: &dyn RefStore,
        catalog: &dyn CatalogReader,
        schema: &str,
        message: &str,
        author: &str,
        max_blob_bytes: usize,
    ) -> Result<Option<Commit>, EngineError> {
        let branch = current_branch(refs).await?;
        self.run(&branch, "commit", || async {
            let (before, after) =
                blob_maps(blobs, trees, commits, refs, catalog, &branch, schema, max_blob_bytes)
                    .await?;
            if staged_changes_from(&before, &after).is_empty() {
                return Ok(None);
            }

            for blob in after.values() {
                blobs.put_blob(blob).await?;
            }

            let blob_ids: Vec<ObjectId> = after.values().map(|b| b.id).collect();
            let tree = build_tree(blob_ids);
            trees.put_tree(&tree).await?;

            let current = refs
                .get_branch(&branch)
                .await
                .map_err(ref_err)?
                .ok_or_else(|| branch_not_found(&branch))?;
            let now = Utc::now();
            let new_commit = NewCommit {
                tree_id: tree.id,
                parent_ids: vec![current.commit_id],
                author: author.to_string(),
                committer: author.to_string(),
                authored_at: now,
                committed_at: now,
                message: message.to_string(),
                merge_base_id: None,
                metadata: BTreeMap::new(),
            }
            .finalize();

            commits.put_commit(&new_commit).await?;
            refs.update_branch(&branch, new_commit.id).await.map_err(ref_err)?;
            Ok(Some(new_commit))
        })
        .await
    }

    /// `status()`: current branch, staged count, current commit, last
    /// commit message. Read-only — not wrapped in the lock/retry sequence.
    pub async fn status(
        &self,
        blobs: &dyn BlobRepository,
        trees: &dyn TreeRepository,
        commits: &dyn CommitRepository,
        refs: &dyn RefStore,
        catalog: &dyn CatalogReader,
        schema: &str,
        max_blob_bytes: usize,
    ) -> Result<StatusReport, EngineError> {
        let branch = current_branch(refs).await?;
        let current = refs.get_branch(&branch).await.map_err(ref_err)?;
        let (before, after) =
            blob_maps(blobs, trees, commits, refs, catalog, &branch, schema, max_blob_bytes).await?;
        let staged_count = staged_changes_from(&before, &after).len();
        let last_message = match &current {
            Some(r) => commits.get_commit(&r.commit_id).await?.map(|c| c.message),
            None => None,
        };
        Ok(StatusReport {
            branch,
            staged_count,
            current_commit: current.map(|r| r.commit_id),
            last_message,
        })
    }

    /// `log(limit)`: HEAD and its ancestors, nearest-first, bounded by
    /// `limit`. Read-only.
    pub async fn log(
        &self,
        commits: &dyn CommitRepository,
        refs: &dyn RefStore,
        limit: usize,
    ) -> Result<Vec<Commit>, EngineError> {
        let branch = current_branch(refs).await?;
        let head = refs
            .get_branch(&branch)
            .await
            .map_err(ref_err)?
            .ok_or_else(|| branch_not_found(&branch))?;

        let mut ids = vec![head.commit_id];
        ids.extend(ancestor_ids(commits, head.commit_id, limit).await?);
        ids.truncate(limit);

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(c) = commits.get_commit(&id).await? {
                out.push(c);
            }
        }
        Ok(out)
    }

    /// `diff(from?, to?, include_data=false)`: coarse per-object change rows
    /// between two commits, or a commit and the live catalog when `to` is
    /// `None`. Data-level diff (`include_data`) is not implemented — see
    /// `spec.md` §9 Open Question 2.
    #[allow(clippy::too_many_arguments)]
    pub async fn diff(
        &self,
        blobs: &dyn BlobRepository,
        trees: &dyn TreeRepository,
        commits: &dyn CommitRepository,
        refs: &dyn RefStore,
        catalog: &dyn CatalogReader,
        schema: &str,
        from: Option<ObjectId>,
        to: Option<ObjectId>,
        max_blob_bytes: usize,
    ) -> Result<Vec<DiffRow>, EngineError> {
        let from_commit = match from {
            Some(id) => id,
            None => {
                let branch = current_branch(refs).await?;
                refs.get_branch(&branch)
                    .await
                    .map_err(ref_err)?
                    .ok_or_else(|| branch_not_found(&branch))?
                    .commit_id
            }
        };
        let before = tree_blob_map(trees, commits, blobs, from_commit).await?;
        let after = match to {
            Some(commit_id) => tree_blob_map(trees, commits, blobs, commit_id).await?,
            None => live_blob_map(catalog, schema, max_blob_bytes).await?,
        };
        let before_ids: BTreeMap<String, ObjectId> =
            before.into_iter().map(|(k, b)| (k, b.id)).collect();
        let after_ids: BTreeMap<String, ObjectId> =
            after.into_iter().map(|(k, b)| (k, b.id)).collect();
        Ok(coarse_diff(&before_ids, &after_ids))
    }

    /// `merge(source_branch, message?, strategy)`. `strategy=auto` first
    /// tries column-level reconciliation on each conflicting table
    /// (`spec.md` §4.7 step 4) and only falls back to `strict`'s all-or-
    /// nothing conflict report for tables it can't cleanly merge.
    #[allow(clippy::too_many_arguments)]
    pub async fn merge(
        &self,
        blobs: &dyn BlobRepository,
        trees: &dyn TreeRepository,
        commits: &dyn CommitRepository,
        refs: &dyn RefStore,
        target_branch: &str,
        source_branch: &str,
        message: Option<String>,
        strategy: MergeStrategyArg,
        author: &str,
    ) -> Result<MergeVerbOutcome, EngineError> {
        self.run(target_branch, "merge", || async {
            let ours = refs
                .get_branch(target_branch)
                .await
                .map_err(ref_err)?
                .ok_or_else(|| branch_not_found(target_branch))?;
            let theirs = refs
                .get_branch(source_branch)
                .await
                .map_err(ref_err)?
                .ok_or_else(|| branch_not_found(source_branch))?;

            if ours.commit_id == theirs.commit_id {
                return Ok(MergeVerbOutcome::AlreadyUpToDate);
            }

            let base_id = merge_base(commits, ours.commit_id, theirs.commit_id)
                .await?
                .ok_or_else(|| EngineError::MergeConflict {
                    object: format!("{target_branch}..{source_branch}"),
                    reason: "no common ancestor".to_string(),
                })?;

            if base_id == ours.commit_id {
                refs.update_branch(target_branch, theirs.commit_id)
                    .await
                    .map_err(ref_err)?;
                return Ok(MergeVerbOutcome::FastForwarded {
                    new_commit: theirs.commit_id,
                });
            }

            let base_tree = tree_blob_ids(trees, commits, blobs, base_id).await?;
            let ours_tree = tree_blob_ids(trees, commits, blobs, ours.commit_id).await?;
            let theirs_tree = tree_blob_ids(trees, commits, blobs, theirs.commit_id).await?;

            let outcome = merge_trees(&base_tree, &ours_tree, &theirs_tree);
            let mut resolved = outcome.resolved_tree_blob_ids.clone();

            if !outcome.is_clean() {
                match strategy {
                    MergeStrategyArg::Strict => {
                        return Ok(MergeVerbOutcome::Conflicts(outcome.conflicts));
                    }
                    MergeStrategyArg::Auto => {
                        let mut unresolved = Vec::new();
                        for conflict in &outcome.conflicts {
                            match reconcile_table_conflict(blobs, conflict).await? {
                                Some(merged_blob) => {
                                    blobs.put_blob(&merged_blob).await?;
                                    resolved.push(merged_blob.id);
                                }
                                None => unresolved.push(conflict.clone()),
                            }
                        }
                        if !unresolved.is_empty() {
                            return Ok(MergeVerbOutcome::Conflicts(unresolved));
                        }
                    }
                    MergeStrategyArg::Ours | MergeStrategyArg::Theirs => {
                        for conflict in &outcome.conflicts {
                            let pick = match strategy {
                                MergeStrategyArg::Ours => conflict.ours_id,
                                MergeStrategyArg::Theirs => conflict.theirs_id,
                                _ => None,
                            };
                            if let Some(id) = pick {
                                resolved.push(id);
                            }
                        }
                    }
                }
            }

            let now = Utc::now();
            let msg = message.clone().unwrap_or_else(|| {
                format!("Merge branch '{source_branch}' into {target_branch}")
            });
            let tree = build_tree(resolved.clone());
            trees.put_tree(&tree).await?;
            let merge_commit = create_merge_commit(
                resolved,
                ours.commit_id,
                theirs.commit_id,
                base_id,
                author.to_string(),
                author.to_string(),
                now,
                msg,
            );
            commits.put_commit(&merge_commit).await?;
            refs.update_branch(target_branch, merge_commit.id)
                .await
                .map_err(ref_err)?;
            Ok(MergeVerbOutcome::Merged { commit: merge_commit })
        })
        .await
    }

    /// `reset_hard(commit_id)`: forces the current branch's tip to
    /// `commit_id`, discarding any commits and staged changes past it.
    pub async fn reset_hard(
        &self,
        commits: &dyn CommitRepository,
        refs: &dyn RefStore,
        commit_id: ObjectId,
    ) -> Result<Ref, EngineError> {
        let branch = current_branch(refs).await?;
        self.run(&branch, "reset_hard", || async {
            commits
                .get_commit(&commit_id)
                .await?
                .ok_or_else(|| commit_not_found(commit_id))?;
            refs.update_branch(&branch, commit_id).await.map_err(ref_err)?;
            Ok(Ref {
                branch: branch.clone(),
                ref_type: RefKind::Branch,
                commit_id,
            })
        })
        .await
    }

    /// `revert_commit(commit_id, message?)`: creates a new commit whose tree
    /// matches `commit_id`'s *parent's* tree (undoing exactly what that
    /// commit changed), parented on the current HEAD. Fails with
    /// `ValidationError` when `commit_id` is a root commit with nothing to
    /// undo back to.
    pub async fn revert_commit(
        &self,
        commits: &dyn CommitRepository,
        refs: &dyn RefStore,
        commit_id: ObjectId,
        message: Option<String>,
        author: &str,
    ) -> Result<Commit, EngineError> {
        let branch = current_branch(refs).await?;
        self.run(&branch, "revert_commit", || async {
            let target = commits
                .get_commit(&commit_id)
                .await?
                .ok_or_else(|| commit_not_found(commit_id))?;
            let parent_id = target.parent_ids.first().copied().ok_or_else(|| {
                EngineError::ValidationError(format!(
                    "cannot revert root commit {commit_id}: it has no parent to revert to"
                ))
            })?;
            let parent = commits
                .get_commit(&parent_id)
                .await?
                .ok_or_else(|| commit_not_found(parent_id))?;
            let head = refs
                .get_branch(&branch)
                .await
                .map_err(ref_err)?
                .ok_or_else(|| branch_not_found(&branch))?;
            let now = Utc::now();
            let mut new_commit = revert(
                &target,
                parent.tree_id,
                head.commit_id,
                author.to_string(),
                author.to_string(),
                now,
            );
            if let Some(msg) = &message {
                new_commit.message = msg.clone();
            }
            let finalized = new_commit.finalize();
            commits.put_commit(&finalized).await?;
            refs.update_branch(&branch, finalized.id).await.map_err(ref_err)?;
            Ok(finalized)
        })
        .await
    }

    /// `apply_tree_state(tree_id, policy)`: diffs `tree_id` against the live
    /// catalog and applies the resulting migration plan, per-step, via
    /// `catalog`.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_tree_state(
        &self,
        blobs: &dyn BlobRepository,
        trees: &dyn TreeRepository,
        refs: &dyn RefStore,
        catalog: &dyn CatalogReader,
        schema: &str,
        tree_id: ObjectId,
        policy: PlanPolicy,
        max_blob_bytes: usize,
    ) -> Result<ApplyResult, EngineError> {
        let branch = current_branch(refs).await?;
        self.run(&branch, "apply_tree_state", || async {
            let tree = trees
                .get_tree(&tree_id)
                .await?
                .ok_or_else(|| EngineError::ValidationError(format!("tree not found: {tree_id}")))?;

            let mut target_ids = BTreeMap::new();
            for blob_id in &tree.blob_ids {
                if let Some(blob) = blobs.get_blob(blob_id).await? {
                    target_ids.insert(blob.qualified_name(), blob.id);
                }
            }

            let live = live_blob_map(catalog, schema, max_blob_bytes).await?;
            let live_ids: BTreeMap<String, ObjectId> =
                live.into_iter().map(|(k, b)| (k, b.id)).collect();

            let rows = coarse_diff(&live_ids, &target_ids);
            let plan = build_plan(rows, policy);
            let applier = CatalogApplier { catalog };
            applier.apply(&plan).await
        })
        .await
    }

    /// `analyze_dependency_impact(schema, name, op)`: blast-radius report
    /// for applying `operation` to `schema.name`. Read-only.
    pub async fn analyze_dependency_impact(
        &self,
        catalog: &dyn CatalogReader,
        schema: &str,
        name: &str,
        operation: Direction,
        max_depth: usize,
    ) -> Result<Vec<ImpactRow>, EngineError> {
        let objects = catalog.list_objects(schema).await?;
        let graph = build_dependency_graph(&objects);
        let key = format!("{schema}.{name}");
        Ok(graph.analyze_impact(&key, operation, max_depth))
    }

    /// `validate_schema(schema)`: structural validation (cycles, inheritance
    /// depth, incoming FK count, view chain depth) over the live catalog.
    /// Read-only.
    pub async fn validate_schema(
        &self,
        catalog: &dyn CatalogReader,
        schema: &str,
        inheritance_depth_limit: u32,
        max_incoming_fks: u32,
        view_chain_limit: u32,
    ) -> Result<Vec<ValidationIssue>, EngineError> {
        let objects = catalog.list_objects(schema).await?;
        let graph = build_dependency_graph(&objects);
        Ok(graph.validate_schema(inheritance_depth_limit, max_incoming_fks, view_chain_limit))
    }
}

fn ref_err(e: crate::refs::RefError) -> EngineError {
    EngineError::ValidationError(e.to_string())
}

fn branch_not_found(name: &str) -> EngineError {
    EngineError::ValidationError(format!("branch not found: {name}"))
}

fn commit_not_found(id: ObjectId) -> EngineError {
    EngineError::ValidationError(format!("commit not found: {id}"))
}

async fn current_branch(refs: &dyn RefStore) -> Result<String, EngineError> {
    refs.get_head()
        .await
        .map_err(ref_err)?
        .ok_or_else(|| EngineError::ValidationError("HEAD is unset; no current branch".to_string()))
}

async fn tree_blob_map(
    trees: &dyn TreeRepository,
    commits: &dyn CommitRepository,
    blobs: &dyn BlobRepository,
    commit_id: ObjectId,
) -> Result<BTreeMap<String, Blob>, EngineError> {
    let commit = commits
        .get_commit(&commit_id)
        .await?
        .ok_or_else(|| commit_not_found(commit_id))?;
    let tree = trees
        .get_tree(&commit.tree_id)
        .await?
        .ok_or_else(|| EngineError::ValidationError(format!("tree not found: {}", commit.tree_id)))?;

    let mut map = BTreeMap::new();
    for blob_id in tree.blob_ids {
        if let Some(blob) = blobs.get_blob(&blob_id).await? {
            map.insert(blob.qualified_name(), blob);
        }
    }
    Ok(map)
}

/// Same blob set as `tree_blob_map`, keyed the same way (qualified object
/// name) but reduced to ids — the shape `merge_trees` matches objects by.
async fn tree_blob_ids(
    trees: &dyn TreeRepository,
    commits: &dyn CommitRepository,
    blobs: &dyn BlobRepository,
    commit_id: ObjectId,
) -> Result<BTreeMap<String, ObjectId>, EngineError> {
    let map = tree_blob_map(trees, commits, blobs, commit_id).await?;
    Ok(map.into_iter().map(|(k, b)| (k, b.id)).collect())
}

async fn live_blob_map(
    catalog: &dyn CatalogReader,
    schema: &str,
    max_blob_bytes: usize,
) -> Result<BTreeMap<String, Blob>, EngineError> {
    let mut map = BTreeMap::new();
    for descriptor in catalog.list_objects(schema).await? {
        let blob = Blob::from_descriptor(&descriptor, max_blob_bytes)?;
        map.insert(blob.qualified_name(), blob);
    }
    Ok(map)
}

#[allow(clippy::too_many_arguments)]
async fn blob_maps(
    blobs: &dyn BlobRepository,
    trees: &dyn TreeRepository,
    commits: &dyn CommitRepository,
    refs: &dyn RefStore,
    catalog: &dyn CatalogReader,
    branch: &str,
    schema: &str,
    max_blob_bytes: usize,
) -> Result<(BTreeMap<String, Blob>, BTreeMap<String, Blob>), EngineError> {
    let head = refs.get_branch(branch).await.map_err(ref_err)?;
    let before = match head {
        Some(r) => tree_blob_map(trees, commits, blobs, r.commit_id).await?,
        None => BTreeMap::new(),
    };
    let after = live_blob_map(catalog, schema, max_blob_bytes).await?;
    Ok((before, after))
}

fn staged_changes_from(
    before: &BTreeMap<String, Blob>,
    after: &BTreeMap<String, Blob>,
) -> Vec<StagedChange> {
    let mut out = Vec::new();

    for (key, after_blob) in after {
        match before.get(key) {
            None => out.push(StagedChange {
                object_name: key.clone(),
                change_type: StagedChangeType::Add,
                old_hash: None,
                new_hash: Some(after_blob.id.to_hex()),
            }),
            Some(before_blob) if before_blob.id != after_blob.id => out.push(StagedChange {
                object_name: key.clone(),
                change_type: StagedChangeType::Modify,
                old_hash: Some(before_blob.id.to_hex()),
                new_hash: Some(after_blob.id.to_hex()),
            }),
            Some(_) => {}
        }
    }

    for (key, before_blob) in before {
        if !after.contains_key(key) {
            out.push(StagedChange {
                object_name: key.clone(),
                change_type: StagedChangeType::Delete,
                old_hash: Some(before_blob.id.to_hex()),
                new_hash: None,
            });
        }
    }

    out.sort_by(|a, b| a.object_name.cmp(&b.object_name));
    out
}

/// Bounded breadth-first walk of a commit's ancestry, nearest-first.
/// Duplicates `commit::walk_ancestors`'s algorithm rather than calling it,
/// since that free function is pinned to `&dyn CommitRepository` and this
/// module only ever receives repository references one trait at a time.
async fn ancestor_ids(
    commits: &dyn CommitRepository,
    start: ObjectId,
    max_depth: usize,
) -> Result<Vec<ObjectId>, EngineError> {
    let mut visited = HashSet::new();
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
        for parent in commits.get_parents(&id).await? {
            if visited.insert(parent) {
                queue.push_back((parent, depth + 1));
            }
        }
    }
    Ok(result)
}

/// Lowest common ancestor via depth-labelled BFS from both sides, ties
/// broken by most recent `committed_at`. Same algorithm as
/// `commit::find_merge_base`.
async fn merge_base(
    commits: &dyn CommitRepository,
    a: ObjectId,
    b: ObjectId,
) -> Result<Option<ObjectId>, EngineError> {
    if a == b {
        return Ok(Some(a));
    }

    let depth_limit = 10_000;
    let mut depths_a = HashMap::new();
    depths_a.insert(a, 0usize);
    let mut queue = VecDeque::new();
    queue.push_back(a);
    while let Some(id) = queue.pop_front() {
        let d = depths_a[&id];
        if d >= depth_limit {
            continue;
        }
        for parent in commits.get_parents(&id).await? {
            if !depths_a.contains_key(&parent) {
                depths_a.insert(parent, d + 1);
                queue.push_back(parent);
            }
        }
    }

    let mut visited_b = HashSet::new();
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
        for parent in commits.get_parents(&id).await? {
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
        if let Some(commit) = commits.get_commit(&id).await? {
            if best.as_ref().map(|(_, t)| commit.committed_at > *t).unwrap_or(true) {
                best = Some((id, commit.committed_at));
            }
        }
    }
    Ok(best.map(|(id, _)| id))
}

/// Builds a dependency graph from catalog descriptors for impact analysis
/// and schema validation. Descriptors only carry flat dependency keys (no
/// edge type), so the edge's `DependencyType`/strength is inferred from the
/// dependent object's own kind.
fn build_dependency_graph(objects: &[CatalogObjectDescriptor]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for object in objects {
        let key = object.qualified_name();
        graph.add_node(&key);
        let dependency_type = dependency_type_for(object.object_type);
        let strength = strength_for(dependency_type);
        for dep in &object.dependencies {
            let edge = DependencyEdge {
                dependent_key: key.clone(),
                depends_on_key: dep.clone(),
                dependency_type,
                strength,
                cascade_behavior: CascadeBehavior::Restrict,
                details: None,
            };
            // A cyclic descriptor set would otherwise abort the whole
            // analysis; skip the offending edge and let validate_schema
            // report the cycle through its own nodes instead.
            let _ = graph.add_dependency(edge);
        }
    }
    graph
}

fn dependency_type_for(object_type: ObjectType) -> DependencyType {
    match object_type {
        ObjectType::View | ObjectType::MaterializedView => DependencyType::ViewDependency,
        ObjectType::Sequence => DependencyType::SequenceOwnership,
        ObjectType::Trigger => DependencyType::TriggerFunction,
        ObjectType::Index => DependencyType::IndexFunction,
        ObjectType::Function | ObjectType::Procedure => DependencyType::FunctionTable,
        _ => DependencyType::ForeignKey,
    }
}

fn strength_for(dependency_type: DependencyType) -> u8 {
    match dependency_type {
        DependencyType::ForeignKey => crate::graph::STRENGTH_FOREIGN_KEY,
        DependencyType::Inheritance => crate::graph::STRENGTH_INHERITANCE,
        DependencyType::SequenceOwnership => crate::graph::STRENGTH_SEQUENCE_OWNERSHIP,
        DependencyType::TriggerFunction => crate::graph::STRENGTH_TRIGGER_FUNCTION,
        DependencyType::ViewDependency => crate::graph::STRENGTH_VIEW_DEPENDENCY,
        DependencyType::IndexFunction => crate::graph::STRENGTH_INDEX_FUNCTION,
        DependencyType::FunctionTable => crate::graph::STRENGTH_FUNCTION_TABLE,
    }
}
