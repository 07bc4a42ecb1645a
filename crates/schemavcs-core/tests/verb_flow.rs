//! End-to-end walks through the three worked examples (`spec.md` §5: linear
//! history, branch-and-diverge, conflict) against `OperationController`,
//! using an in-memory object store rather than `schemavcs-state`'s SurrealDB
//! backend (this crate never depends on `schemavcs-state`).

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use schemavcs_catalog::{CatalogObjectDescriptor, InMemoryCatalog, ObjectType};
use schemavcs_core::controller::{ErrorLog, ErrorLogEntry, LockGuard, LockManager};
use schemavcs_core::refs::RefKind;
use schemavcs_core::tree::{build_tree, Tree, TreeRepository};
use schemavcs_core::{
    Blob, BlobRepository, Commit, CommitRepository, EngineError, MergeStrategyArg,
    MergeVerbOutcome, ObjectId, OperationController, Ref, RefStore,
};
use uuid::Uuid;

struct AlwaysLock;

#[async_trait]
impl LockManager for AlwaysLock {
    async fn acquire(&self, name: &str, _timeout_ms: u64) -> Result<LockGuard, EngineError> {
        Ok(LockGuard {
            lock_name: name.to_string(),
            token: Uuid::new_v4(),
        })
    }
    async fn release(&self, _guard: &LockGuard) -> Result<(), EngineError> {
        Ok(())
    }
}

#[derive(Default)]
struct NullLog;

#[async_trait]
impl ErrorLog for NullLog {
    async fn record(&self, _entry: &ErrorLogEntry) -> Result<(), EngineError> {
        Ok(())
    }
}

#[derive(Default)]
struct MemStore {
    blobs: Mutex<HashMap<ObjectId, Blob>>,
    trees: Mutex<HashMap<ObjectId, Tree>>,
    commits: Mutex<HashMap<ObjectId, Commit>>,
    branches: Mutex<HashMap<String, Ref>>,
    tags: Mutex<HashMap<String, Ref>>,
    head: Mutex<Option<String>>,
    working_schema: Mutex<Option<String>>,
}

#[async_trait]
impl BlobRepository for MemStore {
    async fn put_blob(&self, blob: &Blob) -> Result<(), EngineError> {
        self.blobs.lock().unwrap().insert(blob.id, blob.clone());
        Ok(())
    }
    async fn get_blob(&self, id: &ObjectId) -> Result<Option<Blob>, EngineError> {
        Ok(self.blobs.lock().unwrap().get(id).cloned())
    }
    async fn has_blob(&self, id: &ObjectId) -> Result<bool, EngineError> {
        Ok(self.blobs.lock().unwrap().contains_key(id))
    }
}

#[async_trait]
impl TreeRepository for MemStore {
    async fn put_tree(&self, tree: &Tree) -> Result<(), EngineError> {
        self.trees.lock().unwrap().insert(tree.id, tree.clone());
        Ok(())
    }
    async fn get_tree(&self, id: &ObjectId) -> Result<Option<Tree>, EngineError> {
        Ok(self.trees.lock().unwrap().get(id).cloned())
    }
}

#[async_trait]
impl CommitRepository for MemStore {
    async fn put_commit(&self, commit: &Commit) -> Result<(), EngineError> {
        self.commits.lock().unwrap().insert(commit.id, commit.clone());
        Ok(())
    }
    async fn get_commit(&self, id: &ObjectId) -> Result<Option<Commit>, EngineError> {
        Ok(self.commits.lock().unwrap().get(id).cloned())
    }
    async fn get_parents(&self, id: &ObjectId) -> Result<Vec<ObjectId>, EngineError> {
        Ok(self
            .commits
            .lock()
            .unwrap()
            .get(id)
            .map(|c| c.parent_ids.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl RefStore for MemStore {
    async fn create_branch(
        &self,
        name: &str,
        from_commit: ObjectId,
    ) -> Result<Ref, schemavcs_core::refs::RefError> {
        let r = Ref {
            branch: name.to_string(),
            ref_type: RefKind::Branch,
            commit_id: from_commit,
        };
        self.branches.lock().unwrap().insert(name.to_string(), r.clone());
        Ok(r)
    }
    async fn get_branch(&self, name: &str) -> Result<Option<Ref>, schemavcs_core::refs::RefError> {
        Ok(self.branches.lock().unwrap().get(name).cloned())
    }
    async fn update_branch(
        &self,
        name: &str,
        new_commit: ObjectId,
    ) -> Result<(), schemavcs_core::refs::RefError> {
        let mut branches = self.branches.lock().unwrap();
        let r = branches
            .get_mut(name)
            .ok_or_else(|| schemavcs_core::refs::RefError::NotFound(name.to_string()))?;
        r.commit_id = new_commit;
        Ok(())
    }
    async fn list_branches(&self) -> Result<Vec<Ref>, schemavcs_core::refs::RefError> {
        Ok(self.branches.lock().unwrap().values().cloned().collect())
    }
    async fn create_tag(
        &self,
        name: &str,
        commit_id: ObjectId,
    ) -> Result<Ref, schemavcs_core::refs::RefError> {
        if self.branches.lock().unwrap().contains_key(name) || self.tags.lock().unwrap().contains_key(name) {
            return Err(schemavcs_core::refs::RefError::BranchExists(name.to_string()));
        }
        let r = Ref {
            branch: name.to_string(),
            ref_type: RefKind::Tag,
            commit_id,
        };
        self.tags.lock().unwrap().insert(name.to_string(), r.clone());
        Ok(r)
    }
    async fn get_tag(&self, name: &str) -> Result<Option<Ref>, schemavcs_core::refs::RefError> {
        Ok(self.tags.lock().unwrap().get(name).cloned())
    }
    async fn list_tags(&self) -> Result<Vec<Ref>, schemavcs_core::refs::RefError> {
        Ok(self.tags.lock().unwrap().values().cloned().collect())
    }
    async fn get_head(&self) -> Result<Option<String>, schemavcs_core::refs::RefError> {
        Ok(self.head.lock().unwrap().clone())
    }
    async fn set_head(&self, branch: &str) -> Result<(), schemavcs_core::refs::RefError> {
        *self.head.lock().unwrap() = Some(branch.to_string());
        let mut working_schema = self.working_schema.lock().unwrap();
        if working_schema.is_none() {
            *working_schema = Some(branch.to_string());
        }
        Ok(())
    }
    async fn get_working_schema(&self) -> Result<Option<String>, schemavcs_core::refs::RefError> {
        Ok(self.working_schema.lock().unwrap().clone())
    }
    async fn set_working_schema(&self, name: &str) -> Result<(), schemavcs_core::refs::RefError> {
        *self.working_schema.lock().unwrap() = Some(name.to_string());
        Ok(())
    }
}

fn table(schema: &str, name: &str, raw_definition: &str) -> CatalogObjectDescriptor {
    CatalogObjectDescriptor {
        object_type: ObjectType::Table,
        schema: schema.to_string(),
        name: name.to_string(),
        raw_definition: raw_definition.to_string(),
        dependencies: BTreeSet::new(),
        table: None,
    }
}

async fn genesis(store: &MemStore) -> ObjectId {
    let tree = build_tree(vec![]);
    TreeRepository::put_tree(store, &tree).await.unwrap();
    let now = chrono::Utc::now();
    let commit = schemavcs_core::NewCommit {
        tree_id: tree.id,
        parent_ids: vec![],
        author: "test".to_string(),
        committer: "test".to_string(),
        authored_at: now,
        committed_at: now,
        message: "initial commit".to_string(),
        merge_base_id: None,
        metadata: Default::default(),
    }
    .finalize();
    CommitRepository::put_commit(store, &commit).await.unwrap();
    RefStore::create_branch(store, "main", commit.id).await.unwrap();
    RefStore::set_head(store, "main").await.unwrap();
    commit.id
}

fn controller() -> OperationController<AlwaysLock, NullLog> {
    OperationController::new(AlwaysLock, NullLog, 1_000)
}

/// spec.md §5 "Linear history": stage, commit, stage again, commit again,
/// log shows both commits nearest-first.
#[tokio::test]
async fn linear_history_produces_two_commits_in_log_order() {
    let store = MemStore::default();
    genesis(&store).await;
    let ctl = controller();
    let catalog = InMemoryCatalog::new();

    catalog.seed(table("public", "users", "CREATE TABLE users (id int)"));
    let first = ctl
        .commit(&store, &store, &store, &store, &catalog, "public", "add users", "alice", 100_000)
        .await
        .unwrap()
        .expect("first commit should be non-empty");

    catalog.seed(table("public", "orders", "CREATE TABLE orders (id int)"));
    let second = ctl
        .commit(&store, &store, &store, &store, &catalog, "public", "add orders", "alice", 100_000)
        .await
        .unwrap()
        .expect("second commit should be non-empty");

    let log = ctl.log(&store, &store, 10).await.unwrap();
    assert_eq!(log.len(), 3); // second, first, genesis
    assert_eq!(log[0].id, second.id);
    assert_eq!(log[1].id, first.id);
    assert_eq!(log[1].parent_ids, vec![log[2].id]);
}

/// spec.md §5 "Branch and diverge": a feature branch adds an object the
/// main branch never sees; a clean merge fast-forwards nothing (diverged)
/// but produces a merge commit with both trees reconciled.
#[tokio::test]
async fn branch_and_diverge_merges_cleanly_when_changes_are_disjoint() {
    let store = MemStore::default();
    genesis(&store).await;
    let ctl = controller();
    let catalog = InMemoryCatalog::new();

    catalog.seed(table("public", "users", "CREATE TABLE users (id int)"));
    ctl.commit(&store, &store, &store, &store, &catalog, "public", "add users", "alice", 100_000)
        .await
        .unwrap();

    ctl.create_branch(&store, "feature", "main").await.unwrap();
    ctl.checkout(&store, "feature", false).await.unwrap();

    catalog.seed(table("public", "audit_log", "CREATE TABLE audit_log (id int)"));
    ctl.commit(&store, &store, &store, &store, &catalog, "public", "add audit_log", "bob", 100_000)
        .await
        .unwrap();

    let outcome = ctl
        .merge(&store, &store, &store, &store, "main", "feature", None, MergeStrategyArg::Auto, "carol")
        .await
        .unwrap();

    match outcome {
        MergeVerbOutcome::FastForwarded { .. } => (),
        other => panic!("expected a fast-forward merge (main never diverged), got {other:?}"),
    }
}

/// spec.md §5 "Conflict": both branches redefine the same object; an
/// auto-strategy merge surfaces the conflict instead of guessing.
#[tokio::test]
async fn conflicting_edits_to_the_same_object_surface_as_conflicts() {
    let store = MemStore::default();
    genesis(&store).await;
    let ctl = controller();
    let catalog = InMemoryCatalog::new();

    catalog.seed(table("public", "users", "CREATE TABLE users (id int)"));
    ctl.commit(&store, &store, &store, &store, &catalog, "public", "add users", "alice", 100_000)
        .await
        .unwrap();

    ctl.create_branch(&store, "feature", "main").await.unwrap();

    catalog.seed(table("public", "users", "CREATE TABLE users (id int, name text)"));
    ctl.commit(&store, &store, &store, &store, &catalog, "public", "widen users on main", "alice", 100_000)
        .await
        .unwrap();

    ctl.checkout(&store, "feature", false).await.unwrap();
    catalog.seed(table("public", "users", "CREATE TABLE users (id int, email text)"));
    ctl.commit(&store, &store, &store, &store, &catalog, "public", "widen users on feature", "bob", 100_000)
        .await
        .unwrap();

    let outcome = ctl
        .merge(&store, &store, &store, &store, "main", "feature", None, MergeStrategyArg::Auto, "carol")
        .await
        .unwrap();

    match outcome {
        MergeVerbOutcome::Conflicts(conflicts) => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].object_key, "public.users");
        }
        other => panic!("expected a conflict on public.users, got {other:?}"),
    }
}

#[tokio::test]
async fn reset_hard_moves_branch_tip_without_touching_other_branches() {
    let store = MemStore::default();
    let genesis_id = genesis(&store).await;
    let ctl = controller();
    let catalog = InMemoryCatalog::new();

    catalog.seed(table("public", "users", "CREATE TABLE users (id int)"));
    ctl.commit(&store, &store, &store, &store, &catalog, "public", "add users", "alice", 100_000)
        .await
        .unwrap();

    let reset = ctl.reset_hard(&store, &store, genesis_id).await.unwrap();
    assert_eq!(reset.commit_id, genesis_id);
    assert_eq!(reset.branch, "main");
}

/// spec.md §4.3/§8 scenario 2: reverting a commit undoes exactly that
/// commit's change, leaving the object set from before it was made, and
/// parents the revert on the current tip rather than on the target commit.
#[tokio::test]
async fn revert_commit_restores_pre_commit_state_and_parents_on_head() {
    let store = MemStore::default();
    genesis(&store).await;
    let ctl = controller();
    let catalog = InMemoryCatalog::new();

    catalog.seed(table("public", "users", "CREATE TABLE users (id int)"));
    let add_users = ctl
        .commit(&store, &store, &store, &store, &catalog, "public", "add users", "alice", 100_000)
        .await
        .unwrap()
        .expect("add users should commit");

    catalog.seed(table("public", "orders", "CREATE TABLE orders (id int)"));
    let add_orders = ctl
        .commit(&store, &store, &store, &store, &catalog, "public", "add orders", "alice", 100_000)
        .await
        .unwrap()
        .expect("add orders should commit");

    let reverted = ctl
        .revert_commit(&store, &store, add_orders.id, None, "bob")
        .await
        .unwrap();

    assert_eq!(reverted.tree_id, add_users.tree_id);
    assert_ne!(reverted.tree_id, add_orders.tree_id);
    assert_eq!(reverted.parent_ids, vec![add_orders.id]);
    assert_eq!(reverted.metadata.get("revert"), Some(&"true".to_string()));

    let log = ctl.log(&store, &store, 10).await.unwrap();
    assert_eq!(log[0].id, reverted.id);
}

/// Reverting the root commit has nothing to undo back to and must fail
/// rather than silently producing an empty tree.
#[tokio::test]
async fn revert_commit_on_root_commit_fails() {
    let store = MemStore::default();
    let genesis_id = genesis(&store).await;
    let ctl = controller();

    let err = ctl
        .revert_commit(&store, &store, genesis_id, None, "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ValidationError(_)));
}
