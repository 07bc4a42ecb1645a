//! SurrealDB connection handle and schema setup.
//!
//! Implements every `schemavcs-core` repository trait
//! (`BlobRepository`/`TreeRepository`/`CommitRepository`/`RefStore`) plus
//! the controller-facing `LockManager`/`ErrorLog` traits against a single
//! `Surreal<Db>` connection.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use schemavcs_core::controller::{ErrorLog, ErrorLogEntry, LockGuard, LockManager};
use schemavcs_core::refs::RefKind;
use schemavcs_core::{Blob, BlobRepository, Commit, CommitRepository, EngineError, ObjectId, Ref, RefStore, Tree, TreeRepository};
use surrealdb::engine::local::{Db, Mem};
use surrealdb::Surreal;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::StateError;
use crate::schema::{
    BlobDoc, BranchDoc, CommitDoc, ConflictResolutionDoc, ErrorLogDoc, HeadDoc, OperationLockDoc,
    TreeDoc,
};
use crate::Result;

#[derive(Clone)]
pub struct SurrealHandle {
    db: Surreal<Db>,
}

impl SurrealHandle {
    #[instrument(skip_all)]
    pub async fn setup_db(namespace: &str, database: &str) -> Result<Self> {
        info!("connecting to SurrealDB (in-memory engine)");

        let db = Surreal::new::<Mem>(())
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        db.use_ns(namespace)
            .use_db(database)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        let handle = SurrealHandle { db };
        handle.init_schema().await?;
        info!("schema initialized");
        Ok(handle)
    }

    async fn init_schema(&self) -> Result<()> {
        debug!("initializing schemavcs schema");

        let schema = r#"
            DEFINE TABLE blobs SCHEMAFULL;
            DEFINE FIELD id ON blobs TYPE string;
            DEFINE FIELD object_type ON blobs TYPE string;
            DEFINE FIELD schema_name ON blobs TYPE string;
            DEFINE FIELD name ON blobs TYPE string;
            DEFINE FIELD canonical_text ON blobs TYPE string;
            DEFINE FIELD table_json ON blobs TYPE option<string>;
            DEFINE INDEX idx_blob_id ON blobs FIELDS id UNIQUE;

            DEFINE TABLE trees SCHEMAFULL;
            DEFINE FIELD id ON trees TYPE string;
            DEFINE FIELD blob_ids ON trees TYPE array;
            DEFINE FIELD incremental_parent ON trees TYPE option<string>;
            DEFINE INDEX idx_tree_id ON trees FIELDS id UNIQUE;

            DEFINE TABLE commits SCHEMAFULL;
            DEFINE FIELD id ON commits TYPE string;
            DEFINE FIELD tree_id ON commits TYPE string;
            DEFINE FIELD parent_ids ON commits TYPE array;
            DEFINE FIELD author ON commits TYPE string;
            DEFINE FIELD committer ON commits TYPE string;
            DEFINE FIELD authored_at ON commits TYPE datetime;
            DEFINE FIELD committed_at ON commits TYPE datetime;
            DEFINE FIELD message ON commits TYPE string;
            DEFINE FIELD merge_base_id ON commits TYPE option<string>;
            DEFINE FIELD metadata ON commits TYPE object;
            DEFINE INDEX idx_commit_id ON commits FIELDS id UNIQUE;

            DEFINE TABLE branches SCHEMAFULL;
            DEFINE FIELD name ON branches TYPE string;
            DEFINE FIELD ref_type ON branches TYPE string;
            DEFINE FIELD commit_id ON branches TYPE string;
            DEFINE INDEX idx_branch_name ON branches FIELDS name UNIQUE;

            DEFINE TABLE head SCHEMAFULL;
            DEFINE FIELD branch ON head TYPE string;
            DEFINE FIELD working_schema_name ON head TYPE option<string>;

            DEFINE TABLE operation_locks SCHEMAFULL;
            DEFINE FIELD name ON operation_locks TYPE string;
            DEFINE FIELD token ON operation_locks TYPE string;
            DEFINE FIELD acquired_at ON operation_locks TYPE datetime;
            DEFINE INDEX idx_lock_name ON operation_locks FIELDS name UNIQUE;

            DEFINE TABLE error_log SCHEMAFULL;
            DEFINE FIELD operation_id ON error_log TYPE string;
            DEFINE FIELD category ON error_log TYPE string;
            DEFINE FIELD severity ON error_log TYPE string;
            DEFINE FIELD branch ON error_log TYPE option<string>;
            DEFINE FIELD message ON error_log TYPE string;
            DEFINE FIELD logged_at ON error_log TYPE datetime;

            DEFINE TABLE conflict_resolutions SCHEMAFULL;
            DEFINE FIELD merge_id ON conflict_resolutions TYPE string;
            DEFINE FIELD object_key ON conflict_resolutions TYPE string;
            DEFINE FIELD resolution ON conflict_resolutions TYPE string;
            DEFINE FIELD resolved_blob_id ON conflict_resolutions TYPE option<string>;
            DEFINE FIELD resolved_at ON conflict_resolutions TYPE datetime;
        "#;

        self.db
            .query(schema)
            .await
            .map_err(|e| StateError::SchemaSetup(e.to_string()))?;

        debug!("schema initialized successfully");
        Ok(())
    }
}

fn parse_object_id(s: &str) -> std::result::Result<ObjectId, StateError> {
    ObjectId::from_str(s).map_err(|_| StateError::InvalidObjectId(s.to_string()))
}

#[async_trait]
impl BlobRepository for SurrealHandle {
    #[instrument(skip(self, blob), fields(blob_id = %blob.id))]
    async fn put_blob(&self, blob: &Blob) -> std::result::Result<(), EngineError> {
        let table_json = blob
            .table
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(StateError::from)?;
        let doc = BlobDoc {
            id: blob.id.to_hex(),
            object_type: blob.object_type.to_string(),
            schema_name: blob.schema.clone(),
            name: blob.name.clone(),
            canonical_text: blob.canonical_text.clone(),
            table_json,
        };
        let _: Option<BlobDoc> = self
            .db
            .upsert(("blobs", doc.id.clone()))
            .content(doc)
            .await
            .map_err(StateError::from)?;
        Ok(())
    }

    async fn get_blob(&self, id: &ObjectId) -> std::result::Result<Option<Blob>, EngineError> {
        let doc: Option<BlobDoc> = self
            .db
            .select(("blobs", id.to_hex()))
            .await
            .map_err(StateError::from)?;
        doc.map(|d| doc_to_blob(&d)).transpose().map_err(Into::into)
    }

    async fn has_blob(&self, id: &ObjectId) -> std::result::Result<bool, EngineError> {
        Ok(self.get_blob(id).await?.is_some())
    }
}

fn doc_to_blob(doc: &BlobDoc) -> std::result::Result<Blob, StateError> {
    let object_type = schemavcs_catalog_object_type_from_str(&doc.object_type)?;
    let table = doc
        .table_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(StateError::from)?;
    Ok(Blob {
        id: parse_object_id(&doc.id)?,
        object_type,
        schema: doc.schema_name.clone(),
        name: doc.name.clone(),
        canonical_text: doc.canonical_text.clone(),
        table,
    })
}

fn schemavcs_catalog_object_type_from_str(
    s: &str,
) -> std::result::Result<schemavcs_catalog::ObjectType, StateError> {
    use schemavcs_catalog::ObjectType::*;
    Ok(match s {
        "TABLE" => Table,
        "VIEW" => View,
        "MATERIALIZED_VIEW" => MaterializedView,
        "FUNCTION" => Function,
        "PROCEDURE" => Procedure,
        "TRIGGER" => Trigger,
        "INDEX" => Index,
        "CONSTRAINT" => Constraint,
        "TYPE" => Type,
        "SEQUENCE" => Sequence,
        "PARTITION" => Partition,
        "SCHEMA" => Schema,
        other => return Err(StateError::Deserialization(format!("unknown object_type: {other}"))),
    })
}

#[async_trait]
impl TreeRepository for SurrealHandle {
    async fn put_tree(&self, tree: &Tree) -> std::result::Result<(), EngineError> {
        let doc = TreeDoc {
            id: tree.id.to_hex(),
            blob_ids: tree.blob_ids.iter().map(|id| id.to_hex()).collect(),
            incremental_parent: tree.incremental_parent.map(|id| id.to_hex()),
        };
        let _: Option<TreeDoc> = self
            .db
            .upsert(("trees", doc.id.clone()))
            .content(doc)
            .await
            .map_err(StateError::from)?;
        Ok(())
    }

    async fn get_tree(&self, id: &ObjectId) -> std::result::Result<Option<Tree>, EngineError> {
        let doc: Option<TreeDoc> = self
            .db
            .select(("trees", id.to_hex()))
            .await
            .map_err(StateError::from)?;
        doc.map(|d| doc_to_tree(&d)).transpose().map_err(Into::into)
    }
}

fn doc_to_tree(doc: &TreeDoc) -> std::result::Result<Tree, StateError> {
    let blob_ids = doc
        .blob_ids
        .iter()
        .map(|s| parse_object_id(s))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let incremental_parent = doc
        .incremental_parent
        .as_deref()
        .map(parse_object_id)
        .transpose()?;
    Ok(Tree {
        id: parse_object_id(&doc.id)?,
        blob_ids,
        incremental_parent,
    })
}

#[async_trait]
impl CommitRepository for SurrealHandle {
    #[instrument(skip(self, commit), fields(commit_id = %commit.id))]
    async fn put_commit(&self, commit: &Commit) -> std::result::Result<(), EngineError> {
        let doc = CommitDoc {
            id: commit.id.to_hex(),
            tree_id: commit.tree_id.to_hex(),
            parent_ids: commit.parent_ids.iter().map(|id| id.to_hex()).collect(),
            author: commit.author.clone(),
            committer: commit.committer.clone(),
            authored_at: commit.authored_at,
            committed_at: commit.committed_at,
            message: commit.message.clone(),
            merge_base_id: commit.merge_base_id.map(|id| id.to_hex()),
            metadata: commit.metadata.clone(),
        };
        let _: Option<CommitDoc> = self
            .db
            .upsert(("commits", doc.id.clone()))
            .content(doc)
            .await
            .map_err(StateError::from)?;
        Ok(())
    }

    async fn get_commit(&self, id: &ObjectId) -> std::result::Result<Option<Commit>, EngineError> {
        let doc: Option<CommitDoc> = self
            .db
            .select(("commits", id.to_hex()))
            .await
            .map_err(StateError::from)?;
        doc.map(|d| doc_to_commit(&d)).transpose().map_err(Into::into)
    }

    async fn get_parents(&self, id: &ObjectId) -> std::result::Result<Vec<ObjectId>, EngineError> {
        match self.get_commit(id).await? {
            Some(c) => Ok(c.parent_ids),
            None => Ok(Vec::new()),
        }
    }
}

fn doc_to_commit(doc: &CommitDoc) -> std::result::Result<Commit, StateError> {
    let parent_ids = doc
        .parent_ids
        .iter()
        .map(|s| parse_object_id(s))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let merge_base_id = doc.merge_base_id.as_deref().map(parse_object_id).transpose()?;
    Ok(Commit {
        id: parse_object_id(&doc.id)?,
        tree_id: parse_object_id(&doc.tree_id)?,
        parent_ids,
        author: doc.author.clone(),
        committer: doc.committer.clone(),
        authored_at: doc.authored_at,
        committed_at: doc.committed_at,
        message: doc.message.clone(),
        merge_base_id,
        metadata: doc.metadata.clone(),
    })
}

fn branch_doc_to_ref(d: BranchDoc) -> std::result::Result<Ref, schemavcs_core::refs::RefError> {
    let ref_type = match d.ref_type.as_str() {
        "tag" => RefKind::Tag,
        _ => RefKind::Branch,
    };
    let commit_id = parse_object_id(&d.commit_id)
        .map_err(|e| schemavcs_core::refs::RefError::NotFound(e.to_string()))?;
    Ok(Ref {
        branch: d.name,
        ref_type,
        commit_id,
    })
}

#[async_trait]
impl RefStore for SurrealHandle {
    async fn create_branch(
        &self,
        name: &str,
        from_commit: ObjectId,
    ) -> std::result::Result<Ref, schemavcs_core::refs::RefError> {
        schemavcs_core::refs::validate_branch_name(name)?;
        let existing: Option<BranchDoc> = self
            .db
            .select(("branches", name))
            .await
            .map_err(|e| schemavcs_core::refs::RefError::NotFound(e.to_string()))?;
        if existing.is_some() {
            return Err(schemavcs_core::refs::RefError::BranchExists(name.to_string()));
        }
        let doc = BranchDoc {
            name: name.to_string(),
            ref_type: "branch".to_string(),
            commit_id: from_commit.to_hex(),
        };
        let _: Option<BranchDoc> = self
            .db
            .upsert(("branches", name))
            .content(doc)
            .await
            .map_err(|e| schemavcs_core::refs::RefError::NotFound(e.to_string()))?;
        Ok(Ref {
            branch: name.to_string(),
            ref_type: RefKind::Branch,
            commit_id: from_commit,
        })
    }

    async fn get_branch(
        &self,
        name: &str,
    ) -> std::result::Result<Option<Ref>, schemavcs_core::refs::RefError> {
        let doc: Option<BranchDoc> = self
            .db
            .select(("branches", name))
            .await
            .map_err(|e| schemavcs_core::refs::RefError::NotFound(e.to_string()))?;
        match doc {
            Some(d) if d.ref_type == "branch" => Ok(Some(branch_doc_to_ref(d)?)),
            _ => Ok(None),
        }
    }

    async fn update_branch(
        &self,
        name: &str,
        new_commit: ObjectId,
    ) -> std::result::Result<(), schemavcs_core::refs::RefError> {
        if self.get_branch(name).await?.is_none() {
            return Err(schemavcs_core::refs::RefError::NotFound(name.to_string()));
        }
        let doc = BranchDoc {
            name: name.to_string(),
            ref_type: "branch".to_string(),
            commit_id: new_commit.to_hex(),
        };
        let _: Option<BranchDoc> = self
            .db
            .upsert(("branches", name))
            .content(doc)
            .await
            .map_err(|e| schemavcs_core::refs::RefError::NotFound(e.to_string()))?;
        Ok(())
    }

    async fn list_branches(&self) -> std::result::Result<Vec<Ref>, schemavcs_core::refs::RefError> {
        let docs: Vec<BranchDoc> = self
            .db
            .select("branches")
            .await
            .map_err(|e| schemavcs_core::refs::RefError::NotFound(e.to_string()))?;
        docs.into_iter()
            .filter(|d| d.ref_type == "branch")
            .map(branch_doc_to_ref)
            .collect()
    }

    async fn create_tag(
        &self,
        name: &str,
        commit_id: ObjectId,
    ) -> std::result::Result<Ref, schemavcs_core::refs::RefError> {
        schemavcs_core::refs::validate_branch_name(name)?;
        let existing: Option<BranchDoc> = self
            .db
            .select(("branches", name))
            .await
            .map_err(|e| schemavcs_core::refs::RefError::NotFound(e.to_string()))?;
        if existing.is_some() {
            return Err(schemavcs_core::refs::RefError::BranchExists(name.to_string()));
        }
        let doc = BranchDoc {
            name: name.to_string(),
            ref_type: "tag".to_string(),
            commit_id: commit_id.to_hex(),
        };
        let _: Option<BranchDoc> = self
            .db
            .upsert(("branches", name))
            .content(doc)
            .await
            .map_err(|e| schemavcs_core::refs::RefError::NotFound(e.to_string()))?;
        Ok(Ref {
            branch: name.to_string(),
            ref_type: RefKind::Tag,
            commit_id,
        })
    }

    async fn get_tag(
        &self,
        name: &str,
    ) -> std::result::Result<Option<Ref>, schemavcs_core::refs::RefError> {
        let doc: Option<BranchDoc> = self
            .db
            .select(("branches", name))
            .await
            .map_err(|e| schemavcs_core::refs::RefError::NotFound(e.to_string()))?;
        match doc {
            Some(d) if d.ref_type == "tag" => Ok(Some(branch_doc_to_ref(d)?)),
            _ => Ok(None),
        }
    }

    async fn list_tags(&self) -> std::result::Result<Vec<Ref>, schemavcs_core::refs::RefError> {
        let docs: Vec<BranchDoc> = self
            .db
            .select("branches")
            .await
            .map_err(|e| schemavcs_core::refs::RefError::NotFound(e.to_string()))?;
        docs.into_iter()
            .filter(|d| d.ref_type == "tag")
            .map(branch_doc_to_ref)
            .collect()
    }

    async fn get_head(&self) -> std::result::Result<Option<String>, schemavcs_core::refs::RefError> {
        let doc: Option<HeadDoc> = self
            .db
            .select(("head", "current"))
            .await
            .map_err(|e| schemavcs_core::refs::RefError::NotFound(e.to_string()))?;
        Ok(doc.map(|d| d.branch))
    }

    async fn set_head(&self, branch: &str) -> std::result::Result<(), schemavcs_core::refs::RefError> {
        let working_schema_name = self
            .get_working_schema()
            .await?
            .or(Some(branch.to_string()));
        let doc = HeadDoc {
            branch: branch.to_string(),
            working_schema_name,
        };
        let _: Option<HeadDoc> = self
            .db
            .upsert(("head", "current"))
            .content(doc)
            .await
            .map_err(|e| schemavcs_core::refs::RefError::NotFound(e.to_string()))?;
        Ok(())
    }

    async fn get_working_schema(
        &self,
    ) -> std::result::Result<Option<String>, schemavcs_core::refs::RefError> {
        let doc: Option<HeadDoc> = self
            .db
            .select(("head", "current"))
            .await
            .map_err(|e| schemavcs_core::refs::RefError::NotFound(e.to_string()))?;
        Ok(doc.and_then(|d| d.working_schema_name))
    }

    async fn set_working_schema(
        &self,
        name: &str,
    ) -> std::result::Result<(), schemavcs_core::refs::RefError> {
        let branch = self.get_head().await?.unwrap_or_else(|| name.to_string());
        let doc = HeadDoc {
            branch,
            working_schema_name: Some(name.to_string()),
        };
        let _: Option<HeadDoc> = self
            .db
            .upsert(("head", "current"))
            .content(doc)
            .await
            .map_err(|e| schemavcs_core::refs::RefError::NotFound(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl LockManager for SurrealHandle {
    /// Acquires a named lock by attempting a create-if-absent insert; a
    /// duplicate-key failure means someone else holds it, surfaced as
    /// `LockTimeout` immediately rather than busy-waiting (`spec.md`'s
    /// lock semantics don't describe a wait queue, only a timeout).
    async fn acquire(&self, name: &str, timeout_ms: u64) -> std::result::Result<LockGuard, EngineError> {
        let token = Uuid::new_v4();
        let doc = OperationLockDoc {
            name: name.to_string(),
            token: token.to_string(),
            acquired_at: Utc::now(),
        };
        let existing: Option<OperationLockDoc> = self
            .db
            .select(("operation_locks", name))
            .await
            .map_err(StateError::from)?;
        if existing.is_some() {
            return Err(EngineError::LockTimeout {
                lock_name: name.to_string(),
                timeout_ms,
            });
        }
        let _: Option<OperationLockDoc> = self
            .db
            .create(("operation_locks", name))
            .content(doc)
            .await
            .map_err(StateError::from)?;
        Ok(LockGuard {
            lock_name: name.to_string(),
            token,
        })
    }

    async fn release(&self, guard: &LockGuard) -> std::result::Result<(), EngineError> {
        let _: Option<OperationLockDoc> = self
            .db
            .delete(("operation_locks", guard.lock_name.clone()))
            .await
            .map_err(StateError::from)?;
        Ok(())
    }
}

#[async_trait]
impl ErrorLog for SurrealHandle {
    async fn record(&self, entry: &ErrorLogEntry) -> std::result::Result<(), EngineError> {
        let doc = ErrorLogDoc {
            operation_id: entry.operation_id.to_string(),
            category: entry.category.clone(),
            severity: entry.severity.clone(),
            branch: entry.branch.clone(),
            message: entry.message.clone(),
            logged_at: Utc::now(),
        };
        let _: Option<ErrorLogDoc> = self
            .db
            .create(("error_log", entry.operation_id.to_string()))
            .content(doc)
            .await
            .map_err(StateError::from)?;
        Ok(())
    }
}

impl SurrealHandle {
    /// Records a manual conflict resolution against a merge, used by the
    /// CLI's interactive resolve step.
    pub async fn record_conflict_resolution(
        &self,
        merge_id: &str,
        object_key: &str,
        resolution: &str,
        resolved_blob_id: Option<ObjectId>,
    ) -> Result<()> {
        let doc = ConflictResolutionDoc {
            merge_id: merge_id.to_string(),
            object_key: object_key.to_string(),
            resolution: resolution.to_string(),
            resolved_blob_id: resolved_blob_id.map(|id| id.to_hex()),
            resolved_at: Utc::now(),
        };
        let key = format!("{merge_id}:{object_key}");
        let _: Option<ConflictResolutionDoc> = self
            .db
            .upsert(("conflict_resolutions", key))
            .content(doc)
            .await?;
        Ok(())
    }
}
