//! SurrealDB record shapes for the object store and ancillary tables.
//!
//! Tables:
//! - `blobs`, `trees`, `commits`: the content-addressable object store
//! - `branches`: branch name -> commit id pointers, plus `HEAD`
//! - `operation_locks`: per-branch advisory locks held during a verb
//! - `error_log`: structured record of every recovered/surfaced error
//! - `conflict_resolutions`: manual resolutions recorded against a merge

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bridges `chrono::DateTime<Utc>` to SurrealDB's native datetime type so
/// records round-trip without losing timezone information.
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobDoc {
    pub id: String,
    pub object_type: String,
    pub schema_name: String,
    pub name: String,
    pub canonical_text: String,
    /// JSON-serialized `TableDescriptor`, present only for table blobs built
    /// from a structured descriptor rather than raw DDL text.
    pub table_json: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeDoc {
    pub id: String,
    pub blob_ids: Vec<String>,
    pub incremental_parent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitDoc {
    pub id: String,
    pub tree_id: String,
    pub parent_ids: Vec<String>,
    pub author: String,
    pub committer: String,
    #[serde(with = "surreal_datetime")]
    pub authored_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub committed_at: DateTime<Utc>,
    pub message: String,
    pub merge_base_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A branch or tag pointer; `ref_type` ("branch" | "tag") discriminates the
/// two within the same `branches` table since both are name -> commit_id
/// rows and tags need no table of their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchDoc {
    pub name: String,
    pub ref_type: String,
    pub commit_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadDoc {
    pub branch: String,
    pub working_schema_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationLockDoc {
    pub name: String,
    pub token: String,
    #[serde(with = "surreal_datetime")]
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogDoc {
    pub operation_id: String,
    pub category: String,
    pub severity: String,
    pub branch: Option<String>,
    pub message: String,
    #[serde(with = "surreal_datetime")]
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResolutionDoc {
    pub merge_id: String,
    pub object_key: String,
    pub resolution: String,
    pub resolved_blob_id: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub resolved_at: DateTime<Utc>,
}
