//! Engine configuration: loaded from an optional YAML file, with every
//! field defaulted so a partial or missing file still yields a usable
//! config. Env var overrides (`SCHEMAVCS_<FIELD>`) are applied on top.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid configuration value for key '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_blob_bytes")]
    pub max_blob_bytes: usize,

    #[serde(default = "default_canonicalization_warn_ms")]
    pub canonicalization_warn_ms: u64,

    #[serde(default = "default_walk_ancestors_depth")]
    pub walk_ancestors_default_depth: usize,

    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: Vec<u64>,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    #[serde(default = "default_inheritance_depth_limit")]
    pub inheritance_depth_limit: u32,

    #[serde(default = "default_max_incoming_fks")]
    pub max_incoming_fks: u32,

    #[serde(default = "default_view_chain_limit")]
    pub view_chain_limit: u32,

    #[serde(default = "default_gc_grace_period_secs")]
    pub gc_grace_period_secs: u64,

    #[serde(default = "default_compress_above_bytes")]
    pub compress_above_bytes: usize,

    #[serde(default = "default_surreal_namespace")]
    pub surreal_namespace: String,

    #[serde(default = "default_surreal_database")]
    pub surreal_database: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_blob_bytes: default_max_blob_bytes(),
            canonicalization_warn_ms: default_canonicalization_warn_ms(),
            walk_ancestors_default_depth: default_walk_ancestors_depth(),
            lock_timeout_ms: default_lock_timeout_ms(),
            statement_timeout_ms: default_statement_timeout_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_retry_attempts: default_max_retry_attempts(),
            inheritance_depth_limit: default_inheritance_depth_limit(),
            max_incoming_fks: default_max_incoming_fks(),
            view_chain_limit: default_view_chain_limit(),
            gc_grace_period_secs: default_gc_grace_period_secs(),
            compress_above_bytes: default_compress_above_bytes(),
            surreal_namespace: default_surreal_namespace(),
            surreal_database: default_surreal_database(),
        }
    }
}

fn default_max_blob_bytes() -> usize {
    100_000
}
fn default_canonicalization_warn_ms() -> u64 {
    1_000
}
fn default_walk_ancestors_depth() -> usize {
    100
}
fn default_lock_timeout_ms() -> u64 {
    5_000
}
fn default_statement_timeout_ms() -> u64 {
    30_000
}
fn default_retry_backoff_ms() -> Vec<u64> {
    vec![2_000, 4_000, 8_000]
}
fn default_max_retry_attempts() -> u32 {
    3
}
fn default_inheritance_depth_limit() -> u32 {
    3
}
fn default_max_incoming_fks() -> u32 {
    10
}
fn default_view_chain_limit() -> u32 {
    5
}
fn default_gc_grace_period_secs() -> u64 {
    604_800
}
fn default_compress_above_bytes() -> usize {
    1_024
}
fn default_surreal_namespace() -> String {
    "schemavcs".to_string()
}
fn default_surreal_database() -> String {
    "engine".to_string()
}

/// Loads `path` if it exists, falling back to an all-defaults config when
/// absent, then applies any `SCHEMAVCS_*` environment overrides present.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            EngineConfig::default()
        } else {
            serde_yaml::from_str(&content)?
        }
    } else {
        EngineConfig::default()
    };

    apply_env_overrides(&mut config, &std::env::vars().collect());
    Ok(config)
}

fn apply_env_overrides(config: &mut EngineConfig, env: &HashMap<String, String>) {
    if let Some(v) = env.get("SCHEMAVCS_MAX_BLOB_BYTES").and_then(|s| s.parse().ok()) {
        config.max_blob_bytes = v;
    }
    if let Some(v) = env.get("SCHEMAVCS_LOCK_TIMEOUT_MS").and_then(|s| s.parse().ok()) {
        config.lock_timeout_ms = v;
    }
    if let Some(v) = env
        .get("SCHEMAVCS_STATEMENT_TIMEOUT_MS")
        .and_then(|s| s.parse().ok())
    {
        config.statement_timeout_ms = v;
    }
}
