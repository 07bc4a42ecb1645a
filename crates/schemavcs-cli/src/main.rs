//! schemavcs CLI: every `spec.md` §6 verb as a `clap` subcommand.
//!
//! All business logic lives in `schemavcs_core::OperationController`'s verb
//! methods; this binary only parses args, wires up a `SurrealHandle` (object
//! store + locks + error log) and an `InMemoryCatalog` (there is no live
//! database connector in this crate set), and renders results.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use schemavcs_catalog::{CatalogObjectDescriptor, CatalogReader, InMemoryCatalog};
use schemavcs_core::{
    Direction, ImpactRow, MergeStrategyArg, MergeVerbOutcome, ObjectId, PlanPolicy, ValidationIssue,
};
use schemavcs_state::config::load_config;
use schemavcs_state::SurrealHandle;
use tracing::Level;

#[derive(Parser)]
#[command(name = "schemavcs")]
#[command(author = "Schemavcs Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Git-style schema version control for relational databases", long_about = None)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON instead of text, both for logs and for command output
    #[arg(long, global = true)]
    json: bool,

    /// Path to a schemavcs.yaml config file
    #[arg(long, global = true, default_value = "schemavcs.yaml")]
    config: PathBuf,

    /// Path to a JSON file (array of catalog object descriptors) to seed
    /// the in-memory catalog with, standing in for a live database
    /// connection
    #[arg(long, global = true)]
    seed: Option<PathBuf>,

    /// Schema to operate on
    #[arg(long, global = true, default_value = "public")]
    schema: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap a repository: empty genesis commit, 'main' branch, HEAD
    Init,

    /// Create a new branch
    CreateBranch {
        name: String,
        /// Starting point branch (default: current branch)
        #[arg(long)]
        from: Option<String>,
    },

    /// Move HEAD to a branch, optionally creating it
    Checkout {
        name: String,
        #[arg(long)]
        create_new: bool,
    },

    /// Diff the live catalog against the current branch's committed tree
    StageChanges,

    /// Commit staged changes
    Commit {
        message: String,
        #[arg(long, default_value = "schemavcs")]
        author: String,
    },

    /// Current branch, staged count, current commit, last message
    Status,

    /// Commit history for the current branch
    Log {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Per-object change rows between two commits, or a commit and the live catalog
    Diff {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        /// Accepted for spec compatibility; data-level diff is unimplemented
        #[arg(long)]
        include_data: bool,
    },

    /// Merge another branch into a target branch (default: current branch)
    Merge {
        source: String,
        #[arg(long)]
        target: Option<String>,
        #[arg(long)]
        message: Option<String>,
        #[arg(long, value_enum, default_value_t = MergeStrategyCli::Auto)]
        strategy: MergeStrategyCli,
        #[arg(long, default_value = "schemavcs")]
        author: String,
    },

    /// Force the current branch's tip to a prior commit
    ResetHard { commit: String },

    /// Create a new commit that undoes a prior commit's tree
    RevertCommit {
        commit: String,
        #[arg(long)]
        message: Option<String>,
        #[arg(long, default_value = "schemavcs")]
        author: String,
    },

    /// Diff a tree against the live catalog and apply the resulting migration plan
    ApplyTreeState {
        tree: String,
        #[arg(long, value_enum, default_value_t = PlanPolicyCli::IntelligentAlter)]
        policy: PlanPolicyCli,
    },

    /// Blast-radius report for applying an operation to a schema object
    AnalyzeDependencyImpact {
        name: String,
        #[arg(value_enum)]
        operation: DirectionCli,
        #[arg(long, default_value_t = 5)]
        max_depth: usize,
    },

    /// Structural schema validation (cycles, inheritance depth, FK fan-in, view chains)
    ValidateSchema {
        #[arg(long, default_value_t = 3)]
        inheritance_depth_limit: u32,
        #[arg(long, default_value_t = 10)]
        max_incoming_fks: u32,
        #[arg(long, default_value_t = 5)]
        view_chain_limit: u32,
    },
}

#[derive(Copy, Clone, ValueEnum)]
enum MergeStrategyCli {
    Auto,
    Strict,
    Ours,
    Theirs,
}

impl From<MergeStrategyCli> for MergeStrategyArg {
    fn from(v: MergeStrategyCli) -> Self {
        match v {
            MergeStrategyCli::Auto => MergeStrategyArg::Auto,
            MergeStrategyCli::Strict => MergeStrategyArg::Strict,
            MergeStrategyCli::Ours => MergeStrategyArg::Ours,
            MergeStrategyCli::Theirs => MergeStrategyArg::Theirs,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum PlanPolicyCli {
    IntelligentAlter,
    DropRecreate,
}

impl From<PlanPolicyCli> for PlanPolicy {
    fn from(v: PlanPolicyCli) -> Self {
        match v {
            PlanPolicyCli::IntelligentAlter => PlanPolicy::IntelligentAlter,
            PlanPolicyCli::DropRecreate => PlanPolicy::DropRecreate,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum DirectionCli {
    Create,
    Drop,
}

impl From<DirectionCli> for Direction {
    fn from(v: DirectionCli) -> Self {
        match v {
            DirectionCli::Create => Direction::Create,
            DirectionCli::Drop => Direction::Drop,
        }
    }
}

fn parse_object_id(s: &str) -> Result<ObjectId> {
    ObjectId::from_str(s).map_err(|e| anyhow::anyhow!("invalid object id '{s}': {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    schemavcs_core::telemetry::init_tracing(cli.json, level);

    let config = load_config(&cli.config).context("failed to load schemavcs config")?;

    let handle = SurrealHandle::setup_db(&config.surreal_namespace, &config.surreal_database)
        .await
        .context("failed to initialize SurrealDB object store")?;

    let catalog = InMemoryCatalog::new();
    if let Some(seed_path) = &cli.seed {
        seed_catalog(&catalog, seed_path)?;
    }

    let controller =
        schemavcs_core::OperationController::new(handle.clone(), handle.clone(), config.lock_timeout_ms);

    match cli.command {
        Commands::Init => cmd_init(&handle, &controller).await,
        Commands::CreateBranch { name, from } => {
            cmd_create_branch(&handle, &controller, &name, from.as_deref()).await
        }
        Commands::Checkout { name, create_new } => {
            cmd_checkout(&handle, &controller, &name, create_new, cli.json).await
        }
        Commands::StageChanges => {
            cmd_stage_changes(&handle, &controller, &catalog, &cli.schema, config.max_blob_bytes, cli.json)
                .await
        }
        Commands::Commit { message, author } => {
            cmd_commit(
                &handle,
                &controller,
                &catalog,
                &cli.schema,
                &message,
                &author,
                config.max_blob_bytes,
                cli.json,
            )
            .await
        }
        Commands::Status => {
            cmd_status(&handle, &controller, &catalog, &cli.schema, config.max_blob_bytes, cli.json).await
        }
        Commands::Log { limit } => cmd_log(&handle, &controller, limit, cli.json).await,
        Commands::Diff { from, to, include_data } => {
            if include_data {
                tracing::warn!("--include-data requested but data-level diff is unimplemented (spec.md §9 Open Question 2)");
            }
            cmd_diff(
                &handle,
                &controller,
                &catalog,
                &cli.schema,
                from.as_deref(),
                to.as_deref(),
                config.max_blob_bytes,
                cli.json,
            )
            .await
        }
        Commands::Merge { source, target, message, strategy, author } => {
            cmd_merge(&handle, &controller, &source, target.as_deref(), message, strategy.into(), &author, cli.json)
                .await
        }
        Commands::ResetHard { commit } => cmd_reset_hard(&handle, &controller, &commit, cli.json).await,
        Commands::RevertCommit { commit, message, author } => {
            cmd_revert_commit(&handle, &controller, &commit, message, &author, cli.json).await
        }
        Commands::ApplyTreeState { tree, policy } => {
            cmd_apply_tree_state(
                &handle,
                &controller,
                &catalog,
                &cli.schema,
                &tree,
                policy.into(),
                config.max_blob_bytes,
                cli.json,
            )
            .await
        }
        Commands::AnalyzeDependencyImpact { name, operation, max_depth } => {
            cmd_analyze_dependency_impact(&controller, &catalog, &cli.schema, &name, operation.into(), max_depth, cli.json)
                .await
        }
        Commands::ValidateSchema { inheritance_depth_limit, max_incoming_fks, view_chain_limit } => {
            cmd_validate_schema(
                &controller,
                &catalog,
                &cli.schema,
                inheritance_depth_limit,
                max_incoming_fks,
                view_chain_limit,
                cli.json,
            )
            .await
        }
    }
}

fn seed_catalog(catalog: &InMemoryCatalog, path: &PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file: {path:?}"))?;
    let descriptors: Vec<CatalogObjectDescriptor> =
        serde_json::from_str(&content).with_context(|| format!("invalid seed JSON in {path:?}"))?;
    let count = descriptors.len();
    for descriptor in descriptors {
        catalog.seed(descriptor);
    }
    tracing::info!(count, "seeded in-memory catalog");
    Ok(())
}

type Controller = schemavcs_core::OperationController<SurrealHandle, SurrealHandle>;

/// Bootstrap: an empty tree, a genesis commit on it, a 'main' branch
/// pointing at it, and HEAD set to 'main'. Not a `spec.md` §6 verb — there
/// is no way to get a first branch into an empty object store otherwise.
async fn cmd_init(handle: &SurrealHandle, _controller: &Controller) -> Result<()> {
    use schemavcs_core::tree::build_tree;
    use schemavcs_core::{NewCommit, TreeRepository};

    let tree = build_tree(vec![]);
    TreeRepository::put_tree(handle, &tree).await?;

    let now = chrono::Utc::now();
    let genesis = NewCommit {
        tree_id: tree.id,
        parent_ids: vec![],
        author: "schemavcs".to_string(),
        committer: "schemavcs".to_string(),
        authored_at: now,
        committed_at: now,
        message: "initial commit".to_string(),
        merge_base_id: None,
        metadata: Default::default(),
    }
    .finalize();
    schemavcs_core::CommitRepository::put_commit(handle, &genesis).await?;

    schemavcs_core::RefStore::create_branch(handle, "main", genesis.id).await?;
    schemavcs_core::RefStore::set_head(handle, "main").await?;

    println!("Initialized empty schemavcs repository on 'main'");
    println!("Genesis commit: {}", genesis.id);
    Ok(())
}

async fn cmd_create_branch(
    handle: &SurrealHandle,
    controller: &Controller,
    name: &str,
    from: Option<&str>,
) -> Result<()> {
    let from = match from {
        Some(f) => f.to_string(),
        None => schemavcs_core::RefStore::get_head(handle)
            .await?
            .context("HEAD is unset; run 'schemavcs init' first")?,
    };
    let created = controller.create_branch(handle, name, &from).await?;
    println!("Created branch '{}' at {}", created.branch, created.commit_id);
    Ok(())
}

async fn cmd_checkout(
    handle: &SurrealHandle,
    controller: &Controller,
    name: &str,
    create_new: bool,
    as_json: bool,
) -> Result<()> {
    let target = controller.checkout(handle, name, create_new).await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&target)?);
    } else {
        println!("Switched to branch '{}' at {}", target.branch, target.commit_id);
    }
    Ok(())
}

async fn cmd_stage_changes(
    handle: &SurrealHandle,
    controller: &Controller,
    catalog: &InMemoryCatalog,
    schema: &str,
    max_blob_bytes: usize,
    as_json: bool,
) -> Result<()> {
    let changes = controller
        .stage_changes(handle, handle, handle, handle, catalog, schema, max_blob_bytes)
        .await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&changes)?);
        return Ok(());
    }
    if changes.is_empty() {
        println!("No staged changes");
        return Ok(());
    }
    for change in &changes {
        let marker = match change.change_type {
            schemavcs_core::StagedChangeType::Add => "+",
            schemavcs_core::StagedChangeType::Modify => "~",
            schemavcs_core::StagedChangeType::Delete => "-",
        };
        println!("{marker} {}", change.object_name);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_commit(
    handle: &SurrealHandle,
    controller: &Controller,
    catalog: &InMemoryCatalog,
    schema: &str,
    message: &str,
    author: &str,
    max_blob_bytes: usize,
    as_json: bool,
) -> Result<()> {
    let result = controller
        .commit(handle, handle, handle, handle, catalog, schema, message, author, max_blob_bytes)
        .await?;
    match result {
        Some(commit) => {
            if as_json {
                println!("{}", serde_json::to_string_pretty(&commit)?);
            } else {
                println!("[{}] {}", commit.id, commit.message);
            }
        }
        None => println!("Nothing to commit"),
    }
    Ok(())
}

async fn cmd_status(
    handle: &SurrealHandle,
    controller: &Controller,
    catalog: &InMemoryCatalog,
    schema: &str,
    max_blob_bytes: usize,
    as_json: bool,
) -> Result<()> {
    let report = controller
        .status(handle, handle, handle, handle, catalog, schema, max_blob_bytes)
        .await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("On branch {}", report.branch);
    match report.current_commit {
        Some(id) => println!("HEAD: {id}"),
        None => println!("HEAD: (no commits yet)"),
    }
    if let Some(msg) = &report.last_message {
        println!("Last commit: {msg}");
    }
    println!("Staged changes: {}", report.staged_count);
    Ok(())
}

async fn cmd_log(handle: &SurrealHandle, controller: &Controller, limit: usize, as_json: bool) -> Result<()> {
    let commits = controller.log(handle, handle, limit).await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&commits)?);
        return Ok(());
    }
    for commit in &commits {
        println!("commit {}", commit.id);
        println!("Author: {}", commit.author);
        println!("Date:   {}", commit.committed_at.format("%Y-%m-%d %H:%M:%S UTC"));
        println!();
        println!("    {}", commit.message);
        println!();
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_diff(
    handle: &SurrealHandle,
    controller: &Controller,
    catalog: &InMemoryCatalog,
    schema: &str,
    from: Option<&str>,
    to: Option<&str>,
    max_blob_bytes: usize,
    as_json: bool,
) -> Result<()> {
    let from_id = from.map(parse_object_id).transpose()?;
    let to_id = to.map(parse_object_id).transpose()?;
    let rows = controller
        .diff(handle, handle, handle, handle, catalog, schema, from_id, to_id, max_blob_bytes)
        .await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("No differences");
        return Ok(());
    }
    for row in &rows {
        println!("{:?} {}", row.change_kind, row.object_key);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_merge(
    handle: &SurrealHandle,
    controller: &Controller,
    source: &str,
    target: Option<&str>,
    message: Option<String>,
    strategy: MergeStrategyArg,
    author: &str,
    as_json: bool,
) -> Result<()> {
    let target = match target {
        Some(t) => t.to_string(),
        None => schemavcs_core::RefStore::get_head(handle)
            .await?
            .context("HEAD is unset; run 'schemavcs init' first")?,
    };
    let outcome = controller
        .merge(handle, handle, handle, handle, &target, source, message, strategy, author)
        .await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    match outcome {
        MergeVerbOutcome::AlreadyUpToDate => println!("Already up to date"),
        MergeVerbOutcome::FastForwarded { new_commit } => {
            println!("Fast-forwarded {target} to {new_commit}")
        }
        MergeVerbOutcome::Merged { commit } => {
            println!("Merge commit {} ({})", commit.id, commit.message)
        }
        MergeVerbOutcome::Conflicts(conflicts) => {
            println!("Merge conflicts ({} object(s)):", conflicts.len());
            for c in &conflicts {
                println!("  - {} ({:?})", c.object_key, c.class);
            }
        }
    }
    Ok(())
}

async fn cmd_reset_hard(handle: &SurrealHandle, controller: &Controller, commit: &str, as_json: bool) -> Result<()> {
    let commit_id = parse_object_id(commit)?;
    let result = controller.reset_hard(handle, handle, commit_id).await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("HEAD is now at {} ({})", result.commit_id, result.branch);
    }
    Ok(())
}

async fn cmd_revert_commit(
    handle: &SurrealHandle,
    controller: &Controller,
    commit: &str,
    message: Option<String>,
    author: &str,
    as_json: bool,
) -> Result<()> {
    let commit_id = parse_object_id(commit)?;
    let reverted = controller.revert_commit(handle, handle, commit_id, message, author).await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&reverted)?);
    } else {
        println!("[{}] {}", reverted.id, reverted.message);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_apply_tree_state(
    handle: &SurrealHandle,
    controller: &Controller,
    catalog: &InMemoryCatalog,
    schema: &str,
    tree: &str,
    policy: PlanPolicy,
    max_blob_bytes: usize,
    as_json: bool,
) -> Result<()> {
    let tree_id = parse_object_id(tree)?;
    let result = controller
        .apply_tree_state(handle, handle, handle, catalog, schema, tree_id, policy, max_blob_bytes)
        .await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    for target in &result.executed {
        println!("applied: {target}");
    }
    for warning in &result.warnings {
        println!("warning: {warning}");
    }
    if let Some((target, reason)) = &result.failed {
        println!("failed: {target} ({reason})");
    }
    Ok(())
}

async fn cmd_analyze_dependency_impact(
    controller: &Controller,
    catalog: &InMemoryCatalog,
    schema: &str,
    name: &str,
    operation: Direction,
    max_depth: usize,
    as_json: bool,
) -> Result<()> {
    let rows: Vec<ImpactRow> = controller
        .analyze_dependency_impact(catalog, schema, name, operation, max_depth)
        .await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("No downstream impact found");
        return Ok(());
    }
    for row in &rows {
        println!("{} {:?} risk={:?} via {}", row.affected, row.impact, row.risk, row.path.join(" -> "));
        println!("  suggested: {}", row.suggested_action);
    }
    Ok(())
}

async fn cmd_validate_schema(
    controller: &Controller,
    catalog: &InMemoryCatalog,
    schema: &str,
    inheritance_depth_limit: u32,
    max_incoming_fks: u32,
    view_chain_limit: u32,
    as_json: bool,
) -> Result<()> {
    let issues: Vec<ValidationIssue> = controller
        .validate_schema(catalog, schema, inheritance_depth_limit, max_incoming_fks, view_chain_limit)
        .await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&issues)?);
        return Ok(());
    }
    if issues.is_empty() {
        println!("No validation issues found");
        return Ok(());
    }
    for issue in &issues {
        println!("[{:?}] {}: {}", issue.severity, issue.object, issue.description);
        println!("  remediation: {}", issue.remediation);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemavcs_catalog::ObjectType;
    use std::collections::BTreeSet;

    #[test]
    fn parse_object_id_rejects_garbage() {
        assert!(parse_object_id("not-a-hash").is_err());
    }

    fn controller_for(handle: &SurrealHandle) -> Controller {
        schemavcs_core::OperationController::new(handle.clone(), handle.clone(), 5_000)
    }

    fn seed_table(catalog: &InMemoryCatalog, schema: &str, name: &str, definition: &str) {
        catalog.seed(CatalogObjectDescriptor {
            object_type: ObjectType::Table,
            schema: schema.to_string(),
            name: name.to_string(),
            raw_definition: definition.to_string(),
            dependencies: BTreeSet::new(),
            table: None,
        });
    }

    #[tokio::test]
    async fn init_creates_main_branch_with_a_genesis_commit() {
        let handle = SurrealHandle::setup_db("schemavcs_cli_test", "init").await.unwrap();
        let controller = controller_for(&handle);
        cmd_init(&handle, &controller).await.unwrap();

        assert_eq!(
            schemavcs_core::RefStore::get_head(&handle).await.unwrap(),
            Some("main".to_string())
        );
        let main = schemavcs_core::RefStore::get_branch(&handle, "main")
            .await
            .unwrap()
            .expect("main branch should exist after init");
        let log = controller.log(&handle, &handle, 10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].id, main.commit_id);
    }

    #[tokio::test]
    async fn commit_advances_head_and_status_reflects_it() {
        let handle = SurrealHandle::setup_db("schemavcs_cli_test", "commit_flow").await.unwrap();
        let controller = controller_for(&handle);
        cmd_init(&handle, &controller).await.unwrap();

        let catalog = InMemoryCatalog::new();
        seed_table(&catalog, "public", "users", "CREATE TABLE users (id int)");

        let committed = controller
            .commit(&handle, &handle, &handle, &handle, &catalog, "public", "add users", "tester", 100_000)
            .await
            .unwrap()
            .expect("commit should produce a new commit");

        let status = controller
            .status(&handle, &handle, &handle, &handle, &catalog, "public", 100_000)
            .await
            .unwrap();
        assert_eq!(status.branch, "main");
        assert_eq!(status.current_commit, Some(committed.id));
        assert_eq!(status.staged_count, 0);
        assert_eq!(status.last_message.as_deref(), Some("add users"));
    }

    #[tokio::test]
    async fn create_branch_defaults_from_to_the_current_branch() {
        let handle = SurrealHandle::setup_db("schemavcs_cli_test", "create_branch").await.unwrap();
        let controller = controller_for(&handle);
        cmd_init(&handle, &controller).await.unwrap();

        let head_branch = schemavcs_core::RefStore::get_head(&handle).await.unwrap().unwrap();
        let created = controller.create_branch(&handle, "feature", &head_branch).await.unwrap();

        let main = schemavcs_core::RefStore::get_branch(&handle, "main").await.unwrap().unwrap();
        assert_eq!(created.commit_id, main.commit_id);
    }
}
