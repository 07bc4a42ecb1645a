//! Migration planner and applier.

use async_trait::async_trait;
use schemavcs_catalog::{CatalogReader, DdlKind, DdlStatement, SavepointOutcome};
use serde::{Deserialize, Serialize};

use crate::diff::{is_widening_conversion, ChangeKind, DiffRow};
use crate::error::EngineError;

/// Plan generation policy (`spec.md` §4.8): prefer in-place `ALTER TABLE`
/// when the type matrix allows it, or always drop and recreate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanPolicy {
    IntelligentAlter,
    DropRecreate,
}

/// Orders `rows` and turns each into an executable, risk-annotated
/// [`PlanStep`]. Widening-conversion detection reads the before/after column
/// types out of the fine diff's `detail` string (`"{from} -> {to}"`); rows
/// that never went through `fine_diff_tables` carry no such detail, so
/// type-narrowing risk defaults to the conservative (higher) side for them.
pub fn build_plan(rows: Vec<DiffRow>, policy: PlanPolicy) -> Vec<PlanStep> {
    order_rows(rows)
        .into_iter()
        .map(|row| plan_step_for(row, policy))
        .collect()
}

/// Splits a fine-diff `detail` string of the form `"{before} -> {after}"`.
fn parse_before_after(detail: &str) -> Option<(&str, &str)> {
    detail.split_once(" -> ")
}

fn plan_step_for(row: DiffRow, policy: PlanPolicy) -> PlanStep {
    let type_change = row.detail.as_deref().and_then(parse_before_after);
    let is_widening = row.change_kind == ChangeKind::AlterColumnType
        && type_change
            .map(|(from, to)| is_widening_conversion(from, to))
            .unwrap_or(false);
    let (destructive, risk, duration_hint_ms) = annotate_risk(row.change_kind, is_widening);
    let kind = ddl_kind_for(row.change_kind);
    let body = ddl_body_for(&row, policy);
    let mut statement = DdlStatement::new(kind, row.object_key.clone(), body);
    if destructive {
        statement = statement.destructive();
    }
    if needs_data_migration(row.change_kind, row.detail.as_deref(), is_widening) {
        statement = statement.requires_data_migration();
    }
    PlanStep {
        statement,
        change_kind: row.change_kind,
        destructive,
        duration_hint_ms,
        risk,
    }
}

/// `spec.md` §4.8 step 5: the three DDL shapes that warrant an advisory
/// data-migration statement ahead of the schema change itself — a
/// null-backfill before `SET NOT NULL`, a typed-cast update before a
/// narrowing `ALTER COLUMN TYPE`, and a temp-default pattern for `NOT NULL`
/// column additions with no default.
fn needs_data_migration(kind: ChangeKind, detail: Option<&str>, is_widening: bool) -> bool {
    match kind {
        ChangeKind::AlterColumnNull => detail
            .and_then(parse_before_after)
            .map(|(before, after)| before == "true" && after == "false")
            .unwrap_or(false),
        ChangeKind::AlterColumnType => !is_widening,
        ChangeKind::AddColumn => detail
            .map(|d| d.contains("nullable=false") && d.contains("default=false"))
            .unwrap_or(false),
        _ => false,
    }
}

fn ddl_kind_for(kind: ChangeKind) -> DdlKind {
    match kind {
        ChangeKind::AddTable | ChangeKind::AddColumn | ChangeKind::AddConstraint | ChangeKind::AddIndex => {
            DdlKind::Create
        }
        ChangeKind::DropTable
        | ChangeKind::DropColumn
        | ChangeKind::DropConstraint
        | ChangeKind::DropIndex => DdlKind::Drop,
        _ => DdlKind::Alter,
    }
}

fn ddl_body_for(row: &DiffRow, policy: PlanPolicy) -> String {
    let target = &row.object_key;
    match (row.change_kind, policy) {
        (ChangeKind::AddTable, _) => format!("CREATE TABLE {target} (...);"),
        (ChangeKind::DropTable, _) => format!("DROP TABLE {target};"),
        (ChangeKind::AddColumn, _) => format!("ALTER TABLE {target} ADD COLUMN ...;"),
        (ChangeKind::DropColumn, _) => format!("ALTER TABLE {target} DROP COLUMN ...;"),
        (ChangeKind::AlterColumnType, PlanPolicy::IntelligentAlter) => {
            format!("ALTER TABLE {target} ALTER COLUMN ... TYPE ...;")
        }
        (ChangeKind::AlterColumnType, PlanPolicy::DropRecreate) => {
            format!("-- drop/recreate {target} for column type change")
        }
        (ChangeKind::AlterColumnNull, _) => {
            format!("ALTER TABLE {target} ALTER COLUMN ... SET/DROP NOT NULL;")
        }
        (ChangeKind::AlterColumnDefault, _) => {
            format!("ALTER TABLE {target} ALTER COLUMN ... SET DEFAULT ...;")
        }
        (ChangeKind::RenameColumn, _) => format!("ALTER TABLE {target} RENAME COLUMN ...;"),
        (ChangeKind::RenameTable, _) => format!("ALTER TABLE {target} RENAME TO ...;"),
        (ChangeKind::AddConstraint, _) => format!("ALTER TABLE {target} ADD CONSTRAINT ...;"),
        (ChangeKind::DropConstraint, _) => format!("ALTER TABLE {target} DROP CONSTRAINT ...;"),
        (ChangeKind::AddIndex, _) => format!("CREATE INDEX ON {target};"),
        (ChangeKind::DropIndex, _) => format!("DROP INDEX {target};"),
        (ChangeKind::NoChange, _) => format!("-- no-op on {target}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Risk {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub statement: DdlStatement,
    pub change_kind: ChangeKind,
    pub destructive: bool,
    pub duration_hint_ms: u64,
    pub risk: Risk,
}

/// Orders diff rows per `spec.md` §4.8: drops in reverse-dependency order
/// (constraint, index, view, table), then creates in forward-dependency
/// order (table, view, index, constraint), then alters in a fixed sequence.
pub fn order_rows(mut rows: Vec<DiffRow>) -> Vec<DiffRow> {
    rows.sort_by_key(|r| phase_rank(r.change_kind));
    rows
}

fn phase_rank(kind: ChangeKind) -> u8 {
    match kind {
        ChangeKind::DropConstraint => 0,
        ChangeKind::DropIndex => 1,
        ChangeKind::DropTable => 3,
        ChangeKind::AddTable => 4,
        ChangeKind::RenameTable => 5,
        ChangeKind::AddIndex => 6,
        ChangeKind::AddConstraint => 7,
        ChangeKind::AddColumn => 8,
        ChangeKind::AlterColumnDefault => 9,
        ChangeKind::RenameColumn => 10,
        ChangeKind::AlterColumnNull => 11,
        ChangeKind::AlterColumnType => 12,
        ChangeKind::DropColumn => 13,
        ChangeKind::NoChange => 14,
    }
}

/// Annotates a row with risk and a duration hint. `DropTable` is the only
/// `Critical` case — it destroys every row the table held; `DropColumn`
/// only loses one column's worth of data and is `High` (`spec.md` §4.8 step
/// 4, §8 scenario 4). Type narrowing is `High`; additive changes are `Low`.
pub fn annotate_risk(kind: ChangeKind, is_widening: bool) -> (bool, Risk, u64) {
    match kind {
        ChangeKind::DropTable => (true, Risk::Critical, 5_000),
        ChangeKind::DropColumn => (true, Risk::High, 3_000),
        ChangeKind::DropConstraint | ChangeKind::DropIndex => (true, Risk::High, 2_000),
        ChangeKind::AlterColumnType if !is_widening => (false, Risk::High, 10_000),
        ChangeKind::AlterColumnType => (false, Risk::Medium, 3_000),
        ChangeKind::AlterColumnNull => (false, Risk::Medium, 1_000),
        ChangeKind::AddColumn | ChangeKind::AddIndex | ChangeKind::AddConstraint => {
            (false, Risk::Low, 500)
        }
        ChangeKind::AddTable | ChangeKind::RenameTable | ChangeKind::RenameColumn => {
            (false, Risk::Low, 200)
        }
        ChangeKind::AlterColumnDefault => (false, Risk::Low, 200),
        ChangeKind::NoChange => (false, Risk::Low, 0),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResult {
    pub executed: Vec<String>,
    pub failed: Option<(String, String)>,
    pub warnings: Vec<String>,
}

/// Executes each step's statement in order inside its own savepoint. A
/// failing step halts the run and reports the remaining steps as not
/// executed, rather than continuing past a half-applied migration.
#[async_trait]
pub trait MigrationApplier: Send + Sync {
    async fn apply(&self, steps: &[PlanStep]) -> Result<ApplyResult, EngineError>;
}

pub struct CatalogApplier<'a> {
    pub catalog: &'a dyn CatalogReader,
}

#[async_trait]
impl<'a> MigrationApplier for CatalogApplier<'a> {
    async fn apply(&self, steps: &[PlanStep]) -> Result<ApplyResult, EngineError> {
        let mut result = ApplyResult::default();
        for step in steps {
            if step.risk == Risk::Critical {
                result
                    .warnings
                    .push(format!("destructive step on {}", step.statement.target));
            }
            match self.catalog.execute_in_savepoint(&step.statement).await? {
                SavepointOutcome::Committed => {
                    result.executed.push(step.statement.target.clone());
                }
                SavepointOutcome::RolledBack { reason } => {
                    result.failed = Some((step.statement.target.clone(), reason.clone()));
                    return Err(EngineError::DdlExecutionFailed {
                        target: step.statement.target.clone(),
                        reason,
                    });
                }
            }
        }
        Ok(result)
    }
}
