//! Operation controller: the verb-wrapper every public operation goes
//! through — acquire a named per-branch lock, log structured errors,
//! dispatch recovery policy, always release the lock.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};
use uuid::Uuid;

use crate::error::{EngineError, RecoveryPolicy, Severity};
use crate::retry::with_backoff;

#[async_trait]
pub trait LockManager: Send + Sync {
    /// Acquires a named lock (typically `branch:<name>`), waiting up to
    /// `timeout_ms` before failing with `EngineError::LockTimeout`.
    async fn acquire(&self, name: &str, timeout_ms: u64) -> Result<LockGuard, EngineError>;

    /// Releases a previously acquired lock. Called unconditionally by
    /// `OperationController::run` once `dispatch` returns.
    async fn release(&self, guard: &LockGuard) -> Result<(), EngineError>;
}

/// RAII-style guard; holders call `release` explicitly so the controller can
/// guarantee release in every code path, including panics unwound through
/// `?` — an async `Drop` can't await, so release is driven by the
/// controller's `finally`-style wrapper rather than the guard's destructor.
pub struct LockGuard {
    pub lock_name: String,
    pub token: Uuid,
}

#[async_trait]
pub trait ErrorLog: Send + Sync {
    async fn record(&self, entry: &ErrorLogEntry) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub operation_id: Uuid,
    pub category: String,
    pub severity: String,
    pub branch: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationStatus {
    pub operation_id: Uuid,
    pub branch: String,
    pub description: String,
}

/// Wraps every public verb (commit, merge, plan, apply, branch create) with
/// the same lock/log/recover sequence, instead of each operation re-deriving
/// it ad hoc.
pub struct OperationController<L, E> {
    pub locks: L,
    pub error_log: E,
    pub lock_timeout_ms: u64,
}

impl<L, E> OperationController<L, E>
where
    L: LockManager,
    E: ErrorLog,
{
    pub fn new(locks: L, error_log: E, lock_timeout_ms: u64) -> Self {
        Self {
            locks,
            error_log,
            lock_timeout_ms,
        }
    }

    #[instrument(skip(self, op), fields(branch = %branch))]
    pub async fn run<F, Fut, T>(
        &self,
        branch: &str,
        category: &str,
        op: F,
    ) -> Result<T, EngineError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let operation_id = Uuid::new_v4();
        let lock_name = format!("branch:{branch}");

        let guard = self.locks.acquire(&lock_name, self.lock_timeout_ms).await?;

        let result = self.dispatch(operation_id, branch, category, &op).await;

        // Release happens regardless of outcome; a dedicated `release`
        // call (not `Drop`) keeps this awaitable.
        self.release(guard).await;

        result
    }

    async fn dispatch<F, Fut, T>(
        &self,
        operation_id: Uuid,
        branch: &str,
        category: &str,
        op: &F,
    ) -> Result<T, EngineError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        match op().await {
            Ok(v) => Ok(v),
            Err(e) => {
                self.log_error(operation_id, branch, category, &e).await;
                self.recover(operation_id, branch, category, &e, op).await
            }
        }
    }

    async fn recover<F, Fut, T>(
        &self,
        operation_id: Uuid,
        branch: &str,
        category: &str,
        first_err: &EngineError,
        op: &F,
    ) -> Result<T, EngineError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        match first_err.recovery_policy() {
            RecoveryPolicy::RetryWithBackoff => {
                with_backoff(
                    |e| matches!(e.recovery_policy(), RecoveryPolicy::RetryWithBackoff),
                    || op(),
                )
                .await
            }
            RecoveryPolicy::SingleRecoveryPass => op().await,
            RecoveryPolicy::SurfaceImmediately
            | RecoveryPolicy::NeverRetry
            | RecoveryPolicy::CriticalNoRecovery => {
                let _ = (operation_id, branch, category);
                Err(first_err_clone(first_err))
            }
        }
    }

    async fn log_error(&self, operation_id: Uuid, branch: &str, category: &str, err: &EngineError) {
        let severity = err.severity();
        if matches!(severity, Severity::Critical | Severity::Fatal) {
            error!(operation_id = %operation_id, branch, category, error = %err, "critical operation failure");
        }
        let entry = ErrorLogEntry {
            operation_id,
            category: category.to_string(),
            severity: format!("{severity:?}"),
            branch: Some(branch.to_string()),
            message: err.to_string(),
        };
        // Best-effort: a failure to write the error log must not mask the
        // original error.
        let _ = self.error_log.record(&entry).await;
    }

    async fn release(&self, guard: LockGuard) {
        // Best-effort: a failed unlock is logged but must not mask the
        // operation's own result, which has already been captured by the
        // caller.
        if let Err(e) = self.locks.release(&guard).await {
            error!(lock_name = %guard.lock_name, error = %e, "failed to release lock");
        }
    }
}

fn first_err_clone(err: &EngineError) -> EngineError {
    // EngineError doesn't derive Clone (some variants wrap non-Clone
    // sources); reconstruct a surfaced copy from its Display text.
    EngineError::ValidationError(err.to_string())
}

pub fn backoff_sleep_duration(attempt: usize) -> Duration {
    let ms = [2000u64, 4000, 8000];
    Duration::from_millis(ms[attempt.min(ms.len() - 1)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

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
    struct RecordingLog {
        entries: Mutex<Vec<ErrorLogEntry>>,
    }
    #[async_trait]
    impl ErrorLog for RecordingLog {
        async fn record(&self, entry: &ErrorLogEntry) -> Result<(), EngineError> {
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn successful_op_never_touches_error_log() {
        let ctrl = OperationController::new(AlwaysLock, RecordingLog::default(), 1000);
        let result = ctrl
            .run("main", "commit", || async { Ok::<_, EngineError>(42) })
            .await
            .unwrap();
        assert_eq!(result, 42);
        assert!(ctrl.error_log.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn validation_error_surfaces_immediately_and_logs() {
        let ctrl = OperationController::new(AlwaysLock, RecordingLog::default(), 1000);
        let result: Result<(), EngineError> = ctrl
            .run("main", "commit", || async {
                Err(EngineError::ValidationError("bad branch name".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(ctrl.error_log.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn network_error_retries_then_succeeds() {
        let ctrl = OperationController::new(AlwaysLock, RecordingLog::default(), 1000);
        let attempts = AtomicUsize::new(0);
        let result = ctrl
            .run("main", "fetch", || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(EngineError::NetworkError("timeout".to_string()))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;
        assert!(result.is_ok());
    }
}
