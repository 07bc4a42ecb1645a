//! Closed error taxonomy for the engine.
//!
//! Every public verb returns `Result<_, EngineError>`. Each variant carries
//! a fixed severity and recovery policy (`recovery_for`), dispatched by
//! `controller::OperationController` rather than left to call sites.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
    Fatal,
}

/// How `OperationController` should respond when a given `EngineError`
/// variant is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// Surface to the caller immediately, no retry.
    SurfaceImmediately,
    /// Retry with exponential backoff (2s, 4s, 8s), up to 3 attempts.
    RetryWithBackoff,
    /// Attempt one recovery pass (e.g. re-fetch catalog state), then surface.
    SingleRecoveryPass,
    /// Never retry automatically; requires manual operator action.
    NeverRetry,
    /// Unrecoverable; no recovery attempted, operation aborts.
    CriticalNoRecovery,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("lock timeout acquiring '{lock_name}' after {timeout_ms}ms")]
    LockTimeout { lock_name: String, timeout_ms: u64 },

    #[error("schema conflict on {object}: {reason}")]
    SchemaConflict { object: String, reason: String },

    #[error("DDL execution failed for {target}: {reason}")]
    DdlExecutionFailed { target: String, reason: String },

    #[error("merge conflict on {object}: {reason}")]
    MergeConflict { object: String, reason: String },

    #[error("dependency violation: {0}")]
    DependencyViolation(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("corruption detected: {0}")]
    CorruptionDetected(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("canonicalization error: {reason}")]
    CanonicalizationError { reason: String },

    #[error("DDL too large: {actual_bytes} bytes exceeds max {max_bytes}")]
    DdlTooLarge { actual_bytes: usize, max_bytes: usize },

    #[error("cyclic dependency detected: {0}")]
    CyclicDependency(String),

    #[error("statement timeout after {timeout_ms}ms: {target}")]
    StatementTimeout { target: String, timeout_ms: u64 },

    #[error(transparent)]
    Catalog(#[from] schemavcs_catalog::CatalogError),
}

impl EngineError {
    pub fn severity(&self) -> Severity {
        match self {
            EngineError::ValidationError(_) => Severity::Warning,
            EngineError::LockTimeout { .. } => Severity::Error,
            EngineError::SchemaConflict { .. } => Severity::Error,
            EngineError::DdlExecutionFailed { .. } => Severity::Error,
            EngineError::MergeConflict { .. } => Severity::Warning,
            EngineError::DependencyViolation(_) => Severity::Error,
            EngineError::ResourceExhausted(_) => Severity::Error,
            EngineError::CorruptionDetected(_) => Severity::Fatal,
            EngineError::NetworkError(_) => Severity::Error,
            EngineError::PermissionDenied(_) => Severity::Error,
            EngineError::CanonicalizationError { .. } => Severity::Warning,
            EngineError::DdlTooLarge { .. } => Severity::Warning,
            EngineError::CyclicDependency(_) => Severity::Error,
            EngineError::StatementTimeout { .. } => Severity::Error,
            EngineError::Catalog(_) => Severity::Error,
        }
    }

    pub fn recovery_policy(&self) -> RecoveryPolicy {
        match self {
            EngineError::ValidationError(_) => RecoveryPolicy::SurfaceImmediately,
            EngineError::LockTimeout { .. } => RecoveryPolicy::RetryWithBackoff,
            EngineError::SchemaConflict { .. } => RecoveryPolicy::NeverRetry,
            EngineError::DdlExecutionFailed { .. } => RecoveryPolicy::SingleRecoveryPass,
            EngineError::MergeConflict { .. } => RecoveryPolicy::NeverRetry,
            EngineError::DependencyViolation(_) => RecoveryPolicy::SingleRecoveryPass,
            EngineError::ResourceExhausted(_) => RecoveryPolicy::RetryWithBackoff,
            EngineError::CorruptionDetected(_) => RecoveryPolicy::CriticalNoRecovery,
            EngineError::NetworkError(_) => RecoveryPolicy::RetryWithBackoff,
            EngineError::PermissionDenied(_) => RecoveryPolicy::SurfaceImmediately,
            EngineError::CanonicalizationError { .. } => RecoveryPolicy::SurfaceImmediately,
            EngineError::DdlTooLarge { .. } => RecoveryPolicy::SurfaceImmediately,
            EngineError::CyclicDependency(_) => RecoveryPolicy::SurfaceImmediately,
            EngineError::StatementTimeout { .. } => RecoveryPolicy::RetryWithBackoff,
            EngineError::Catalog(_) => RecoveryPolicy::SingleRecoveryPass,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corruption_is_fatal_with_no_recovery() {
        let err = EngineError::CorruptionDetected("bad tree hash".to_string());
        assert_eq!(err.severity(), Severity::Fatal);
        assert_eq!(err.recovery_policy(), RecoveryPolicy::CriticalNoRecovery);
    }

    #[test]
    fn lock_timeout_retries_with_backoff() {
        let err = EngineError::LockTimeout {
            lock_name: "main".to_string(),
            timeout_ms: 5000,
        };
        assert_eq!(err.recovery_policy(), RecoveryPolicy::RetryWithBackoff);
    }

    #[test]
    fn resource_exhausted_is_recoverable_with_backoff() {
        let err = EngineError::ResourceExhausted("connection pool full".to_string());
        assert_eq!(err.severity(), Severity::Error);
        assert_eq!(err.recovery_policy(), RecoveryPolicy::RetryWithBackoff);
    }

    #[test]
    fn dependency_violation_gets_a_single_recovery_pass() {
        let err = EngineError::DependencyViolation("public.orders references public.users".to_string());
        assert_eq!(err.recovery_policy(), RecoveryPolicy::SingleRecoveryPass);
    }
}
