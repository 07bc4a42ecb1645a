use serde::{Deserialize, Serialize};

/// Typed DDL statement kind. Replaces the "dynamic SQL strings concatenated
/// ad hoc" pattern (`spec.md` §9): the applier only ever takes
/// [`DdlStatement`] values, never raw strings from unknown sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DdlKind {
    Create,
    Alter,
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SafetyFlags {
    pub destructive: bool,
    pub requires_data_migration: bool,
}

/// A single executable unit of DDL, annotated with its safety posture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DdlStatement {
    pub kind: DdlKind,
    /// Qualified target object, e.g. `"public.users"`.
    pub target: String,
    /// The actual DDL text to execute.
    pub body: String,
    pub safety: SafetyFlags,
}

impl DdlStatement {
    pub fn new(kind: DdlKind, target: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            body: body.into(),
            safety: SafetyFlags::default(),
        }
    }

    pub fn destructive(mut self) -> Self {
        self.safety.destructive = true;
        self
    }

    pub fn requires_data_migration(mut self) -> Self {
        self.safety.requires_data_migration = true;
        self
    }
}
