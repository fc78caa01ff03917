//! Migration step catalog and per-step results

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::auth;
use crate::executor::DatabaseCommand;
use crate::layout::BackupLayout;

/// Which phase a step belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Export,
    Import,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Export => write!(f, "export"),
            Phase::Import => write!(f, "import"),
        }
    }
}

/// How a failed step affects the rest of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Failure ends the run; later steps are recorded as skipped
    Fatal,
    /// Failure is recorded and the run moves on to the next step
    WarnAndContinue,
}

/// Outcome status of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
    TimedOut,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Success => write!(f, "success"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
            StepStatus::TimedOut => write!(f, "timed-out"),
        }
    }
}

// Step names, stable across releases: reports and scripts refer to them.
pub const EXPORT_SCHEMA: &str = "export_schema";
pub const EXPORT_DATA: &str = "export_data";
pub const EXPORT_AUTH_USERS: &str = "export_auth_users";
pub const EXPORT_AUTH_IDENTITIES: &str = "export_auth_identities";
pub const IMPORT_SCHEMA: &str = "import_schema";
pub const IMPORT_DATA: &str = "import_data";
pub const IMPORT_AUTH_USERS: &str = "import_auth_users";

/// Schema moved by the schema and data steps
pub const APP_SCHEMA: &str = "public";

/// One atomic unit of migration work. Steps either complete or fail as a
/// whole; cancellation and timeouts apply between and around steps, never
/// inside one.
#[derive(Debug, Clone)]
pub struct MigrationStep {
    pub name: String,
    pub phase: Phase,
    pub command: DatabaseCommand,
    pub policy: FailurePolicy,
    /// Artifacts that must exist before this step may run. A missing
    /// artifact skips the step instead of running a doomed command.
    pub requires: Vec<PathBuf>,
}

impl MigrationStep {
    pub fn new(
        name: impl Into<String>,
        phase: Phase,
        command: DatabaseCommand,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            name: name.into(),
            phase,
            command,
            policy,
            requires: Vec::new(),
        }
    }

    pub fn requires(mut self, artifact: impl Into<PathBuf>) -> Self {
        self.requires.push(artifact.into());
        self
    }
}

/// Ordered export steps for one run. Order matters: the fatal steps come
/// first so a broken source connection fails the run before any best-effort
/// auth exports muddy the report.
pub fn export_steps(layout: &BackupLayout) -> Vec<MigrationStep> {
    vec![
        MigrationStep::new(
            EXPORT_SCHEMA,
            Phase::Export,
            DatabaseCommand::DumpSchema {
                schema: APP_SCHEMA.to_string(),
                out: layout.schema_sql(),
            },
            FailurePolicy::Fatal,
        ),
        MigrationStep::new(
            EXPORT_DATA,
            Phase::Export,
            DatabaseCommand::DumpData {
                schema: APP_SCHEMA.to_string(),
                out: layout.data_sql(),
            },
            FailurePolicy::Fatal,
        ),
        MigrationStep::new(
            EXPORT_AUTH_USERS,
            Phase::Export,
            DatabaseCommand::CopyOutCsv {
                query: auth::auth_users_query(),
                out: layout.auth_users_csv(),
            },
            FailurePolicy::WarnAndContinue,
        ),
        MigrationStep::new(
            EXPORT_AUTH_IDENTITIES,
            Phase::Export,
            DatabaseCommand::CopyOutCsv {
                query: auth::auth_identities_query(),
                out: layout.auth_identities_csv(),
            },
            FailurePolicy::WarnAndContinue,
        ),
    ]
}

/// Ordered import steps for one run. Every import step is warn-and-continue
/// so a single refused statement degrades the run instead of ending it. The
/// auth-user step goes through the generated upsert script so re-imports
/// update existing rows instead of duplicating them.
pub fn import_steps(layout: &BackupLayout) -> Vec<MigrationStep> {
    vec![
        MigrationStep::new(
            IMPORT_SCHEMA,
            Phase::Import,
            DatabaseCommand::RunScript {
                script: layout.schema_sql(),
            },
            FailurePolicy::WarnAndContinue,
        )
        .requires(layout.schema_sql()),
        MigrationStep::new(
            IMPORT_DATA,
            Phase::Import,
            DatabaseCommand::RunScript {
                script: layout.data_sql(),
            },
            FailurePolicy::WarnAndContinue,
        )
        .requires(layout.data_sql()),
        MigrationStep::new(
            IMPORT_AUTH_USERS,
            Phase::Import,
            DatabaseCommand::RunScript {
                script: layout.auth_users_import_sql(),
            },
            FailurePolicy::WarnAndContinue,
        )
        .requires(layout.auth_users_csv()),
    ]
}

/// Immutable outcome of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: String,
    pub phase: Phase,
    pub policy: FailurePolicy,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StepResult {
    pub fn success(step: &MigrationStep) -> Self {
        Self {
            step: step.name.clone(),
            phase: step.phase,
            policy: step.policy,
            status: StepStatus::Success,
            message: None,
        }
    }

    pub fn failed(step: &MigrationStep, message: impl Into<String>) -> Self {
        Self {
            step: step.name.clone(),
            phase: step.phase,
            policy: step.policy,
            status: StepStatus::Failed,
            message: Some(message.into()),
        }
    }

    pub fn skipped(step: &MigrationStep, reason: impl Into<String>) -> Self {
        Self {
            step: step.name.clone(),
            phase: step.phase,
            policy: step.policy,
            status: StepStatus::Skipped,
            message: Some(reason.into()),
        }
    }

    pub fn timed_out(step: &MigrationStep, seconds: u64) -> Self {
        Self {
            step: step.name.clone(),
            phase: step.phase,
            policy: step.policy,
            status: StepStatus::TimedOut,
            message: Some(format!("timed out after {seconds}s")),
        }
    }

    /// True when this result degrades the run without having aborted it.
    pub fn is_degraded(&self) -> bool {
        matches!(self.status, StepStatus::Failed | StepStatus::TimedOut)
            && self.policy == FailurePolicy::WarnAndContinue
    }
}
