//! Cloud-to-self-hosted database migration engine
//!
//! Moves a deployment's PostgreSQL state from a managed cloud project into a
//! self-hosted Basalt stack. The flow is strictly sequential: resolve and
//! pre-flight both connections, export the application schema, data, and auth
//! records from the source into a timestamped backup directory, pause for an
//! explicit operator confirmation, then import into the target. Exported
//! artifacts are never deleted, so a run that stops at the confirmation gate
//! (or fails partway) can be finished later with an import-only run over the
//! same directory.
//!
//! External database work goes through the [`DatabaseExecutor`] trait; the
//! production implementation spawns the PostgreSQL client tools with
//! credentials passed through the process environment, and tests substitute
//! a scripted executor.

pub mod auth;
pub mod error;
pub mod executor;
pub mod layout;
pub mod orchestrator;
pub mod profile;
pub mod resolver;
pub mod run;
pub mod steps;
pub mod userlist;

// Re-export commonly used types
pub use error::{MigrateError, MigrateResult};
pub use executor::{DatabaseCommand, DatabaseExecutor, ExecOutput, PgToolsExecutor};
pub use layout::BackupLayout;
pub use orchestrator::{
    AssumeYes, ConfirmationGate, DenyAll, MigrationOrchestrator, MigrationRequest,
    OrchestratorConfig,
};
pub use profile::{ConnectionInput, ConnectionProfile, ConnectionRole};
pub use resolver::{ConnectionResolver, TARGET_PASSWORD_KEY};
pub use run::{MigrationReport, MigrationRun, RunOutcome, RunState};
pub use steps::{FailurePolicy, MigrationStep, Phase, StepResult, StepStatus};
pub use userlist::{fetch_pool_credentials, render_userlist, PoolCredential};
