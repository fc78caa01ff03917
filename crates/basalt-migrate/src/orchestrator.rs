//! Migration orchestrator
//!
//! Sequences one run end to end: resolve both profiles, pre-flight
//! connectivity, export, wait for explicit confirmation, import, report.
//! Steps run strictly one at a time, and the step is also the unit of
//! timeout and cancellation; nothing is ever interrupted mid-step.
//!
//! The orchestrator never fails out: every failure mode is folded into the
//! [`MigrationReport`] so the caller always gets a full enumeration of what
//! ran, what did not, and why.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth;
use crate::error::{MigrateError, MigrateResult};
use crate::executor::DatabaseExecutor;
use crate::layout::BackupLayout;
use crate::profile::{ConnectionInput, ConnectionProfile, ConnectionRole};
use crate::resolver::ConnectionResolver;
use crate::run::{MigrationReport, MigrationRun};
use crate::steps::{
    export_steps, import_steps, FailurePolicy, MigrationStep, Phase, StepResult, StepStatus,
};

/// Asks the operator whether the import phase may touch the target.
/// Implementations must treat anything that is not an explicit yes as a no.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm_import(
        &self,
        backup_dir: &Path,
        target: &ConnectionProfile,
    ) -> MigrateResult<bool>;
}

/// Gate that never confirms. This is the default for non-interactive runs:
/// without an operator present, nothing may touch the target.
pub struct DenyAll;

#[async_trait]
impl ConfirmationGate for DenyAll {
    async fn confirm_import(
        &self,
        _backup_dir: &Path,
        _target: &ConnectionProfile,
    ) -> MigrateResult<bool> {
        Ok(false)
    }
}

/// Gate that always confirms, for runs started with an explicit yes flag.
pub struct AssumeYes;

#[async_trait]
impl ConfirmationGate for AssumeYes {
    async fn confirm_import(
        &self,
        _backup_dir: &Path,
        _target: &ConnectionProfile,
    ) -> MigrateResult<bool> {
        Ok(true)
    }
}

/// Tunables for one orchestrator instance
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Directory under which each run creates its backup directory
    pub backup_root: PathBuf,
    /// Upper bound for a single step (and the pre-flight probes).
    /// `None` waits indefinitely.
    pub step_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            backup_root: PathBuf::from("."),
            step_timeout: None,
        }
    }
}

/// Connection parameters for one run, before resolution
#[derive(Debug, Clone, Default)]
pub struct MigrationRequest {
    pub source: ConnectionInput,
    pub target: ConnectionInput,
}

/// How one phase ended
enum PhaseOutcome {
    Completed,
    Fatal(MigrateError),
    Cancelled,
}

/// Drives migration runs. One instance can serve several runs; each run
/// gets its own [`MigrationRun`] aggregate and backup directory.
pub struct MigrationOrchestrator {
    executor: Arc<dyn DatabaseExecutor>,
    resolver: ConnectionResolver,
    config: OrchestratorConfig,
    gate: Arc<dyn ConfirmationGate>,
    cancel: CancellationToken,
}

impl MigrationOrchestrator {
    pub fn new(
        executor: Arc<dyn DatabaseExecutor>,
        resolver: ConnectionResolver,
        config: OrchestratorConfig,
        gate: Arc<dyn ConfirmationGate>,
    ) -> Self {
        Self {
            executor,
            resolver,
            config,
            gate,
            cancel: CancellationToken::new(),
        }
    }

    /// Token observed between steps. Cancelling it stops the run at the next
    /// step boundary; the step in flight finishes (or times out) first.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the full export-confirm-import flow.
    pub async fn run(&self, request: MigrationRequest) -> MigrationReport {
        let mut run = MigrationRun::new();
        info!("Migration run {} starting", run.id());
        run.begin_resolving();

        let (source, target) = match self.resolve_and_preflight(request).await {
            Ok(profiles) => profiles,
            Err(err) => {
                warn!("Pre-flight failed: {err}");
                run.abort(&err);
                return run.into_report();
            }
        };

        let layout = BackupLayout::for_run(&self.config.backup_root, run.started_at());
        if let Err(err) = layout.ensure_dir() {
            run.abort(&MigrateError::Io(err));
            return run.into_report();
        }
        run.set_backup_dir(layout.dir().to_path_buf());
        info!("Backup directory {}", layout.dir().display());

        run.begin_export();
        match self.run_phase(&mut run, &source, export_steps(&layout)).await {
            PhaseOutcome::Completed => {}
            PhaseOutcome::Fatal(err) => {
                run.abort(&err);
                return run.into_report();
            }
            PhaseOutcome::Cancelled => {
                run.abort(&MigrateError::Cancelled);
                return run.into_report();
            }
        }

        self.confirm_and_import(&mut run, &layout, &target).await;
        run.into_report()
    }

    /// Import a previously exported backup directory, without re-running the
    /// exports. The confirmation gate still applies.
    pub async fn import_existing(
        &self,
        target: ConnectionInput,
        backup_dir: impl Into<PathBuf>,
    ) -> MigrationReport {
        let mut run = MigrationRun::new();
        info!("Import-only run {} starting", run.id());
        run.begin_resolving();

        let target = match self.resolver.resolve(ConnectionRole::Target, target) {
            Ok(profile) => profile,
            Err(err) => {
                run.abort(&err);
                return run.into_report();
            }
        };
        if let Err(err) = self.check_reachable(&target).await {
            warn!("Pre-flight failed: {err}");
            run.abort(&err);
            return run.into_report();
        }

        let layout = BackupLayout::existing(backup_dir);
        if !layout.dir().is_dir() {
            run.abort(&MigrateError::Configuration(format!(
                "Backup directory {} does not exist",
                layout.dir().display()
            )));
            return run.into_report();
        }
        run.set_backup_dir(layout.dir().to_path_buf());

        // No export work here; the phase is passed through so the lifecycle
        // reads the same in every report
        run.begin_export();
        info!("Reusing artifacts from {}", layout.dir().display());

        self.confirm_and_import(&mut run, &layout, &target).await;
        run.into_report()
    }

    /// Shared tail of both run flavors: gate, then import, then close.
    async fn confirm_and_import(
        &self,
        run: &mut MigrationRun,
        layout: &BackupLayout,
        target: &ConnectionProfile,
    ) {
        run.await_confirmation();
        if self.cancel.is_cancelled() {
            run.decline("cancelled while awaiting confirmation");
            return;
        }
        match self.gate.confirm_import(layout.dir(), target).await {
            Ok(true) => info!("Import confirmed"),
            Ok(false) => {
                info!(
                    "Import not confirmed; artifacts kept at {}",
                    layout.dir().display()
                );
                run.decline("import not confirmed");
                return;
            }
            Err(err) => {
                run.abort(&err);
                return;
            }
        }

        run.begin_import();
        self.prepare_import_scripts(layout);
        match self.run_phase(run, target, import_steps(layout)).await {
            PhaseOutcome::Completed => run.finalize(),
            PhaseOutcome::Fatal(err) => run.abort(&err),
            // Remaining steps are already recorded as skipped. An interrupted
            // import still ends the run as aborted: the target may be half
            // written, and the exit code has to say so
            PhaseOutcome::Cancelled => run.abort(&MigrateError::Cancelled),
        }
    }

    async fn resolve_and_preflight(
        &self,
        request: MigrationRequest,
    ) -> MigrateResult<(ConnectionProfile, ConnectionProfile)> {
        let (source, target) = self.resolver.resolve_pair(request.source, request.target)?;
        self.check_reachable(&source).await?;
        self.check_reachable(&target).await?;
        Ok((source, target))
    }

    async fn check_reachable(&self, profile: &ConnectionProfile) -> MigrateResult<()> {
        info!("Checking connectivity to {} database {}", profile.role, profile);
        let probe = self.executor.check_connectivity(profile);
        let outcome = match self.config.step_timeout {
            Some(limit) => match tokio::time::timeout(limit, probe).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(MigrateError::Connectivity {
                        role: profile.role,
                        message: format!("no answer within {}s", limit.as_secs()),
                    });
                }
            },
            None => probe.await,
        };
        let output = outcome.map_err(|e| MigrateError::Connectivity {
            role: profile.role,
            message: e.to_string(),
        })?;
        if !output.success {
            return Err(MigrateError::Connectivity {
                role: profile.role,
                message: output.error_message(),
            });
        }
        Ok(())
    }

    /// Execute one phase's steps strictly in order. A fatal failure or a
    /// cancellation stops the phase, but the steps that never ran are still
    /// recorded, as skipped, so the report enumerates everything.
    async fn run_phase(
        &self,
        run: &mut MigrationRun,
        profile: &ConnectionProfile,
        steps: Vec<MigrationStep>,
    ) -> PhaseOutcome {
        let mut outcome = PhaseOutcome::Completed;
        for step in &steps {
            match outcome {
                PhaseOutcome::Completed => {}
                PhaseOutcome::Fatal(_) => {
                    run.push_result(StepResult::skipped(
                        step,
                        "not run: an earlier fatal failure ended the run",
                    ));
                    continue;
                }
                PhaseOutcome::Cancelled => {
                    run.push_result(StepResult::skipped(step, "not run: cancelled by operator"));
                    continue;
                }
            }
            if self.cancel.is_cancelled() {
                warn!("Cancellation requested; stopping before step '{}'", step.name);
                run.push_result(StepResult::skipped(step, "not run: cancelled by operator"));
                outcome = PhaseOutcome::Cancelled;
                continue;
            }
            if let Some(missing) = step.requires.iter().find(|p| !p.exists()) {
                run.push_result(StepResult::skipped(
                    step,
                    format!("required artifact {} is missing", missing.display()),
                ));
                continue;
            }
            let result = self.execute_step(profile, step).await;
            let failed = matches!(result.status, StepStatus::Failed | StepStatus::TimedOut);
            let fatal = (failed && step.policy == FailurePolicy::Fatal)
                .then(|| self.fatal_error(step, &result));
            run.push_result(result);
            if let Some(err) = fatal {
                outcome = PhaseOutcome::Fatal(err);
            }
        }
        outcome
    }

    /// Run one step, bounded by the configured timeout. A timed-out step's
    /// tool is killed with the dropped future; the artifacts it half-wrote
    /// stay on disk like any other failure's.
    async fn execute_step(&self, profile: &ConnectionProfile, step: &MigrationStep) -> StepResult {
        info!("Step '{}' ({}) starting", step.name, step.phase);
        let call = self.executor.execute(profile, &step.command);
        let outcome = match self.config.step_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let seconds = limit.as_secs();
                    warn!("Step '{}' exceeded its {}s limit", step.name, seconds);
                    return StepResult::timed_out(step, seconds);
                }
            },
            None => call.await,
        };
        match outcome {
            Ok(output) if output.success => StepResult::success(step),
            Ok(output) => StepResult::failed(step, output.error_message()),
            Err(err) => StepResult::failed(step, err.to_string()),
        }
    }

    fn fatal_error(&self, step: &MigrationStep, result: &StepResult) -> MigrateError {
        if result.status == StepStatus::TimedOut {
            return MigrateError::Timeout {
                step: step.name.clone(),
                seconds: self
                    .config
                    .step_timeout
                    .map(|d| d.as_secs())
                    .unwrap_or_default(),
            };
        }
        let message = result
            .message
            .clone()
            .unwrap_or_else(|| "unknown failure".to_string());
        match step.phase {
            Phase::Export => MigrateError::Export {
                step: step.name.clone(),
                message,
            },
            Phase::Import => MigrateError::Import {
                step: step.name.clone(),
                message,
            },
        }
    }

    /// Write the generated upsert script next to the artifacts. Skipped when
    /// the users CSV is absent so the auth import step reports a missing
    /// artifact instead of a confusing psql error.
    fn prepare_import_scripts(&self, layout: &BackupLayout) {
        if !layout.auth_users_csv().exists() {
            return;
        }
        if let Err(err) = std::fs::write(
            layout.auth_users_import_sql(),
            auth::auth_users_import_sql(layout),
        ) {
            warn!("Could not write auth import script: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{DatabaseCommand, ExecOutput};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FnExecutor<F>(F);

    #[async_trait]
    impl<F> DatabaseExecutor for FnExecutor<F>
    where
        F: Fn(&DatabaseCommand) -> MigrateResult<ExecOutput> + Send + Sync,
    {
        async fn execute(
            &self,
            _profile: &ConnectionProfile,
            command: &DatabaseCommand,
        ) -> MigrateResult<ExecOutput> {
            (self.0)(command)
        }
    }

    struct SlowExecutor;

    #[async_trait]
    impl DatabaseExecutor for SlowExecutor {
        async fn execute(
            &self,
            _profile: &ConnectionProfile,
            _command: &DatabaseCommand,
        ) -> MigrateResult<ExecOutput> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ExecOutput::ok(""))
        }
    }

    fn profile(role: ConnectionRole) -> ConnectionProfile {
        ConnectionProfile {
            role,
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "pw-secret".to_string(),
            database: "postgres".to_string(),
        }
    }

    fn orchestrator(
        executor: Arc<dyn DatabaseExecutor>,
        step_timeout: Option<Duration>,
    ) -> MigrationOrchestrator {
        MigrationOrchestrator::new(
            executor,
            ConnectionResolver::new(),
            OrchestratorConfig {
                backup_root: std::env::temp_dir(),
                step_timeout,
            },
            Arc::new(AssumeYes),
        )
    }

    fn run_in_import_state() -> MigrationRun {
        let mut run = MigrationRun::new();
        run.begin_resolving();
        run.begin_export();
        run.await_confirmation();
        run.begin_import();
        run
    }

    #[tokio::test]
    async fn test_fatal_import_step_aborts_the_run() {
        let orch = orchestrator(
            Arc::new(FnExecutor(|_: &DatabaseCommand| {
                Ok(ExecOutput::failed("relation does not exist"))
            })),
            None,
        );
        let mut run = run_in_import_state();
        let step = MigrationStep::new(
            "custom_import",
            Phase::Import,
            DatabaseCommand::RunSql {
                sql: "SELECT 1".to_string(),
            },
            FailurePolicy::Fatal,
        );
        let outcome = orch
            .run_phase(&mut run, &profile(ConnectionRole::Target), vec![step])
            .await;
        match outcome {
            PhaseOutcome::Fatal(MigrateError::Import { step, message }) => {
                assert_eq!(step, "custom_import");
                assert!(message.contains("relation does not exist"));
            }
            _ => panic!("expected a fatal import error"),
        }
        assert_eq!(run.results().len(), 1);
        assert_eq!(run.results()[0].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_step_timeout_produces_timed_out_result() {
        let orch = orchestrator(Arc::new(SlowExecutor), Some(Duration::from_millis(20)));
        let step = MigrationStep::new(
            "slow_step",
            Phase::Export,
            DatabaseCommand::RunSql {
                sql: "SELECT pg_sleep(60)".to_string(),
            },
            FailurePolicy::Fatal,
        );
        let result = orch
            .execute_step(&profile(ConnectionRole::Source), &step)
            .await;
        assert_eq!(result.status, StepStatus::TimedOut);
        assert!(result.message.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_artifact_skips_without_calling_the_executor() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let orch = orchestrator(
            Arc::new(FnExecutor(move |_: &DatabaseCommand| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ExecOutput::ok(""))
            })),
            None,
        );
        let mut run = run_in_import_state();
        let step = MigrationStep::new(
            "needs_artifact",
            Phase::Import,
            DatabaseCommand::RunScript {
                script: PathBuf::from("/nonexistent/script.sql"),
            },
            FailurePolicy::WarnAndContinue,
        )
        .requires("/nonexistent/artifact.csv");
        let outcome = orch
            .run_phase(&mut run, &profile(ConnectionRole::Target), vec![step])
            .await;
        assert!(matches!(outcome, PhaseOutcome::Completed));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(run.results()[0].status, StepStatus::Skipped);
        assert!(run.results()[0]
            .message
            .as_deref()
            .unwrap()
            .contains("artifact"));
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_skips_every_step() {
        let orch = orchestrator(
            Arc::new(FnExecutor(|_: &DatabaseCommand| Ok(ExecOutput::ok("")))),
            None,
        );
        orch.cancellation_token().cancel();
        let mut run = MigrationRun::new();
        run.begin_resolving();
        run.begin_export();
        let layout = BackupLayout::existing("/tmp/migration_backup_t");
        let outcome = orch
            .run_phase(
                &mut run,
                &profile(ConnectionRole::Source),
                export_steps(&layout),
            )
            .await;
        assert!(matches!(outcome, PhaseOutcome::Cancelled));
        assert_eq!(run.results().len(), 4);
        assert!(run
            .results()
            .iter()
            .all(|r| r.status == StepStatus::Skipped));
    }
}
