//! Run lifecycle: state machine, aggregate, and final report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::MigrateError;
use crate::steps::{StepResult, StepStatus};

/// Lifecycle states of a migration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Initialized,
    Resolving,
    Exporting,
    AwaitingConfirmation,
    Importing,
    Finalized,
    Aborted,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Initialized => write!(f, "initialized"),
            RunState::Resolving => write!(f, "resolving"),
            RunState::Exporting => write!(f, "exporting"),
            RunState::AwaitingConfirmation => write!(f, "awaiting_confirmation"),
            RunState::Importing => write!(f, "importing"),
            RunState::Finalized => write!(f, "finalized"),
            RunState::Aborted => write!(f, "aborted"),
        }
    }
}

impl RunState {
    /// Legal lifecycle transitions. The run aggregate only exposes methods
    /// that follow these edges, and asserts them in debug builds.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Initialized, Resolving)
                | (Resolving, Exporting)
                | (Exporting, AwaitingConfirmation)
                | (AwaitingConfirmation, Importing)
                | (Importing, Finalized)
                | (Resolving, Aborted)
                | (Exporting, Aborted)
                | (AwaitingConfirmation, Aborted)
                | (Importing, Aborted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Finalized | RunState::Aborted)
    }
}

/// Overall outcome of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every step succeeded
    Complete,
    /// The run finished, but at least one step failed, timed out, or was
    /// skipped along the way
    Partial,
    /// The operator did not confirm the import; nothing touched the target
    Declined,
    /// A fatal failure ended the run early
    Aborted,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Complete => write!(f, "complete"),
            RunOutcome::Partial => write!(f, "partial"),
            RunOutcome::Declined => write!(f, "declined"),
            RunOutcome::Aborted => write!(f, "aborted"),
        }
    }
}

impl RunOutcome {
    /// Process exit code for this outcome.
    ///
    /// Partial success deliberately exits zero: the artifacts were produced
    /// and the run finished, so automation that only checks the exit code
    /// keeps working, while the summary (and the JSON report) carries the
    /// degraded steps. A declined confirmation is a normal stop, not a
    /// failure. Only a hard abort is non-zero.
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Complete | RunOutcome::Partial | RunOutcome::Declined => 0,
            RunOutcome::Aborted => 1,
        }
    }
}

/// Aggregate driven by the orchestrator for the duration of one run.
/// Collects step results and enforces the lifecycle; it performs no
/// database work itself.
#[derive(Debug)]
pub struct MigrationRun {
    id: String,
    state: RunState,
    results: Vec<StepResult>,
    backup_dir: Option<PathBuf>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    outcome: Option<RunOutcome>,
    abort_reason: Option<String>,
}

impl MigrationRun {
    pub fn new() -> Self {
        Self {
            id: basalt_core::generate_id().to_string(),
            state: RunState::Initialized,
            results: Vec::new(),
            backup_dir: None,
            started_at: Utc::now(),
            finished_at: None,
            outcome: None,
            abort_reason: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    pub fn backup_dir(&self) -> Option<&Path> {
        self.backup_dir.as_deref()
    }

    pub fn set_backup_dir(&mut self, dir: PathBuf) {
        self.backup_dir = Some(dir);
    }

    pub fn begin_resolving(&mut self) {
        self.set_state(RunState::Resolving);
    }

    pub fn begin_export(&mut self) {
        self.set_state(RunState::Exporting);
    }

    pub fn await_confirmation(&mut self) {
        self.set_state(RunState::AwaitingConfirmation);
    }

    pub fn begin_import(&mut self) {
        self.set_state(RunState::Importing);
    }

    /// Record one step outcome, in execution order.
    pub fn push_result(&mut self, result: StepResult) {
        match result.status {
            StepStatus::Success => info!("Step '{}' completed", result.step),
            _ => warn!(
                "Step '{}' ended as {}{}",
                result.step,
                result.status,
                result
                    .message
                    .as_deref()
                    .map(|m| format!(": {m}"))
                    .unwrap_or_default()
            ),
        }
        self.results.push(result);
    }

    /// Close the run normally. The outcome is complete only when every
    /// recorded step succeeded.
    pub fn finalize(&mut self) {
        let outcome = if self
            .results
            .iter()
            .all(|r| r.status == StepStatus::Success)
        {
            RunOutcome::Complete
        } else {
            RunOutcome::Partial
        };
        self.outcome = Some(outcome);
        self.finished_at = Some(Utc::now());
        self.set_state(RunState::Finalized);
    }

    /// Close the run because the operator did not confirm the import.
    pub fn decline(&mut self, reason: impl Into<String>) {
        self.outcome = Some(RunOutcome::Declined);
        self.abort_reason = Some(reason.into());
        self.finished_at = Some(Utc::now());
        self.set_state(RunState::Aborted);
    }

    /// Close the run because of a fatal failure.
    pub fn abort(&mut self, error: &MigrateError) {
        self.outcome = Some(RunOutcome::Aborted);
        self.abort_reason = Some(error.to_string());
        self.finished_at = Some(Utc::now());
        self.set_state(RunState::Aborted);
    }

    pub fn into_report(self) -> MigrationReport {
        MigrationReport {
            run_id: self.id,
            outcome: self.outcome.unwrap_or(RunOutcome::Aborted),
            state: self.state,
            steps: self.results,
            backup_dir: self.backup_dir,
            started_at: self.started_at,
            finished_at: self.finished_at.unwrap_or_else(Utc::now),
            abort_reason: self.abort_reason,
        }
    }

    fn set_state(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal run state transition {} -> {}",
            self.state,
            next
        );
        info!("Run {}: {} -> {}", self.id, self.state, next);
        self.state = next;
    }
}

impl Default for MigrationRun {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable summary of a finished run. Enumerates every step with its
/// outcome; the run never claims completeness it did not earn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub run_id: String,
    pub outcome: RunOutcome,
    pub state: RunState,
    pub steps: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl MigrationReport {
    /// Steps that failed or timed out without aborting the run.
    pub fn degraded_steps(&self) -> Vec<&StepResult> {
        self.steps.iter().filter(|r| r.is_degraded()).collect()
    }

    pub fn is_degraded(&self) -> bool {
        self.steps.iter().any(|r| r.is_degraded())
    }

    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::BackupLayout;
    use crate::steps::{export_steps, import_steps};

    fn run_through_export() -> (MigrationRun, BackupLayout) {
        let layout = BackupLayout::existing("/tmp/migration_backup_t");
        let mut run = MigrationRun::new();
        run.begin_resolving();
        run.begin_export();
        (run, layout)
    }

    #[test]
    fn test_happy_path_transitions_are_legal() {
        use RunState::*;
        let path = [
            Initialized,
            Resolving,
            Exporting,
            AwaitingConfirmation,
            Importing,
            Finalized,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_abort_is_reachable_from_active_states() {
        use RunState::*;
        for state in [Resolving, Exporting, AwaitingConfirmation, Importing] {
            assert!(state.can_transition_to(Aborted));
        }
        assert!(!Initialized.can_transition_to(Aborted));
        assert!(!Finalized.can_transition_to(Aborted));
    }

    #[test]
    fn test_no_transitions_out_of_terminal_states() {
        use RunState::*;
        for terminal in [Finalized, Aborted] {
            assert!(terminal.is_terminal());
            for next in [
                Initialized,
                Resolving,
                Exporting,
                AwaitingConfirmation,
                Importing,
                Finalized,
                Aborted,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_skipping_phases_is_illegal() {
        use RunState::*;
        assert!(!Initialized.can_transition_to(Exporting));
        assert!(!Resolving.can_transition_to(Importing));
        assert!(!Exporting.can_transition_to(Importing));
        assert!(!Exporting.can_transition_to(Finalized));
    }

    #[test]
    #[should_panic(expected = "illegal run state transition")]
    fn test_out_of_order_transition_panics() {
        let mut run = MigrationRun::new();
        // Exporting is only reachable through Resolving
        run.begin_export();
    }

    #[test]
    fn test_all_success_finalizes_complete() {
        let (mut run, layout) = run_through_export();
        for step in export_steps(&layout) {
            run.push_result(StepResult::success(&step));
        }
        run.await_confirmation();
        run.begin_import();
        for step in import_steps(&layout) {
            run.push_result(StepResult::success(&step));
        }
        run.finalize();
        let report = run.into_report();
        assert_eq!(report.outcome, RunOutcome::Complete);
        assert_eq!(report.state, RunState::Finalized);
        assert_eq!(report.exit_code(), 0);
        assert!(!report.is_degraded());
    }

    #[test]
    fn test_any_non_success_finalizes_partial() {
        let (mut run, layout) = run_through_export();
        let steps = export_steps(&layout);
        run.push_result(StepResult::success(&steps[0]));
        run.push_result(StepResult::success(&steps[1]));
        run.push_result(StepResult::failed(&steps[2], "permission denied"));
        run.push_result(StepResult::success(&steps[3]));
        run.await_confirmation();
        run.begin_import();
        run.finalize();
        let report = run.into_report();
        assert_eq!(report.outcome, RunOutcome::Partial);
        // Partial success still exits zero; the report carries the damage
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.degraded_steps().len(), 1);
        assert_eq!(report.degraded_steps()[0].step, "export_auth_users");
    }

    #[test]
    fn test_declined_run_reports_declined_and_exits_zero() {
        let (mut run, layout) = run_through_export();
        for step in export_steps(&layout) {
            run.push_result(StepResult::success(&step));
        }
        run.await_confirmation();
        run.decline("import not confirmed");
        let report = run.into_report();
        assert_eq!(report.outcome, RunOutcome::Declined);
        assert_eq!(report.state, RunState::Aborted);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.abort_reason.as_deref(), Some("import not confirmed"));
    }

    #[test]
    fn test_aborted_run_exits_non_zero_with_reason() {
        let (mut run, layout) = run_through_export();
        let steps = export_steps(&layout);
        run.push_result(StepResult::failed(&steps[0], "connection refused"));
        run.abort(&MigrateError::Export {
            step: "export_schema".to_string(),
            message: "connection refused".to_string(),
        });
        let report = run.into_report();
        assert_eq!(report.outcome, RunOutcome::Aborted);
        assert_ne!(report.exit_code(), 0);
        assert!(report
            .abort_reason
            .as_deref()
            .unwrap()
            .contains("export_schema"));
    }

    #[test]
    fn test_report_serializes_with_stable_names() {
        let (mut run, layout) = run_through_export();
        run.push_result(StepResult::success(&export_steps(&layout)[0]));
        run.await_confirmation();
        run.decline("import not confirmed");
        let report = run.into_report();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "declined");
        assert_eq!(json["state"], "aborted");
        assert_eq!(json["steps"][0]["step"], "export_schema");
        assert_eq!(json["steps"][0]["status"], "success");
        assert_eq!(json["steps"][0]["phase"], "export");
        // Successful steps carry no message field at all
        assert!(json["steps"][0].get("message").is_none());
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(MigrationRun::new().id(), MigrationRun::new().id());
    }
}
