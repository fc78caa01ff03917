//! Database executor collaborators
//!
//! Steps never build shell strings. Every external database operation is
//! described by a [`DatabaseCommand`] value and dispatched through the
//! [`DatabaseExecutor`] trait. The production implementation spawns the
//! PostgreSQL client tools directly (no shell in between) and hands the
//! password over through the process environment, so credentials never
//! appear in a command line or a process listing.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MigrateError, MigrateResult};
use crate::profile::ConnectionProfile;

/// One external database operation
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseCommand {
    /// Schema-only dump of one schema to a file
    DumpSchema { schema: String, out: PathBuf },
    /// Data-only dump of one schema to a file, written so triggers are
    /// disabled while the data is loaded back in
    DumpData { schema: String, out: PathBuf },
    /// Column-selected query export to a CSV file with a header row
    CopyOutCsv { query: String, out: PathBuf },
    /// Run a SQL script from a file, stopping at the first error
    RunScript { script: PathBuf },
    /// Run one inline SQL statement and capture its rows on stdout
    RunSql { sql: String },
}

impl DatabaseCommand {
    /// Name of the client tool this command runs, for error messages.
    pub fn tool(&self) -> &'static str {
        match self {
            DatabaseCommand::DumpSchema { .. } | DatabaseCommand::DumpData { .. } => "pg_dump",
            DatabaseCommand::CopyOutCsv { .. }
            | DatabaseCommand::RunScript { .. }
            | DatabaseCommand::RunSql { .. } => "psql",
        }
    }
}

/// Captured outcome of one external call. A tool that ran and exited
/// non-zero is a *failed* output, not an `Err`; errors are reserved for not
/// being able to run the tool at all.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Trimmed stderr, or a placeholder when the tool said nothing.
    pub fn error_message(&self) -> String {
        let trimmed = self.stderr.trim();
        if trimmed.is_empty() {
            "tool exited with an error and no output".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

/// Capability-typed access to the external database tools
#[async_trait]
pub trait DatabaseExecutor: Send + Sync {
    /// Run one command against the given database.
    async fn execute(
        &self,
        profile: &ConnectionProfile,
        command: &DatabaseCommand,
    ) -> MigrateResult<ExecOutput>;

    /// Cheap reachability probe, run before any step touches a database.
    async fn check_connectivity(&self, profile: &ConnectionProfile) -> MigrateResult<ExecOutput> {
        self.execute(
            profile,
            &DatabaseCommand::RunSql {
                sql: "SELECT 1".to_string(),
            },
        )
        .await
    }
}

/// Production executor that spawns `pg_dump` / `psql` from `PATH`
#[derive(Debug, Clone, Default)]
pub struct PgToolsExecutor;

impl PgToolsExecutor {
    pub fn new() -> Self {
        Self
    }

    fn build(&self, profile: &ConnectionProfile, command: &DatabaseCommand) -> Command {
        let mut cmd = match command {
            DatabaseCommand::DumpSchema { schema, out } => {
                let mut cmd = Command::new("pg_dump");
                cmd.arg("--schema-only")
                    .arg("--schema")
                    .arg(schema)
                    .arg("--no-owner")
                    .arg("--no-privileges")
                    .arg("--file")
                    .arg(out);
                cmd
            }
            DatabaseCommand::DumpData { schema, out } => {
                let mut cmd = Command::new("pg_dump");
                cmd.arg("--data-only")
                    .arg("--schema")
                    .arg(schema)
                    .arg("--disable-triggers")
                    .arg("--no-owner")
                    .arg("--file")
                    .arg(out);
                cmd
            }
            DatabaseCommand::CopyOutCsv { query, out } => {
                let mut cmd = Command::new("psql");
                // \copy runs client-side so the CSV lands next to the other
                // artifacts even when the server is remote
                cmd.arg("--no-psqlrc").arg("--command").arg(format!(
                    "\\copy ({}) TO '{}' WITH (FORMAT csv, HEADER true)",
                    query,
                    out.display()
                ));
                cmd
            }
            DatabaseCommand::RunScript { script } => {
                let mut cmd = Command::new("psql");
                cmd.arg("--no-psqlrc")
                    .arg("--set")
                    .arg("ON_ERROR_STOP=1")
                    .arg("--file")
                    .arg(script);
                cmd
            }
            DatabaseCommand::RunSql { sql } => {
                let mut cmd = Command::new("psql");
                cmd.arg("--no-psqlrc")
                    .arg("--tuples-only")
                    .arg("--no-align")
                    .arg("--set")
                    .arg("ON_ERROR_STOP=1")
                    .arg("--command")
                    .arg(sql);
                cmd
            }
        };
        cmd.arg("--host")
            .arg(&profile.host)
            .arg("--port")
            .arg(profile.port.to_string())
            .arg("--username")
            .arg(&profile.user)
            .arg("--dbname")
            .arg(&profile.database)
            .arg("--no-password");
        // Credentials go through the environment, never the argument list
        cmd.env("PGPASSWORD", &profile.password);
        // A step whose future is dropped (timeout) must not leave the tool
        // running against the database
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl DatabaseExecutor for PgToolsExecutor {
    async fn execute(
        &self,
        profile: &ConnectionProfile,
        command: &DatabaseCommand,
    ) -> MigrateResult<ExecOutput> {
        let mut cmd = self.build(profile, command);
        debug!(
            "Running {} against {}:{}/{}",
            command.tool(),
            profile.host,
            profile.port,
            profile.database
        );
        let output = cmd.output().await.map_err(|source| MigrateError::ToolLaunch {
            tool: command.tool().to_string(),
            source,
        })?;
        Ok(ExecOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
