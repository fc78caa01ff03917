//! Cloud-to-self-hosted migration commands

use async_trait::async_trait;
use clap::{Args, Subcommand};
use colored::Colorize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use basalt_core::SettingsStore;
use basalt_migrate::profile::{DEFAULT_DATABASE, DEFAULT_PORT, DEFAULT_USER};
use basalt_migrate::{
    AssumeYes, ConfirmationGate, ConnectionInput, ConnectionProfile, ConnectionResolver, DenyAll,
    MigrateError, MigrateResult, MigrationOrchestrator, MigrationReport, MigrationRequest,
    OrchestratorConfig, PgToolsExecutor, RunOutcome, StepStatus,
};

#[derive(Args)]
pub struct MigrateCommand {
    #[command(subcommand)]
    command: MigrateCommands,
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Export from the cloud database, then import into the self-hosted one
    Run(RunArgs),
    /// Import a previously exported backup directory into the target
    Import(ImportArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Source (cloud) database URL; individual --source-* flags override
    /// its parts
    #[arg(long, env = "SOURCE_DATABASE_URL")]
    source_url: Option<String>,

    /// Source database host
    #[arg(long, env = "SOURCE_DB_HOST")]
    source_host: Option<String>,

    /// Source database port
    #[arg(long, env = "SOURCE_DB_PORT")]
    source_port: Option<u16>,

    /// Source database user
    #[arg(long, env = "SOURCE_DB_USER")]
    source_user: Option<String>,

    /// Source database password
    #[arg(long, env = "SOURCE_DB_PASSWORD")]
    source_password: Option<String>,

    /// Source database name
    #[arg(long, env = "SOURCE_DB_NAME")]
    source_database: Option<String>,

    /// Target database host
    #[arg(long, env = "TARGET_DB_HOST")]
    target_host: Option<String>,

    /// Target database port
    #[arg(long, env = "TARGET_DB_PORT")]
    target_port: Option<u16>,

    /// Target database user
    #[arg(long, env = "TARGET_DB_USER")]
    target_user: Option<String>,

    /// Target database password; falls back to POSTGRES_PASSWORD from the
    /// settings file
    #[arg(long, env = "TARGET_DB_PASSWORD")]
    target_password: Option<String>,

    /// Target database name
    #[arg(long, env = "TARGET_DB_NAME")]
    target_database: Option<String>,

    /// Directory under which the run's backup directory is created
    #[arg(long, env = "BASALT_BACKUP_ROOT", default_value = ".")]
    backup_root: PathBuf,

    /// Settings file consulted for the target password
    #[arg(long, env = "BASALT_SETTINGS_FILE", default_value = ".env")]
    settings_file: PathBuf,

    /// Per-step timeout in seconds; 0 waits indefinitely
    #[arg(long, env = "BASALT_STEP_TIMEOUT_SECS", default_value = "0")]
    step_timeout_secs: u64,

    /// Answer yes to the import confirmation
    #[arg(long, default_value = "false")]
    yes: bool,

    /// Never prompt; missing parameters become errors and the import is
    /// not confirmed unless --yes is also given
    #[arg(long, default_value = "false")]
    non_interactive: bool,

    /// Print the final report as JSON instead of the text summary
    #[arg(long, default_value = "false")]
    json: bool,
}

#[derive(Args)]
struct ImportArgs {
    /// Backup directory from an earlier run
    #[arg(long, env = "BASALT_BACKUP_DIR")]
    backup_dir: PathBuf,

    /// Target database host
    #[arg(long, env = "TARGET_DB_HOST")]
    target_host: Option<String>,

    /// Target database port
    #[arg(long, env = "TARGET_DB_PORT")]
    target_port: Option<u16>,

    /// Target database user
    #[arg(long, env = "TARGET_DB_USER")]
    target_user: Option<String>,

    /// Target database password; falls back to POSTGRES_PASSWORD from the
    /// settings file
    #[arg(long, env = "TARGET_DB_PASSWORD")]
    target_password: Option<String>,

    /// Target database name
    #[arg(long, env = "TARGET_DB_NAME")]
    target_database: Option<String>,

    /// Settings file consulted for the target password
    #[arg(long, env = "BASALT_SETTINGS_FILE", default_value = ".env")]
    settings_file: PathBuf,

    /// Per-step timeout in seconds; 0 waits indefinitely
    #[arg(long, env = "BASALT_STEP_TIMEOUT_SECS", default_value = "0")]
    step_timeout_secs: u64,

    /// Answer yes to the import confirmation
    #[arg(long, default_value = "false")]
    yes: bool,

    /// Never prompt
    #[arg(long, default_value = "false")]
    non_interactive: bool,

    /// Print the final report as JSON instead of the text summary
    #[arg(long, default_value = "false")]
    json: bool,
}

impl MigrateCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        match self.command {
            MigrateCommands::Run(args) => execute_run(args),
            MigrateCommands::Import(args) => execute_import(args),
        }
    }
}

fn execute_run(args: RunArgs) -> anyhow::Result<()> {
    print_header("Basalt Migration");

    let resolver = build_resolver(&args.settings_file);
    let interactive = !args.non_interactive;

    // Explicit flags win over URL parts; prompts only fill what is left
    let mut source = ConnectionInput {
        host: args.source_host,
        port: args.source_port,
        user: args.source_user,
        password: args.source_password,
        database: args.source_database,
    };
    if let Some(url) = args.source_url.as_deref() {
        source = source.or(ConnectionInput::from_url(url)?);
    }
    if interactive {
        source = prompt_connection(source, "Source (cloud) database", false)?;
    }

    let target = ConnectionInput {
        host: args.target_host,
        port: args.target_port,
        user: args.target_user,
        password: args.target_password,
        database: args.target_database,
    };
    let target = finish_target(target, &resolver, interactive)?;

    print_section("Plan");
    print_info("Source", &describe(&source));
    print_info("Target", &describe(&target));
    print_info("Backup root", &args.backup_root.display().to_string());
    if args.step_timeout_secs > 0 {
        print_info("Step timeout", &format!("{}s", args.step_timeout_secs));
    }
    println!();

    let orchestrator = MigrationOrchestrator::new(
        Arc::new(PgToolsExecutor::new()),
        resolver,
        OrchestratorConfig {
            backup_root: args.backup_root,
            step_timeout: step_timeout(args.step_timeout_secs),
        },
        build_gate(args.yes, args.non_interactive),
    );

    let rt = tokio::runtime::Runtime::new()?;
    spawn_cancel_on_ctrl_c(&rt, &orchestrator);
    let report = rt.block_on(orchestrator.run(MigrationRequest { source, target }));

    finish(&report, args.json)
}

fn execute_import(args: ImportArgs) -> anyhow::Result<()> {
    print_header("Basalt Migration - Import");

    let resolver = build_resolver(&args.settings_file);
    let interactive = !args.non_interactive;

    let target = ConnectionInput {
        host: args.target_host,
        port: args.target_port,
        user: args.target_user,
        password: args.target_password,
        database: args.target_database,
    };
    let target = finish_target(target, &resolver, interactive)?;

    print_section("Plan");
    print_info("Backup directory", &args.backup_dir.display().to_string());
    print_info("Target", &describe(&target));
    println!();

    let orchestrator = MigrationOrchestrator::new(
        Arc::new(PgToolsExecutor::new()),
        resolver,
        OrchestratorConfig {
            // Import-only runs never create directories; the root is unused
            backup_root: PathBuf::from("."),
            step_timeout: step_timeout(args.step_timeout_secs),
        },
        build_gate(args.yes, args.non_interactive),
    );

    let rt = tokio::runtime::Runtime::new()?;
    spawn_cancel_on_ctrl_c(&rt, &orchestrator);
    let report = rt.block_on(orchestrator.import_existing(target, args.backup_dir));

    finish(&report, args.json)
}

/// Interactive confirmation gate. Anything other than an explicit yes
/// declines the import.
struct PromptGate;

#[async_trait]
impl ConfirmationGate for PromptGate {
    async fn confirm_import(
        &self,
        backup_dir: &Path,
        target: &ConnectionProfile,
    ) -> MigrateResult<bool> {
        println!();
        println!("{}", BOX_LINE.bright_yellow());
        println!(
            "{}",
            "   ⚠️  Ready to import into the target database"
                .bright_white()
                .bold()
        );
        println!("{}", BOX_LINE.bright_yellow());
        println!();
        print_info("Artifacts", &backup_dir.display().to_string());
        print_info("Target", &target.to_string());
        println!();
        println!(
            "{}",
            "This will apply the exported schema and data to the target database."
                .bright_yellow()
        );
        println!(
            "{}",
            "Objects with the same names may be modified.".bright_yellow()
        );
        println!();
        print!(
            "{} ",
            "Do you want to import now? (y/N):".bright_white().bold()
        );
        io::stdout().flush().map_err(MigrateError::Io)?;

        let mut response = String::new();
        io::stdin()
            .read_line(&mut response)
            .map_err(MigrateError::Io)?;
        let response = response.trim().to_lowercase();
        Ok(response == "y" || response == "yes")
    }
}

fn build_resolver(settings_file: &Path) -> ConnectionResolver {
    match SettingsStore::load(settings_file) {
        Ok(store) => {
            debug!("Loaded settings from {}", settings_file.display());
            ConnectionResolver::new().with_settings(store)
        }
        Err(err) => {
            debug!("Settings file unavailable: {err}");
            ConnectionResolver::new()
        }
    }
}

fn build_gate(yes: bool, non_interactive: bool) -> Arc<dyn ConfirmationGate> {
    if yes {
        Arc::new(AssumeYes)
    } else if non_interactive {
        // Without an operator there is nobody to say yes
        Arc::new(DenyAll)
    } else {
        Arc::new(PromptGate)
    }
}

fn step_timeout(seconds: u64) -> Option<Duration> {
    (seconds > 0).then(|| Duration::from_secs(seconds))
}

fn spawn_cancel_on_ctrl_c(rt: &tokio::runtime::Runtime, orchestrator: &MigrationOrchestrator) {
    let cancel = orchestrator.cancellation_token();
    rt.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!(
                "{}",
                "Stopping after the current step finishes...".bright_yellow()
            );
            cancel.cancel();
        }
    });
}

/// Fill whatever the flags and URL left open. A plain enter accepts the
/// shown default (or leaves the field for the resolver to reject).
fn prompt_connection(
    mut input: ConnectionInput,
    label: &str,
    skip_password: bool,
) -> anyhow::Result<ConnectionInput> {
    print_section(label);
    if input.host.is_none() {
        input.host = prompt("Host", None)?;
    }
    if input.port.is_none() {
        if let Some(raw) = prompt("Port", Some("5432"))? {
            input.port = Some(
                raw.parse()
                    .map_err(|_| anyhow::anyhow!("Invalid port '{raw}'"))?,
            );
        }
    }
    if input.user.is_none() {
        input.user = prompt("User", Some(DEFAULT_USER))?;
    }
    if input.database.is_none() {
        input.database = prompt("Database", Some(DEFAULT_DATABASE))?;
    }
    if input.password.is_none() && !skip_password {
        input.password = prompt("Password", None)?;
    }
    Ok(input)
}

fn prompt(label: &str, default: Option<&str>) -> anyhow::Result<Option<String>> {
    match default {
        Some(default) => print!(
            "{} [{}]: ",
            label.bright_white(),
            default.bright_cyan()
        ),
        None => print!("{}: ", label.bright_white()),
    }
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    let response = response.trim();
    if response.is_empty() {
        Ok(None)
    } else {
        Ok(Some(response.to_string()))
    }
}

fn finish_target(
    mut target: ConnectionInput,
    resolver: &ConnectionResolver,
    interactive: bool,
) -> anyhow::Result<ConnectionInput> {
    let prefilled = target.password.is_none() && resolver.settings_password().is_some();
    if prefilled {
        print_info("Target password", "pre-filled from the settings file");
    }
    if interactive {
        target = prompt_connection(target, "Target (self-hosted) database", prefilled)?;
    }
    Ok(target)
}

fn describe(input: &ConnectionInput) -> String {
    format!(
        "{}@{}:{}/{}",
        input.user.as_deref().unwrap_or(DEFAULT_USER),
        input.host.as_deref().unwrap_or("<missing>"),
        input.port.unwrap_or(DEFAULT_PORT),
        input.database.as_deref().unwrap_or(DEFAULT_DATABASE),
    )
}

fn finish(report: &MigrationReport, json: bool) -> anyhow::Result<()> {
    render_report(report, json)?;
    let code = report.exit_code();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn render_report(report: &MigrationReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!();
    println!("{}", BOX_LINE.bright_cyan());
    println!("{}", "   Migration summary".bright_white().bold());
    println!("{}", BOX_LINE.bright_cyan());
    println!();

    for step in &report.steps {
        let padded = format!("{:<9}", step.status.to_string());
        let status = match step.status {
            StepStatus::Success => padded.bright_green(),
            StepStatus::Failed | StepStatus::TimedOut => padded.bright_red(),
            StepStatus::Skipped => padded.bright_yellow(),
        };
        match step.message.as_deref() {
            Some(message) => println!("   {:<24} {} {}", step.step, status, message.dimmed()),
            None => println!("   {:<24} {}", step.step, status),
        }
    }
    if !report.steps.is_empty() {
        println!();
    }

    match report.outcome {
        RunOutcome::Complete => print_success("Migration completed successfully"),
        RunOutcome::Partial => {
            print_warning("Migration finished with warnings (partial success)");
            for step in report.degraded_steps() {
                println!("   {} {}", "degraded:".bright_yellow(), step.step);
            }
        }
        RunOutcome::Declined => {
            print_warning("Import was not confirmed; the target was left untouched");
            if let Some(dir) = &report.backup_dir {
                println!(
                    "   Export kept at {}; apply it later with {}",
                    dir.display().to_string().bright_white(),
                    "basalt migrate import --backup-dir <dir>".bright_cyan()
                );
            }
        }
        RunOutcome::Aborted => {
            print_error(&format!(
                "Migration aborted: {}",
                report.abort_reason.as_deref().unwrap_or("unknown reason")
            ));
            if let Some(dir) = &report.backup_dir {
                println!(
                    "   Any exported artifacts were kept at {}",
                    dir.display().to_string().bright_white()
                );
            }
        }
    }
    print_info("Run", &report.run_id);
    print_info("Duration", &format!("{}s", report.duration_seconds()));
    println!();
    Ok(())
}

const BOX_LINE: &str =
    "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

fn print_header(title: &str) {
    println!();
    println!("{}", BOX_LINE.bright_cyan());
    println!("{}", format!("   {title}").bright_white().bold());
    println!("{}", BOX_LINE.bright_cyan());
}

fn print_section(title: &str) {
    println!();
    println!("{}", format!("── {title} ──").bright_cyan().bold());
}

fn print_success(message: &str) {
    println!("{} {}", "✅".bright_green(), message.bright_green());
}

fn print_warning(message: &str) {
    println!("{} {}", "⚠️".bright_yellow(), message.bright_yellow());
}

fn print_error(message: &str) {
    println!("{} {}", "❌".bright_red(), message.bright_red());
}

fn print_info(label: &str, value: &str) {
    println!("   {} {}", format!("{label}:").bright_white(), value);
}
