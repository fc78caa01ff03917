//! Basalt CLI - operator tooling for self-hosted deployments
//!
//! This binary fronts the library crates: migrating a managed cloud project
//! into a self-hosted stack and regenerating the connection pooler's
//! authentication file.

mod commands;

use clap::{Parser, Subcommand};
use commands::{MigrateCommand, PoolAuthCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "BASALT_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "BASALT_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move a cloud project's database into the self-hosted stack
    Migrate(MigrateCommand),
    /// Rebuild the connection pooler's authentication file
    PoolAuth(PoolAuthCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Use log level from base CLI
    let log_level = cli.log_level.clone();

    // Configure logging with custom filter for cleaner output
    // If RUST_LOG is set, use it directly; otherwise use our default filter
    let filter = if std::env::var("RUST_LOG").is_ok() {
        // RUST_LOG is set, use it as-is (user wants full control)
        tracing_subscriber::EnvFilter::try_from_default_env()
            .expect("Invalid RUST_LOG environment variable")
    } else {
        // Default filter: all basalt crates at the chosen level, the console
        // stays readable because interactive output goes through stdout
        tracing_subscriber::EnvFilter::new(format!(
            "basalt_cli={level},\
             basalt_core={level},\
             basalt_migrate={level}",
            level = log_level
        ))
    };

    // Configure tracing with filter and custom format
    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer() // "compact" or any other value
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default subscriber");

    match cli.command {
        Commands::Migrate(migrate_cmd) => migrate_cmd.execute(),
        Commands::PoolAuth(pool_auth_cmd) => pool_auth_cmd.execute(),
    }
}
