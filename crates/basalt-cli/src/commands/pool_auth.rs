//! Rebuild the connection pooler's authentication file from the database

use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tracing::{debug, info};

use basalt_core::SettingsStore;
use basalt_migrate::{
    fetch_pool_credentials, render_userlist, ConnectionInput, ConnectionResolver, ConnectionRole,
    PgToolsExecutor,
};

#[derive(Args)]
pub struct PoolAuthCommand {
    /// Target database host
    #[arg(long, env = "TARGET_DB_HOST")]
    pub host: Option<String>,

    /// Target database port
    #[arg(long, env = "TARGET_DB_PORT")]
    pub port: Option<u16>,

    /// Target database user
    #[arg(long, env = "TARGET_DB_USER")]
    pub user: Option<String>,

    /// Target database password; falls back to POSTGRES_PASSWORD from the
    /// settings file
    #[arg(long, env = "TARGET_DB_PASSWORD")]
    pub password: Option<String>,

    /// Target database name
    #[arg(long, env = "TARGET_DB_NAME")]
    pub database: Option<String>,

    /// Settings file consulted for the target password
    #[arg(long, env = "BASALT_SETTINGS_FILE", default_value = ".env")]
    pub settings_file: PathBuf,

    /// Where to write the pooler file
    #[arg(long, default_value = "userlist.txt")]
    pub output: PathBuf,
}

impl PoolAuthCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        info!("Rebuilding pooler authentication file");

        let resolver = match SettingsStore::load(&self.settings_file) {
            Ok(store) => {
                debug!("Loaded settings from {}", self.settings_file.display());
                ConnectionResolver::new().with_settings(store)
            }
            Err(err) => {
                debug!("Settings file unavailable: {err}");
                ConnectionResolver::new()
            }
        };

        let profile = resolver.resolve(
            ConnectionRole::Target,
            ConnectionInput {
                host: self.host,
                port: self.port,
                user: self.user,
                password: self.password,
                database: self.database,
            },
        )?;

        println!();
        println!(
            "{} {}",
            "Reading role credentials from".bright_white(),
            profile.to_string().bright_cyan()
        );

        let rt = tokio::runtime::Runtime::new()?;
        let executor = PgToolsExecutor::new();
        let credentials = rt.block_on(fetch_pool_credentials(&executor, &profile))?;

        std::fs::write(&self.output, render_userlist(&credentials))?;

        println!();
        println!(
            "{} {} {}",
            "✅ Wrote".bright_green(),
            self.output.display().to_string().bright_white(),
            format!("({} roles)", credentials.len()).bright_white()
        );
        println!(
            "{}",
            "Restart the pooler so it picks up the new file.".bright_white()
        );
        println!();

        Ok(())
    }
}
