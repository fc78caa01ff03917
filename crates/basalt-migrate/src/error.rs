//! Error types for the migration engine

use thiserror::Error;

use crate::profile::ConnectionRole;

/// Result type for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Errors that can occur while preparing or running a migration
#[derive(Error, Debug)]
pub enum MigrateError {
    /// A required connection parameter is missing or invalid. Raised before
    /// any database is touched.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A database did not answer the pre-flight probe
    #[error("Cannot reach {role} database: {message}")]
    Connectivity {
        role: ConnectionRole,
        message: String,
    },

    /// A fatal export step failed
    #[error("Export step '{step}' failed: {message}")]
    Export { step: String, message: String },

    /// A fatal import step failed
    #[error("Import step '{step}' failed: {message}")]
    Import { step: String, message: String },

    /// A fatal step exceeded the configured per-step timeout
    #[error("Step '{step}' timed out after {seconds}s")]
    Timeout { step: String, seconds: u64 },

    /// The run was cancelled between steps
    #[error("Migration cancelled by operator")]
    Cancelled,

    /// An external database tool could not be spawned at all
    #[error("Failed to launch {tool}: {source}")]
    ToolLaunch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading pool credentials from the target failed
    #[error("Pool credential extraction failed: {0}")]
    PoolAuth(String),

    /// Filesystem error while managing the backup directory
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
