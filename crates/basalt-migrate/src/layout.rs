//! On-disk layout of a migration backup directory
//!
//! The directory written by the export phase is the durable contract with
//! the import phase. File names are stable so a run that stopped at the
//! confirmation gate (or lost some steps) can be finished later by pointing
//! an import-only run at the same directory. Nothing in the engine ever
//! deletes these files.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use basalt_core::timestamp_slug;

pub const SCHEMA_SQL: &str = "schema.sql";
pub const DATA_SQL: &str = "data.sql";
pub const AUTH_USERS_CSV: &str = "auth_users.csv";
pub const AUTH_IDENTITIES_CSV: &str = "auth_identities.csv";
/// Generated during import preparation, not by the export phase.
pub const AUTH_USERS_IMPORT_SQL: &str = "import_auth_users.sql";

const DIR_PREFIX: &str = "migration_backup_";

/// Paths of one run's artifacts
#[derive(Debug, Clone)]
pub struct BackupLayout {
    dir: PathBuf,
}

impl BackupLayout {
    /// Layout for a new run under `root`, keyed by the run's start time.
    pub fn for_run(root: impl AsRef<Path>, started_at: DateTime<Utc>) -> Self {
        Self {
            dir: root
                .as_ref()
                .join(format!("{DIR_PREFIX}{}", timestamp_slug(started_at))),
        }
    }

    /// Layout over an existing backup directory (import-only runs).
    pub fn existing(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn schema_sql(&self) -> PathBuf {
        self.dir.join(SCHEMA_SQL)
    }

    pub fn data_sql(&self) -> PathBuf {
        self.dir.join(DATA_SQL)
    }

    pub fn auth_users_csv(&self) -> PathBuf {
        self.dir.join(AUTH_USERS_CSV)
    }

    pub fn auth_identities_csv(&self) -> PathBuf {
        self.dir.join(AUTH_IDENTITIES_CSV)
    }

    pub fn auth_users_import_sql(&self) -> PathBuf {
        self.dir.join(AUTH_USERS_IMPORT_SQL)
    }

    /// Create the directory if needed. An existing directory (and anything
    /// in it) is left untouched.
    pub fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_directory_is_timestamped() {
        let started = Utc.with_ymd_and_hms(2024, 1, 31, 9, 45, 0).unwrap();
        let layout = BackupLayout::for_run("/var/backups", started);
        assert_eq!(
            layout.dir(),
            Path::new("/var/backups/migration_backup_20240131_094500")
        );
    }

    #[test]
    fn test_artifact_paths_live_inside_the_directory() {
        let layout = BackupLayout::existing("/tmp/migration_backup_x");
        assert_eq!(
            layout.schema_sql(),
            Path::new("/tmp/migration_backup_x/schema.sql")
        );
        assert_eq!(
            layout.data_sql(),
            Path::new("/tmp/migration_backup_x/data.sql")
        );
        assert_eq!(
            layout.auth_users_csv(),
            Path::new("/tmp/migration_backup_x/auth_users.csv")
        );
        assert_eq!(
            layout.auth_identities_csv(),
            Path::new("/tmp/migration_backup_x/auth_identities.csv")
        );
        assert_eq!(
            layout.auth_users_import_sql(),
            Path::new("/tmp/migration_backup_x/import_auth_users.sql")
        );
    }

    #[test]
    fn test_ensure_dir_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let started = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let layout = BackupLayout::for_run(root.path(), started);
        layout.ensure_dir().unwrap();
        std::fs::write(layout.schema_sql(), "-- schema").unwrap();
        layout.ensure_dir().unwrap();
        // A second ensure_dir never clears existing artifacts
        assert!(layout.schema_sql().exists());
    }
}
