//! Connection-pool authentication records
//!
//! The self-hosted stack fronts PostgreSQL with a connection pooler that
//! authenticates against a `userlist.txt` of quoted `"user" "hash"` pairs.
//! After a migration (or a password change) the file has to be rebuilt from
//! what the database actually stores, so the extraction reads `pg_shadow`
//! rather than trusting any settings file.

use crate::error::{MigrateError, MigrateResult};
use crate::executor::{DatabaseCommand, DatabaseExecutor};
use crate::profile::ConnectionProfile;

/// One pooler credential row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolCredential {
    pub user: String,
    pub password_hash: String,
}

/// Every role with a stored password hash. Roles without one cannot log in
/// through the pooler and are left out.
const POOL_CREDENTIALS_SQL: &str =
    "SELECT usename, passwd FROM pg_shadow WHERE passwd IS NOT NULL ORDER BY usename";

/// Read pooler credentials from the target database.
pub async fn fetch_pool_credentials(
    executor: &dyn DatabaseExecutor,
    profile: &ConnectionProfile,
) -> MigrateResult<Vec<PoolCredential>> {
    let output = executor
        .execute(
            profile,
            &DatabaseCommand::RunSql {
                sql: POOL_CREDENTIALS_SQL.to_string(),
            },
        )
        .await?;
    if !output.success {
        return Err(MigrateError::PoolAuth(output.error_message()));
    }
    Ok(parse_rows(&output.stdout))
}

/// Parse unaligned tuples-only psql output (`user|hash` per line).
fn parse_rows(raw: &str) -> Vec<PoolCredential> {
    raw.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let (user, hash) = line.split_once('|')?;
            Some(PoolCredential {
                user: user.to_string(),
                password_hash: hash.to_string(),
            })
        })
        .collect()
}

/// Render the pooler file format: one quoted pair per line.
pub fn render_userlist(credentials: &[PoolCredential]) -> String {
    let mut out = String::new();
    for credential in credentials {
        out.push_str(&format!(
            "\"{}\" \"{}\"\n",
            credential.user, credential.password_hash
        ));
    }
    out
}
