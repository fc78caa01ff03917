//! Connection parameter resolution
//!
//! Collapses explicit parameters, the settings-file pre-fill, and the stock
//! defaults into validated [`ConnectionProfile`]s. Defaults only ever fill
//! fields the caller left unset; host and password have no defaults and must
//! come from somewhere. Connectivity is deliberately not checked here; that
//! happens in the orchestrator's pre-flight.

use basalt_core::{mask_sensitive, SettingsStore};
use tracing::debug;

use crate::error::{MigrateError, MigrateResult};
use crate::profile::{
    ConnectionInput, ConnectionProfile, ConnectionRole, DEFAULT_DATABASE, DEFAULT_PORT,
    DEFAULT_USER,
};

/// Settings key consulted for the target password when the caller did not
/// supply one. Matches the variable the self-hosted stack itself boots with.
pub const TARGET_PASSWORD_KEY: &str = "POSTGRES_PASSWORD";

/// Resolves raw connection inputs into complete profiles
#[derive(Debug, Default)]
pub struct ConnectionResolver {
    settings: Option<SettingsStore>,
}

impl ConnectionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a settings store. It is only consulted to pre-fill the target
    /// password; explicit values always win over it.
    pub fn with_settings(mut self, settings: SettingsStore) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Resolve one side of the migration.
    pub fn resolve(
        &self,
        role: ConnectionRole,
        input: ConnectionInput,
    ) -> MigrateResult<ConnectionProfile> {
        let mut input = input;

        if role == ConnectionRole::Target && input.password.is_none() {
            if let Some(password) = self.settings_password() {
                debug!("Pre-filled target password from settings file");
                input.password = Some(password);
            }
        }

        let host = input.host.unwrap_or_default().trim().to_string();
        if host.is_empty() {
            return Err(MigrateError::Configuration(format!(
                "{role} database host must not be empty"
            )));
        }

        let password = input.password.unwrap_or_default();
        if password.is_empty() {
            return Err(MigrateError::Configuration(format!(
                "{role} database password must not be empty"
            )));
        }

        let profile = ConnectionProfile {
            role,
            host,
            port: input.port.unwrap_or(DEFAULT_PORT),
            user: input
                .user
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_USER.to_string()),
            password,
            database: input
                .database
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
        };
        debug!(
            "Resolved {} profile {} (password {})",
            role,
            profile,
            mask_sensitive(&profile.password)
        );
        Ok(profile)
    }

    /// Resolve both sides. Source errors surface before target errors so the
    /// operator fixes them in the order they were asked for.
    pub fn resolve_pair(
        &self,
        source: ConnectionInput,
        target: ConnectionInput,
    ) -> MigrateResult<(ConnectionProfile, ConnectionProfile)> {
        let source = self.resolve(ConnectionRole::Source, source)?;
        let target = self.resolve(ConnectionRole::Target, target)?;
        Ok((source, target))
    }

    /// Non-empty target password from the settings file, if any.
    pub fn settings_password(&self) -> Option<String> {
        self.settings
            .as_ref()
            .and_then(|s| s.get(TARGET_PASSWORD_KEY))
            .filter(|p| !p.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(host: &str, password: &str) -> ConnectionInput {
        ConnectionInput {
            host: Some(host.to_string()),
            password: Some(password.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_fill_unset_fields_only() {
        let resolver = ConnectionResolver::new();
        let profile = resolver
            .resolve(ConnectionRole::Source, input("db.example.com", "pw-secret"))
            .unwrap();
        assert_eq!(profile.host, "db.example.com");
        assert_eq!(profile.port, DEFAULT_PORT);
        assert_eq!(profile.user, DEFAULT_USER);
        assert_eq!(profile.database, DEFAULT_DATABASE);
        assert_eq!(profile.password, "pw-secret");
    }

    #[test]
    fn test_explicit_fields_are_never_overridden() {
        let resolver = ConnectionResolver::new();
        let profile = resolver
            .resolve(
                ConnectionRole::Source,
                ConnectionInput {
                    host: Some("db.example.com".to_string()),
                    port: Some(6543),
                    user: Some("admin".to_string()),
                    password: Some("pw-secret".to_string()),
                    database: Some("app".to_string()),
                },
            )
            .unwrap();
        assert_eq!(profile.port, 6543);
        assert_eq!(profile.user, "admin");
        assert_eq!(profile.database, "app");
    }

    #[test]
    fn test_empty_host_is_rejected() {
        let resolver = ConnectionResolver::new();
        for host in ["", "   "] {
            let err = resolver
                .resolve(ConnectionRole::Source, input(host, "pw-secret"))
                .unwrap_err();
            assert!(matches!(err, MigrateError::Configuration(_)));
            assert!(err.to_string().contains("host"));
        }
    }

    #[test]
    fn test_missing_host_is_rejected() {
        let resolver = ConnectionResolver::new();
        let err = resolver
            .resolve(
                ConnectionRole::Target,
                ConnectionInput {
                    password: Some("pw-secret".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("target"));
    }

    #[test]
    fn test_empty_password_is_rejected() {
        let resolver = ConnectionResolver::new();
        let err = resolver
            .resolve(ConnectionRole::Source, input("db.example.com", ""))
            .unwrap_err();
        assert!(matches!(err, MigrateError::Configuration(_)));
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn test_settings_prefill_target_password() {
        let settings = SettingsStore::parse("POSTGRES_PASSWORD=from-settings\n");
        let resolver = ConnectionResolver::new().with_settings(settings);
        let profile = resolver
            .resolve(
                ConnectionRole::Target,
                ConnectionInput {
                    host: Some("localhost".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(profile.password, "from-settings");
    }

    #[test]
    fn test_settings_never_fill_source_password() {
        let settings = SettingsStore::parse("POSTGRES_PASSWORD=from-settings\n");
        let resolver = ConnectionResolver::new().with_settings(settings);
        let err = resolver
            .resolve(
                ConnectionRole::Source,
                ConnectionInput {
                    host: Some("db.example.com".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, MigrateError::Configuration(_)));
    }

    #[test]
    fn test_explicit_password_beats_settings() {
        let settings = SettingsStore::parse("POSTGRES_PASSWORD=from-settings\n");
        let resolver = ConnectionResolver::new().with_settings(settings);
        let profile = resolver
            .resolve(ConnectionRole::Target, input("localhost", "explicit"))
            .unwrap();
        assert_eq!(profile.password, "explicit");
    }

    #[test]
    fn test_empty_settings_password_does_not_count() {
        let settings = SettingsStore::parse("POSTGRES_PASSWORD=\n");
        let resolver = ConnectionResolver::new().with_settings(settings);
        let err = resolver
            .resolve(
                ConnectionRole::Target,
                ConnectionInput {
                    host: Some("localhost".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn test_resolve_pair_reports_source_first() {
        let resolver = ConnectionResolver::new();
        let err = resolver
            .resolve_pair(ConnectionInput::default(), ConnectionInput::default())
            .unwrap_err();
        assert!(err.to_string().contains("source"));
    }

    #[test]
    fn test_whitespace_host_is_trimmed() {
        let resolver = ConnectionResolver::new();
        let profile = resolver
            .resolve(
                ConnectionRole::Source,
                input("  db.example.com  ", "pw-secret"),
            )
            .unwrap();
        assert_eq!(profile.host, "db.example.com");
    }
}
