//! Read-only access to env-format settings files
//!
//! Self-hosted deployments keep their service credentials in an env file next
//! to the compose file. Basalt only ever reads that file (for example to
//! pre-fill the target database password during a migration); it never writes
//! to it or takes ownership of its contents.

use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading a settings file
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Key/value view over an env-format file (`KEY=value`, `#` comments)
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    values: HashMap<String, String>,
}

impl SettingsStore {
    /// Load a settings file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let store = Self::parse(&raw);
        tracing::debug!(
            "Loaded {} settings entries from {}",
            store.len(),
            path.display()
        );
        Ok(store)
    }

    /// Parse env-format content. Later assignments win, matching how the
    /// shell sources the same file.
    pub fn parse(raw: &str) -> Self {
        let mut values = HashMap::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                if key.is_empty() {
                    continue;
                }
                values.insert(key.to_string(), unquote(value.trim()).to_string());
            }
        }
        Self { values }
    }

    /// Look up a key. Returns `None` for keys that are absent entirely;
    /// a key assigned an empty value returns `Some("")`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Strip one matching pair of surrounding quotes, if present.
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'"' || first == b'\'') && bytes[bytes.len() - 1] == first {
            return &value[1..value.len() - 1];
        }
    }
    value
}
