//! Core utilities and shared types for the Basalt toolkit
//!
//! This crate holds the pieces every other Basalt crate leans on: read-only
//! access to deployment settings files and small helpers for ids, timestamps,
//! and log redaction. It deliberately has no dependencies on the rest of the
//! workspace.

pub mod settings;
pub mod utils;

// Re-export commonly used types
pub use settings::{SettingsError, SettingsStore};
pub use utils::*;

// Re-export external dependencies so downstream crates can use them
// without declaring their own versions
pub use anyhow;
pub use chrono;
pub use serde;
pub use serde_json;
pub use thiserror;
pub use tracing;
pub use uuid;
