//! wikiconf - settings loader for wiki deployments
//!
//! Reads an ordered list of configuration directives, applies documented
//! defaults, generates and persists signing secrets on first run, and
//! produces one immutable settings record before any request is served.

pub mod cli;
pub mod config;
pub mod error;
pub mod utils;

// Re-export commonly used types
pub use config::{SettingKey, SettingValue, SettingsLoader, SettingsRecord};
pub use error::{Result, WikiconfError};
