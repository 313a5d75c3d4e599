//! CLI commands and argument parsing
//!
//! This module defines the command-line interface structure using clap,
//! including all commands, subcommands, and their arguments.

use crate::config::{
    FileSecretStore, SettingKey, SettingValue, SettingsLoader, SettingsRecord, DEFAULT_ENV_PREFIX,
};
use crate::error::WikiconfError;
use crate::utils::format::{DisplayUtils, OutputFormat, TableFormatter};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::Tabled;
use tracing::debug;

#[derive(Parser)]
#[command(name = "wikiconf")]
#[command(about = "Load, check and inspect wiki deployment settings")]
#[command(version, author)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Prefix of environment variables that pre-seed settings
    #[arg(long, global = true, value_name = "PREFIX", default_value = DEFAULT_ENV_PREFIX)]
    pub env_prefix: String,

    /// Ignore environment overrides
    #[arg(long, global = true)]
    pub no_env: bool,

    /// Secrets file (defaults to <FILE>.secrets.toml next to the directive file)
    #[arg(long, global = true, value_name = "PATH")]
    pub secrets_file: Option<PathBuf>,

    /// Pre-seed a setting; wins over the directive file (repeatable)
    #[arg(long = "set", global = true, value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub overrides: Vec<(String, String)>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a directive file and report problems
    Check {
        /// Directive file
        file: PathBuf,
    },
    /// Show every resolved setting
    Show {
        /// Directive file
        file: PathBuf,
        /// Print secret values instead of fingerprints
        #[arg(long)]
        show_secrets: bool,
    },
    /// Print one resolved setting
    Get {
        /// Directive file
        file: PathBuf,
        /// Setting name
        key: String,
        /// Print the secret value instead of its fingerprint
        #[arg(long)]
        reveal: bool,
    },
    /// List every known setting with its kind and default
    Keys,
    /// Inspect persisted secrets
    Secrets {
        #[command(subcommand)]
        command: SecretCommands,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum SecretCommands {
    /// List persisted secrets (fingerprints only)
    List {
        /// Directive file the secrets belong to
        file: Option<PathBuf>,
    },
    /// Show the secrets file path
    Path {
        /// Directive file the secrets belong to
        file: Option<PathBuf>,
    },
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[derive(Tabled, Serialize)]
struct SettingRow {
    #[tabled(rename = "Setting")]
    key: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled, Serialize)]
struct KeyRow {
    #[tabled(rename = "Setting")]
    key: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Default")]
    default: String,
}

#[derive(Tabled, Serialize)]
struct SecretRow {
    #[tabled(rename = "Secret")]
    key: String,
    #[tabled(rename = "Length")]
    length: usize,
    #[tabled(rename = "Generated")]
    generated_at: String,
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
}

#[derive(Serialize)]
struct CheckReport<'a> {
    site_name: &'a str,
    server: &'a str,
    warnings: Vec<String>,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match &self.command {
            Commands::Check { file } => self.execute_check(file).await,
            Commands::Show { file, show_secrets } => self.execute_show(file, *show_secrets).await,
            Commands::Get { file, key, reveal } => self.execute_get(file, key, *reveal).await,
            Commands::Keys => self.execute_keys(),
            Commands::Secrets { command } => match command {
                SecretCommands::List { file } => self.execute_secrets_list(file.as_deref()),
                SecretCommands::Path { file } => {
                    println!("{}", self.secrets_path(file.as_deref())?.display());
                    Ok(())
                }
            },
            Commands::Version => {
                println!("wikiconf {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }

    fn secrets_path(&self, file: Option<&Path>) -> Result<PathBuf> {
        match (&self.secrets_file, file) {
            (Some(path), _) => Ok(path.clone()),
            (None, Some(file)) => Ok(FileSecretStore::path_for_source(file)),
            (None, None) => Ok(FileSecretStore::global_path()?),
        }
    }

    fn build_loader(&self, file: &Path) -> Result<SettingsLoader> {
        let secrets_path = self.secrets_path(Some(file))?;
        debug!("Using secrets file {}", secrets_path.display());

        let mut loader =
            SettingsLoader::new().with_secret_store(Arc::new(FileSecretStore::new(secrets_path)));
        if !self.no_env {
            loader = loader.with_env_overrides(&self.env_prefix)?;
        }
        for (key, value) in &self.overrides {
            loader = loader.preseed_named(key, value)?;
        }
        Ok(loader)
    }

    async fn load(&self, file: &Path) -> Result<SettingsRecord> {
        let loader = self.build_loader(file)?;
        let record = loader
            .load_file(file)
            .await
            .with_context(|| format!("Failed to load settings from {}", file.display()))?;
        Ok(record)
    }

    async fn execute_check(&self, file: &Path) -> Result<()> {
        let record = self.load(file).await?;
        let warnings = record.operational_warnings();

        if self.format != OutputFormat::Table {
            let report = CheckReport {
                site_name: &record.site.name,
                server: &record.site.server,
                warnings,
            };
            let formatter = TableFormatter::new(self.format, self.no_color);
            println!("{}", formatter.format_document(&report)?);
            return Ok(());
        }

        let display = DisplayUtils::new(self.no_color);
        display.print_success(&format!("{} loaded", file.display()));

        let database = format!(
            "{} {}@{}/{}",
            record.database.db_type,
            record.database.user,
            record.database.server,
            record.database.name
        );
        let cache = record.cache.main_cache_type.to_string();
        let skins = format!(
            "{} (default {})",
            record.appearance.skins.join(", "),
            record.appearance.default_skin
        );
        let extensions = record.extensions.join(", ");
        let pairs = [
            ("Site", record.site.name.as_str()),
            ("Server", record.site.server.as_str()),
            ("Database", database.as_str()),
            ("Cache", cache.as_str()),
            ("Skins", skins.as_str()),
            ("Extensions", extensions.as_str()),
        ];
        println!("{}", display.format_key_value_pairs(&pairs));

        for warning in &warnings {
            display.print_warning(warning);
        }
        Ok(())
    }

    async fn execute_show(&self, file: &Path, show_secrets: bool) -> Result<()> {
        let record = self.load(file).await?;
        let formatter = TableFormatter::new(self.format, self.no_color);

        if self.format == OutputFormat::Table {
            let rows: Vec<SettingRow> = record
                .entries()
                .into_iter()
                .map(|(key, value)| SettingRow {
                    key: key.name().to_string(),
                    kind: key.kind().short_name().to_string(),
                    value: render_value(&value, show_secrets),
                })
                .collect();
            println!("{}", formatter.format_rows(&rows)?);
            return Ok(());
        }

        let mut document = serde_json::Map::new();
        for (key, value) in record.entries() {
            document.insert(key.name().to_string(), json_value(&value, show_secrets)?);
        }
        println!("{}", formatter.format_document(&document)?);
        Ok(())
    }

    async fn execute_get(&self, file: &Path, key: &str, reveal: bool) -> Result<()> {
        let key: SettingKey = key.parse()?;
        let record = self.load(file).await?;
        let value = record.get(key);

        match self.format {
            OutputFormat::Table => println!("{}", render_value(&value, reveal)),
            _ => {
                let formatter = TableFormatter::new(self.format, self.no_color);
                println!("{}", formatter.format_document(&json_value(&value, reveal)?)?);
            }
        }
        Ok(())
    }

    fn execute_keys(&self) -> Result<()> {
        let rows: Vec<KeyRow> = SettingKey::ALL
            .iter()
            .map(|key| KeyRow {
                key: key.name().to_string(),
                kind: key.kind().describe(),
                default: key.describe_default(),
            })
            .collect();
        let formatter = TableFormatter::new(self.format, self.no_color);
        println!("{}", formatter.format_rows(&rows)?);
        Ok(())
    }

    fn execute_secrets_list(&self, file: Option<&Path>) -> Result<()> {
        let store = FileSecretStore::new(self.secrets_path(file)?);
        let rows: Vec<SecretRow> = store
            .entries()?
            .into_iter()
            .map(|entry| SecretRow {
                key: entry.key,
                length: entry.length,
                generated_at: entry.generated_at.to_rfc3339(),
                fingerprint: entry.fingerprint,
            })
            .collect();
        let formatter = TableFormatter::new(self.format, self.no_color);
        println!("{}", formatter.format_rows(&rows)?);
        Ok(())
    }
}

fn render_value(value: &SettingValue, reveal: bool) -> String {
    match value {
        SettingValue::Secret(secret) if reveal => secret.expose().to_string(),
        SettingValue::Str(s) if s.is_empty() => "<not set>".to_string(),
        other => other.to_string(),
    }
}

fn json_value(
    value: &SettingValue,
    reveal: bool,
) -> std::result::Result<serde_json::Value, WikiconfError> {
    match value {
        SettingValue::Secret(secret) if reveal => {
            Ok(serde_json::Value::String(secret.expose().to_string()))
        }
        SettingValue::Secret(secret) if !secret.is_empty() => {
            Ok(serde_json::Value::String(secret.fingerprint()))
        }
        other => Ok(serde_json::to_value(other)?),
    }
}
