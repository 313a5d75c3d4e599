//! Settings loading
//!
//! Applies directives in source order on top of any externally pre-seeded
//! values, then resolves defaults for everything still unset:
//! 1. Pre-seeded values (environment, command line, programmatic)
//! 2. Directives, top to bottom
//! 3. Schema defaults, derived defaults and persisted secrets

use crate::config::directive::{parse_directives, Directive, DirectiveOp, RawValue, Segment};
use crate::config::schema::{DefaultValue, ResolvedValues, SettingKey, SettingValue, ValueKind};
use crate::config::secret::{MemorySecretStore, SecretStore};
use crate::config::settings::SettingsRecord;
use crate::error::{Result, WikiconfError};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default prefix for environment overrides (`WIKICONF_DB_PASSWORD`, ...)
pub const DEFAULT_ENV_PREFIX: &str = "WIKICONF";

#[derive(Debug, Clone)]
struct Override {
    key: SettingKey,
    value: RawValue,
    origin: String,
}

/// Builds a [`SettingsRecord`] from a directive source
pub struct SettingsLoader {
    overrides: Vec<Override>,
    secrets: Arc<dyn SecretStore>,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    /// Loader without overrides, keeping generated secrets in memory
    pub fn new() -> Self {
        Self {
            overrides: Vec::new(),
            secrets: Arc::new(MemorySecretStore::new()),
        }
    }

    pub fn with_secret_store(mut self, store: Arc<dyn SecretStore>) -> Self {
        self.secrets = store;
        self
    }

    /// Pre-seed a value. Pre-seeded values win over every directive and
    /// every computed default for the same key.
    pub fn preseed(mut self, key: SettingKey, value: RawValue) -> Self {
        self.overrides.push(Override {
            key,
            value,
            origin: "preseed".to_string(),
        });
        self
    }

    /// Pre-seed from a `name` / `value` pair such as a `--set key=value` flag
    pub fn preseed_named(mut self, name: &str, value: &str) -> Result<Self> {
        let key = SettingKey::from_name(name.trim())
            .ok_or_else(|| WikiconfError::config(format!("Unknown setting '{name}' in override")))?;
        self.overrides.push(Override {
            key,
            value: RawValue::Text(value.to_string()),
            origin: format!("override {name}"),
        });
        Ok(self)
    }

    /// Pre-seed from `<PREFIX>_<KEY>` environment variables
    pub fn with_env_overrides(mut self, prefix: &str) -> Result<Self> {
        let environment = config::Config::builder()
            .add_source(config::Environment::with_prefix(prefix))
            .build()?;
        let found: HashMap<String, String> = environment.try_deserialize()?;

        let mut names: Vec<(String, String)> = found.into_iter().collect();
        names.sort();

        for (name, value) in names {
            let variable = format!("{}_{}", prefix, name.to_uppercase());
            match SettingKey::from_name(&name) {
                Some(key) => {
                    debug!("Pre-seeding '{}' from {}", key, variable);
                    self.overrides.push(Override {
                        key,
                        value: RawValue::Text(value),
                        origin: variable,
                    });
                }
                None => warn!("Ignoring {}: no setting named '{}'", variable, name),
            }
        }

        Ok(self)
    }

    /// Parse and load a directive source
    pub fn load(&self, source: &str) -> Result<SettingsRecord> {
        let directives = parse_directives(source)?;
        self.load_directives(&directives)
    }

    /// Load a directive file from disk
    pub async fn load_file(&self, path: &Path) -> Result<SettingsRecord> {
        let contents = tokio::fs::read_to_string(path).await?;
        debug!("Read directive source {}", path.display());
        self.load(&contents)
    }

    /// Load and wrap the record for sharing with request handlers
    pub fn load_shared(&self, source: &str) -> Result<Arc<SettingsRecord>> {
        self.load(source).map(Arc::new)
    }

    /// Apply already-parsed directives
    pub fn load_directives(&self, directives: &[Directive]) -> Result<SettingsRecord> {
        let mut values = ResolvedValues::new();
        let mut pinned = BTreeSet::new();

        for entry in &self.overrides {
            let value = self.resolve(entry.key, &entry.value, &values)?;
            debug!("'{}' pre-seeded by {}", entry.key, entry.origin);
            values.insert(entry.key, value);
            pinned.insert(entry.key);
        }

        for directive in directives {
            self.apply(directive, &mut values, &pinned)?;
        }

        self.resolve_defaults(&mut values)?;

        let record = SettingsRecord::from_resolved(values)?;
        info!(
            "Loaded settings for '{}' ({} directives, {} skins, {} extensions)",
            record.site.name,
            directives.len(),
            record.appearance.skins.len(),
            record.extensions.len()
        );
        Ok(record)
    }

    fn apply(
        &self,
        directive: &Directive,
        values: &mut ResolvedValues,
        pinned: &BTreeSet<SettingKey>,
    ) -> Result<()> {
        let key = SettingKey::from_name(&directive.key)
            .ok_or_else(|| WikiconfError::unknown_key(&directive.key, directive.line))?;

        if pinned.contains(&key) {
            debug!(
                "line {}: '{}' is pre-seeded externally, directive ignored",
                directive.line, key
            );
            return Ok(());
        }

        match directive.op {
            DirectiveOp::Set => {
                let value = self.resolve(key, &directive.value, values)?;
                trace_applied(directive, key);
                values.insert(key, value);
            }
            DirectiveOp::SetIfAbsent => {
                if values.contains_key(&key) {
                    debug!(
                        "line {}: '{}' already set, guarded directive skipped",
                        directive.line, key
                    );
                    return Ok(());
                }
                let value = self.resolve(key, &directive.value, values)?;
                trace_applied(directive, key);
                values.insert(key, value);
            }
            DirectiveOp::Append => {
                if key.kind() != ValueKind::List {
                    return Err(WikiconfError::invalid_operation(
                        key.name(),
                        format!("line {}: only list settings can be appended to", directive.line),
                    ));
                }
                let additions = self.append_items(key, &directive.value, values)?;

                let current = match values.remove(&key) {
                    Some(existing) => existing,
                    // Appending to an unset list extends its default
                    None => match key.default_value() {
                        DefaultValue::Value(default) => default,
                        _ => SettingValue::List(Vec::new()),
                    },
                };
                let mut items = match current {
                    SettingValue::List(items) => items,
                    other => {
                        return Err(WikiconfError::invalid_value(
                            key.name(),
                            key.kind().describe(),
                            other.to_string(),
                        ))
                    }
                };
                items.extend(additions);
                trace_applied(directive, key);
                values.insert(key, SettingValue::List(items));
            }
        }

        Ok(())
    }

    fn append_items(
        &self,
        key: SettingKey,
        raw: &RawValue,
        values: &ResolvedValues,
    ) -> Result<Vec<String>> {
        // A single string appends one item, even if it contains commas
        match raw {
            RawValue::Text(s) | RawValue::Bare(s) => Ok(vec![s.clone()]),
            RawValue::Template(segments) => Ok(vec![interpolate(segments, values)?]),
            other => match self.resolve(key, other, values)? {
                SettingValue::List(items) => Ok(items),
                value => Err(WikiconfError::invalid_value(
                    key.name(),
                    key.kind().describe(),
                    value.to_string(),
                )),
            },
        }
    }

    fn resolve(
        &self,
        key: SettingKey,
        raw: &RawValue,
        values: &ResolvedValues,
    ) -> Result<SettingValue> {
        match raw {
            RawValue::Generate(length) => {
                if key.kind() != ValueKind::Secret {
                    return Err(WikiconfError::invalid_operation(
                        key.name(),
                        "generate() is only valid for secret settings",
                    ));
                }
                let secret = self.secrets.get_or_generate(key.name(), *length)?;
                Ok(SettingValue::Secret(secret))
            }
            RawValue::Template(segments) => {
                key.coerce(&RawValue::Text(interpolate(segments, values)?))
            }
            RawValue::List(items) => {
                let expanded = items
                    .iter()
                    .map(|item| match item {
                        RawValue::Template(segments) => {
                            interpolate(segments, values).map(RawValue::Text)
                        }
                        other => Ok(other.clone()),
                    })
                    .collect::<Result<Vec<_>>>()?;
                key.coerce(&RawValue::List(expanded))
            }
            other => key.coerce(other),
        }
    }

    fn resolve_defaults(&self, values: &mut ResolvedValues) -> Result<()> {
        for key in SettingKey::ALL {
            if values.contains_key(&key) {
                continue;
            }
            let value = match key.default_value() {
                DefaultValue::Required => return Err(WikiconfError::missing_key(key.name())),
                DefaultValue::Value(value) => value,
                DefaultValue::Derived(compute) => compute(values),
                DefaultValue::Generated { length } => {
                    SettingValue::Secret(self.secrets.get_or_generate(key.name(), length)?)
                }
            };
            values.insert(key, value);
        }
        Ok(())
    }
}

fn interpolate(segments: &[Segment], values: &ResolvedValues) -> Result<String> {
    let mut rendered = String::new();
    for segment in segments {
        match segment {
            Segment::Literal(text) => rendered.push_str(text),
            Segment::Reference(name) => {
                let key = SettingKey::from_name(name).ok_or_else(|| {
                    WikiconfError::config(format!("Reference to unknown setting '${{{name}}}'"))
                })?;
                let value = values
                    .get(&key)
                    .cloned()
                    .or_else(|| key.reference_fallback(values))
                    .ok_or_else(|| {
                        WikiconfError::invalid_operation(
                            name,
                            "cannot be referenced before it is set",
                        )
                    })?;
                let text = value.interpolation_text().ok_or_else(|| {
                    WikiconfError::invalid_operation(name, "secret settings cannot be interpolated")
                })?;
                rendered.push_str(&text);
            }
        }
    }
    Ok(rendered)
}

fn trace_applied(directive: &Directive, key: SettingKey) {
    if key.kind() == ValueKind::Secret {
        debug!("line {}: {} {} <secret>", directive.line, key, directive.op.symbol());
    } else {
        debug!(
            "line {}: {} {} {}",
            directive.line,
            key,
            directive.op.symbol(),
            directive.value
        );
    }
}
