//! Settings schema
//!
//! The complete set of keys a deployment can configure, the kind of value
//! each one holds, and the default each one resolves to when no directive
//! supplies it. The key set is fixed here; nothing is discovered at runtime.

use crate::config::directive::RawValue;
use crate::config::secret::Secret;
use crate::error::{Result, WikiconfError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Values resolved so far during a load, keyed by setting
pub type ResolvedValues = BTreeMap<SettingKey, SettingValue>;

pub const DB_TYPES: &[&str] = &["mysql", "postgres", "sqlite"];
pub const CACHE_TYPES: &[&str] = &["none", "db", "hash", "accel", "memcached", "anything"];

const DEFAULT_LOGO_ASSET: &str = "resources/assets/change-your-logo.svg";

/// Kind of value a setting holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Str,
    Bool,
    Int,
    List,
    /// Absolute http(s) URL, stored without a trailing slash
    Url,
    /// One of a fixed set of lower-case names
    Choice(&'static [&'static str]),
    Secret,
}

impl ValueKind {
    /// Human-readable description used in coercion errors
    pub fn describe(&self) -> String {
        match self {
            ValueKind::Str => "a string".to_string(),
            ValueKind::Bool => "a boolean (true/false)".to_string(),
            ValueKind::Int => "an integer".to_string(),
            ValueKind::List => "a list of strings".to_string(),
            ValueKind::Url => "an absolute http(s) URL".to_string(),
            ValueKind::Choice(options) => format!("one of: {}", options.join(", ")),
            ValueKind::Secret => "a secret string".to_string(),
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            ValueKind::Str => "string",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::List => "list",
            ValueKind::Url => "url",
            ValueKind::Choice(_) => "choice",
            ValueKind::Secret => "secret",
        }
    }
}

/// A resolved setting value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SettingValue {
    Str(String),
    Bool(bool),
    Int(i64),
    List(Vec<String>),
    Secret(Secret),
}

impl SettingValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SettingValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Text used when this value is interpolated into a string directive
    pub fn interpolation_text(&self) -> Option<String> {
        match self {
            SettingValue::Str(s) => Some(s.clone()),
            SettingValue::Bool(b) => Some(b.to_string()),
            SettingValue::Int(i) => Some(i.to_string()),
            SettingValue::List(items) => Some(items.join(",")),
            SettingValue::Secret(_) => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Str(s) => write!(f, "{s}"),
            SettingValue::Bool(b) => write!(f, "{b}"),
            SettingValue::Int(i) => write!(f, "{i}"),
            SettingValue::List(items) => write!(f, "[{}]", items.join(", ")),
            SettingValue::Secret(secret) => write!(f, "{secret}"),
        }
    }
}

/// How a key resolves when no directive or pre-seeded value supplies it
#[derive(Debug, Clone)]
pub enum DefaultValue {
    /// No default; load fails when the key is absent
    Required,
    Value(SettingValue),
    /// Computed from keys that appear earlier in [`SettingKey::ALL`]
    Derived(fn(&ResolvedValues) -> SettingValue),
    /// Random hex of the given length, persisted through the secret store
    Generated { length: usize },
}

/// Every configurable key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    SiteName,
    ScriptPath,
    Server,
    ResourceBasePath,
    Logo,
    LogoIcon,
    LanguageCode,
    LocalTimezone,
    DisableOutputCompression,
    DbType,
    DbServer,
    DbName,
    DbUser,
    DbPassword,
    DbPrefix,
    DbTableOptions,
    SharedTables,
    MainCacheType,
    MemcachedServers,
    CacheDirectory,
    EnableEmail,
    EnableUserEmail,
    EmergencyContact,
    PasswordSender,
    EnotifUserTalk,
    EnotifWatchlist,
    EmailAuthentication,
    EnableUploads,
    MaxUploadSize,
    UseImageMagick,
    ImageMagickConvertCommand,
    UseInstantCommons,
    Pingback,
    DefaultSkin,
    Skins,
    Extensions,
    SecretKey,
    AuthenticationTokenVersion,
    UpgradeKey,
    RightsPage,
    RightsUrl,
    RightsText,
    RightsIcon,
    Diff3,
    ShowExceptionDetails,
    ShowDbErrorBacktrace,
    ShowSqlErrors,
}

impl SettingKey {
    /// All keys in resolution order. Derived defaults only read keys listed
    /// before them.
    pub const ALL: [SettingKey; 47] = [
        SettingKey::SiteName,
        SettingKey::ScriptPath,
        SettingKey::Server,
        SettingKey::ResourceBasePath,
        SettingKey::Logo,
        SettingKey::LogoIcon,
        SettingKey::LanguageCode,
        SettingKey::LocalTimezone,
        SettingKey::DisableOutputCompression,
        SettingKey::DbType,
        SettingKey::DbServer,
        SettingKey::DbName,
        SettingKey::DbUser,
        SettingKey::DbPassword,
        SettingKey::DbPrefix,
        SettingKey::DbTableOptions,
        SettingKey::SharedTables,
        SettingKey::MainCacheType,
        SettingKey::MemcachedServers,
        SettingKey::CacheDirectory,
        SettingKey::EnableEmail,
        SettingKey::EnableUserEmail,
        SettingKey::EmergencyContact,
        SettingKey::PasswordSender,
        SettingKey::EnotifUserTalk,
        SettingKey::EnotifWatchlist,
        SettingKey::EmailAuthentication,
        SettingKey::EnableUploads,
        SettingKey::MaxUploadSize,
        SettingKey::UseImageMagick,
        SettingKey::ImageMagickConvertCommand,
        SettingKey::UseInstantCommons,
        SettingKey::Pingback,
        SettingKey::DefaultSkin,
        SettingKey::Skins,
        SettingKey::Extensions,
        SettingKey::SecretKey,
        SettingKey::AuthenticationTokenVersion,
        SettingKey::UpgradeKey,
        SettingKey::RightsPage,
        SettingKey::RightsUrl,
        SettingKey::RightsText,
        SettingKey::RightsIcon,
        SettingKey::Diff3,
        SettingKey::ShowExceptionDetails,
        SettingKey::ShowDbErrorBacktrace,
        SettingKey::ShowSqlErrors,
    ];

    /// Name used in directive sources and environment overrides
    pub fn name(&self) -> &'static str {
        match self {
            SettingKey::SiteName => "site_name",
            SettingKey::ScriptPath => "script_path",
            SettingKey::Server => "server",
            SettingKey::ResourceBasePath => "resource_base_path",
            SettingKey::Logo => "logo",
            SettingKey::LogoIcon => "logo_icon",
            SettingKey::LanguageCode => "language_code",
            SettingKey::LocalTimezone => "local_timezone",
            SettingKey::DisableOutputCompression => "disable_output_compression",
            SettingKey::DbType => "db_type",
            SettingKey::DbServer => "db_server",
            SettingKey::DbName => "db_name",
            SettingKey::DbUser => "db_user",
            SettingKey::DbPassword => "db_password",
            SettingKey::DbPrefix => "db_prefix",
            SettingKey::DbTableOptions => "db_table_options",
            SettingKey::SharedTables => "shared_tables",
            SettingKey::MainCacheType => "main_cache_type",
            SettingKey::MemcachedServers => "memcached_servers",
            SettingKey::CacheDirectory => "cache_directory",
            SettingKey::EnableEmail => "enable_email",
            SettingKey::EnableUserEmail => "enable_user_email",
            SettingKey::EmergencyContact => "emergency_contact",
            SettingKey::PasswordSender => "password_sender",
            SettingKey::EnotifUserTalk => "enotif_user_talk",
            SettingKey::EnotifWatchlist => "enotif_watchlist",
            SettingKey::EmailAuthentication => "email_authentication",
            SettingKey::EnableUploads => "enable_uploads",
            SettingKey::MaxUploadSize => "max_upload_size",
            SettingKey::UseImageMagick => "use_image_magick",
            SettingKey::ImageMagickConvertCommand => "image_magick_convert_command",
            SettingKey::UseInstantCommons => "use_instant_commons",
            SettingKey::Pingback => "pingback",
            SettingKey::DefaultSkin => "default_skin",
            SettingKey::Skins => "skins",
            SettingKey::Extensions => "extensions",
            SettingKey::SecretKey => "secret_key",
            SettingKey::AuthenticationTokenVersion => "authentication_token_version",
            SettingKey::UpgradeKey => "upgrade_key",
            SettingKey::RightsPage => "rights_page",
            SettingKey::RightsUrl => "rights_url",
            SettingKey::RightsText => "rights_text",
            SettingKey::RightsIcon => "rights_icon",
            SettingKey::Diff3 => "diff3",
            SettingKey::ShowExceptionDetails => "show_exception_details",
            SettingKey::ShowDbErrorBacktrace => "show_db_error_backtrace",
            SettingKey::ShowSqlErrors => "show_sql_errors",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|key| key.name() == name)
    }

    pub fn kind(&self) -> ValueKind {
        use SettingKey::*;
        match self {
            Server => ValueKind::Url,
            DbType => ValueKind::Choice(DB_TYPES),
            MainCacheType => ValueKind::Choice(CACHE_TYPES),
            DbPassword | SecretKey | UpgradeKey => ValueKind::Secret,
            SharedTables | MemcachedServers | Skins | Extensions => ValueKind::List,
            MaxUploadSize => ValueKind::Int,
            DisableOutputCompression | EnableEmail | EnableUserEmail | EnotifUserTalk
            | EnotifWatchlist | EmailAuthentication | EnableUploads | UseImageMagick
            | UseInstantCommons | Pingback | ShowExceptionDetails | ShowDbErrorBacktrace
            | ShowSqlErrors => ValueKind::Bool,
            _ => ValueKind::Str,
        }
    }

    pub fn default_value(&self) -> DefaultValue {
        use SettingKey::*;
        match self {
            SiteName | Server => DefaultValue::Required,
            ResourceBasePath => DefaultValue::Derived(|values| {
                SettingValue::Str(resolved_str(values, ScriptPath))
            }),
            Logo | LogoIcon => DefaultValue::Derived(|values| {
                SettingValue::Str(format!(
                    "{}/{}",
                    resolved_str(values, ResourceBasePath),
                    DEFAULT_LOGO_ASSET
                ))
            }),
            SecretKey => DefaultValue::Generated { length: 64 },
            UpgradeKey => DefaultValue::Generated { length: 16 },
            DbPassword => DefaultValue::Value(SettingValue::Secret(Secret::new(""))),
            LanguageCode => str_default("en"),
            LocalTimezone => str_default("UTC"),
            DbType => str_default("mysql"),
            DbServer => str_default("localhost"),
            DbName => str_default("my_wiki"),
            DbUser => str_default("wikiuser"),
            DbTableOptions => str_default("ENGINE=InnoDB, DEFAULT CHARSET=binary"),
            SharedTables => DefaultValue::Value(SettingValue::List(vec![
                "user".to_string(),
                "user_properties".to_string(),
                "user_autocreate_serial".to_string(),
            ])),
            MainCacheType => str_default("none"),
            ImageMagickConvertCommand => str_default("/usr/bin/convert"),
            DefaultSkin => str_default("vector"),
            MaxUploadSize => DefaultValue::Value(SettingValue::Int(100 * 1024 * 1024)),
            EnableEmail | EnableUserEmail | EmailAuthentication => {
                DefaultValue::Value(SettingValue::Bool(true))
            }
            MemcachedServers | Skins | Extensions => {
                DefaultValue::Value(SettingValue::List(Vec::new()))
            }
            _ => match self.kind() {
                ValueKind::Bool => DefaultValue::Value(SettingValue::Bool(false)),
                _ => str_default(""),
            },
        }
    }

    /// Value a `${key}` reference falls back to when the key is still unset
    ///
    /// Derived defaults see the fallbacks of every earlier unset key, so a
    /// chain such as logo -> resource_base_path -> script_path resolves the
    /// same way the final defaults do.
    pub fn reference_fallback(&self, values: &ResolvedValues) -> Option<SettingValue> {
        match self.default_value() {
            DefaultValue::Value(SettingValue::Secret(_)) => None,
            DefaultValue::Value(value) => Some(value),
            DefaultValue::Derived(compute) => {
                let mut scratch = values.clone();
                for key in Self::ALL.iter().take_while(|key| *key != self) {
                    if scratch.contains_key(key) {
                        continue;
                    }
                    if let Some(fallback) = key.reference_fallback(&scratch) {
                        scratch.insert(*key, fallback);
                    }
                }
                Some(compute(&scratch))
            }
            DefaultValue::Required | DefaultValue::Generated { .. } => None,
        }
    }

    /// Default rendered for listings
    pub fn describe_default(&self) -> String {
        match self.default_value() {
            DefaultValue::Required => "(required)".to_string(),
            DefaultValue::Value(SettingValue::Str(s)) if s.is_empty() => "\"\"".to_string(),
            DefaultValue::Value(SettingValue::Str(s)) => format!("\"{s}\""),
            DefaultValue::Value(SettingValue::Secret(_)) => "\"\"".to_string(),
            DefaultValue::Value(value) => value.to_string(),
            DefaultValue::Derived(_) => match self {
                SettingKey::ResourceBasePath => "(script_path)".to_string(),
                _ => format!("(resource_base_path)/{DEFAULT_LOGO_ASSET}"),
            },
            DefaultValue::Generated { length } => format!("(generated, {length} hex chars)"),
        }
    }

    /// Coerce a raw directive value into this key's kind
    ///
    /// String values must already be interpolated. `generate(N)` is handled by
    /// the loader and rejected here.
    pub fn coerce(&self, raw: &RawValue) -> Result<SettingValue> {
        let kind = self.kind();
        let mismatch =
            || WikiconfError::invalid_value(self.name(), kind.describe(), raw.to_string());

        match kind {
            ValueKind::Str => match raw {
                RawValue::Text(s) | RawValue::Bare(s) => Ok(SettingValue::Str(s.clone())),
                // authentication_token_version = 1
                RawValue::Int(i) => Ok(SettingValue::Str(i.to_string())),
                _ => Err(mismatch()),
            },
            ValueKind::Bool => match raw {
                RawValue::Bool(b) => Ok(SettingValue::Bool(*b)),
                RawValue::Text(s) | RawValue::Bare(s) => {
                    parse_bool(s).map(SettingValue::Bool).ok_or_else(mismatch)
                }
                _ => Err(mismatch()),
            },
            ValueKind::Int => match raw {
                RawValue::Int(i) => Ok(SettingValue::Int(*i)),
                RawValue::Text(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(SettingValue::Int)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            ValueKind::List => match raw {
                RawValue::List(items) => items
                    .iter()
                    .map(|item| match item {
                        RawValue::Text(s) | RawValue::Bare(s) => Ok(s.clone()),
                        _ => Err(mismatch()),
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(SettingValue::List),
                RawValue::Text(s) => Ok(SettingValue::List(split_list(s))),
                _ => Err(mismatch()),
            },
            ValueKind::Url => match raw {
                RawValue::Text(s) => parse_server_url(s)
                    .map(SettingValue::Str)
                    .ok_or_else(mismatch),
                _ => Err(mismatch()),
            },
            ValueKind::Choice(options) => match raw {
                RawValue::Text(s) | RawValue::Bare(s) => {
                    let normalized = normalize_choice(s);
                    if options.contains(&normalized.as_str()) {
                        Ok(SettingValue::Str(normalized))
                    } else {
                        Err(mismatch())
                    }
                }
                _ => Err(mismatch()),
            },
            ValueKind::Secret => match raw {
                RawValue::Text(s) => Ok(SettingValue::Secret(Secret::new(s.as_str()))),
                _ => Err(mismatch()),
            },
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SettingKey {
    type Err = WikiconfError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| WikiconfError::config(format!("Unknown setting '{s}'")))
    }
}

fn str_default(value: &str) -> DefaultValue {
    DefaultValue::Value(SettingValue::Str(value.to_string()))
}

fn resolved_str(values: &ResolvedValues, key: SettingKey) -> String {
    values
        .get(&key)
        .and_then(SettingValue::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Strict boolean parsing; anything outside the accepted spellings is rejected
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_server_url(s: &str) -> Option<String> {
    let trimmed = s.trim();
    let parsed = url::Url::parse(trimmed).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || !parsed.has_host() {
        return None;
    }
    Some(trimmed.trim_end_matches('/').to_string())
}

// The platform spells cache types as constants (CACHE_NONE, CACHE_ACCEL, ...)
fn normalize_choice(s: &str) -> String {
    let lower = s.trim().to_ascii_lowercase();
    match lower.strip_prefix("cache_") {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names_round_trip() {
        for key in SettingKey::ALL {
            assert_eq!(SettingKey::from_name(key.name()), Some(key));
        }
        assert_eq!(SettingKey::from_name("wgSitename"), None);
    }

    #[test]
    fn test_all_keys_listed_once() {
        let mut names: Vec<_> = SettingKey::ALL.iter().map(|k| k.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), SettingKey::ALL.len());
    }

    #[test]
    fn test_derived_defaults_follow_their_inputs() {
        let position = |key| SettingKey::ALL.iter().position(|k| *k == key).unwrap();
        assert!(position(SettingKey::ScriptPath) < position(SettingKey::ResourceBasePath));
        assert!(position(SettingKey::ResourceBasePath) < position(SettingKey::Logo));
        assert!(position(SettingKey::ResourceBasePath) < position(SettingKey::LogoIcon));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn test_coerce_bool_rejects_maybe() {
        let err = SettingKey::EnableUploads
            .coerce(&RawValue::Text("maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, WikiconfError::InvalidValue { .. }));
        assert!(err.to_string().contains("enable_uploads"));
    }

    #[test]
    fn test_coerce_int() {
        assert_eq!(
            SettingKey::MaxUploadSize.coerce(&RawValue::Text(" 2048 ".to_string())).unwrap(),
            SettingValue::Int(2048)
        );
        assert!(SettingKey::MaxUploadSize.coerce(&RawValue::Bool(true)).is_err());
    }

    #[test]
    fn test_coerce_list_from_text_splits_on_commas() {
        let value = SettingKey::MemcachedServers
            .coerce(&RawValue::Text("10.0.0.1:11211, 10.0.0.2:11211,".to_string()))
            .unwrap();
        assert_eq!(
            value,
            SettingValue::List(vec!["10.0.0.1:11211".to_string(), "10.0.0.2:11211".to_string()])
        );
    }

    #[test]
    fn test_coerce_list_into_scalar_fails() {
        let raw = RawValue::List(vec![RawValue::Text("a".to_string())]);
        assert!(SettingKey::SiteName.coerce(&raw).is_err());
    }

    #[test]
    fn test_coerce_server_url() {
        assert_eq!(
            SettingKey::Server
                .coerce(&RawValue::Text("http://localhost:8080/".to_string()))
                .unwrap(),
            SettingValue::Str("http://localhost:8080".to_string())
        );
        assert!(SettingKey::Server.coerce(&RawValue::Text("localhost".to_string())).is_err());
        assert!(SettingKey::Server
            .coerce(&RawValue::Text("ftp://example.org".to_string()))
            .is_err());
    }

    #[test]
    fn test_coerce_cache_constant_spelling() {
        assert_eq!(
            SettingKey::MainCacheType.coerce(&RawValue::Bare("CACHE_NONE".to_string())).unwrap(),
            SettingValue::Str("none".to_string())
        );
        assert_eq!(
            SettingKey::MainCacheType.coerce(&RawValue::Text("Memcached".to_string())).unwrap(),
            SettingValue::Str("memcached".to_string())
        );
        assert!(SettingKey::MainCacheType.coerce(&RawValue::Bare("redis".to_string())).is_err());
    }

    #[test]
    fn test_logo_default_uses_resource_base_path() {
        let mut values = ResolvedValues::new();
        values.insert(SettingKey::ResourceBasePath, SettingValue::Str("/w".to_string()));
        let DefaultValue::Derived(compute) = SettingKey::Logo.default_value() else {
            panic!("logo default should be derived");
        };
        assert_eq!(
            compute(&values),
            SettingValue::Str("/w/resources/assets/change-your-logo.svg".to_string())
        );
    }

    #[test]
    fn test_chained_reference_fallback_follows_every_hop() {
        let mut values = ResolvedValues::new();
        values.insert(SettingKey::ScriptPath, SettingValue::Str("/w".to_string()));
        assert_eq!(
            SettingKey::Logo.reference_fallback(&values),
            Some(SettingValue::Str("/w/resources/assets/change-your-logo.svg".to_string()))
        );

        values.insert(SettingKey::ResourceBasePath, SettingValue::Str("/res".to_string()));
        assert_eq!(
            SettingKey::LogoIcon.reference_fallback(&values),
            Some(SettingValue::Str("/res/resources/assets/change-your-logo.svg".to_string()))
        );
    }

    #[test]
    fn test_coerce_int_into_string_key() {
        assert_eq!(
            SettingKey::AuthenticationTokenVersion.coerce(&RawValue::Int(1)).unwrap(),
            SettingValue::Str("1".to_string())
        );
        assert!(SettingKey::SiteName.coerce(&RawValue::Bool(true)).is_err());
    }

    #[test]
    fn test_secret_keys_are_not_referenceable() {
        let values = ResolvedValues::new();
        assert!(SettingKey::SecretKey.reference_fallback(&values).is_none());
        assert!(SettingKey::DbPassword.reference_fallback(&values).is_none());
        assert!(SettingKey::SiteName.reference_fallback(&values).is_none());
        assert_eq!(
            SettingKey::LanguageCode.reference_fallback(&values),
            Some(SettingValue::Str("en".to_string()))
        );
    }
}
