//! Resolved settings record
//!
//! The immutable result of a load. Consumers get typed groups through the
//! public fields, or a keyed view through [`SettingsRecord::get`].

use crate::config::schema::{ResolvedValues, SettingKey, SettingValue};
use crate::config::secret::Secret;
use crate::error::{Result, WikiconfError};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Database driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Mysql,
    Postgres,
    Sqlite,
}

impl FromStr for DatabaseType {
    type Err = WikiconfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mysql" => Ok(Self::Mysql),
            "postgres" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(WikiconfError::invalid_value(
                "db_type",
                "mysql, postgres or sqlite",
                other,
            )),
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mysql => "mysql",
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

/// Object cache implementation the platform should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    None,
    Db,
    Hash,
    Accel,
    Memcached,
    Anything,
}

impl CacheBackend {
    pub fn is_noop(&self) -> bool {
        matches!(self, CacheBackend::None)
    }
}

impl FromStr for CacheBackend {
    type Err = WikiconfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "db" => Ok(Self::Db),
            "hash" => Ok(Self::Hash),
            "accel" => Ok(Self::Accel),
            "memcached" => Ok(Self::Memcached),
            "anything" => Ok(Self::Anything),
            other => Err(WikiconfError::invalid_value(
                "main_cache_type",
                "a known cache type",
                other,
            )),
        }
    }
}

impl fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Db => "db",
            Self::Hash => "hash",
            Self::Accel => "accel",
            Self::Memcached => "memcached",
            Self::Anything => "anything",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteSettings {
    pub name: String,
    pub script_path: String,
    /// Canonical origin used to build absolute links
    pub server: String,
    pub resource_base_path: String,
    pub logo: String,
    pub logo_icon: String,
    pub language_code: String,
    pub local_timezone: String,
    pub disable_output_compression: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseSettings {
    pub db_type: DatabaseType,
    pub server: String,
    pub name: String,
    pub user: String,
    pub password: Secret,
    pub prefix: String,
    pub table_options: String,
    pub shared_tables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheSettings {
    pub main_cache_type: CacheBackend,
    pub memcached_servers: Vec<String>,
    /// Empty when file caching is disabled
    pub cache_directory: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailSettings {
    pub enable_email: bool,
    pub enable_user_email: bool,
    pub emergency_contact: String,
    pub password_sender: String,
    pub enotif_user_talk: bool,
    pub enotif_watchlist: bool,
    pub email_authentication: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadSettings {
    pub enable_uploads: bool,
    pub max_upload_size: i64,
    pub use_image_magick: bool,
    pub image_magick_convert_command: String,
    pub use_instant_commons: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppearanceSettings {
    pub default_skin: String,
    /// Enabled skins, in load order
    pub skins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthSettings {
    pub secret_key: Secret,
    pub authentication_token_version: String,
    pub upgrade_key: Secret,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RightsSettings {
    pub page: String,
    pub url: String,
    pub text: String,
    pub icon: String,
}

/// Verbosity of error surfaces shown to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DebugSettings {
    pub show_exception_details: bool,
    pub show_db_error_backtrace: bool,
    pub show_sql_errors: bool,
}

impl DebugSettings {
    pub fn any_enabled(&self) -> bool {
        self.show_exception_details || self.show_db_error_backtrace || self.show_sql_errors
    }
}

/// The resolved configuration of one deployment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsRecord {
    pub site: SiteSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub email: EmailSettings,
    pub uploads: UploadSettings,
    pub appearance: AppearanceSettings,
    /// Optional feature modules to activate, in load order
    pub extensions: Vec<String>,
    pub auth: AuthSettings,
    pub rights: RightsSettings,
    pub debug: DebugSettings,
    pub pingback: bool,
    pub diff3: String,
}

impl SettingsRecord {
    /// Build the record from a complete set of resolved values
    pub(crate) fn from_resolved(mut values: ResolvedValues) -> Result<Self> {
        let mut take = |key: SettingKey| {
            values
                .remove(&key)
                .ok_or_else(|| WikiconfError::missing_key(key.name()))
        };

        Ok(Self {
            site: SiteSettings {
                name: string(SettingKey::SiteName, take(SettingKey::SiteName)?)?,
                script_path: string(SettingKey::ScriptPath, take(SettingKey::ScriptPath)?)?,
                server: string(SettingKey::Server, take(SettingKey::Server)?)?,
                resource_base_path: string(
                    SettingKey::ResourceBasePath,
                    take(SettingKey::ResourceBasePath)?,
                )?,
                logo: string(SettingKey::Logo, take(SettingKey::Logo)?)?,
                logo_icon: string(SettingKey::LogoIcon, take(SettingKey::LogoIcon)?)?,
                language_code: string(SettingKey::LanguageCode, take(SettingKey::LanguageCode)?)?,
                local_timezone: string(
                    SettingKey::LocalTimezone,
                    take(SettingKey::LocalTimezone)?,
                )?,
                disable_output_compression: boolean(
                    SettingKey::DisableOutputCompression,
                    take(SettingKey::DisableOutputCompression)?,
                )?,
            },
            database: DatabaseSettings {
                db_type: string(SettingKey::DbType, take(SettingKey::DbType)?)?.parse()?,
                server: string(SettingKey::DbServer, take(SettingKey::DbServer)?)?,
                name: string(SettingKey::DbName, take(SettingKey::DbName)?)?,
                user: string(SettingKey::DbUser, take(SettingKey::DbUser)?)?,
                password: secret(SettingKey::DbPassword, take(SettingKey::DbPassword)?)?,
                prefix: string(SettingKey::DbPrefix, take(SettingKey::DbPrefix)?)?,
                table_options: string(
                    SettingKey::DbTableOptions,
                    take(SettingKey::DbTableOptions)?,
                )?,
                shared_tables: list(SettingKey::SharedTables, take(SettingKey::SharedTables)?)?,
            },
            cache: CacheSettings {
                main_cache_type: string(
                    SettingKey::MainCacheType,
                    take(SettingKey::MainCacheType)?,
                )?
                .parse()?,
                memcached_servers: list(
                    SettingKey::MemcachedServers,
                    take(SettingKey::MemcachedServers)?,
                )?,
                cache_directory: string(
                    SettingKey::CacheDirectory,
                    take(SettingKey::CacheDirectory)?,
                )?,
            },
            email: EmailSettings {
                enable_email: boolean(SettingKey::EnableEmail, take(SettingKey::EnableEmail)?)?,
                enable_user_email: boolean(
                    SettingKey::EnableUserEmail,
                    take(SettingKey::EnableUserEmail)?,
                )?,
                emergency_contact: string(
                    SettingKey::EmergencyContact,
                    take(SettingKey::EmergencyContact)?,
                )?,
                password_sender: string(
                    SettingKey::PasswordSender,
                    take(SettingKey::PasswordSender)?,
                )?,
                enotif_user_talk: boolean(
                    SettingKey::EnotifUserTalk,
                    take(SettingKey::EnotifUserTalk)?,
                )?,
                enotif_watchlist: boolean(
                    SettingKey::EnotifWatchlist,
                    take(SettingKey::EnotifWatchlist)?,
                )?,
                email_authentication: boolean(
                    SettingKey::EmailAuthentication,
                    take(SettingKey::EmailAuthentication)?,
                )?,
            },
            uploads: UploadSettings {
                enable_uploads: boolean(
                    SettingKey::EnableUploads,
                    take(SettingKey::EnableUploads)?,
                )?,
                max_upload_size: integer(
                    SettingKey::MaxUploadSize,
                    take(SettingKey::MaxUploadSize)?,
                )?,
                use_image_magick: boolean(
                    SettingKey::UseImageMagick,
                    take(SettingKey::UseImageMagick)?,
                )?,
                image_magick_convert_command: string(
                    SettingKey::ImageMagickConvertCommand,
                    take(SettingKey::ImageMagickConvertCommand)?,
                )?,
                use_instant_commons: boolean(
                    SettingKey::UseInstantCommons,
                    take(SettingKey::UseInstantCommons)?,
                )?,
            },
            appearance: AppearanceSettings {
                default_skin: string(SettingKey::DefaultSkin, take(SettingKey::DefaultSkin)?)?,
                skins: list(SettingKey::Skins, take(SettingKey::Skins)?)?,
            },
            extensions: list(SettingKey::Extensions, take(SettingKey::Extensions)?)?,
            auth: AuthSettings {
                secret_key: secret(SettingKey::SecretKey, take(SettingKey::SecretKey)?)?,
                authentication_token_version: string(
                    SettingKey::AuthenticationTokenVersion,
                    take(SettingKey::AuthenticationTokenVersion)?,
                )?,
                upgrade_key: secret(SettingKey::UpgradeKey, take(SettingKey::UpgradeKey)?)?,
            },
            rights: RightsSettings {
                page: string(SettingKey::RightsPage, take(SettingKey::RightsPage)?)?,
                url: string(SettingKey::RightsUrl, take(SettingKey::RightsUrl)?)?,
                text: string(SettingKey::RightsText, take(SettingKey::RightsText)?)?,
                icon: string(SettingKey::RightsIcon, take(SettingKey::RightsIcon)?)?,
            },
            debug: DebugSettings {
                show_exception_details: boolean(
                    SettingKey::ShowExceptionDetails,
                    take(SettingKey::ShowExceptionDetails)?,
                )?,
                show_db_error_backtrace: boolean(
                    SettingKey::ShowDbErrorBacktrace,
                    take(SettingKey::ShowDbErrorBacktrace)?,
                )?,
                show_sql_errors: boolean(
                    SettingKey::ShowSqlErrors,
                    take(SettingKey::ShowSqlErrors)?,
                )?,
            },
            pingback: boolean(SettingKey::Pingback, take(SettingKey::Pingback)?)?,
            diff3: string(SettingKey::Diff3, take(SettingKey::Diff3)?)?,
        })
    }

    /// Keyed view of one setting
    pub fn get(&self, key: SettingKey) -> SettingValue {
        use SettingKey::*;
        let s = |value: &String| SettingValue::Str(value.clone());
        let b = |value: bool| SettingValue::Bool(value);
        let l = |value: &Vec<String>| SettingValue::List(value.clone());
        let x = |value: &Secret| SettingValue::Secret(value.clone());

        match key {
            SiteName => s(&self.site.name),
            ScriptPath => s(&self.site.script_path),
            Server => s(&self.site.server),
            ResourceBasePath => s(&self.site.resource_base_path),
            Logo => s(&self.site.logo),
            LogoIcon => s(&self.site.logo_icon),
            LanguageCode => s(&self.site.language_code),
            LocalTimezone => s(&self.site.local_timezone),
            DisableOutputCompression => b(self.site.disable_output_compression),
            DbType => SettingValue::Str(self.database.db_type.to_string()),
            DbServer => s(&self.database.server),
            DbName => s(&self.database.name),
            DbUser => s(&self.database.user),
            DbPassword => x(&self.database.password),
            DbPrefix => s(&self.database.prefix),
            DbTableOptions => s(&self.database.table_options),
            SharedTables => l(&self.database.shared_tables),
            MainCacheType => SettingValue::Str(self.cache.main_cache_type.to_string()),
            MemcachedServers => l(&self.cache.memcached_servers),
            CacheDirectory => s(&self.cache.cache_directory),
            EnableEmail => b(self.email.enable_email),
            EnableUserEmail => b(self.email.enable_user_email),
            EmergencyContact => s(&self.email.emergency_contact),
            PasswordSender => s(&self.email.password_sender),
            EnotifUserTalk => b(self.email.enotif_user_talk),
            EnotifWatchlist => b(self.email.enotif_watchlist),
            EmailAuthentication => b(self.email.email_authentication),
            EnableUploads => b(self.uploads.enable_uploads),
            MaxUploadSize => SettingValue::Int(self.uploads.max_upload_size),
            UseImageMagick => b(self.uploads.use_image_magick),
            ImageMagickConvertCommand => s(&self.uploads.image_magick_convert_command),
            UseInstantCommons => b(self.uploads.use_instant_commons),
            Pingback => b(self.pingback),
            DefaultSkin => s(&self.appearance.default_skin),
            Skins => l(&self.appearance.skins),
            Extensions => l(&self.extensions),
            SecretKey => x(&self.auth.secret_key),
            AuthenticationTokenVersion => s(&self.auth.authentication_token_version),
            UpgradeKey => x(&self.auth.upgrade_key),
            RightsPage => s(&self.rights.page),
            RightsUrl => s(&self.rights.url),
            RightsText => s(&self.rights.text),
            RightsIcon => s(&self.rights.icon),
            Diff3 => s(&self.diff3),
            ShowExceptionDetails => b(self.debug.show_exception_details),
            ShowDbErrorBacktrace => b(self.debug.show_db_error_backtrace),
            ShowSqlErrors => b(self.debug.show_sql_errors),
        }
    }

    /// All settings in schema order
    pub fn entries(&self) -> Vec<(SettingKey, SettingValue)> {
        SettingKey::ALL.iter().map(|key| (*key, self.get(*key))).collect()
    }

    /// Valid but risky settings worth surfacing to an operator.
    ///
    /// The loader never rejects these; whether they are appropriate depends
    /// on the environment the deployment runs in.
    pub fn operational_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.debug.show_exception_details {
            warnings.push(
                "show_exception_details is enabled: exception traces are shown to clients"
                    .to_string(),
            );
        }
        if self.debug.show_db_error_backtrace {
            warnings.push(
                "show_db_error_backtrace is enabled: database backtraces are shown to clients"
                    .to_string(),
            );
        }
        if self.debug.show_sql_errors {
            warnings.push(
                "show_sql_errors is enabled: SQL error text is shown to clients".to_string(),
            );
        }
        if self.database.db_type != DatabaseType::Sqlite && self.database.password.is_empty() {
            warnings.push(format!(
                "db_password is empty for the {} driver",
                self.database.db_type
            ));
        }
        if self.uploads.enable_uploads
            && self.uploads.use_image_magick
            && self.uploads.image_magick_convert_command.trim().is_empty()
        {
            warnings.push(
                "use_image_magick is enabled but image_magick_convert_command is empty"
                    .to_string(),
            );
        }
        if self.cache.main_cache_type == CacheBackend::Memcached
            && self.cache.memcached_servers.is_empty()
        {
            warnings.push(
                "main_cache_type is memcached but memcached_servers is empty".to_string(),
            );
        }

        warnings
    }
}

fn mismatch(key: SettingKey, value: &SettingValue) -> WikiconfError {
    WikiconfError::invalid_value(key.name(), key.kind().describe(), value.to_string())
}

fn string(key: SettingKey, value: SettingValue) -> Result<String> {
    match value {
        SettingValue::Str(s) => Ok(s),
        other => Err(mismatch(key, &other)),
    }
}

fn boolean(key: SettingKey, value: SettingValue) -> Result<bool> {
    value.as_bool().ok_or_else(|| mismatch(key, &value))
}

fn integer(key: SettingKey, value: SettingValue) -> Result<i64> {
    value.as_int().ok_or_else(|| mismatch(key, &value))
}

fn list(key: SettingKey, value: SettingValue) -> Result<Vec<String>> {
    match value {
        SettingValue::List(items) => Ok(items),
        other => Err(mismatch(key, &other)),
    }
}

fn secret(key: SettingKey, value: SettingValue) -> Result<Secret> {
    match value {
        SettingValue::Secret(s) => Ok(s),
        other => Err(mismatch(key, &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::DefaultValue;

    fn complete_values() -> ResolvedValues {
        let mut values = ResolvedValues::new();
        for key in SettingKey::ALL {
            let value = match key.default_value() {
                DefaultValue::Value(value) => value,
                DefaultValue::Derived(compute) => compute(&values),
                DefaultValue::Generated { length } => {
                    SettingValue::Secret(Secret::generate(length))
                }
                DefaultValue::Required => match key {
                    SettingKey::Server => SettingValue::Str("http://localhost:8080".to_string()),
                    _ => SettingValue::Str("TestWiki".to_string()),
                },
            };
            values.insert(key, value);
        }
        values
    }

    #[test]
    fn test_from_resolved_and_keyed_view_agree() {
        let values = complete_values();
        let record = SettingsRecord::from_resolved(values.clone()).unwrap();
        for (key, value) in record.entries() {
            assert_eq!(values.get(&key), Some(&value), "mismatch for {key}");
        }
    }

    #[test]
    fn test_from_resolved_reports_missing_key() {
        let mut values = complete_values();
        values.remove(&SettingKey::DbName);
        let err = SettingsRecord::from_resolved(values).unwrap_err();
        assert!(matches!(err, WikiconfError::MissingKey { ref key } if key == "db_name"));
    }

    #[test]
    fn test_from_resolved_rejects_wrong_kind() {
        let mut values = complete_values();
        values.insert(SettingKey::EnableUploads, SettingValue::Str("yes".to_string()));
        assert!(SettingsRecord::from_resolved(values).is_err());
    }

    #[test]
    fn test_defaults_have_no_warnings_except_empty_password() {
        let record = SettingsRecord::from_resolved(complete_values()).unwrap();
        assert!(!record.debug.any_enabled());
        assert_eq!(
            record.operational_warnings(),
            vec!["db_password is empty for the mysql driver".to_string()]
        );
    }

    #[test]
    fn test_debug_flags_produce_warnings() {
        let mut record = SettingsRecord::from_resolved(complete_values()).unwrap();
        record.database.db_type = DatabaseType::Sqlite;
        record.debug.show_sql_errors = true;
        let warnings = record.operational_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("show_sql_errors"));
    }

    #[test]
    fn test_serialized_record_masks_secrets() {
        let record = SettingsRecord::from_resolved(complete_values()).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["auth"]["secret_key"], "********");
        assert_eq!(json["database"]["password"], "");
        assert_eq!(json["cache"]["main_cache_type"], "none");
    }
}
