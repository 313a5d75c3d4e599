//! Settings loader tests
//!
//! End-to-end loading of directive sources: ordering rules, guarded
//! initialization, list accumulation, defaults, coercion failures and
//! secret persistence.

use std::sync::Arc;
use tempfile::TempDir;
use wikiconf::config::{
    CacheBackend, DatabaseType, FileSecretStore, MemorySecretStore, RawValue, SecretStore,
};
use wikiconf::{SettingKey, SettingValue, SettingsLoader, WikiconfError};

const SAMPLE: &str = include_str!("../samples/docker-wiki.conf");
const MINIMAL: &str = "site_name = \"TestWiki\"\nserver = \"https://wiki.example.org/\"\n";

#[cfg(test)]
mod sample_deployment_tests {
    use super::*;

    #[test]
    fn test_sample_deployment_loads() {
        let record = SettingsLoader::new().load(SAMPLE).unwrap();

        assert_eq!(record.site.name, "DockerWiki");
        assert_eq!(record.site.server, "http://localhost:8080");
        assert_eq!(record.site.logo, "/resources/assets/change-your-logo.svg");
        assert_eq!(record.database.db_type, DatabaseType::Mysql);
        assert_eq!(record.database.server, "data");
        assert_eq!(record.database.password.expose(), "changeThis");
        assert_eq!(record.cache.main_cache_type, CacheBackend::None);
        assert!(record.cache.main_cache_type.is_noop());
        assert!(record.uploads.enable_uploads);
        assert!(!record.email.enable_email);
        assert_eq!(record.appearance.default_skin, "timeless");
        assert_eq!(
            record.appearance.skins,
            vec!["MinervaNeue", "MonoBook", "Timeless", "Vector"]
        );
        assert_eq!(record.extensions, vec!["OATHAuth"]);
        assert_eq!(record.database.shared_tables.last().map(String::as_str), Some("actor"));
        assert_eq!(record.auth.secret_key.len(), 64);
        assert_eq!(record.auth.upgrade_key.len(), 16);
        assert_eq!(record.auth.authentication_token_version, "1");
    }

    #[test]
    fn test_sample_deployment_warns_about_debug_flags() {
        let record = SettingsLoader::new().load(SAMPLE).unwrap();
        assert!(record.debug.any_enabled());
        let warnings = record.operational_warnings();
        assert_eq!(warnings.len(), 3, "{warnings:?}");
    }
}

#[cfg(test)]
mod ordering_tests {
    use super::*;

    #[test]
    fn test_identical_input_gives_identical_record() {
        let loader = SettingsLoader::new();
        let first = loader.load(SAMPLE).unwrap();
        let second = loader.load(SAMPLE).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_last_write_wins() {
        let source = format!("{MINIMAL}db_name = \"first\"\ndb_name = \"second\"\n");
        let record = SettingsLoader::new().load(&source).unwrap();
        assert_eq!(record.database.name, "second");
    }

    #[test]
    fn test_guarded_init_never_overwrites_preseeded_value() {
        let loader = SettingsLoader::new()
            .preseed(SettingKey::SecretKey, RawValue::Text("X".to_string()));
        let source = format!("{MINIMAL}secret_key ?= generate(64)\n");
        let record = loader.load(&source).unwrap();
        assert_eq!(record.auth.secret_key.expose(), "X");
    }

    #[test]
    fn test_guarded_init_never_overwrites_earlier_directive() {
        let source = format!(
            "{MINIMAL}upgrade_key = \"dd6c12193cb5c6b5\"\nupgrade_key ?= generate(16)\n"
        );
        let record = SettingsLoader::new().load(&source).unwrap();
        assert_eq!(record.auth.upgrade_key.expose(), "dd6c12193cb5c6b5");
    }

    #[test]
    fn test_enabled_modules_accumulate() {
        let source = format!("{MINIMAL}load_extension \"A\"\nload_extension \"B\"\n");
        let record = SettingsLoader::new().load(&source).unwrap();
        assert_eq!(record.extensions, vec!["A", "B"]);
    }

    #[test]
    fn test_derived_defaults_see_final_values() {
        let source = format!("{MINIMAL}script_path = \"/w\"\n");
        let record = SettingsLoader::new().load(&source).unwrap();
        assert_eq!(record.site.resource_base_path, "/w");
        assert_eq!(record.site.logo, "/w/resources/assets/change-your-logo.svg");
        assert_eq!(record.site.logo_icon, record.site.logo);
    }
}

#[cfg(test)]
mod default_and_error_tests {
    use super::*;

    #[test]
    fn test_omitted_debug_flags_default_to_false() {
        let record = SettingsLoader::new().load(MINIMAL).unwrap();
        assert!(!record.debug.show_exception_details);
        assert!(!record.debug.show_db_error_backtrace);
        assert!(!record.debug.show_sql_errors);
    }

    #[test]
    fn test_documented_defaults() {
        let record = SettingsLoader::new().load(MINIMAL).unwrap();
        assert_eq!(record.site.server, "https://wiki.example.org");
        assert_eq!(record.site.language_code, "en");
        assert_eq!(record.database.db_type, DatabaseType::Mysql);
        assert_eq!(record.database.name, "my_wiki");
        assert_eq!(record.cache.main_cache_type, CacheBackend::None);
        assert_eq!(record.uploads.max_upload_size, 104_857_600);
        assert_eq!(record.appearance.default_skin, "vector");
        assert!(record.appearance.skins.is_empty());
        assert!(record.email.enable_email);
        assert_eq!(record.get(SettingKey::Pingback), SettingValue::Bool(false));
    }

    #[test]
    fn test_malformed_boolean_fails_descriptively() {
        let source = format!("{MINIMAL}enable_uploads = \"maybe\"\n");
        let err = SettingsLoader::new().load(&source).unwrap_err();
        match &err {
            WikiconfError::InvalidValue { key, expected, value } => {
                assert_eq!(key, "enable_uploads");
                assert!(expected.contains("boolean"));
                assert!(value.contains("maybe"));
            }
            other => panic!("expected an invalid value error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_required_key_fails() {
        let err = SettingsLoader::new().load("server = \"http://localhost\"\n").unwrap_err();
        assert!(matches!(err, WikiconfError::MissingKey { ref key } if key == "site_name"));
    }

    #[test]
    fn test_invalid_choice_fails() {
        let source = format!("{MINIMAL}db_type = oracle\n");
        assert!(SettingsLoader::new().load(&source).is_err());
    }
}

#[cfg(test)]
mod secret_persistence_tests {
    use super::*;

    #[test]
    fn test_generated_secret_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("wiki.conf.secrets.toml");

        let first = SettingsLoader::new()
            .with_secret_store(Arc::new(FileSecretStore::new(&path)))
            .load(MINIMAL)
            .unwrap();
        let second = SettingsLoader::new()
            .with_secret_store(Arc::new(FileSecretStore::new(&path)))
            .load(MINIMAL)
            .unwrap();

        assert_eq!(first.auth.secret_key, second.auth.secret_key);
        assert_eq!(first.auth.upgrade_key, second.auth.upgrade_key);

        let keys: Vec<String> = FileSecretStore::new(&path)
            .entries()
            .unwrap()
            .into_iter()
            .map(|entry| entry.key)
            .collect();
        assert_eq!(keys, vec!["secret_key", "upgrade_key"]);
    }

    #[test]
    fn test_explicit_secret_is_not_persisted() {
        let store = Arc::new(MemorySecretStore::new());
        let source = format!("{MINIMAL}secret_key = \"fixed\"\nupgrade_key = \"fixed-too\"\n");
        SettingsLoader::new()
            .with_secret_store(store.clone())
            .load(&source)
            .unwrap();
        assert_eq!(store.get("secret_key").unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_file() {
        let temp_dir = TempDir::new().unwrap();
        let source_path = temp_dir.path().join("wiki.conf");
        tokio::fs::write(&source_path, SAMPLE).await.unwrap();

        let store_path = FileSecretStore::path_for_source(&source_path);
        let loader =
            SettingsLoader::new().with_secret_store(Arc::new(FileSecretStore::new(&store_path)));
        let record = loader.load_file(&source_path).await.unwrap();

        assert_eq!(record.site.name, "DockerWiki");
        assert!(store_path.exists());
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let err = SettingsLoader::new()
            .load_file(&temp_dir.path().join("absent.conf"))
            .await
            .unwrap_err();
        assert!(matches!(err, WikiconfError::IoError(_)));
    }
}

#[cfg(test)]
mod override_tests {
    use super::*;

    #[test]
    fn test_environment_overrides_win() {
        std::env::set_var("WIKICONF_ENVTEST_A_DB_PASSWORD", "from-env");
        std::env::set_var("WIKICONF_ENVTEST_A_ENABLE_UPLOADS", "off");
        std::env::set_var("WIKICONF_ENVTEST_A_NOT_A_SETTING", "ignored");

        let record = SettingsLoader::new()
            .with_env_overrides("WIKICONF_ENVTEST_A")
            .unwrap()
            .load(SAMPLE)
            .unwrap();

        assert_eq!(record.database.password.expose(), "from-env");
        assert!(!record.uploads.enable_uploads);
    }

    #[test]
    fn test_environment_override_is_coerced() {
        std::env::set_var("WIKICONF_ENVTEST_B_SHOW_SQL_ERRORS", "maybe");

        let err = SettingsLoader::new()
            .with_env_overrides("WIKICONF_ENVTEST_B")
            .unwrap()
            .load(MINIMAL)
            .unwrap_err();
        assert!(matches!(err, WikiconfError::InvalidValue { .. }));
    }

    #[test]
    fn test_preseeded_list_replaces_appends() {
        let record = SettingsLoader::new()
            .preseed_named("skins", "Vector, MonoBook")
            .unwrap()
            .load(SAMPLE)
            .unwrap();
        assert_eq!(record.appearance.skins, vec!["Vector", "MonoBook"]);
    }
}

#[cfg(test)]
mod publication_tests {
    use super::*;

    #[test]
    fn test_shared_record_is_readable_from_many_threads() {
        let shared = SettingsLoader::new().load_shared(SAMPLE).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let settings = Arc::clone(&shared);
                std::thread::spawn(move || settings.site.name.clone())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), "DockerWiki");
        }
    }
}
