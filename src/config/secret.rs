//! Secret values and their persistence
//!
//! Signing secrets are generated once, on the first load that finds them
//! missing, and persisted so that later loads reuse the same value.
//! Regenerating on every start would invalidate all sessions and tokens.

use crate::error::{Result, WikiconfError};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

const MASK: &str = "********";

/// A secret string, wiped from memory on drop and never printed
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Random lower-case hex string of `length` characters from the OS CSPRNG
    pub fn generate(length: usize) -> Self {
        let mut bytes = Zeroizing::new(vec![0u8; length.div_ceil(2)]);
        OsRng.fill_bytes(&mut bytes);
        let mut encoded = hex::encode(bytes.as_slice());
        encoded.truncate(length);
        Self::new(encoded)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Short SHA-256 prefix, safe to print when comparing deployments
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        format!("sha256:{}", &hex::encode(digest)[..12])
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({MASK})")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("(empty)")
        } else {
            f.write_str(&self.fingerprint())
        }
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.is_empty() {
            serializer.serialize_str("")
        } else {
            serializer.serialize_str(MASK)
        }
    }
}

/// Persistence for generated secrets
pub trait SecretStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Secret>>;

    fn put(&self, key: &str, secret: &Secret) -> Result<()>;

    /// Where the secrets live, for log messages
    fn location(&self) -> String;

    /// Return the persisted secret for `key`, generating and persisting one
    /// of `length` hex characters when none exists.
    fn get_or_generate(&self, key: &str, length: usize) -> Result<Secret> {
        if let Some(existing) = self.get(key)? {
            if existing.len() != length {
                warn!(
                    "Persisted secret '{}' has {} characters, expected {}; keeping it",
                    key,
                    existing.len(),
                    length
                );
            }
            debug!("Reusing persisted secret '{}' from {}", key, self.location());
            return Ok(existing);
        }

        let secret = Secret::generate(length);
        self.put(key, &secret)?;
        info!(
            "Generated secret '{}' ({}) and stored it in {}",
            key,
            secret.fingerprint(),
            self.location()
        );
        Ok(secret)
    }
}

/// Process-local store; secrets survive only as long as the store itself
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<BTreeMap<String, Secret>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Result<Option<Secret>> {
        let secrets = self
            .secrets
            .lock()
            .map_err(|_| WikiconfError::secret_store("memory store lock poisoned"))?;
        Ok(secrets.get(key).cloned())
    }

    fn put(&self, key: &str, secret: &Secret) -> Result<()> {
        let mut secrets = self
            .secrets
            .lock()
            .map_err(|_| WikiconfError::secret_store("memory store lock poisoned"))?;
        secrets.insert(key.to_string(), secret.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSecret {
    value: String,
    length: usize,
    generated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSecrets {
    #[serde(default)]
    secrets: BTreeMap<String, StoredSecret>,
}

/// Summary of a persisted secret, without its value
#[derive(Debug, Clone, PartialEq)]
pub struct SecretEntry {
    pub key: String,
    pub length: usize,
    pub generated_at: DateTime<Utc>,
    pub fingerprint: String,
}

/// TOML file store, written with owner-only permissions
#[derive(Debug)]
pub struct FileSecretStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    guard: Mutex<()>,
}

impl FileSecretStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Secrets file kept next to a directive source: `wiki.conf` stores its
    /// secrets in `wiki.conf.secrets.toml`
    pub fn path_for_source(source: &Path) -> PathBuf {
        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "settings".to_string());
        source.with_file_name(format!("{file_name}.secrets.toml"))
    }

    /// Per-user fallback location when no directive file is involved
    pub fn global_path() -> Result<PathBuf> {
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        {
            use std::env;
            let config_dir = if let Ok(xdg_config_home) = env::var("XDG_CONFIG_HOME") {
                PathBuf::from(xdg_config_home)
            } else {
                let home_dir = env::var("HOME")
                    .map_err(|_| WikiconfError::config("HOME environment variable not set"))?;
                PathBuf::from(home_dir).join(".config")
            };
            Ok(config_dir.join("wikiconf").join("secrets.toml"))
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            let config_dir = dirs::config_dir()
                .ok_or_else(|| WikiconfError::config("Unable to determine config directory"))?;
            Ok(config_dir.join("wikiconf").join("secrets.toml"))
        }
    }

    /// Persisted secrets, sorted by key
    pub fn entries(&self) -> Result<Vec<SecretEntry>> {
        let stored = self.read()?;
        Ok(stored
            .secrets
            .into_iter()
            .map(|(key, entry)| {
                let value = Secret::new(entry.value);
                SecretEntry {
                    key,
                    length: entry.length,
                    generated_at: entry.generated_at,
                    fingerprint: value.fingerprint(),
                }
            })
            .collect())
    }

    fn read(&self) -> Result<StoredSecrets> {
        if !self.path.exists() {
            return Ok(StoredSecrets::default());
        }
        let contents = Zeroizing::new(std::fs::read_to_string(&self.path)?);
        Ok(toml::from_str(&contents)?)
    }

    fn write(&self, stored: &StoredSecrets) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let contents = Zeroizing::new(
            toml::to_string_pretty(stored)
                .map_err(|e| WikiconfError::serialization(e.to_string()))?,
        );

        let temp_path = self.path.with_extension("toml.tmp");
        std::fs::write(&temp_path, contents.as_bytes())?;
        restrict_permissions(&temp_path)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl SecretStore for FileSecretStore {
    fn get(&self, key: &str) -> Result<Option<Secret>> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| WikiconfError::secret_store("file store lock poisoned"))?;
        let stored = self.read()?;
        Ok(stored.secrets.get(key).map(|entry| Secret::new(entry.value.clone())))
    }

    fn put(&self, key: &str, secret: &Secret) -> Result<()> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| WikiconfError::secret_store("file store lock poisoned"))?;
        let mut stored = self.read()?;
        stored.secrets.insert(
            key.to_string(),
            StoredSecret {
                value: secret.expose().to_string(),
                length: secret.len(),
                generated_at: Utc::now(),
            },
        );
        self.write(&stored)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
