use thiserror::Error;

/// Main error type for wikiconf operations
#[derive(Debug, Error)]
pub enum WikiconfError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Missing required setting '{key}': it has no default and was not supplied")]
    MissingKey { key: String },

    #[error("Unknown setting '{key}' at line {line}")]
    UnknownKey { key: String, line: usize },

    #[error("Invalid value for '{key}': expected {expected}, got {value}")]
    InvalidValue {
        key: String,
        expected: String,
        value: String,
    },

    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Invalid operation on '{key}': {message}")]
    InvalidOperation { key: String, message: String },

    #[error("Secret store error: {0}")]
    SecretStoreError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("Environment loading error: {0}")]
    ConfigLoadError(#[from] config::ConfigError),
}

impl WikiconfError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn missing_key<S: Into<String>>(key: S) -> Self {
        Self::MissingKey { key: key.into() }
    }

    pub fn unknown_key<S: Into<String>>(key: S, line: usize) -> Self {
        Self::UnknownKey {
            key: key.into(),
            line,
        }
    }

    pub fn invalid_value<K, E, V>(key: K, expected: E, value: V) -> Self
    where
        K: Into<String>,
        E: Into<String>,
        V: Into<String>,
    {
        Self::InvalidValue {
            key: key.into(),
            expected: expected.into(),
            value: value.into(),
        }
    }

    pub fn parse<S: Into<String>>(line: usize, message: S) -> Self {
        Self::ParseError {
            line,
            message: message.into(),
        }
    }

    pub fn invalid_operation<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self::InvalidOperation {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn secret_store<S: Into<String>>(msg: S) -> Self {
        Self::SecretStoreError(msg.into())
    }

    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Self::SerializationError(msg.into())
    }
}

/// Result type alias for wikiconf operations
pub type Result<T> = std::result::Result<T, WikiconfError>;
