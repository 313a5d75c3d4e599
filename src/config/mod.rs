//! Configuration management module
//!
//! Parses directive sources, applies them over externally pre-seeded values,
//! resolves schema defaults and persisted secrets, and produces the immutable
//! settings record handed to every consumer.

pub mod directive;
pub mod loader;
pub mod schema;
pub mod secret;
pub mod settings;

pub use directive::{parse_directives, Directive, DirectiveOp, RawValue};
pub use loader::*;
pub use schema::{SettingKey, SettingValue, ValueKind};
pub use secret::{FileSecretStore, MemorySecretStore, Secret, SecretStore};
pub use settings::*;
