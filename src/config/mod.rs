//! Configuration module for semsql.
//!
//! Handles connection configuration, environment variables, and settings.

mod connection;
mod settings;

pub use connection::{redact_url, ConnectionConfig, ConnectionError, Driver};
pub use settings::{
    expand_env_vars, AuthSettings, DatabaseSettings, LlmSettings, PoolSettings, SemanticSettings,
    ServerSettings, Settings, SettingsError,
};
