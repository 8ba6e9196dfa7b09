//! TOML-based configuration for semsql.
//!
//! Supports a config file (semsql.toml) with environment variable expansion,
//! followed by plain environment variable overrides.
//!
//! Example configuration:
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8000
//!
//! [database]
//! url = "sqlite:///warehouse.db"
//! query_timeout_secs = 30
//!
//! [database.pool]
//! max_open_conns = 8
//!
//! [llm]
//! provider = "ollama"
//! model = "llama3.2"
//! base_url = "http://localhost:11434"
//!
//! [auth]
//! secret = "${JWT_SECRET}"
//! algorithm = "HS256"
//! token_ttl_minutes = 60
//!
//! [semantic]
//! path = "config/semantic_layer.json"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use super::connection::{ConnectionConfig, ConnectionError};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// HTTP listener.
    pub server: ServerSettings,

    /// Target database.
    pub database: DatabaseSettings,

    /// Language model provider.
    pub llm: LlmSettings,

    /// Token issuing and the user store.
    pub auth: AuthSettings,

    /// Semantic layer document.
    pub semantic: SemanticSettings,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Target database settings.
///
/// `url` wins over the individual components when both are present.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Connection URL (supports ${ENV_VAR} expansion).
    pub url: Option<String>,

    pub driver: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,

    /// Explicit SQL dialect for prompts. Derived from the URL when unset.
    pub dialect: Option<String>,

    /// Per-statement time limit.
    pub query_timeout_secs: u64,

    /// Connection pool settings.
    pub pool: PoolSettings,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            driver: None,
            host: None,
            port: None,
            name: None,
            user: None,
            password: None,
            dialect: None,
            query_timeout_secs: 30,
            pool: PoolSettings::default(),
        }
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("url", &self.url.as_deref().map(super::connection::redact_url))
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("dialect", &self.dialect)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .field("pool", &self.pool)
            .finish()
    }
}

impl DatabaseSettings {
    /// Resolve the connection configuration.
    ///
    /// Without a URL or a driver, falls back to `sqlite:///data.db`.
    pub fn connection(&self) -> Result<ConnectionConfig, ConnectionError> {
        if let Some(url) = &self.url {
            return ConnectionConfig::from_url(url);
        }

        match &self.driver {
            Some(driver) => ConnectionConfig::from_parts(
                driver,
                self.host.clone(),
                self.name.clone(),
                self.port,
                self.user.clone(),
                self.password.clone(),
            ),
            None => ConnectionConfig::from_url(DEFAULT_DATABASE_URL),
        }
    }

    /// The SQL dialect the language model should target.
    pub fn dialect(&self) -> String {
        let url = self
            .url
            .clone()
            .or_else(|| self.connection().ok().map(|c| c.to_url()));
        crate::prompt::infer_dialect(self.dialect.as_deref(), url.as_deref())
    }
}

const DEFAULT_DATABASE_URL: &str = "sqlite:///data.db";

/// Connection pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum number of open connections.
    pub max_open_conns: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self { max_open_conns: 5 }
    }
}

/// Language model provider settings.
///
/// Compared by value: the gateway rebuilds its client whenever these change.
#[derive(Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Provider name (openai, anthropic, ollama, or a registered custom provider).
    pub provider: String,

    /// Model name. Each provider has its own default.
    pub model: Option<String>,

    /// API key for cloud providers.
    pub api_key: Option<String>,

    /// Endpoint override. Each provider has its own default.
    pub base_url: Option<String>,

    /// Per-completion time limit.
    pub timeout_secs: u64,

    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            api_key: None,
            base_url: None,
            timeout_secs: 60,
            temperature: 0.0,
        }
    }
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl LlmSettings {
    /// Settings for a named provider with defaults for everything else.
    pub fn for_provider(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Self::default()
        }
    }

    /// Lower-cased provider name used for registry lookup.
    pub fn provider_key(&self) -> String {
        self.provider.trim().to_lowercase()
    }

    /// Environment variable holding the provider-specific API key.
    fn api_key_var(provider: &str) -> Option<&'static str> {
        match provider {
            "openai" => Some("OPENAI_API_KEY"),
            "anthropic" => Some("ANTHROPIC_API_KEY"),
            _ => None,
        }
    }
}

/// Token and user store settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Token signing secret. A random key is generated when unset.
    pub secret: Option<String>,

    /// HMAC algorithm: HS256, HS384 or HS512.
    pub algorithm: String,

    /// Access token lifetime.
    pub token_ttl_minutes: i64,

    /// SQLite file holding registered users.
    pub user_db_path: PathBuf,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            secret: None,
            algorithm: "HS256".to_string(),
            token_ttl_minutes: 60,
            user_db_path: PathBuf::from("users.db"),
        }
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .field("algorithm", &self.algorithm)
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .field("user_db_path", &self.user_db_path)
            .finish()
    }
}

/// Semantic layer document settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SemanticSettings {
    pub path: PathBuf,
}

impl Default for SemanticSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("semantic_layer.json"),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML text and expand `${VAR}` references.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let mut settings: Settings = toml::from_str(content)?;
        settings.expand_env_refs()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations, then apply
    /// environment overrides.
    ///
    /// Searches in order:
    /// 1. Environment variable `SEMSQL_CONFIG`
    /// 2. `./semsql.toml`
    /// 3. `~/.config/semsql/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        let mut settings = Self::load_file()?;
        settings.apply_overrides(|key| env::var(key).ok())?;
        Ok(settings)
    }

    fn load_file() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("SEMSQL_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("semsql.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("semsql").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Expand environment references in the fields that carry URLs and secrets.
    fn expand_env_refs(&mut self) -> Result<(), SettingsError> {
        for field in [
            &mut self.database.url,
            &mut self.database.password,
            &mut self.llm.api_key,
            &mut self.llm.base_url,
            &mut self.auth.secret,
        ] {
            if let Some(value) = field.as_mut() {
                *value = expand_env_vars(value)?;
            }
        }
        Ok(())
    }

    /// Apply overrides from a key lookup (normally the process environment).
    ///
    /// Empty values are treated as unset.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SEMSQL_HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("SEMSQL_PORT") {
            self.server.port = parse_value("SEMSQL_PORT", &v)?;
        }

        let db = &mut self.database;
        if let Some(v) = get("DATABASE_URL") {
            db.url = Some(v);
        }
        if let Some(v) = get("DB_DRIVER") {
            db.driver = Some(v);
        }
        if let Some(v) = get("DB_HOST") {
            db.host = Some(v);
        }
        if let Some(v) = get("DB_PORT") {
            db.port = Some(parse_value("DB_PORT", &v)?);
        }
        if let Some(v) = get("DB_NAME") {
            db.name = Some(v);
        }
        if let Some(v) = get("DB_USER") {
            db.user = Some(v);
        }
        if let Some(v) = get("DB_PASSWORD") {
            db.password = Some(v);
        }
        if let Some(v) = get("SQL_DIALECT") {
            db.dialect = Some(v);
        }
        if let Some(v) = get("DB_POOL_SIZE") {
            db.pool.max_open_conns = parse_value("DB_POOL_SIZE", &v)?;
        }
        if let Some(v) = get("DB_QUERY_TIMEOUT_SECS") {
            db.query_timeout_secs = parse_value("DB_QUERY_TIMEOUT_SECS", &v)?;
        }

        let llm = &mut self.llm;
        if let Some(v) = get("LLM_PROVIDER") {
            llm.provider = v;
        }
        if let Some(v) = get("LLM_MODEL") {
            llm.model = Some(v);
        }
        if let Some(v) = get("LLM_BASE_URL").or_else(|| get("OLLAMA_BASE_URL")) {
            llm.base_url = Some(v);
        }
        if let Some(v) = get("LLM_TIMEOUT_SECS") {
            llm.timeout_secs = parse_value("LLM_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("LLM_API_KEY") {
            llm.api_key = Some(v);
        } else if llm.api_key.is_none() {
            if let Some(var) = LlmSettings::api_key_var(&llm.provider_key()) {
                llm.api_key = get(var);
            }
        }

        let auth = &mut self.auth;
        if let Some(v) = get("JWT_SECRET") {
            auth.secret = Some(v);
        }
        if let Some(v) = get("JWT_ALGORITHM") {
            auth.algorithm = v;
        }
        if let Some(v) = get("ACCESS_TOKEN_EXPIRE_MINUTES") {
            auth.token_ttl_minutes = parse_value("ACCESS_TOKEN_EXPIRE_MINUTES", &v)?;
        }
        if let Some(v) = get("USER_DB_PATH") {
            auth.user_db_path = PathBuf::from(v);
        }

        if let Some(v) = get("SEMANTIC_LAYER_PATH") {
            self.semantic.path = PathBuf::from(v);
        }

        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SettingsError> {
    value.trim().parse().map_err(|_| SettingsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax. A lone `$` is kept as-is.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name: String = if chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            chars.by_ref().take_while(|&ch| ch != '}').collect()
        } else {
            let mut name = String::new();
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                name.push(ch);
                chars.next();
            }
            if name.is_empty() {
                result.push('$');
                continue;
            }
            name
        };

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
