//! Access control.
//!
//! Users register with a username and password; only a salted hash is
//! stored. Login mints a signed, stateless bearer token which protected
//! endpoints verify on every request.
//!
//! ```text
//! Anonymous ──login──▶ Authenticated ──expiry / no token──▶ Anonymous
//! ```

pub mod password;
pub mod signing_key;
pub mod store;
pub mod token;

pub use signing_key::SigningKey;
pub use store::{UserRecord, UserStore};
pub use token::{Algorithm, Claims, TokenSigner};

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use crate::config::AuthSettings;

/// Result type for access control.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors raised by access control.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown user or wrong password.
    #[error("Incorrect username or password")]
    InvalidCredentials,

    /// Missing, malformed, expired or forged token.
    #[error("Could not validate credentials")]
    InvalidToken,

    /// The username is already registered.
    #[error("Username already registered")]
    Conflict,

    /// The request carried an unusable username or password.
    #[error("{0}")]
    Validation(String),

    /// Invalid auth configuration.
    #[error("auth configuration error: {0}")]
    Config(String),

    #[error("user store error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("crypto error: {0}")]
    Crypto(&'static str),

    #[error("auth task failed: {0}")]
    Task(String),
}

impl AuthError {
    /// Whether this failure means "not authenticated".
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AuthError::InvalidCredentials | AuthError::InvalidToken)
    }
}

/// Trim and lower-case a username. Empty names are rejected.
pub fn normalize_username(raw: &str) -> AuthResult<String> {
    let username = raw.trim().to_lowercase();
    if username.is_empty() {
        return Err(AuthError::Validation("username must not be empty".to_string()));
    }
    Ok(username)
}

/// Registration, login and token verification.
pub struct AccessControl {
    users: UserStore,
    signer: TokenSigner,
    hash_iterations: u32,
}

impl AccessControl {
    pub fn new(users: UserStore, signer: TokenSigner) -> Self {
        Self {
            users,
            signer,
            hash_iterations: password::DEFAULT_ITERATIONS,
        }
    }

    /// Open the configured user store and build the token signer.
    pub fn from_settings(settings: &AuthSettings) -> AuthResult<Self> {
        let users = UserStore::open(&settings.user_db_path)?;
        let signer = TokenSigner::from_settings(settings)?;
        Ok(Self::new(users, signer))
    }

    /// Override the PBKDF2 iteration count for new hashes.
    pub fn with_hash_iterations(mut self, iterations: u32) -> Self {
        self.hash_iterations = iterations;
        self
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    /// Register a new user.
    pub async fn register(&self, username: &str, password: &str) -> AuthResult<()> {
        let username = normalize_username(username)?;
        if password.is_empty() {
            return Err(AuthError::Validation("password must not be empty".to_string()));
        }

        if self.users.find(&username).await?.is_some() {
            return Err(AuthError::Conflict);
        }

        let password = password.to_string();
        let iterations = self.hash_iterations;
        let password_hash =
            tokio::task::spawn_blocking(move || password::hash_password(&password, iterations))
                .await
                .map_err(|e| AuthError::Task(e.to_string()))??;

        self.users
            .insert(UserRecord {
                username: username.clone(),
                password_hash,
                created_at: Utc::now(),
            })
            .await?;

        info!(user = %username, "user registered");
        Ok(())
    }

    /// Check credentials and mint a token.
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<String> {
        let username = normalize_username(username)?;
        if password.is_empty() {
            return Err(AuthError::Validation("password must not be empty".to_string()));
        }

        let Some(record) = self.users.find(&username).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || {
            password::verify_password(&password, &record.password_hash)
        })
        .await
        .map_err(|e| AuthError::Task(e.to_string()))?;

        if !matches {
            return Err(AuthError::InvalidCredentials);
        }

        info!(user = %username, "user logged in");
        self.signer.issue(&username)
    }

    /// Verify a bearer token and return its username.
    pub fn verify(&self, token: &str) -> AuthResult<String> {
        self.signer.verify(token)
    }
}
