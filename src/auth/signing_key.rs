//! Token signing key.
//!
//! The key is either:
//! - Taken from the configured secret (`JWT_SECRET`, persistent mode)
//! - Generated randomly at startup (ephemeral mode; tokens die with the process)

use std::fmt;

use ring::rand::{SecureRandom, SystemRandom};
use tracing::warn;

use super::{AuthError, AuthResult};

/// Length of a generated key in bytes.
pub const EPHEMERAL_KEY_LENGTH: usize = 32;

/// HMAC key material and whether it survives a restart.
#[derive(Clone)]
pub struct SigningKey {
    secret: Vec<u8>,
    persistent: bool,
}

impl SigningKey {
    /// Use `secret` when present and non-empty, otherwise generate an ephemeral key.
    pub fn resolve(secret: Option<&str>) -> AuthResult<Self> {
        match secret.filter(|s| !s.is_empty()) {
            Some(secret) => Ok(Self {
                secret: secret.as_bytes().to_vec(),
                persistent: true,
            }),
            None => {
                warn!("JWT_SECRET is not set; using an ephemeral signing key, tokens will not survive a restart");
                Self::ephemeral()
            }
        }
    }

    /// A random key.
    pub fn ephemeral() -> AuthResult<Self> {
        let mut secret = vec![0u8; EPHEMERAL_KEY_LENGTH];
        SystemRandom::new()
            .fill(&mut secret)
            .map_err(|_| AuthError::Crypto("random generator failed"))?;
        Ok(Self {
            secret,
            persistent: false,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.secret
    }

    /// Whether the key came from configuration.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("secret", &"***")
            .field("persistent", &self.persistent)
            .finish()
    }
}
