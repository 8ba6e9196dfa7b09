//! Stateless bearer tokens.
//!
//! Compact JWS: `base64url(header).base64url(claims).base64url(hmac)`, no
//! padding. Nothing is stored server-side; a token is valid while its
//! signature checks out and `exp` lies in the future.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine};
use chrono::{DateTime, Duration, Utc};
use ring::hmac;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::signing_key::SigningKey;
use super::{AuthError, AuthResult};
use crate::config::AuthSettings;

/// HMAC signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    HS256,
    HS384,
    HS512,
}

impl Algorithm {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> AuthResult<Self> {
        match s.trim().to_uppercase().as_str() {
            "HS256" => Ok(Algorithm::HS256),
            "HS384" => Ok(Algorithm::HS384),
            "HS512" => Ok(Algorithm::HS512),
            _ => Err(AuthError::Config(format!(
                "unsupported token algorithm '{}'. Supported: HS256, HS384, HS512",
                s
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::HS256 => "HS256",
            Algorithm::HS384 => "HS384",
            Algorithm::HS512 => "HS512",
        }
    }

    fn hmac(&self) -> hmac::Algorithm {
        match self {
            Algorithm::HS256 => hmac::HMAC_SHA256,
            Algorithm::HS384 => hmac::HMAC_SHA384,
            Algorithm::HS512 => hmac::HMAC_SHA512,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Username.
    pub sub: String,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
    /// Issue time, seconds since the epoch.
    pub iat: i64,
}

/// Issues and verifies tokens with one key and algorithm.
pub struct TokenSigner {
    key: hmac::Key,
    algorithm: Algorithm,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(key: &SigningKey, algorithm: Algorithm, ttl: Duration) -> Self {
        Self {
            key: hmac::Key::new(algorithm.hmac(), key.bytes()),
            algorithm,
            ttl,
        }
    }

    /// Signer for the configured secret, algorithm and lifetime.
    pub fn from_settings(settings: &AuthSettings) -> AuthResult<Self> {
        let algorithm = Algorithm::from_str(&settings.algorithm)?;
        if settings.token_ttl_minutes <= 0 {
            return Err(AuthError::Config(format!(
                "token lifetime must be positive, got {} minutes",
                settings.token_ttl_minutes
            )));
        }
        let key = SigningKey::resolve(settings.secret.as_deref())?;
        Ok(Self::new(&key, algorithm, Duration::minutes(settings.token_ttl_minutes)))
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Mint a token for `subject`.
    pub fn issue(&self, subject: &str) -> AuthResult<String> {
        self.issue_at(subject, Utc::now())
    }

    pub(crate) fn issue_at(&self, subject: &str, now: DateTime<Utc>) -> AuthResult<String> {
        let header = Header {
            alg: self.algorithm.name().to_string(),
            typ: "JWT".to_string(),
        };
        let claims = Claims {
            sub: subject.to_string(),
            exp: (now + self.ttl).timestamp(),
            iat: now.timestamp(),
        };

        let signing_input = format!("{}.{}", encode_part(&header)?, encode_part(&claims)?);
        let signature = hmac::sign(&self.key, signing_input.as_bytes());
        Ok(format!("{}.{}", signing_input, B64URL.encode(signature.as_ref())))
    }

    /// Check a token and return its subject.
    pub fn verify(&self, token: &str) -> AuthResult<String> {
        self.verify_at(token, Utc::now()).map(|claims| claims.sub)
    }

    pub(crate) fn verify_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<Claims> {
        let token = token.trim();
        let (signing_input, signature) = token.rsplit_once('.').ok_or(AuthError::InvalidToken)?;
        let (header, claims) = signing_input
            .split_once('.')
            .filter(|(_, claims)| !claims.contains('.'))
            .ok_or(AuthError::InvalidToken)?;

        let header: Header = decode_part(header)?;
        if header.alg != self.algorithm.name() {
            return Err(AuthError::InvalidToken);
        }

        let signature = B64URL.decode(signature).map_err(|_| AuthError::InvalidToken)?;
        hmac::verify(&self.key, signing_input.as_bytes(), &signature)
            .map_err(|_| AuthError::InvalidToken)?;

        let claims: Claims = decode_part(claims)?;
        if claims.sub.is_empty() || claims.exp <= now.timestamp() {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }
}

fn encode_part<T: Serialize>(value: &T) -> AuthResult<String> {
    let json = serde_json::to_vec(value).map_err(|_| AuthError::Crypto("token encoding failed"))?;
    Ok(B64URL.encode(json))
}

fn decode_part<T: DeserializeOwned>(part: &str) -> AuthResult<T> {
    let bytes = B64URL.decode(part).map_err(|_| AuthError::InvalidToken)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::InvalidToken)
}
