//! Signed session tokens (HS256 JWT)

use amity_core::config::{AuthSection, MIN_JWT_SECRET_LEN};
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AuthError;

/// Token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    /// Session id
    pub sid: Uuid,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
}

/// Keys and lifetime for issuing and verifying tokens
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl std::fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKeys")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenKeys {
    /// Build keys from a secret. Secrets shorter than 32 bytes are rejected.
    pub fn new(secret: &str, ttl_secs: u64) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::MissingSecret);
        }
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(AuthError::WeakSecret {
                min: MIN_JWT_SECRET_LEN,
            });
        }
        Ok(Self::from_secret(secret, ttl_secs))
    }

    fn from_secret(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            // Bounded so it always fits a chrono::Duration
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX).min(i64::MAX / 1000),
        }
    }

    /// Keys from the `[auth]` config section.
    ///
    /// In dev mode a missing secret is replaced by a random one, so tokens
    /// do not survive a restart.
    pub fn from_config(auth: &AuthSection) -> Result<Self, AuthError> {
        match auth.jwt_secret.as_deref() {
            Some(secret) => Self::new(secret, auth.token_ttl_secs),
            None if auth.dev_mode => {
                tracing::warn!("no JWT secret configured; using a random dev-mode secret");
                let secret: String = rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(48)
                    .map(char::from)
                    .collect();
                Ok(Self::from_secret(&secret, auth.token_ttl_secs))
            }
            None => Err(AuthError::MissingSecret),
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Issue a token for `user_id` bound to `session_id`.
    pub fn issue(&self, user_id: Uuid, session_id: Uuid) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            sid: session_id,
            iat: now,
            exp: now.saturating_add(self.ttl_secs),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    /// Verify signature and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }
}
