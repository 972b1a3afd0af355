//! Password hashing with Argon2id (PHC strings)

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use once_cell::sync::Lazy;

use super::AuthError;
use crate::models::Password;

/// Hash a password, returning the PHC string with salt and parameters.
pub fn hash_password(password: &Password) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.expose().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Check a plaintext password against a stored PHC string.
///
/// A malformed stored hash is an error, a wrong password is `Ok(false)`.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(stored).map_err(|e| AuthError::Hash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Hash checked when a login matches no account
static DUMMY_HASH: Lazy<Option<String>> = Lazy::new(|| {
    let password = Password::new("no-such-account-here").ok()?;
    hash_password(&password).ok()
});

/// Spend one verification on a throwaway hash, so an unknown login costs
/// as much as a wrong password.
pub fn verify_dummy(password: &str) {
    match DUMMY_HASH.as_deref() {
        Some(hash) => {
            let _ = verify_password(password, hash);
        }
        None => tracing::warn!("dummy password hash unavailable"),
    }
}
