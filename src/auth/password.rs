//! Secret hashing and input rules for operator credentials.
//!
//! bcrypt at a fixed cost runs on the blocking pool so a burst of logins does
//! not stall the async workers.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use tokio::task;

use super::error::AuthError;

pub const BCRYPT_COST: u32 = 12;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MIN_USERNAME_LENGTH: usize = 3;

// Compared against when the username is unknown so both paths pay for one bcrypt verify.
static DUMMY_HASH: Lazy<Option<String>> =
    Lazy::new(|| bcrypt::hash("backoffice-timing-equaliser", BCRYPT_COST).ok());

/// Hash a plaintext secret with bcrypt.
///
/// # Errors
/// Returns an error if the blocking task fails or bcrypt rejects the input.
pub async fn hash_password(password: &str) -> Result<SecretString> {
    let password = password.to_string();
    let hash = task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .context("password hashing task failed")?
        .context("failed to hash password")?;
    Ok(SecretString::from(hash))
}

/// Compare a plaintext secret against a stored hash.
///
/// A malformed stored hash counts as a mismatch.
///
/// # Errors
/// Returns an error only if the blocking task itself fails.
pub async fn verify_password(password: &str, hash: &SecretString) -> Result<bool> {
    let password = password.to_string();
    let hash = hash.expose_secret().to_string();
    let matches = task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .context("password verification task failed")?;
    Ok(matches)
}

/// Burn one verification against a throwaway hash; the result is always `false`.
///
/// # Errors
/// Returns an error only if the blocking task itself fails.
pub async fn verify_dummy(password: &str) -> Result<bool> {
    let password = password.to_string();
    task::spawn_blocking(move || {
        if let Some(hash) = DUMMY_HASH.as_deref() {
            let _ = bcrypt::verify(password, hash);
        }
        false
    })
    .await
    .context("password verification task failed")
}

/// Enforce the minimum length for a new secret.
///
/// # Errors
/// Returns `AuthError::Validation` when the secret is too short.
pub fn validate_new_password(password: &str, label: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::validation(format!(
            "{label} must be at least {MIN_PASSWORD_LENGTH} characters."
        )));
    }
    Ok(())
}

/// Usernames are letters, digits and underscores, at least three long.
///
/// # Errors
/// Returns `AuthError::Validation` describing the first rule that fails.
pub fn validate_username(username: &str) -> Result<(), AuthError> {
    if username.chars().count() < MIN_USERNAME_LENGTH {
        return Err(AuthError::validation(format!(
            "Username must be at least {MIN_USERNAME_LENGTH} characters."
        )));
    }
    let valid = Regex::new(r"^[A-Za-z0-9_]+$").is_ok_and(|re| re.is_match(username));
    if !valid {
        return Err(AuthError::validation(
            "Username can only contain letters, numbers, and underscores.",
        ));
    }
    Ok(())
}
