//! Error taxonomy for the authentication core.

use thiserror::Error;

pub const INVALID_CREDENTIALS: &str = "Invalid credentials.";
pub const UNEXPECTED: &str = "An unexpected error occurred.";

#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),
    /// No usable credential was presented, or the presented one is unknown.
    #[error("{0}")]
    Unauthenticated(String),
    /// The access credential was valid but its lifetime has elapsed.
    #[error("Token expired. Please refresh your token.")]
    Expired,
    /// The access credential failed signature or structural checks.
    #[error("Invalid token.")]
    Invalid,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Too many requests. Please try again later.")]
    RateLimited { retry_after_seconds: u64 },
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl AuthError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Login failures look identical whether or not the username exists.
    #[must_use]
    pub fn invalid_credentials() -> Self {
        Self::Unauthenticated(INVALID_CREDENTIALS.to_string())
    }

    /// Message safe to hand to a caller.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Unexpected(_) => UNEXPECTED.to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn unexpected_errors_hide_details() {
        let err = AuthError::from(anyhow!("connection refused on 10.0.0.3:5432"));
        assert_eq!(err.public_message(), UNEXPECTED);
    }

    #[test]
    fn expired_and_invalid_are_distinct() {
        assert_ne!(
            AuthError::Expired.public_message(),
            AuthError::Invalid.public_message()
        );
    }

    #[test]
    fn invalid_credentials_is_generic() {
        assert_eq!(
            AuthError::invalid_credentials().public_message(),
            INVALID_CREDENTIALS
        );
    }
}
