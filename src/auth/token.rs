//! Access and refresh credentials.
//!
//! Access credentials are HS256 JWTs carrying `{id, username, role, iat, exp}`;
//! the server keeps no record of them. Refresh credentials are 32 random bytes,
//! URL-safe base64 encoded, and only their SHA-256 digest reaches the registry.
//!
//! Issuing a pair always goes through the registry's per-identity slot, so a
//! new pair displaces whatever refresh credential the identity held before.

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr, sync::Arc};
use tracing::warn;
use uuid::Uuid;

use super::{operator::Operator, role::Role};
use crate::store::{RefreshEntry, RefreshRegistry};

pub const DEFAULT_ACCESS_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
pub const DEFAULT_REFRESH_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
pub const MIN_SECRET_BYTES: usize = 32;
const GENERATED_SECRET_BYTES: usize = 64;
const REFRESH_TOKEN_BYTES: usize = 32;

/// Claims embedded in every access credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token invalid")]
    Invalid,
}

/// Deployment environment; decides how a missing signing secret is handled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// Pick the signing secret for this process.
///
/// A configured secret must be at least [`MIN_SECRET_BYTES`] long. Without one,
/// production refuses to start while development falls back to a random
/// secret that dies with the process.
///
/// # Errors
/// Returns an error for a short secret, a missing secret in production, or a
/// failing random source.
pub fn resolve_signing_secret(
    configured: Option<SecretString>,
    environment: Environment,
) -> Result<SecretString> {
    match configured {
        Some(secret) if secret.expose_secret().len() < MIN_SECRET_BYTES => {
            bail!("JWT secret must be at least {MIN_SECRET_BYTES} bytes")
        }
        Some(secret) => Ok(secret),
        None if environment == Environment::Production => {
            bail!("JWT secret is required in production (set BACKOFFICE_JWT_SECRET)")
        }
        None => {
            warn!(
                "No JWT secret configured, using a random secret; access tokens will not survive a restart"
            );
            generate_signing_secret()
        }
    }
}

/// 64 random bytes, URL-safe base64 encoded.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_signing_secret() -> Result<SecretString> {
    let mut bytes = [0u8; GENERATED_SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate signing secret")?;
    Ok(SecretString::from(URL_SAFE_NO_PAD.encode(bytes)))
}

/// Create a new refresh credential. The raw value is only handed to the client.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_refresh_token() -> Result<String> {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate refresh token")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Digest under which a refresh credential is stored and looked up.
#[must_use]
pub fn hash_refresh_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Signs and verifies access credentials.
#[derive(Clone)]
pub struct AccessSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl fmt::Debug for AccessSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessSigner")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl AccessSigner {
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat"]);
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            validation,
            ttl: Duration::seconds(DEFAULT_ACCESS_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_ttl_seconds(mut self, seconds: i64) -> Self {
        self.ttl = Duration::seconds(seconds);
        self
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign an access credential for `operator`.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn issue(&self, operator: &Operator) -> Result<String> {
        self.issue_at(operator, Utc::now())
    }

    /// Sign an access credential as if issued at `issued_at`.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn issue_at(&self, operator: &Operator, issued_at: DateTime<Utc>) -> Result<String> {
        let claims = AccessClaims {
            id: operator.id,
            username: operator.username.clone(),
            role: operator.role,
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("failed to sign access token")
    }

    /// Check signature and expiry.
    ///
    /// # Errors
    /// `TokenError::Expired` once `exp` has passed, `TokenError::Invalid` for
    /// anything else that fails to verify.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, TokenError> {
        decode::<AccessClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }

    /// Claims of a correctly signed credential, expired or not. Only for reporting.
    #[must_use]
    pub fn claims_ignoring_expiry(&self, token: &str) -> Option<AccessClaims> {
        let mut validation = self.validation.clone();
        validation.validate_exp = false;
        decode::<AccessClaims>(token, &self.decoding, &validation)
            .ok()
            .map(|data| data.claims)
    }
}

/// Access plus refresh credential handed out on login and refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenPair { .. }")
    }
}

/// Mints token pairs and records refresh credentials.
#[derive(Clone)]
pub struct TokenIssuer {
    signer: AccessSigner,
    registry: Arc<dyn RefreshRegistry>,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(signer: AccessSigner, registry: Arc<dyn RefreshRegistry>) -> Self {
        Self {
            signer,
            registry,
            refresh_ttl: Duration::seconds(DEFAULT_REFRESH_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl = Duration::seconds(seconds);
        self
    }

    #[must_use]
    pub fn signer(&self) -> &AccessSigner {
        &self.signer
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<dyn RefreshRegistry> {
        &self.registry
    }

    /// Issue a fresh pair, displacing the identity's previous refresh credential.
    ///
    /// # Errors
    /// Returns an error if signing, randomness or the registry fails.
    pub async fn issue_pair(&self, operator: &Operator) -> Result<TokenPair> {
        let (pair, entry) = self.mint(operator)?;
        self.registry.store(&entry).await?;
        Ok(pair)
    }

    /// Issue a new pair only if the identity still holds `current_hash`.
    ///
    /// Returns `None` when another request rotated or revoked it first.
    ///
    /// # Errors
    /// Returns an error if signing, randomness or the registry fails.
    pub async fn rotate_pair(
        &self,
        operator: &Operator,
        current_hash: &[u8],
    ) -> Result<Option<TokenPair>> {
        let (pair, entry) = self.mint(operator)?;
        if self.registry.replace(current_hash, &entry).await? {
            Ok(Some(pair))
        } else {
            Ok(None)
        }
    }

    fn mint(&self, operator: &Operator) -> Result<(TokenPair, RefreshEntry)> {
        let now = Utc::now();
        let access_token = self.signer.issue_at(operator, now)?;
        let refresh_token = generate_refresh_token()?;
        let expires_at = now
            .checked_add_signed(self.refresh_ttl)
            .ok_or_else(|| anyhow!("refresh token lifetime out of range"))?;
        let entry = RefreshEntry {
            token_hash: hash_refresh_token(&refresh_token),
            identity_id: operator.id,
            expires_at,
            created_at: now,
        };
        Ok((
            TokenPair {
                access_token,
                refresh_token,
            },
            entry,
        ))
    }
}
