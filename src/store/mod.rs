//! Durable collections behind the authentication core.
//!
//! Two stores back the session lifecycle:
//!
//! - **Credential store:** operator accounts and their bcrypt hashes. Usernames
//!   are unique; a duplicate insert surfaces as [`StoreError::Conflict`].
//! - **Refresh registry:** active refresh credentials, keyed by identity. Each
//!   identity holds at most one entry, so storing a new one rotates the old one
//!   out. Only SHA-256 hashes of refresh credentials are kept.
//!
//! `postgres` is the production backing; `memory` serves tests and embedding.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::operator::Operator;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("username already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One active refresh credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshEntry {
    pub token_hash: Vec<u8>,
    pub identity_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshEntry {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Operator>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Operator>>;

    /// All operators, oldest first.
    async fn list(&self) -> Result<Vec<Operator>>;

    async fn create(&self, operator: &Operator) -> Result<(), StoreError>;

    /// Overwrite role, hash and timestamps of an existing operator.
    /// Returns `false` when the operator does not exist.
    async fn update(&self, operator: &Operator) -> Result<bool>;

    /// Returns `false` when the operator does not exist.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Cheap liveness probe for `/health`.
    async fn health_check(&self) -> Result<()>;
}

#[async_trait]
pub trait RefreshRegistry: Send + Sync {
    /// Store `entry`, removing any other entry for the same identity.
    async fn store(&self, entry: &RefreshEntry) -> Result<()>;

    /// Swap the identity's entry for `entry` only while it still holds `current_hash`.
    ///
    /// Returns `false` when the entry was already rotated or revoked.
    async fn replace(&self, current_hash: &[u8], entry: &RefreshEntry) -> Result<bool>;

    async fn find_by_token(&self, token_hash: &[u8]) -> Result<Option<RefreshEntry>>;

    async fn revoke_token(&self, token_hash: &[u8]) -> Result<bool>;

    /// Returns the number of entries removed.
    async fn revoke_all_for_identity(&self, identity_id: Uuid) -> Result<u64>;
}
