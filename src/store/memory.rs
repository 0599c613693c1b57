//! In-process stores. Each collection sits behind a single lock, which
//! serializes writers the same way the Postgres constraints do.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{CredentialStore, RefreshEntry, RefreshRegistry, StoreError};
use crate::auth::operator::Operator;

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    operators: RwLock<HashMap<Uuid, Operator>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Operator>> {
        let operators = self.operators.read().await;
        Ok(operators
            .values()
            .find(|operator| operator.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Operator>> {
        Ok(self.operators.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Operator>> {
        let mut list: Vec<Operator> = self.operators.read().await.values().cloned().collect();
        list.sort_by_key(|operator| operator.created_at);
        Ok(list)
    }

    async fn create(&self, operator: &Operator) -> Result<(), StoreError> {
        let mut operators = self.operators.write().await;
        if operators
            .values()
            .any(|existing| existing.username == operator.username)
        {
            return Err(StoreError::Conflict);
        }
        operators.insert(operator.id, operator.clone());
        Ok(())
    }

    async fn update(&self, operator: &Operator) -> Result<bool> {
        let mut operators = self.operators.write().await;
        match operators.get_mut(&operator.id) {
            Some(existing) => {
                *existing = operator.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.operators.write().await.remove(&id).is_some())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Entries keyed by identity, so a second entry for the same identity cannot exist.
#[derive(Debug, Default)]
pub struct MemoryRefreshRegistry {
    entries: Mutex<HashMap<Uuid, RefreshEntry>>,
}

impl MemoryRefreshRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl RefreshRegistry for MemoryRefreshRegistry {
    async fn store(&self, entry: &RefreshEntry) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(entry.identity_id, entry.clone());
        Ok(())
    }

    async fn replace(&self, current_hash: &[u8], entry: &RefreshEntry) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(&entry.identity_id) {
            Some(existing) if existing.token_hash == current_hash => {
                *existing = entry.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_token(&self, token_hash: &[u8]) -> Result<Option<RefreshEntry>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .values()
            .find(|entry| entry.token_hash == token_hash)
            .cloned())
    }

    async fn revoke_token(&self, token_hash: &[u8]) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.token_hash != token_hash);
        Ok(entries.len() < before)
    }

    async fn revoke_all_for_identity(&self, identity_id: Uuid) -> Result<u64> {
        let removed = self.entries.lock().await.remove(&identity_id);
        Ok(u64::from(removed.is_some()))
    }
}
