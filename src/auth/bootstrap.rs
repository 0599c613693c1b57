//! Bootstrap superadmin from deployment configuration.
//!
//! The configured account is created as `superadmin` when missing and elevated
//! when it exists with a lower role. Other operators are left untouched, and an
//! existing account keeps its current secret.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tracing::{error, info};
use uuid::Uuid;

use super::{operator::Operator, password::hash_password, role::Role};
use crate::store::{CredentialStore, StoreError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Username or secret not configured.
    Skipped,
    Created(Uuid),
    Elevated(Uuid),
    Unchanged(Uuid),
}

/// Ensure the configured superadmin exists.
///
/// # Errors
/// Returns an error if hashing or the credential store fails.
pub async fn ensure_superadmin(
    store: &dyn CredentialStore,
    username: Option<&str>,
    password: Option<&SecretString>,
) -> Result<BootstrapOutcome> {
    let username = username.map(str::trim).filter(|value| !value.is_empty());
    let password = password.filter(|value| !value.expose_secret().is_empty());
    let (Some(username), Some(password)) = (username, password) else {
        error!("Admin username or password not configured, cannot seed superadmin");
        return Ok(BootstrapOutcome::Skipped);
    };

    if let Some(mut existing) = store.find_by_username(username).await? {
        if existing.role == Role::Superadmin {
            return Ok(BootstrapOutcome::Unchanged(existing.id));
        }
        existing.role = Role::Superadmin;
        existing.updated_at = Some(Utc::now());
        store
            .update(&existing)
            .await
            .context("failed to elevate bootstrap operator")?;
        info!(username, "Elevated bootstrap operator to superadmin");
        return Ok(BootstrapOutcome::Elevated(existing.id));
    }

    let operator = Operator::new(
        username.to_string(),
        hash_password(password.expose_secret()).await?,
        Role::Superadmin,
    );
    match store.create(&operator).await {
        Ok(()) => {}
        Err(StoreError::Conflict) => {
            return Err(anyhow!("bootstrap operator {username} was created concurrently"));
        }
        Err(StoreError::Other(err)) => return Err(err.context("failed to create bootstrap operator")),
    }

    info!(username, "Superadmin account created");
    Ok(BootstrapOutcome::Created(operator.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::password::verify_password, store::memory::MemoryCredentialStore};

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[tokio::test]
    async fn skipped_without_configuration() -> Result<()> {
        let store = MemoryCredentialStore::new();
        let outcome = ensure_superadmin(&store, Some("root"), None).await?;
        assert_eq!(outcome, BootstrapOutcome::Skipped);
        let outcome = ensure_superadmin(&store, None, Some(&secret("Passw0rd!"))).await?;
        assert_eq!(outcome, BootstrapOutcome::Skipped);
        assert!(store.list().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn creates_then_leaves_alone() -> Result<()> {
        let store = MemoryCredentialStore::new();
        let password = secret("Passw0rd!");

        let BootstrapOutcome::Created(id) =
            ensure_superadmin(&store, Some("root"), Some(&password)).await?
        else {
            return Err(anyhow!("expected creation"));
        };
        let created = store.find_by_id(id).await?.ok_or_else(|| anyhow!("missing"))?;
        assert_eq!(created.role, Role::Superadmin);
        assert!(verify_password("Passw0rd!", &created.password_hash).await?);

        let again = ensure_superadmin(&store, Some("root"), Some(&password)).await?;
        assert_eq!(again, BootstrapOutcome::Unchanged(id));
        Ok(())
    }

    #[tokio::test]
    async fn elevates_existing_admin() -> Result<()> {
        let store = MemoryCredentialStore::new();
        let existing = Operator::new("root".to_string(), secret("hash"), Role::Admin);
        store.create(&existing).await.map_err(|err| anyhow!(err))?;
        let bystander = Operator::new("ops1".to_string(), secret("hash"), Role::Admin);
        store.create(&bystander).await.map_err(|err| anyhow!(err))?;

        let outcome = ensure_superadmin(&store, Some("root"), Some(&secret("ignored1"))).await?;
        assert_eq!(outcome, BootstrapOutcome::Elevated(existing.id));

        let root = store.find_by_id(existing.id).await?.ok_or_else(|| anyhow!("missing"))?;
        assert_eq!(root.role, Role::Superadmin);
        assert_eq!(root.password_hash.expose_secret(), "hash");
        let ops = store.find_by_id(bystander.id).await?.ok_or_else(|| anyhow!("missing"))?;
        assert_eq!(ops.role, Role::Admin);
        Ok(())
    }
}
