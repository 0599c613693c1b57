//! `PostgreSQL` backing for the credential store and refresh registry.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::{CredentialStore, RefreshEntry, RefreshRegistry, StoreError};
use crate::auth::{operator::Operator, role::Role};

pub const SCHEMA_SQL: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/db/sql/01_backoffice.sql"
));

/// Create the tables if they are missing.
///
/// # Errors
/// Returns an error if the schema statements fail.
pub async fn apply_schema(pool: &PgPool) -> Result<()> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "DDL");
    sqlx::Executor::execute(pool, SCHEMA_SQL)
        .instrument(span)
        .await
        .context("failed to apply schema")?;
    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn operator_from_row(row: &PgRow) -> Result<Operator> {
    let role: String = row.try_get("role")?;
    let password_hash: String = row.try_get("password_hash")?;
    Ok(Operator {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: SecretString::from(password_hash),
        role: role.parse::<Role>().map_err(|err| anyhow!(err))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<RefreshEntry> {
    Ok(RefreshEntry {
        token_hash: row.try_get("token_hash")?,
        identity_id: row.try_get("identity_id")?,
        expires_at: row.try_get::<DateTime<Utc>, _>("expires_at")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const OPERATOR_COLUMNS: &str = "id, username, password_hash, role, created_at, updated_at";

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Operator>> {
        let query = format!("SELECT {OPERATOR_COLUMNS} FROM operators WHERE username = $1");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup operator by username")?;
        row.as_ref().map(operator_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Operator>> {
        let query = format!("SELECT {OPERATOR_COLUMNS} FROM operators WHERE id = $1");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup operator by id")?;
        row.as_ref().map(operator_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Operator>> {
        let query = format!("SELECT {OPERATOR_COLUMNS} FROM operators ORDER BY created_at");
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list operators")?;
        rows.iter().map(operator_from_row).collect()
    }

    async fn create(&self, operator: &Operator) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO operators (id, username, password_hash, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(operator.id)
            .bind(&operator.username)
            .bind(operator.password_hash.expose_secret())
            .bind(operator.role.as_str())
            .bind(operator.created_at)
            .bind(operator.updated_at)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict),
            Err(err) => Err(StoreError::Other(
                anyhow::Error::new(err).context("failed to insert operator"),
            )),
        }
    }

    async fn update(&self, operator: &Operator) -> Result<bool> {
        let query = r"
            UPDATE operators
            SET password_hash = $2, role = $3, updated_at = $4
            WHERE id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(operator.id)
            .bind(operator.password_hash.expose_secret())
            .bind(operator.role.as_str())
            .bind(operator.updated_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update operator")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let query = "DELETE FROM operators WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete operator")?;
        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")
    }
}

#[derive(Clone, Debug)]
pub struct PgRefreshRegistry {
    pool: PgPool,
}

impl PgRefreshRegistry {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshRegistry for PgRefreshRegistry {
    async fn store(&self, entry: &RefreshEntry) -> Result<()> {
        // Upsert on the identity key: issuing always displaces the previous credential.
        let query = r"
            INSERT INTO refresh_tokens (identity_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (identity_id) DO UPDATE
            SET token_hash = EXCLUDED.token_hash,
                expires_at = EXCLUDED.expires_at,
                created_at = EXCLUDED.created_at
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(entry.identity_id)
            .bind(&entry.token_hash)
            .bind(entry.expires_at)
            .bind(entry.created_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to store refresh token")?;
        Ok(())
    }

    async fn replace(&self, current_hash: &[u8], entry: &RefreshEntry) -> Result<bool> {
        let query = r"
            UPDATE refresh_tokens
            SET token_hash = $3, expires_at = $4, created_at = $5
            WHERE identity_id = $1 AND token_hash = $2
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(entry.identity_id)
            .bind(current_hash)
            .bind(&entry.token_hash)
            .bind(entry.expires_at)
            .bind(entry.created_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to rotate refresh token")?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_by_token(&self, token_hash: &[u8]) -> Result<Option<RefreshEntry>> {
        let query = r"
            SELECT identity_id, token_hash, expires_at, created_at
            FROM refresh_tokens
            WHERE token_hash = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup refresh token")?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn revoke_token(&self, token_hash: &[u8]) -> Result<bool> {
        let query = "DELETE FROM refresh_tokens WHERE token_hash = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke refresh token")?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_identity(&self, identity_id: Uuid) -> Result<u64> {
        let query = "DELETE FROM refresh_tokens WHERE identity_id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(identity_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke refresh tokens")?;
        Ok(result.rows_affected())
    }
}
