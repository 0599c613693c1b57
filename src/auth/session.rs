//! Session lifecycle and operator administration.
//!
//! Flow Overview:
//! 1) Login: presence check, login limiter, lookup, bcrypt compare, then a new
//!    token pair. Unknown usernames still pay for one bcrypt verify.
//! 2) Refresh: lookup by hash, lazy expiry, owner lookup, then compare-and-swap
//!    rotation so a refresh credential works exactly once.
//! 3) Password change, reset and delete revoke the affected identity's refresh
//!    credential; access credentials already out stay valid until they expire.
//!
//! Callers pass verified [`AccessClaims`] in an [`Actor`]; role policies are
//! enforced before these methods run.

use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    audit::{AuditAction, AuditEvent, AuditSink},
    error::AuthError,
    operator::{Operator, OperatorSummary},
    password::{
        hash_password, validate_new_password, validate_username, verify_dummy, verify_password,
    },
    rate_limit::{enforce, Discriminator, Limiters},
    role::Role,
    token::{hash_refresh_token, AccessClaims, TokenIssuer, TokenPair},
};
use crate::store::{CredentialStore, StoreError};

pub const USERNAME_AND_PASSWORD_REQUIRED: &str = "Username and password are required.";
pub const REFRESH_TOKEN_REQUIRED: &str = "Refresh token required.";
pub const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token.";
pub const REFRESH_TOKEN_EXPIRED: &str = "Refresh token expired. Please login again.";
pub const USER_NO_LONGER_EXISTS: &str = "User no longer exists.";
pub const BOTH_PASSWORDS_REQUIRED: &str = "Both current and new password are required.";
pub const CURRENT_PASSWORD_INCORRECT: &str = "Current password is incorrect.";
pub const USERNAME_EXISTS: &str = "Username already exists.";
pub const ADMIN_NOT_FOUND: &str = "Admin not found.";
pub const USER_NOT_FOUND: &str = "User not found.";
pub const CANNOT_DELETE_SELF: &str = "You cannot delete your own account.";
pub const CANNOT_DELETE_SUPERADMIN: &str = "Cannot delete a superadmin account.";
pub const CANNOT_RESET_SELF: &str = "Use change-password to update your own password.";

/// Verified caller of a protected operation.
#[derive(Clone, Copy, Debug)]
pub struct Actor<'a> {
    pub claims: &'a AccessClaims,
    pub caller_address: Option<&'a str>,
}

#[derive(Clone, Debug)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    pub operator: OperatorSummary,
}

#[derive(Clone)]
pub struct SessionService {
    credentials: Arc<dyn CredentialStore>,
    issuer: TokenIssuer,
    limiters: Limiters,
    audit: Arc<dyn AuditSink>,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

impl SessionService {
    #[must_use]
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        issuer: TokenIssuer,
        limiters: Limiters,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            credentials,
            issuer,
            limiters,
            audit,
        }
    }

    #[must_use]
    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    #[must_use]
    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    #[must_use]
    pub fn limiters(&self) -> &Limiters {
        &self.limiters
    }

    /// Exchange a username and secret for a token pair.
    ///
    /// # Errors
    /// `Validation` for missing fields, `RateLimited` past the login limit and a
    /// generic `Unauthenticated` for any credential mismatch.
    pub async fn login(
        &self,
        username: Option<&str>,
        password: Option<&str>,
        caller_address: Option<&str>,
    ) -> Result<LoginOutcome, AuthError> {
        let (Some(username), Some(password)) = (present(username), present(password)) else {
            return Err(AuthError::validation(USERNAME_AND_PASSWORD_REQUIRED));
        };

        enforce(
            self.limiters.login.as_ref(),
            &Discriminator::from_request(Some(username), caller_address),
        )?;

        let operator = self.credentials.find_by_username(username).await?;
        let verified = match &operator {
            Some(operator) => verify_password(password, &operator.password_hash).await?,
            None => verify_dummy(password).await?,
        };

        let operator = match operator {
            Some(operator) if verified => operator,
            _ => {
                warn!(
                    username,
                    caller_address = caller_address.unwrap_or("unknown"),
                    "Failed login attempt"
                );
                return Err(AuthError::invalid_credentials());
            }
        };

        let tokens = self.issuer.issue_pair(&operator).await?;
        info!(operator_id = %operator.id, username = %operator.username, "Operator login successful");

        Ok(LoginOutcome {
            tokens,
            operator: operator.summary(),
        })
    }

    /// Rotate a refresh credential into a new pair.
    ///
    /// # Errors
    /// `Validation` when missing, `Unauthenticated` when unknown, expired,
    /// already rotated, or owned by a deleted identity.
    pub async fn refresh(
        &self,
        refresh_token: Option<&str>,
        caller_address: Option<&str>,
    ) -> Result<TokenPair, AuthError> {
        let Some(refresh_token) = present(refresh_token) else {
            return Err(AuthError::validation(REFRESH_TOKEN_REQUIRED));
        };

        let registry = self.issuer.registry();
        let token_hash = hash_refresh_token(refresh_token);
        let Some(entry) = registry.find_by_token(&token_hash).await? else {
            warn!(
                caller_address = caller_address.unwrap_or("unknown"),
                "Invalid refresh token used"
            );
            return Err(AuthError::unauthenticated(INVALID_REFRESH_TOKEN));
        };

        if entry.is_expired_at(Utc::now()) {
            registry.revoke_token(&token_hash).await?;
            return Err(AuthError::unauthenticated(REFRESH_TOKEN_EXPIRED));
        }

        let Some(operator) = self.credentials.find_by_id(entry.identity_id).await? else {
            registry.revoke_all_for_identity(entry.identity_id).await?;
            return Err(AuthError::unauthenticated(USER_NO_LONGER_EXISTS));
        };

        let Some(tokens) = self.issuer.rotate_pair(&operator, &token_hash).await? else {
            warn!(operator_id = %operator.id, "Refresh token reused during rotation");
            return Err(AuthError::unauthenticated(INVALID_REFRESH_TOKEN));
        };

        info!(operator_id = %operator.id, "Token refreshed with rotation");
        Ok(tokens)
    }

    /// Rotate the caller's own secret and end their refresh session.
    ///
    /// # Errors
    /// `Validation` for missing or short input, `RateLimited` past the limit and
    /// `Unauthenticated` when the current secret does not match.
    pub async fn change_password(
        &self,
        actor: Actor<'_>,
        current_password: Option<&str>,
        new_password: Option<&str>,
    ) -> Result<(), AuthError> {
        enforce(
            self.limiters.password_change.as_ref(),
            &Discriminator::from_request(None, actor.caller_address),
        )?;

        let (Some(current_password), Some(new_password)) =
            (present(current_password), present(new_password))
        else {
            return Err(AuthError::validation(BOTH_PASSWORDS_REQUIRED));
        };
        validate_new_password(new_password, "New password")?;

        let Some(mut operator) = self.credentials.find_by_id(actor.claims.id).await? else {
            return Err(AuthError::unauthenticated(CURRENT_PASSWORD_INCORRECT));
        };
        if !verify_password(current_password, &operator.password_hash).await? {
            return Err(AuthError::unauthenticated(CURRENT_PASSWORD_INCORRECT));
        }

        operator.password_hash = hash_password(new_password).await?;
        operator.updated_at = Some(Utc::now());
        self.save(&operator).await?;
        self.issuer
            .registry()
            .revoke_all_for_identity(operator.id)
            .await?;

        self.audit.record(AuditEvent::operator(
            actor.claims.id,
            &actor.claims.username,
            AuditAction::ChangePassword,
            operator.id,
            actor.caller_address,
        ));
        info!(operator_id = %operator.id, "Password changed");
        Ok(())
    }

    /// # Errors
    /// `NotFound` when the caller's identity has been removed.
    pub async fn me(&self, claims: &AccessClaims) -> Result<OperatorSummary, AuthError> {
        self.credentials
            .find_by_id(claims.id)
            .await?
            .map(|operator| operator.summary())
            .ok_or_else(|| AuthError::not_found(USER_NOT_FOUND))
    }

    /// # Errors
    /// Fails only on storage errors.
    pub async fn list_operators(&self) -> Result<Vec<OperatorSummary>, AuthError> {
        let operators = self.credentials.list().await?;
        Ok(operators.iter().map(Operator::summary).collect())
    }

    /// Create an `admin` operator. Superadmins come only from bootstrap.
    ///
    /// # Errors
    /// `Validation` for bad input, `Conflict` for a taken username.
    pub async fn create_operator(
        &self,
        actor: Actor<'_>,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<OperatorSummary, AuthError> {
        let (Some(username), Some(password)) = (present(username), present(password)) else {
            return Err(AuthError::validation(USERNAME_AND_PASSWORD_REQUIRED));
        };
        validate_username(username)?;
        validate_new_password(password, "Password")?;

        if self.credentials.find_by_username(username).await?.is_some() {
            return Err(AuthError::conflict(USERNAME_EXISTS));
        }

        let operator = Operator::new(
            username.to_string(),
            hash_password(password).await?,
            Role::Admin,
        );
        match self.credentials.create(&operator).await {
            Ok(()) => {}
            Err(StoreError::Conflict) => return Err(AuthError::conflict(USERNAME_EXISTS)),
            Err(StoreError::Other(err)) => return Err(err.into()),
        }

        self.audit.record(AuditEvent::operator(
            actor.claims.id,
            &actor.claims.username,
            AuditAction::CreateOperator,
            operator.id,
            actor.caller_address,
        ));
        info!(created_by = %actor.claims.username, username = %operator.username, "Operator created");
        Ok(operator.summary())
    }

    /// Delete another, non-superadmin operator and revoke their refresh credential.
    ///
    /// # Errors
    /// `Validation` for self-deletion, `NotFound` for unknown ids and
    /// `Forbidden` for superadmin targets.
    pub async fn delete_operator(
        &self,
        actor: Actor<'_>,
        target_id: &str,
    ) -> Result<OperatorSummary, AuthError> {
        let target_id = parse_target(target_id)?;
        if target_id == actor.claims.id {
            return Err(AuthError::validation(CANNOT_DELETE_SELF));
        }

        let Some(target) = self.credentials.find_by_id(target_id).await? else {
            return Err(AuthError::not_found(ADMIN_NOT_FOUND));
        };
        if target.role == Role::Superadmin {
            return Err(AuthError::forbidden(CANNOT_DELETE_SUPERADMIN));
        }

        if !self.credentials.delete(target.id).await? {
            return Err(AuthError::not_found(ADMIN_NOT_FOUND));
        }
        self.issuer
            .registry()
            .revoke_all_for_identity(target.id)
            .await?;

        self.audit.record(AuditEvent::operator(
            actor.claims.id,
            &actor.claims.username,
            AuditAction::DeleteOperator,
            target.id,
            actor.caller_address,
        ));
        info!(deleted_by = %actor.claims.username, username = %target.username, "Operator deleted");
        Ok(target.summary())
    }

    /// Force a new secret on another operator and revoke their refresh credential.
    ///
    /// # Errors
    /// `Validation` for a short secret or a self-targeted reset, `NotFound`
    /// for unknown ids.
    pub async fn reset_password(
        &self,
        actor: Actor<'_>,
        target_id: &str,
        new_password: Option<&str>,
    ) -> Result<OperatorSummary, AuthError> {
        let new_password = new_password.unwrap_or_default();
        validate_new_password(new_password, "New password")?;

        let target_id = parse_target(target_id)?;
        if target_id == actor.claims.id {
            return Err(AuthError::validation(CANNOT_RESET_SELF));
        }

        let Some(mut target) = self.credentials.find_by_id(target_id).await? else {
            return Err(AuthError::not_found(ADMIN_NOT_FOUND));
        };

        target.password_hash = hash_password(new_password).await?;
        target.updated_at = Some(Utc::now());
        self.save(&target).await?;
        self.issuer
            .registry()
            .revoke_all_for_identity(target.id)
            .await?;

        self.audit.record(AuditEvent::operator(
            actor.claims.id,
            &actor.claims.username,
            AuditAction::ResetPassword,
            target.id,
            actor.caller_address,
        ));
        info!(reset_by = %actor.claims.username, username = %target.username, "Operator password reset");
        Ok(target.summary())
    }

    /// Most recent audit events, newest first.
    #[must_use]
    pub fn audit_log(&self, limit: usize) -> Vec<AuditEvent> {
        self.audit.recent(limit)
    }

    async fn save(&self, operator: &Operator) -> Result<(), AuthError> {
        let updated = self
            .credentials
            .update(operator)
            .await
            .context("failed to persist operator")?;
        if updated {
            Ok(())
        } else {
            Err(AuthError::not_found(ADMIN_NOT_FOUND))
        }
    }
}

// Unparseable ids cannot name an existing operator.
fn parse_target(target_id: &str) -> Result<Uuid, AuthError> {
    Uuid::parse_str(target_id.trim()).map_err(|_| AuthError::not_found(ADMIN_NOT_FOUND))
}
