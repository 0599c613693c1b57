//! Request-time verification of access credentials and role policies.
//!
//! Every refusal is handed to a [`DenialReporter`] together with the caller
//! address, the attempted path and whatever identity the caller claimed. The
//! credential itself is never part of a report.

use serde::Serialize;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::{
    error::AuthError,
    role::{Policy, Role},
    token::{AccessClaims, AccessSigner, TokenError},
};

pub const NO_TOKEN: &str = "Access denied. No token provided.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DenialReason {
    MissingToken,
    Expired,
    Invalid,
    Forbidden,
}

impl DenialReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingToken => "missing-token",
            Self::Expired => "expired",
            Self::Invalid => "invalid",
            Self::Forbidden => "forbidden",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DenialReport {
    pub caller_address: Option<String>,
    pub path: String,
    pub claimed_id: Option<Uuid>,
    pub claimed_username: Option<String>,
    pub claimed_role: Option<Role>,
    pub reason: DenialReason,
}

pub trait DenialReporter: Send + Sync {
    fn report(&self, report: &DenialReport);
}

#[derive(Clone, Debug, Default)]
pub struct TracingDenialReporter;

impl DenialReporter for TracingDenialReporter {
    fn report(&self, report: &DenialReport) {
        warn!(
            caller_address = report.caller_address.as_deref().unwrap_or("unknown"),
            path = %report.path,
            claimed_id = ?report.claimed_id,
            claimed_username = report.claimed_username.as_deref().unwrap_or(""),
            claimed_role = report.claimed_role.map_or("", Role::as_str),
            reason = report.reason.as_str(),
            "Access denied"
        );
    }
}

/// Where a guarded request came from.
#[derive(Clone, Copy, Debug)]
pub struct RequestContext<'a> {
    pub caller_address: Option<&'a str>,
    pub path: &'a str,
}

/// Strip the `Bearer` scheme from an `Authorization` header value.
#[must_use]
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[derive(Clone)]
pub struct AccessGuard {
    signer: AccessSigner,
    reporter: Arc<dyn DenialReporter>,
}

impl AccessGuard {
    #[must_use]
    pub fn new(signer: AccessSigner, reporter: Arc<dyn DenialReporter>) -> Self {
        Self { signer, reporter }
    }

    /// Validate a raw access credential.
    ///
    /// # Errors
    /// `Unauthenticated` when absent, `Expired` past expiry, `Invalid` otherwise.
    pub fn verify(
        &self,
        raw_token: Option<&str>,
        context: &RequestContext<'_>,
    ) -> Result<AccessClaims, AuthError> {
        let Some(token) = raw_token else {
            self.deny(context, None, DenialReason::MissingToken);
            return Err(AuthError::unauthenticated(NO_TOKEN));
        };

        match self.signer.verify(token) {
            Ok(claims) => Ok(claims),
            Err(TokenError::Expired) => {
                let claimed = self.signer.claims_ignoring_expiry(token);
                self.deny(context, claimed.as_ref(), DenialReason::Expired);
                Err(AuthError::Expired)
            }
            Err(TokenError::Invalid) => {
                self.deny(context, None, DenialReason::Invalid);
                Err(AuthError::Invalid)
            }
        }
    }

    /// # Errors
    /// `Forbidden` when the claimed role falls outside `policy`.
    pub fn require_role(
        &self,
        claims: &AccessClaims,
        policy: Policy,
        context: &RequestContext<'_>,
    ) -> Result<(), AuthError> {
        if policy.allows(claims.role) {
            return Ok(());
        }
        self.deny(context, Some(claims), DenialReason::Forbidden);
        Err(AuthError::forbidden(policy.denial_message()))
    }

    /// `verify` followed by `require_role`.
    ///
    /// # Errors
    /// Propagates the first failing check.
    pub fn authorize(
        &self,
        raw_token: Option<&str>,
        policy: Policy,
        context: &RequestContext<'_>,
    ) -> Result<AccessClaims, AuthError> {
        let claims = self.verify(raw_token, context)?;
        self.require_role(&claims, policy, context)?;
        Ok(claims)
    }

    fn deny(
        &self,
        context: &RequestContext<'_>,
        claims: Option<&AccessClaims>,
        reason: DenialReason,
    ) {
        self.reporter.report(&DenialReport {
            caller_address: context.caller_address.map(str::to_string),
            path: context.path.to_string(),
            claimed_id: claims.map(|claims| claims.id),
            claimed_username: claims.map(|claims| claims.username.clone()),
            claimed_role: claims.map(|claims| claims.role),
            reason,
        });
    }
}
