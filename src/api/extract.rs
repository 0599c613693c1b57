//! Request extractors for caller address and guarded identities.

use anyhow::anyhow;
use axum::{
    async_trait,
    extract::{ConnectInfo, Extension, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use super::state::AuthState;
use crate::auth::{
    guard::{bearer_token, RequestContext},
    role::{Policy, ANY_OPERATOR, SUPERADMIN_ONLY},
    session::Actor,
    token::AccessClaims,
    AuthError,
};

/// First `x-forwarded-for` hop, else `x-real-ip`.
#[must_use]
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Network address of the caller.
///
/// The socket peer by default. Proxy headers are read only when
/// [`AuthState::trust_forwarded_headers`] is set, since any client can send them.
#[derive(Clone, Debug, Default)]
pub struct ClientAddr(pub Option<String>);

impl ClientAddr {
    fn from_parts(parts: &Parts) -> Self {
        let trusted = parts
            .extensions
            .get::<Arc<AuthState>>()
            .is_some_and(|state| state.trust_forwarded_headers());
        let peer = parts.extensions.get::<ConnectInfo<SocketAddr>>();
        Self::resolve(&parts.headers, peer, trusted)
    }

    fn resolve(
        headers: &HeaderMap,
        peer: Option<&ConnectInfo<SocketAddr>>,
        trust_forwarded_headers: bool,
    ) -> Self {
        let forwarded = if trust_forwarded_headers {
            extract_client_ip(headers)
        } else {
            None
        };
        Self(forwarded.or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string())))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

/// A verified caller.
#[derive(Clone, Debug)]
pub struct Caller {
    pub claims: AccessClaims,
    pub caller_address: Option<String>,
}

impl Caller {
    #[must_use]
    pub fn actor(&self) -> Actor<'_> {
        Actor {
            claims: &self.claims,
            caller_address: self.caller_address.as_deref(),
        }
    }
}

fn authorize(parts: &Parts, policy: Policy) -> Result<Caller, AuthError> {
    let state = parts
        .extensions
        .get::<Arc<AuthState>>()
        .cloned()
        .ok_or_else(|| AuthError::from(anyhow!("auth state extension missing")))?;
    let ClientAddr(caller_address) = ClientAddr::from_parts(parts);
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let context = RequestContext {
        caller_address: caller_address.as_deref(),
        path: parts.uri.path(),
    };
    let claims = state
        .guard()
        .authorize(bearer_token(header), policy, &context)?;

    Ok(Caller {
        claims,
        caller_address,
    })
}

/// Any operator, `admin` or `superadmin`.
#[derive(Clone, Debug)]
pub struct AnyOperator(pub Caller);

/// Superadmins only.
#[derive(Clone, Debug)]
pub struct Superadmin(pub Caller);

#[async_trait]
impl<S> FromRequestParts<S> for AnyOperator
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        authorize(parts, ANY_OPERATOR).map(Self)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Superadmin
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        authorize(parts, SUPERADMIN_ONLY).map(Self)
    }
}

pub type SharedState = Extension<Arc<AuthState>>;
