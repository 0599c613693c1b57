//! Login, refresh, password change and `me`.
//!
//! Bodies are taken as `Option<Json<_>>` so a missing or malformed body lands
//! on the same 400 messages as missing fields.

use axum::response::Json;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::instrument;
use utoipa::ToSchema;

use crate::{
    api::{
        error::ErrorBody,
        extract::{AnyOperator, ClientAddr, SharedState},
    },
    auth::{operator::OperatorSummary, AuthError},
};

#[derive(ToSchema, Deserialize, Default)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: OperatorSummary,
}

#[derive(ToSchema, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

impl fmt::Debug for RefreshRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshRequest { .. }")
    }
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(ToSchema, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

impl fmt::Debug for ChangePasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChangePasswordRequest { .. }")
    }
}

#[derive(ToSchema, Serialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = LoginResponse),
        (status = 400, description = "Missing username or password", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 429, description = "Too many login attempts", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    state: SharedState,
    ClientAddr(caller_address): ClientAddr,
    payload: Option<Json<LoginRequest>>,
) -> Result<Json<LoginResponse>, AuthError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let outcome = state
        .session()
        .login(
            request.username.as_deref(),
            request.password.as_deref(),
            caller_address.as_deref(),
        )
        .await?;

    Ok(Json(LoginResponse {
        access_token: outcome.tokens.access_token,
        refresh_token: outcome.tokens.refresh_token,
        user: outcome.operator,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Rotated token pair", body = TokenResponse),
        (status = 400, description = "Missing refresh token", body = ErrorBody),
        (status = 401, description = "Unknown, expired or already used refresh token", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn refresh(
    state: SharedState,
    ClientAddr(caller_address): ClientAddr,
    payload: Option<Json<RefreshRequest>>,
) -> Result<Json<TokenResponse>, AuthError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let tokens = state
        .session()
        .refresh(request.refresh_token.as_deref(), caller_address.as_deref())
        .await?;

    Ok(Json(TokenResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password updated, sessions revoked", body = MessageResponse),
        (status = 400, description = "Missing or too short password", body = ErrorBody),
        (status = 401, description = "Unauthenticated or wrong current password", body = ErrorBody),
        (status = 429, description = "Too many attempts", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all, fields(operator_id = %caller.claims.id))]
pub async fn change_password(
    state: SharedState,
    AnyOperator(caller): AnyOperator,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Result<Json<MessageResponse>, AuthError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    state
        .session()
        .change_password(
            caller.actor(),
            request.current_password.as_deref(),
            request.new_password.as_deref(),
        )
        .await?;

    Ok(Json(MessageResponse::new(
        "Password updated successfully. Please login again.",
    )))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Caller identity", body = OperatorSummary),
        (status = 401, description = "Unauthenticated", body = ErrorBody),
        (status = 404, description = "Identity no longer exists", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(
    state: SharedState,
    AnyOperator(caller): AnyOperator,
) -> Result<Json<OperatorSummary>, AuthError> {
    state.session().me(&caller.claims).await.map(Json)
}
