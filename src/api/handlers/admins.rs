//! Operator administration, superadmin only.

use axum::{extract::Path, http::StatusCode, response::Json};
use serde::Deserialize;
use std::fmt;
use tracing::instrument;
use utoipa::ToSchema;

use super::session::MessageResponse;
use crate::{
    api::{
        error::ErrorBody,
        extract::{SharedState, Superadmin},
    },
    auth::{operator::OperatorSummary, AuthError},
};

/// New operators always get the `admin` role.
#[derive(ToSchema, Deserialize, Default)]
pub struct CreateOperatorRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for CreateOperatorRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateOperatorRequest")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(ToSchema, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub new_password: Option<String>,
}

impl fmt::Debug for ResetPasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResetPasswordRequest { .. }")
    }
}

#[utoipa::path(
    get,
    path = "/auth/admins",
    responses(
        (status = 200, description = "All operators, secrets stripped", body = [OperatorSummary]),
        (status = 401, description = "Unauthenticated", body = ErrorBody),
        (status = 403, description = "Superadmin access required", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admins"
)]
pub async fn list(
    state: SharedState,
    Superadmin(_caller): Superadmin,
) -> Result<Json<Vec<OperatorSummary>>, AuthError> {
    state.session().list_operators().await.map(Json)
}

#[utoipa::path(
    post,
    path = "/auth/admins",
    request_body = CreateOperatorRequest,
    responses(
        (status = 201, description = "Operator created", body = OperatorSummary),
        (status = 400, description = "Invalid username or password", body = ErrorBody),
        (status = 403, description = "Superadmin access required", body = ErrorBody),
        (status = 409, description = "Username already exists", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admins"
)]
#[instrument(skip_all, fields(created_by = %caller.claims.username))]
pub async fn create(
    state: SharedState,
    Superadmin(caller): Superadmin,
    payload: Option<Json<CreateOperatorRequest>>,
) -> Result<(StatusCode, Json<OperatorSummary>), AuthError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let created = state
        .session()
        .create_operator(
            caller.actor(),
            request.username.as_deref(),
            request.password.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    delete,
    path = "/auth/admins/{id}",
    params(("id" = String, Path, description = "Operator id")),
    responses(
        (status = 200, description = "Operator deleted", body = MessageResponse),
        (status = 400, description = "Cannot delete own account", body = ErrorBody),
        (status = 403, description = "Superadmin required, or target is a superadmin", body = ErrorBody),
        (status = 404, description = "Operator not found", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admins"
)]
#[instrument(skip_all, fields(deleted_by = %caller.claims.username, target = %id))]
pub async fn delete(
    state: SharedState,
    Superadmin(caller): Superadmin,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AuthError> {
    let deleted = state.session().delete_operator(caller.actor(), &id).await?;
    Ok(Json(MessageResponse::new(format!(
        "Admin \"{}\" deleted.",
        deleted.username
    ))))
}

#[utoipa::path(
    put,
    path = "/auth/admins/{id}/reset-password",
    params(("id" = String, Path, description = "Operator id")),
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset, target sessions revoked", body = MessageResponse),
        (status = 400, description = "Too short, or targets the caller", body = ErrorBody),
        (status = 403, description = "Superadmin access required", body = ErrorBody),
        (status = 404, description = "Operator not found", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admins"
)]
#[instrument(skip_all, fields(reset_by = %caller.claims.username, target = %id))]
pub async fn reset_password(
    state: SharedState,
    Superadmin(caller): Superadmin,
    Path(id): Path<String>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Result<Json<MessageResponse>, AuthError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let target = state
        .session()
        .reset_password(caller.actor(), &id, request.new_password.as_deref())
        .await?;
    Ok(Json(MessageResponse::new(format!(
        "Password reset for \"{}\". They need to login again.",
        target.username
    ))))
}
