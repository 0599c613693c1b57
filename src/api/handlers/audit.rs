use axum::response::Json;

use crate::{
    api::{
        error::ErrorBody,
        extract::{AnyOperator, SharedState},
    },
    auth::audit::AuditEvent,
};

pub const AUDIT_PAGE_SIZE: usize = 100;

#[utoipa::path(
    get,
    path = "/auth/audit-log",
    responses(
        (status = 200, description = "Most recent administration events, newest first", body = [AuditEvent]),
        (status = 401, description = "Unauthenticated", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "admins"
)]
pub async fn audit_log(state: SharedState, AnyOperator(_caller): AnyOperator) -> Json<Vec<AuditEvent>> {
    Json(state.session().audit_log(AUDIT_PAGE_SIZE))
}
