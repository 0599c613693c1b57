//! HTTP mapping for [`AuthError`].

use axum::{
    http::{
        header::{RETRY_AFTER, WWW_AUTHENTICATE},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::auth::AuthError;

/// Body of every error response.
#[derive(ToSchema, Serialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

#[must_use]
pub fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::Validation(_) => StatusCode::BAD_REQUEST,
        AuthError::Unauthenticated(_) | AuthError::Expired | AuthError::Invalid => {
            StatusCode::UNAUTHORIZED
        }
        AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
        AuthError::NotFound(_) => StatusCode::NOT_FOUND,
        AuthError::Conflict(_) => StatusCode::CONFLICT,
        AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        AuthError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Unexpected(err) = &self {
            error!("Unexpected error: {err:#}");
        }

        let status = status_for(&self);
        let mut response = (
            status,
            Json(ErrorBody {
                error: self.public_message(),
            }),
        )
            .into_response();

        let headers = response.headers_mut();
        match self {
            Self::Expired => {
                headers.insert(
                    WWW_AUTHENTICATE,
                    HeaderValue::from_static(
                        r#"Bearer error="invalid_token", error_description="expired""#,
                    ),
                );
            }
            Self::Invalid => {
                headers.insert(
                    WWW_AUTHENTICATE,
                    HeaderValue::from_static(
                        r#"Bearer error="invalid_token", error_description="invalid""#,
                    ),
                );
            }
            Self::RateLimited {
                retry_after_seconds,
            } => {
                headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_seconds));
            }
            _ => {}
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use axum::body::to_bytes;

    async fn body_of(response: Response) -> Result<serde_json::Value> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(status_for(&AuthError::validation("x")), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&AuthError::Expired), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&AuthError::forbidden("x")), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&AuthError::not_found("x")), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&AuthError::conflict("x")), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&AuthError::RateLimited {
                retry_after_seconds: 1
            }),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[tokio::test]
    async fn unexpected_body_is_generic() -> Result<()> {
        let response = AuthError::from(anyhow!("pool timed out")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(response).await?;
        assert_eq!(body["error"], "An unexpected error occurred.");
        Ok(())
    }

    #[test]
    fn expired_carries_bearer_challenge() {
        let response = AuthError::Expired.into_response();
        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok());
        assert_eq!(
            challenge,
            Some(r#"Bearer error="invalid_token", error_description="expired""#)
        );
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let response = AuthError::RateLimited {
            retry_after_seconds: 42,
        }
        .into_response();
        assert_eq!(
            response.headers().get(RETRY_AFTER),
            Some(&HeaderValue::from(42u64))
        );
    }
}
