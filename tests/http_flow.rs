use anyhow::{anyhow, Result};
use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER, WWW_AUTHENTICATE},
        Method, Request, StatusCode,
    },
    Router,
};
use backoffice::{
    api::{self, state::AuthStateBuilder},
    auth::{
        audit::MemoryAuditLog,
        operator::Operator,
        password::hash_password,
        rate_limit::{FixedWindowLimiter, LimiterConfig, Limiters},
        token::AccessSigner,
        Role,
    },
    store::{
        memory::{MemoryCredentialStore, MemoryRefreshRegistry},
        CredentialStore,
    },
};
use chrono::{Duration, Utc};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc, time};
use tower::ServiceExt;

const ROOT_PASSWORD: &str = "R00tPassw0rd";
const OPS_PASSWORD: &str = "Passw0rd!";

struct TestApp {
    router: Router,
    signer: AccessSigner,
    credentials: Arc<MemoryCredentialStore>,
    root: Operator,
    ops: Operator,
}

struct Reply {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    body: Value,
}

impl Reply {
    fn str(&self, field: &str) -> Result<&str> {
        self.body
            .get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("missing `{field}` in {}", self.body))
    }

    fn header(&self, name: impl axum::http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

fn peer(last_octet: u8) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, last_octet], 40_000))
}

/// Global throttle allowing a single request per caller per minute.
fn one_request_per_minute() -> Limiters {
    Limiters::disabled().with_global(Arc::new(FixedWindowLimiter::in_memory(
        LimiterConfig::new("global", 1, time::Duration::from_secs(60)),
    )))
}

async fn test_app() -> Result<TestApp> {
    test_app_with(Limiters::standard(), false).await
}

async fn test_app_with(limiters: Limiters, trust_forwarded_headers: bool) -> Result<TestApp> {
    let signer = AccessSigner::new(&SecretString::from(
        "an-integration-test-secret-of-sufficient-length".to_string(),
    ));
    let credentials = Arc::new(MemoryCredentialStore::new());

    let root = Operator::new(
        "root".to_string(),
        hash_password(ROOT_PASSWORD).await?,
        Role::Superadmin,
    );
    let ops = Operator::new(
        "ops1".to_string(),
        hash_password(OPS_PASSWORD).await?,
        Role::Admin,
    );
    credentials.create(&root).await?;
    credentials.create(&ops).await?;

    let state = AuthStateBuilder::new(
        credentials.clone(),
        Arc::new(MemoryRefreshRegistry::new()),
        signer.clone(),
    )
    .with_audit(Arc::new(MemoryAuditLog::default()))
    .with_limiters(limiters)
    .with_trust_forwarded_headers(trust_forwarded_headers)
    .build();

    let router = api::app(
        Arc::new(state),
        &["http://localhost:5173".to_string()],
    )?;

    Ok(TestApp {
        router,
        signer,
        credentials,
        root,
        ops,
    })
}

impl TestApp {
    async fn call(
        &self,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> Result<Reply> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };
        self.send(request).await
    }

    /// `GET /health` from `from`, with extra request headers.
    async fn health_from(&self, from: SocketAddr, headers: &[(&str, &str)]) -> Result<Reply> {
        let mut builder = Request::builder().method(Method::GET).uri("/health");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut request = builder.body(Body::empty())?;
        request.extensions_mut().insert(ConnectInfo(from));
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> Result<Reply> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };

        Ok(Reply {
            status,
            headers,
            body,
        })
    }

    async fn login(&self, username: &str, password: &str) -> Result<Reply> {
        self.call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": username, "password": password })),
        )
        .await
    }

    async fn access_token(&self, username: &str, password: &str) -> Result<String> {
        let reply = self.login(username, password).await?;
        assert_eq!(reply.status, StatusCode::OK, "login failed: {}", reply.body);
        Ok(reply.str("accessToken")?.to_string())
    }
}

#[tokio::test]
async fn login_refresh_rotation_and_replay() -> Result<()> {
    let app = test_app().await?;

    let login = app.login("ops1", OPS_PASSWORD).await?;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.body["user"]["username"], "ops1");
    assert_eq!(login.body["user"]["role"], "admin");
    assert!(login.body["user"].get("passwordHash").is_none());
    let access = login.str("accessToken")?.to_string();
    let first_refresh = login.str("refreshToken")?.to_string();

    let me = app.call(Method::GET, "/auth/me", Some(&access), None).await?;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.str("username")?, "ops1");
    assert_eq!(me.str("id")?, app.ops.id.to_string());

    let rotated = app
        .call(
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({ "refreshToken": first_refresh })),
        )
        .await?;
    assert_eq!(rotated.status, StatusCode::OK);
    let second_refresh = rotated.str("refreshToken")?.to_string();
    assert_ne!(second_refresh, first_refresh);
    assert!(!rotated.str("accessToken")?.is_empty());

    let replay = app
        .call(
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({ "refreshToken": first_refresh })),
        )
        .await?;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
    assert_eq!(replay.str("error")?, "Invalid refresh token.");

    let again = app
        .call(
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({ "refreshToken": second_refresh })),
        )
        .await?;
    assert_eq!(again.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn login_failures_look_alike() -> Result<()> {
    let app = test_app().await?;

    let wrong = app.login("ops1", "not-the-password").await?;
    let unknown = app.login("ghost", "not-the-password").await?;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.body, unknown.body);
    assert_eq!(wrong.str("error")?, "Invalid credentials.");

    let missing = app
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "ops1" })),
        )
        .await?;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.str("error")?, "Username and password are required.");

    let no_body = app.call(Method::POST, "/auth/login", None, None).await?;
    assert_eq!(no_body.status, StatusCode::BAD_REQUEST);

    let no_refresh = app
        .call(Method::POST, "/auth/refresh", None, Some(json!({})))
        .await?;
    assert_eq!(no_refresh.status, StatusCode::BAD_REQUEST);
    assert_eq!(no_refresh.str("error")?, "Refresh token required.");
    Ok(())
}

#[tokio::test]
async fn sixth_login_attempt_is_rate_limited() -> Result<()> {
    let app = test_app().await?;

    for _ in 0..5 {
        let reply = app.login("ops1", "wrong-password").await?;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    }

    let limited = app.login("ops1", OPS_PASSWORD).await?;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.header(RETRY_AFTER).is_some());
    assert!(!limited.str("error")?.is_empty());

    // Other usernames have their own window.
    let other = app.login("root", ROOT_PASSWORD).await?;
    assert_eq!(other.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn admin_routes_require_superadmin() -> Result<()> {
    let app = test_app().await?;
    let ops_access = app.access_token("ops1", OPS_PASSWORD).await?;
    let root_access = app.access_token("root", ROOT_PASSWORD).await?;

    let forbidden = app
        .call(Method::GET, "/auth/admins", Some(&ops_access), None)
        .await?;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
    assert_eq!(forbidden.str("error")?, "Superadmin access required.");

    let listed = app
        .call(Method::GET, "/auth/admins", Some(&root_access), None)
        .await?;
    assert_eq!(listed.status, StatusCode::OK);
    let operators = listed
        .body
        .as_array()
        .ok_or_else(|| anyhow!("expected array, got {}", listed.body))?;
    assert_eq!(operators.len(), 2);
    assert!(operators
        .iter()
        .all(|operator| operator.get("passwordHash").is_none()));
    Ok(())
}

#[tokio::test]
async fn operator_lifecycle_and_protections() -> Result<()> {
    let app = test_app().await?;
    let root_access = app.access_token("root", ROOT_PASSWORD).await?;

    let created = app
        .call(
            Method::POST,
            "/auth/admins",
            Some(&root_access),
            Some(json!({ "username": "ops2", "password": "Passw0rd!" })),
        )
        .await?;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.str("role")?, "admin");
    let ops2_id = created.str("id")?.to_string();

    let duplicate = app
        .call(
            Method::POST,
            "/auth/admins",
            Some(&root_access),
            Some(json!({ "username": "ops2", "password": "Passw0rd!" })),
        )
        .await?;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert_eq!(duplicate.str("error")?, "Username already exists.");

    let short = app
        .call(
            Method::POST,
            "/auth/admins",
            Some(&root_access),
            Some(json!({ "username": "ops3", "password": "short" })),
        )
        .await?;
    assert_eq!(short.status, StatusCode::BAD_REQUEST);

    let delete_self = app
        .call(
            Method::DELETE,
            &format!("/auth/admins/{}", app.root.id),
            Some(&root_access),
            None,
        )
        .await?;
    assert_eq!(delete_self.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        delete_self.str("error")?,
        "You cannot delete your own account."
    );

    let second_root = Operator::new(
        "root2".to_string(),
        hash_password(ROOT_PASSWORD).await?,
        Role::Superadmin,
    );
    app.credentials.create(&second_root).await?;
    let delete_superadmin = app
        .call(
            Method::DELETE,
            &format!("/auth/admins/{}", second_root.id),
            Some(&root_access),
            None,
        )
        .await?;
    assert_eq!(delete_superadmin.status, StatusCode::FORBIDDEN);
    assert_eq!(
        delete_superadmin.str("error")?,
        "Cannot delete a superadmin account."
    );

    let missing = app
        .call(
            Method::DELETE,
            "/auth/admins/not-a-uuid",
            Some(&root_access),
            None,
        )
        .await?;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.str("error")?, "Admin not found.");

    let deleted = app
        .call(
            Method::DELETE,
            &format!("/auth/admins/{ops2_id}"),
            Some(&root_access),
            None,
        )
        .await?;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.str("message")?, "Admin \"ops2\" deleted.");

    let gone = app.login("ops2", "Passw0rd!").await?;
    assert_eq!(gone.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn created_operators_cannot_request_superadmin() -> Result<()> {
    let app = test_app().await?;
    let root_access = app.access_token("root", ROOT_PASSWORD).await?;

    let created = app
        .call(
            Method::POST,
            "/auth/admins",
            Some(&root_access),
            Some(json!({ "username": "eve", "password": "Passw0rd!", "role": "superadmin" })),
        )
        .await?;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.str("role")?, "admin");

    let eve_access = app.access_token("eve", "Passw0rd!").await?;
    let admins = app
        .call(Method::GET, "/auth/admins", Some(&eve_access), None)
        .await?;
    assert_eq!(admins.status, StatusCode::FORBIDDEN);

    // Still deletable, which a superadmin would not be.
    let deleted = app
        .call(
            Method::DELETE,
            &format!("/auth/admins/{}", created.str("id")?),
            Some(&root_access),
            None,
        )
        .await?;
    assert_eq!(deleted.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn reset_password_revokes_target_sessions() -> Result<()> {
    let app = test_app().await?;
    let root_access = app.access_token("root", ROOT_PASSWORD).await?;
    let ops_login = app.login("ops1", OPS_PASSWORD).await?;
    let ops_refresh = ops_login.str("refreshToken")?.to_string();

    let reset = app
        .call(
            Method::PUT,
            &format!("/auth/admins/{}/reset-password", app.ops.id),
            Some(&root_access),
            Some(json!({ "newPassword": "Fresh-Passw0rd" })),
        )
        .await?;
    assert_eq!(reset.status, StatusCode::OK);
    assert_eq!(
        reset.str("message")?,
        "Password reset for \"ops1\". They need to login again."
    );

    let stale = app
        .call(
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({ "refreshToken": ops_refresh })),
        )
        .await?;
    assert_eq!(stale.status, StatusCode::UNAUTHORIZED);

    assert_eq!(
        app.login("ops1", "Fresh-Passw0rd").await?.status,
        StatusCode::OK
    );

    let own = app
        .call(
            Method::PUT,
            &format!("/auth/admins/{}/reset-password", app.root.id),
            Some(&root_access),
            Some(json!({ "newPassword": "Another-Passw0rd" })),
        )
        .await?;
    assert_eq!(own.status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn change_password_revokes_refresh() -> Result<()> {
    let app = test_app().await?;
    let login = app.login("ops1", OPS_PASSWORD).await?;
    let access = login.str("accessToken")?.to_string();
    let refresh = login.str("refreshToken")?.to_string();

    let wrong = app
        .call(
            Method::POST,
            "/auth/change-password",
            Some(&access),
            Some(json!({ "currentPassword": "nope-nope", "newPassword": "N3w-Passw0rd" })),
        )
        .await?;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.str("error")?, "Current password is incorrect.");

    let changed = app
        .call(
            Method::POST,
            "/auth/change-password",
            Some(&access),
            Some(json!({ "currentPassword": OPS_PASSWORD, "newPassword": "N3w-Passw0rd" })),
        )
        .await?;
    assert_eq!(changed.status, StatusCode::OK);

    let revoked = app
        .call(
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({ "refreshToken": refresh })),
        )
        .await?;
    assert_eq!(revoked.status, StatusCode::UNAUTHORIZED);

    // The access token lives on until it expires.
    let me = app.call(Method::GET, "/auth/me", Some(&access), None).await?;
    assert_eq!(me.status, StatusCode::OK);

    assert_eq!(
        app.login("ops1", OPS_PASSWORD).await?.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        app.login("ops1", "N3w-Passw0rd").await?.status,
        StatusCode::OK
    );
    Ok(())
}

#[tokio::test]
async fn bearer_failures_are_distinguished() -> Result<()> {
    let app = test_app().await?;

    let missing = app.call(Method::GET, "/auth/me", None, None).await?;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.str("error")?, "Access denied. No token provided.");

    let garbage = app
        .call(Method::GET, "/auth/me", Some("not.a.jwt"), None)
        .await?;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);
    assert_eq!(garbage.str("error")?, "Invalid token.");
    assert_eq!(
        garbage.header(WWW_AUTHENTICATE),
        Some(r#"Bearer error="invalid_token", error_description="invalid""#)
    );

    let expired_token = app
        .signer
        .issue_at(&app.ops, Utc::now() - Duration::days(8))?;
    let expired = app
        .call(Method::GET, "/auth/me", Some(&expired_token), None)
        .await?;
    assert_eq!(expired.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        expired.str("error")?,
        "Token expired. Please refresh your token."
    );
    assert_eq!(
        expired.header(WWW_AUTHENTICATE),
        Some(r#"Bearer error="invalid_token", error_description="expired""#)
    );

    let foreign = AccessSigner::new(&SecretString::from(
        "some-other-deployment-secret-entirely-000".to_string(),
    ))
    .issue(&app.root)?;
    let forged = app
        .call(Method::GET, "/auth/admins", Some(&foreign), None)
        .await?;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn audit_log_lists_newest_first() -> Result<()> {
    let app = test_app().await?;
    let root_access = app.access_token("root", ROOT_PASSWORD).await?;

    let created = app
        .call(
            Method::POST,
            "/auth/admins",
            Some(&root_access),
            Some(json!({ "username": "ops2", "password": "Passw0rd!" })),
        )
        .await?;
    let ops2_id = created.str("id")?.to_string();
    app.call(
        Method::PUT,
        &format!("/auth/admins/{ops2_id}/reset-password"),
        Some(&root_access),
        Some(json!({ "newPassword": "Fresh-Passw0rd" })),
    )
    .await?;

    let ops_access = app.access_token("ops1", OPS_PASSWORD).await?;
    let log = app
        .call(Method::GET, "/auth/audit-log", Some(&ops_access), None)
        .await?;
    assert_eq!(log.status, StatusCode::OK);
    let events = log
        .body
        .as_array()
        .ok_or_else(|| anyhow!("expected array, got {}", log.body))?;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["action"], "reset-password");
    assert_eq!(events[0]["resourceId"], ops2_id.as_str());
    assert_eq!(events[0]["identityUsername"], "root");
    assert_eq!(events[1]["action"], "create-operator");

    let anonymous = app.call(Method::GET, "/auth/audit-log", None, None).await?;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn health_and_request_id() -> Result<()> {
    let app = test_app().await?;

    let health = app.call(Method::GET, "/health", None, None).await?;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.str("database")?, "ok");
    assert_eq!(health.str("name")?, env!("CARGO_PKG_NAME"));
    assert!(health
        .header("x-app")
        .is_some_and(|value| value.starts_with(env!("CARGO_PKG_NAME"))));
    assert!(health.header("x-request-id").is_some());

    let options = app.call(Method::OPTIONS, "/health", None, None).await?;
    assert_eq!(options.status, StatusCode::OK);
    assert_eq!(options.body, Value::Null);
    Ok(())
}

#[tokio::test]
async fn global_throttle_rejects_over_limit() -> Result<()> {
    let app = test_app_with(one_request_per_minute(), false).await?;

    let first = app.health_from(peer(1), &[]).await?;
    assert_eq!(first.status, StatusCode::OK);

    let second = app.health_from(peer(1), &[]).await?;
    assert_eq!(second.status, StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = second
        .header(RETRY_AFTER)
        .ok_or_else(|| anyhow!("missing Retry-After"))?
        .parse()?;
    assert!((1..=60).contains(&retry_after));
    assert!(!second.str("error")?.is_empty());

    // Another address has its own window.
    let other = app.health_from(peer(2), &[]).await?;
    assert_eq!(other.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn spoofed_forwarded_headers_do_not_reset_the_throttle() -> Result<()> {
    let app = test_app_with(one_request_per_minute(), false).await?;

    let first = app
        .health_from(peer(1), &[("x-forwarded-for", "203.0.113.1")])
        .await?;
    assert_eq!(first.status, StatusCode::OK);

    let spoofed = app
        .health_from(
            peer(1),
            &[("x-forwarded-for", "203.0.113.2"), ("x-real-ip", "203.0.113.3")],
        )
        .await?;
    assert_eq!(spoofed.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(spoofed.header(RETRY_AFTER).is_some());
    assert!(!spoofed.str("error")?.is_empty());
    Ok(())
}

#[tokio::test]
async fn trusted_forwarded_headers_key_the_throttle() -> Result<()> {
    let app = test_app_with(one_request_per_minute(), true).await?;

    let first = app
        .health_from(peer(1), &[("x-forwarded-for", "203.0.113.1, 10.0.0.1")])
        .await?;
    assert_eq!(first.status, StatusCode::OK);

    // Same proxy socket, different client behind it.
    let other_client = app
        .health_from(peer(1), &[("x-forwarded-for", "203.0.113.2, 10.0.0.1")])
        .await?;
    assert_eq!(other_client.status, StatusCode::OK);

    let repeat = app
        .health_from(peer(9), &[("x-forwarded-for", "203.0.113.1")])
        .await?;
    assert_eq!(repeat.status, StatusCode::TOO_MANY_REQUESTS);
    Ok(())
}
