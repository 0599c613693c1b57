use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    middleware,
    routing::{delete, get, post, put},
    Extension, Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use url::Url;

mod error;
pub mod extract;
pub mod handlers;
// The document is also printed by the `openapi` binary.
mod openapi;
pub mod state;

pub use self::{error::ErrorBody, openapi::openapi, state::AuthState};

use self::handlers::{admins, audit, health, session, throttle};

/// Build the application router.
///
/// # Errors
/// Returns an error if an allowed origin is not a valid URL.
pub fn app(state: Arc<AuthState>, allowed_origins: &[String]) -> Result<Router> {
    let origins = allowed_origins
        .iter()
        .map(|origin| origin_header(origin))
        .collect::<Result<Vec<_>>>()?;

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true);

    let app = Router::new()
        .route("/health", get(health::health).options(health::health))
        .route("/auth/login", post(session::login))
        .route("/auth/refresh", post(session::refresh))
        .route("/auth/change-password", post(session::change_password))
        .route("/auth/me", get(session::me))
        .route("/auth/admins", get(admins::list).post(admins::create))
        .route("/auth/admins/:id", delete(admins::delete))
        .route("/auth/admins/:id/reset-password", put(admins::reset_password))
        .route("/auth/audit-log", get(audit::audit_log))
        // Runs after the state extension below is in place.
        .layer(middleware::from_fn(throttle::global))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state)),
        );

    Ok(app)
}

/// Serve `app` on `[::]:port` until SIGINT or SIGTERM.
///
/// # Errors
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(port: u16, app: Router) -> Result<()> {
    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Gracefully shutdown");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

/// Reduce a configured origin URL to `scheme://host[:port]`.
fn origin_header(origin: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(origin.trim())
        .with_context(|| format!("Invalid allowed origin: {origin}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Allowed origin must include a valid host: {origin}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let value = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&value).context("Failed to build origin header")
}
