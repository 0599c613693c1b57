use crate::{
    api::{self, state::AuthStateBuilder},
    auth::{
        audit::MemoryAuditLog,
        bootstrap::{ensure_superadmin, BootstrapOutcome},
        token::{resolve_signing_secret, AccessSigner, Environment},
    },
    cli::telemetry,
    store::postgres::{apply_schema, PgCredentialStore, PgRefreshRegistry},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub environment: Environment,
    pub jwt_secret: Option<SecretString>,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub allowed_origins: Vec<String>,
    pub trust_forwarded_headers: bool,
    pub admin_username: Option<String>,
    pub admin_password: Option<SecretString>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if configuration is unusable, the database is unreachable,
/// or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    // Resolved before touching the database so a bad deployment fails fast.
    let secret = resolve_signing_secret(args.jwt_secret, args.environment)?;
    let signer = AccessSigner::new(&secret).with_ttl_seconds(args.access_token_ttl_seconds);

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    apply_schema(&pool)
        .await
        .context("Failed to apply database schema")?;

    let credentials = Arc::new(PgCredentialStore::new(pool.clone()));
    let registry = Arc::new(PgRefreshRegistry::new(pool));

    match ensure_superadmin(
        credentials.as_ref(),
        args.admin_username.as_deref(),
        args.admin_password.as_ref(),
    )
    .await
    .context("Failed to seed superadmin")?
    {
        BootstrapOutcome::Created(id) => info!(%id, "Superadmin created"),
        BootstrapOutcome::Elevated(id) => info!(%id, "Existing operator elevated to superadmin"),
        BootstrapOutcome::Unchanged(_) | BootstrapOutcome::Skipped => {}
    }

    let state = AuthStateBuilder::new(credentials, registry, signer)
        .with_refresh_ttl_seconds(args.refresh_token_ttl_seconds)
        .with_audit(Arc::new(MemoryAuditLog::default()))
        .with_trust_forwarded_headers(args.trust_forwarded_headers)
        .build();

    let app = api::app(Arc::new(state), &args.allowed_origins)?;

    let result = api::serve(args.port, app).await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        ("environment", args.environment.to_string()),
        ("jwt_secret_set", args.jwt_secret.is_some().to_string()),
        (
            "access_token_ttl_seconds",
            args.access_token_ttl_seconds.to_string(),
        ),
        (
            "refresh_token_ttl_seconds",
            args.refresh_token_ttl_seconds.to_string(),
        ),
        ("allowed_origins", args.allowed_origins.join(",")),
        (
            "trust_forwarded_headers",
            args.trust_forwarded_headers.to_string(),
        ),
        (
            "admin_username",
            args.admin_username
                .clone()
                .unwrap_or_else(|| "n/a".to_string()),
        ),
        ("admin_password_set", args.admin_password.is_some().to_string()),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = String::from("Startup configuration:");
    for (key, value) in &entries {
        message.push_str(&format!("\n  {key:<max_key_len$} : {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_dsn_hides_password() {
        assert_eq!(
            redact_dsn("postgres://ops:hunter2@db:5432/backoffice"),
            "postgres://ops:REDACTED@db:5432/backoffice"
        );
        assert_eq!(
            redact_dsn("postgres://ops@db:5432/backoffice"),
            "postgres://ops@db:5432/backoffice"
        );
        assert_eq!(redact_dsn("::nope"), "invalid-dsn");
    }
}
