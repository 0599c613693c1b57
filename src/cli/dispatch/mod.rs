//! Map parsed arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, bootstrap, ARG_DSN, ARG_PORT};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let bootstrap_opts = bootstrap::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        environment: auth_opts.environment,
        jwt_secret: auth_opts.jwt_secret,
        access_token_ttl_seconds: auth_opts.access_token_ttl_seconds,
        refresh_token_ttl_seconds: auth_opts.refresh_token_ttl_seconds,
        allowed_origins: auth_opts.allowed_origins,
        trust_forwarded_headers: auth_opts.trust_forwarded_headers,
        admin_username: bootstrap_opts.username,
        admin_password: bootstrap_opts.password,
    }))
}
