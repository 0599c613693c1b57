use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

use crate::auth::token::{Environment, DEFAULT_ACCESS_TTL_SECONDS, DEFAULT_REFRESH_TTL_SECONDS};

pub const ARG_ENVIRONMENT: &str = "environment";
pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_ACCESS_TOKEN_TTL_SECONDS: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL_SECONDS: &str = "refresh-token-ttl-seconds";
pub const ARG_ALLOWED_ORIGINS: &str = "allowed-origins";
pub const ARG_TRUST_FORWARDED_HEADERS: &str = "trust-forwarded-headers";

const DEFAULT_ALLOWED_ORIGINS: [&str; 3] = [
    "http://localhost:5173",
    "http://localhost:3000",
    "http://localhost:8080",
];

#[derive(Debug, Clone)]
pub struct Options {
    pub environment: Environment,
    pub jwt_secret: Option<SecretString>,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub allowed_origins: Vec<String>,
    pub trust_forwarded_headers: bool,
}

impl Options {
    /// Parse token and CORS arguments from matches.
    ///
    /// # Errors
    /// Returns an error if no allowed origin remains after trimming.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let allowed_origins: Vec<String> = matches
            .get_many::<String>(ARG_ALLOWED_ORIGINS)
            .map(|values| {
                values
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if allowed_origins.is_empty() {
            anyhow::bail!("missing required argument: --{ARG_ALLOWED_ORIGINS}");
        }

        Ok(Self {
            environment: matches
                .get_one::<Environment>(ARG_ENVIRONMENT)
                .copied()
                .unwrap_or_default(),
            jwt_secret: matches
                .get_one::<String>(ARG_JWT_SECRET)
                .filter(|value| !value.is_empty())
                .map(|value| SecretString::from(value.clone())),
            access_token_ttl_seconds: matches
                .get_one::<i64>(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_ACCESS_TTL_SECONDS),
            refresh_token_ttl_seconds: matches
                .get_one::<i64>(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_REFRESH_TTL_SECONDS),
            allowed_origins,
            trust_forwarded_headers: matches.get_flag(ARG_TRUST_FORWARDED_HEADERS),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_cors_args(command);
    with_proxy_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ENVIRONMENT)
                .long(ARG_ENVIRONMENT)
                .help("Deployment environment: development or production")
                .long_help(
                    "Deployment environment. In production a missing --jwt-secret is a startup error; in development a random secret is generated for the lifetime of the process.",
                )
                .env("BACKOFFICE_ENV")
                .default_value("development")
                .value_parser(|value: &str| value.parse::<Environment>()),
        )
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("Secret used to sign access tokens (at least 32 bytes)")
                .env("BACKOFFICE_JWT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .long(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .help("Access token TTL in seconds")
                .env("BACKOFFICE_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .long(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .help("Refresh token TTL in seconds")
                .env("BACKOFFICE_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("2592000")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}

fn with_cors_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_ALLOWED_ORIGINS)
            .long(ARG_ALLOWED_ORIGINS)
            .help("Comma separated list of origins allowed by CORS")
            .env("BACKOFFICE_ALLOWED_ORIGINS")
            .value_delimiter(',')
            .default_values(DEFAULT_ALLOWED_ORIGINS),
    )
}

fn with_proxy_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_TRUST_FORWARDED_HEADERS)
            .long(ARG_TRUST_FORWARDED_HEADERS)
            .help("Identify callers by x-forwarded-for/x-real-ip")
            .long_help(
                "Identify callers by the x-forwarded-for or x-real-ip header instead of the socket address. Enable only behind a reverse proxy that overwrites these headers, otherwise clients can pick their own rate-limit key.",
            )
            .env("BACKOFFICE_TRUST_FORWARDED_HEADERS")
            .action(ArgAction::SetTrue),
    )
}
