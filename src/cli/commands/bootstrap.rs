use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_ADMIN_USERNAME: &str = "admin-username";
pub const ARG_ADMIN_PASSWORD: &str = "admin-password";

/// Credentials of the superadmin seeded at startup.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            username: matches
                .get_one::<String>(ARG_ADMIN_USERNAME)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            password: matches
                .get_one::<String>(ARG_ADMIN_PASSWORD)
                .filter(|value| !value.is_empty())
                .map(|value| SecretString::from(value.clone())),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ADMIN_USERNAME)
                .long(ARG_ADMIN_USERNAME)
                .help("Username of the bootstrap superadmin")
                .env("BACKOFFICE_ADMIN_USERNAME"),
        )
        .arg(
            Arg::new(ARG_ADMIN_PASSWORD)
                .long(ARG_ADMIN_PASSWORD)
                .help("Password of the bootstrap superadmin")
                .long_help(
                    "Password of the bootstrap superadmin. Only used when the account is created; an existing account keeps its password and is elevated to superadmin.",
                )
                .env("BACKOFFICE_ADMIN_PASSWORD")
                .hide_env_values(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn parse_from_env() {
        temp_env::with_vars(
            [
                ("BACKOFFICE_ADMIN_USERNAME", Some(" root ")),
                ("BACKOFFICE_ADMIN_PASSWORD", Some("Sup3rSecret!")),
            ],
            || {
                let matches = with_args(Command::new("test")).get_matches_from(vec!["test"]);
                let options = Options::parse(&matches);
                assert_eq!(options.username.as_deref(), Some("root"));
                assert_eq!(
                    options.password.as_ref().map(|secret| secret.expose_secret()),
                    Some("Sup3rSecret!")
                );
            },
        );
    }

    #[test]
    fn empty_values_are_unset() {
        temp_env::with_vars(
            [
                ("BACKOFFICE_ADMIN_USERNAME", Some("  ")),
                ("BACKOFFICE_ADMIN_PASSWORD", Some("")),
            ],
            || {
                let matches = with_args(Command::new("test")).get_matches_from(vec!["test"]);
                let options = Options::parse(&matches);
                assert!(options.username.is_none());
                assert!(options.password.is_none());
            },
        );
    }
}
