pub mod firebase;
pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_BACKEND: &str = "backend";
pub const ARG_ENVIRONMENT: &str = "environment";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";

/// Check the arguments the chosen backend needs.
///
/// # Errors
/// Returns an error string if the Firebase backend is selected without credentials.
pub fn validate(matches: &clap::ArgMatches) -> Result<(), String> {
    if matches.get_one::<String>(ARG_BACKEND).map(String::as_str) != Some("firebase") {
        return Ok(());
    }

    if !matches.contains_id(firebase::ARG_API_KEY) {
        return Err("Missing required argument: --firebase-api-key".to_string());
    }
    if !matches.contains_id(firebase::ARG_SERVICE_ACCOUNT)
        && !matches.contains_id(firebase::ARG_ACCESS_TOKEN)
    {
        return Err(
            "Missing required argument: --firebase-service-account or --firebase-access-token"
                .to_string(),
        );
    }
    if matches.contains_id(firebase::ARG_ACCESS_TOKEN)
        && !matches.contains_id(firebase::ARG_PROJECT_ID)
    {
        return Err(
            "Missing required argument: --firebase-project-id (required with --firebase-access-token)"
                .to_string(),
        );
    }
    Ok(())
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("prepwise")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("PREPWISE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_BACKEND)
                .long(ARG_BACKEND)
                .help("Provider backend; memory keeps everything in process")
                .env("PREPWISE_BACKEND")
                .default_value("firebase")
                .value_parser(["firebase", "memory"]),
        )
        .arg(
            Arg::new(ARG_ENVIRONMENT)
                .long(ARG_ENVIRONMENT)
                .help("Deployment environment; production marks the session cookie Secure")
                .env("PREPWISE_ENVIRONMENT")
                .default_value("development")
                .value_parser(["development", "production"]),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL, used as the CORS origin")
                .env("PREPWISE_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        );

    let command = firebase::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIREBASE_ENV: [&str; 6] = [
        "PREPWISE_FIREBASE_PROJECT_ID",
        "PREPWISE_FIREBASE_API_KEY",
        "PREPWISE_FIREBASE_SERVICE_ACCOUNT",
        "PREPWISE_FIREBASE_ACCESS_TOKEN",
        "PREPWISE_BACKEND",
        "PREPWISE_LOG_LEVEL",
    ];

    fn cleared() -> Vec<(&'static str, Option<&'static str>)> {
        FIREBASE_ENV.iter().map(|key| (*key, None)).collect()
    }

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "prepwise");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some(env!("CARGO_PKG_DESCRIPTION").to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_defaults() {
        temp_env::with_vars(cleared(), || {
            let matches = new().get_matches_from(vec!["prepwise"]);
            assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(8080));
            assert_eq!(
                matches.get_one::<String>(ARG_BACKEND).map(String::as_str),
                Some("firebase")
            );
            assert_eq!(
                matches.get_one::<String>(ARG_ENVIRONMENT).map(String::as_str),
                Some("development")
            );
            assert_eq!(
                matches
                    .get_one::<String>(firebase::ARG_FIRESTORE_URL)
                    .map(String::as_str),
                Some(crate::firebase::DEFAULT_FIRESTORE_URL)
            );
        });
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("PREPWISE_PORT", Some("443")),
                ("PREPWISE_ENVIRONMENT", Some("production")),
                ("PREPWISE_FIREBASE_PROJECT_ID", Some("prepwise-prod")),
                ("PREPWISE_FIREBASE_API_KEY", Some("AIza-test")),
                ("PREPWISE_FIREBASE_ACCESS_TOKEN", Some("owner")),
                ("PREPWISE_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["prepwise"]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(443));
                assert_eq!(
                    matches
                        .get_one::<String>(firebase::ARG_PROJECT_ID)
                        .map(String::as_str),
                    Some("prepwise-prod")
                );
                assert_eq!(matches.get_one::<u8>("verbosity").copied(), Some(2));
                assert!(validate(&matches).is_ok());
            },
        );
    }

    #[test]
    fn test_check_log_level_verbosity() {
        for index in 0..5_usize {
            temp_env::with_vars([("PREPWISE_LOG_LEVEL", None::<String>)], || {
                let mut args = vec!["prepwise".to_string()];
                if index > 0 {
                    args.push(format!("-{}", "v".repeat(index)));
                }
                let matches = new().get_matches_from(args);
                assert_eq!(
                    matches.get_one::<u8>("verbosity").copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_validate_firebase_requirements() {
        temp_env::with_vars(cleared(), || {
            let matches = new().get_matches_from(vec!["prepwise"]);
            assert!(validate(&matches)
                .is_err_and(|err| err.contains("--firebase-api-key")));

            let matches =
                new().get_matches_from(vec!["prepwise", "--firebase-api-key", "AIza-test"]);
            assert!(validate(&matches)
                .is_err_and(|err| err.contains("--firebase-service-account")));

            let matches = new().get_matches_from(vec![
                "prepwise",
                "--firebase-api-key",
                "AIza-test",
                "--firebase-access-token",
                "owner",
            ]);
            assert!(validate(&matches)
                .is_err_and(|err| err.contains("--firebase-project-id")));

            let matches = new().get_matches_from(vec![
                "prepwise",
                "--firebase-api-key",
                "AIza-test",
                "--firebase-service-account",
                "/etc/prepwise/sa.json",
            ]);
            assert!(validate(&matches).is_ok());
        });
    }

    #[test]
    fn test_memory_backend_needs_no_credentials() {
        temp_env::with_vars(cleared(), || {
            let matches = new().get_matches_from(vec!["prepwise", "--backend", "memory"]);
            assert!(validate(&matches).is_ok());
        });
    }

    #[test]
    fn test_credential_conflict() {
        temp_env::with_vars(cleared(), || {
            let result = new().try_get_matches_from(vec![
                "prepwise",
                "--firebase-service-account",
                "/etc/prepwise/sa.json",
                "--firebase-access-token",
                "owner",
            ]);
            assert_eq!(
                result.map_err(|e| e.kind()),
                Err(clap::error::ErrorKind::ArgumentConflict)
            );
        });
    }

    #[test]
    fn test_invalid_backend() {
        let result = new().try_get_matches_from(vec!["prepwise", "--backend", "postgres"]);
        assert_eq!(
            result.map_err(|e| e.kind()),
            Err(clap::error::ErrorKind::InvalidValue)
        );
    }
}
