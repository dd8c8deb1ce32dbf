use clap::{Arg, Command};

use crate::firebase::{DEFAULT_FIRESTORE_URL, DEFAULT_IDENTITY_TOOLKIT_URL};

pub const ARG_PROJECT_ID: &str = "firebase-project-id";
pub const ARG_API_KEY: &str = "firebase-api-key";
pub const ARG_SERVICE_ACCOUNT: &str = "firebase-service-account";
pub const ARG_ACCESS_TOKEN: &str = "firebase-access-token";
pub const ARG_IDENTITY_TOOLKIT_URL: &str = "identity-toolkit-url";
pub const ARG_FIRESTORE_URL: &str = "firestore-url";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PROJECT_ID)
                .long(ARG_PROJECT_ID)
                .help("Firebase project id (defaults to the service account's project)")
                .env("PREPWISE_FIREBASE_PROJECT_ID"),
        )
        .arg(
            Arg::new(ARG_API_KEY)
                .long(ARG_API_KEY)
                .help("Firebase Web API key used for email/password sign-up and sign-in")
                .env("PREPWISE_FIREBASE_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_SERVICE_ACCOUNT)
                .long(ARG_SERVICE_ACCOUNT)
                .help("Path to the service account key file (JSON)")
                .env("PREPWISE_FIREBASE_SERVICE_ACCOUNT")
                .conflicts_with(ARG_ACCESS_TOKEN),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN)
                .long(ARG_ACCESS_TOKEN)
                .help("Static bearer token instead of a service account (emulators use \"owner\")")
                .env("PREPWISE_FIREBASE_ACCESS_TOKEN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_IDENTITY_TOOLKIT_URL)
                .long(ARG_IDENTITY_TOOLKIT_URL)
                .help("Identity Toolkit base URL")
                .env("PREPWISE_IDENTITY_TOOLKIT_URL")
                .default_value(DEFAULT_IDENTITY_TOOLKIT_URL),
        )
        .arg(
            Arg::new(ARG_FIRESTORE_URL)
                .long(ARG_FIRESTORE_URL)
                .help("Firestore base URL")
                .env("PREPWISE_FIRESTORE_URL")
                .default_value(DEFAULT_FIRESTORE_URL),
        )
}
