use crate::cli::{
    actions::{
        server::{Args, Backend, FirebaseArgs},
        Action,
    },
    commands::{self, firebase},
};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use std::path::PathBuf;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    commands::validate(matches).map_err(|e| anyhow!(e))?;

    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(8080);
    let production = matches
        .get_one::<String>(commands::ARG_ENVIRONMENT)
        .is_some_and(|env| env == "production");
    let frontend_base_url = matches
        .get_one::<String>(commands::ARG_FRONTEND_BASE_URL)
        .cloned()
        .context("missing required argument: --frontend-base-url")?;

    let backend = match matches
        .get_one::<String>(commands::ARG_BACKEND)
        .map(String::as_str)
    {
        Some("memory") => Backend::Memory,
        _ => Backend::Firebase(firebase_args(matches)?),
    };

    Ok(Action::Server(Args {
        port,
        backend,
        production,
        frontend_base_url,
    }))
}

fn firebase_args(matches: &clap::ArgMatches) -> Result<FirebaseArgs> {
    let api_key = matches
        .get_one::<String>(firebase::ARG_API_KEY)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --firebase-api-key")?;

    Ok(FirebaseArgs {
        project_id: matches.get_one::<String>(firebase::ARG_PROJECT_ID).cloned(),
        api_key,
        service_account: matches
            .get_one::<String>(firebase::ARG_SERVICE_ACCOUNT)
            .map(PathBuf::from),
        access_token: matches
            .get_one::<String>(firebase::ARG_ACCESS_TOKEN)
            .cloned()
            .map(SecretString::from),
        identity_toolkit_url: matches
            .get_one::<String>(firebase::ARG_IDENTITY_TOOLKIT_URL)
            .cloned()
            .context("missing required argument: --identity-toolkit-url")?,
        firestore_url: matches
            .get_one::<String>(firebase::ARG_FIRESTORE_URL)
            .cloned()
            .context("missing required argument: --firestore-url")?,
    })
}
