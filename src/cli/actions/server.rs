use crate::{
    api,
    firebase::{FirebaseApp, FirebaseConfig, ServiceAccount, TokenSource},
    memory::MemoryBackend,
    session::SessionConfig,
};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug)]
pub struct FirebaseArgs {
    pub project_id: Option<String>,
    pub api_key: SecretString,
    pub service_account: Option<PathBuf>,
    pub access_token: Option<SecretString>,
    pub identity_toolkit_url: String,
    pub firestore_url: String,
}

impl FirebaseArgs {
    /// Resolve credentials; the project id falls back to the service account's.
    ///
    /// # Errors
    /// Returns an error if the key file cannot be loaded or no project id is known.
    pub fn config(&self) -> Result<FirebaseConfig> {
        let (token_source, account_project) = match (&self.service_account, &self.access_token) {
            (Some(path), _) => {
                let account = ServiceAccount::from_file(path)
                    .with_context(|| format!("Failed to load service account {}", path.display()))?;
                let project = account.project_id.clone();
                (TokenSource::ServiceAccount(account), project)
            }
            (None, Some(token)) => (TokenSource::Static(token.clone()), None),
            (None, None) => {
                return Err(anyhow!(
                    "Firebase backend needs a service account or an access token"
                ))
            }
        };

        let project_id = self
            .project_id
            .clone()
            .or(account_project)
            .ok_or_else(|| anyhow!("Missing Firebase project id"))?;

        Ok(
            FirebaseConfig::new(project_id, self.api_key.clone(), token_source)
                .with_identity_toolkit_url(self.identity_toolkit_url.clone())
                .with_firestore_url(self.firestore_url.clone()),
        )
    }
}

#[derive(Debug)]
pub enum Backend {
    Firebase(FirebaseArgs),
    Memory,
}

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub backend: Backend,
    pub production: bool,
    pub frontend_base_url: String,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the provider backend cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let providers = match &args.backend {
        Backend::Firebase(firebase) => {
            let config = firebase.config()?;
            info!(project_id = %config.project_id, "using Firebase backend");
            FirebaseApp::new(&config)
                .context("Failed to build Firebase clients")?
                .providers()
        }
        Backend::Memory => {
            warn!("using in-memory backend, nothing is persisted");
            MemoryBackend::new().providers()
        }
    };

    let session_config = SessionConfig::new(args.production);

    api::new(args.port, &providers, session_config, &args.frontend_base_url).await
}

fn log_startup_args(args: &Args) {
    let backend = match &args.backend {
        Backend::Firebase(firebase) => format!(
            "firebase (project: {}, credentials: {})",
            firebase.project_id.as_deref().unwrap_or("from service account"),
            if firebase.service_account.is_some() {
                "service account"
            } else {
                "static token"
            }
        ),
        Backend::Memory => "memory".to_string(),
    };
    let environment = if args.production {
        "production"
    } else {
        "development"
    };
    info!(
        "{} {} - {}\n  listen:       tcp:{}\n  backend:      {backend}\n  environment:  {environment}\n  frontend_url: {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH),
        args.port,
        args.frontend_base_url,
    );
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
