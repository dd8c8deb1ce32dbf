//! Firebase backend over the public REST APIs.
//!
//! - Identity Toolkit for account creation, password sign-in, account lookup
//!   and session cookie issuance.
//! - Session cookies are verified offline against the published key set
//!   ([`keys::SessionKeys`]), with the revocation check done through account
//!   lookup.
//! - Firestore for the `users` and `interviews` collections.
//!
//! Privileged calls carry an OAuth2 bearer token minted from a service account
//! (or a static token when talking to emulators).

pub mod credentials;
pub mod firestore;
pub mod identity;
pub mod jwks;
pub mod jwt;
pub mod keys;
pub mod value;

use reqwest::{Client, Response};
use secrecy::SecretString;
use serde_json::Value;
use std::{sync::Arc, time::Duration};

use crate::provider::{ProviderError, Providers};

pub use credentials::{AccessTokens, ServiceAccount, TokenSource};
pub use firestore::FirestoreStore;
pub use identity::FirebaseIdentity;

pub const DEFAULT_IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com";
pub const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com";
const REQUEST_TIMEOUT_SECONDS: u64 = 10;

#[derive(Clone)]
pub struct FirebaseConfig {
    pub project_id: String,
    /// Web API key used by the email/password endpoints.
    pub api_key: SecretString,
    pub identity_toolkit_url: String,
    pub firestore_url: String,
    pub token_source: TokenSource,
}

impl std::fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("project_id", &self.project_id)
            .field("api_key", &"***")
            .field("identity_toolkit_url", &self.identity_toolkit_url)
            .field("firestore_url", &self.firestore_url)
            .field("token_source", &self.token_source)
            .finish()
    }
}

impl FirebaseConfig {
    #[must_use]
    pub fn new(project_id: String, api_key: SecretString, token_source: TokenSource) -> Self {
        Self {
            project_id,
            api_key,
            identity_toolkit_url: DEFAULT_IDENTITY_TOOLKIT_URL.to_string(),
            firestore_url: DEFAULT_FIRESTORE_URL.to_string(),
            token_source,
        }
    }

    #[must_use]
    pub fn with_identity_toolkit_url(mut self, url: impl Into<String>) -> Self {
        self.identity_toolkit_url = url.into();
        self
    }

    #[must_use]
    pub fn with_firestore_url(mut self, url: impl Into<String>) -> Self {
        self.firestore_url = url.into();
        self
    }
}

/// Provider clients built once at startup and shared by every request.
#[derive(Clone, Debug)]
pub struct FirebaseApp {
    identity: Arc<FirebaseIdentity>,
    store: Arc<FirestoreStore>,
}

impl FirebaseApp {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built or an endpoint URL is invalid.
    pub fn new(config: &FirebaseConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()?;
        let tokens = Arc::new(AccessTokens::new(
            config.token_source.clone(),
            client.clone(),
        ));

        let identity = FirebaseIdentity::new(
            client.clone(),
            &config.identity_toolkit_url,
            &config.project_id,
            config.api_key.clone(),
            tokens.clone(),
        )?;
        let store = FirestoreStore::new(client, &config.firestore_url, &config.project_id, tokens)?;

        Ok(Self {
            identity: Arc::new(identity),
            store: Arc::new(store),
        })
    }

    #[must_use]
    pub fn providers(&self) -> Providers {
        Providers {
            identity: self.identity.clone(),
            admin: self.identity.clone(),
            users: self.store.clone(),
            interviews: self.store.clone(),
        }
    }
}

/// `{"error": {"message": ...}}` body of a failed call, or `[{"error": ...}]`
/// for streamed responses such as `runQuery`.
pub(crate) async fn error_message(response: Response) -> (u16, String) {
    let status = response.status().as_u16();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    let error = match &body {
        Value::Array(items) => items.first().map(|item| &item["error"]),
        _ => Some(&body["error"]),
    };
    let message = error
        .and_then(|error| error["message"].as_str())
        .unwrap_or_default()
        .to_string();
    (status, message)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::net::TcpListener;

    pub(crate) fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }
}
