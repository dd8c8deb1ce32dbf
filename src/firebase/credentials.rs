//! OAuth2 access tokens for privileged Firebase calls.
//!
//! A service account signs a JWT assertion which is exchanged at its token
//! endpoint for a bearer token (`urn:ietf:params:oauth:grant-type:jwt-bearer`).
//! The token is cached and reused until shortly before it expires.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::{
    path::Path,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use super::jwt::sign_rs256;
use crate::provider::{now_unix_seconds, ProviderError};

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const SCOPES: &str = "https://www.googleapis.com/auth/cloud-platform \
https://www.googleapis.com/auth/datastore \
https://www.googleapis.com/auth/identitytoolkit \
https://www.googleapis.com/auth/userinfo.email";
const ASSERTION_TTL_SECONDS: i64 = 3600;
/// Refresh this long before the provider-reported expiry.
const EXPIRY_MARGIN_SECONDS: u64 = 300;

#[derive(Deserialize)]
struct ServiceAccountFile {
    #[serde(default)]
    project_id: Option<String>,
    client_email: String,
    #[serde(default)]
    private_key_id: Option<String>,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

/// Google service-account key (the JSON file downloaded from the console).
#[derive(Clone)]
pub struct ServiceAccount {
    pub project_id: Option<String>,
    pub client_email: String,
    pub private_key_id: Option<String>,
    private_key: SecretString,
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"***")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccount {
    /// # Errors
    /// Returns `ProviderError::Credentials` if the JSON is not a service-account key.
    pub fn from_json(json: &str) -> Result<Self, ProviderError> {
        let file: ServiceAccountFile = serde_json::from_str(json)
            .map_err(|err| ProviderError::Credentials(format!("invalid service account: {err}")))?;
        Ok(Self {
            project_id: file.project_id,
            client_email: file.client_email,
            private_key_id: file.private_key_id,
            private_key: SecretString::from(file.private_key),
            token_uri: file
                .token_uri
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
        })
    }

    /// # Errors
    /// Returns `ProviderError::Credentials` if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ProviderError> {
        let json = std::fs::read_to_string(path).map_err(|err| {
            ProviderError::Credentials(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Signed JWT assertion for the token endpoint.
    fn assertion(&self, now: i64) -> Result<String, ProviderError> {
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: SCOPES,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_TTL_SECONDS,
        };
        sign_rs256(
            self.private_key.expose_secret(),
            self.private_key_id.as_deref(),
            &claims,
        )
        .map_err(|err| ProviderError::Credentials(format!("failed to sign assertion: {err}")))
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Where bearer tokens come from.
#[derive(Clone, Debug)]
pub enum TokenSource {
    ServiceAccount(ServiceAccount),
    /// Fixed token, e.g. `owner` for the local emulators.
    Static(SecretString),
}

struct CachedToken {
    token: SecretString,
    refresh_at: Instant,
}

pub struct AccessTokens {
    source: TokenSource,
    client: Client,
    cache: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for AccessTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokens")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl AccessTokens {
    #[must_use]
    pub fn new(source: TokenSource, client: Client) -> Self {
        Self {
            source,
            client,
            cache: Mutex::new(None),
        }
    }

    /// Current bearer token, minting a new one when the cached token is near expiry.
    ///
    /// Concurrent callers wait on the same refresh.
    ///
    /// # Errors
    /// Returns an error if the assertion cannot be signed or the exchange fails.
    pub async fn bearer(&self) -> Result<SecretString, ProviderError> {
        let account = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::ServiceAccount(account) => account,
        };

        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.token.clone());
            }
        }

        let (token, lifetime) = self.exchange(account).await?;
        *cache = Some(CachedToken {
            token: token.clone(),
            refresh_at: Instant::now()
                + lifetime.saturating_sub(Duration::from_secs(EXPIRY_MARGIN_SECONDS)),
        });
        Ok(token)
    }

    #[instrument(skip_all, fields(client_email = %account.client_email))]
    async fn exchange(&self, account: &ServiceAccount) -> Result<(SecretString, Duration), ProviderError> {
        let assertion = account.assertion(now_unix_seconds())?;

        let response = self
            .client
            .post(&account.token_uri)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let message = body["error_description"]
                .as_str()
                .or_else(|| body["error"].as_str())
                .unwrap_or_default()
                .to_string();
            return Err(ProviderError::Api { status, message });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Decode(format!("token response: {err}")))?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        info!(expires_in = lifetime.as_secs(), "access token minted");
        debug!("caching access token");

        Ok((SecretString::from(token.access_token), lifetime))
    }
}
