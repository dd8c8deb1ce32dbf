//! Identity Toolkit client: email/password accounts and session cookies.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

use super::{credentials::AccessTokens, keys::SessionKeys};
use crate::provider::{
    now_unix_seconds, AccountInfo, Credentials, IdentityAdmin, IdentityClient, ProviderError,
    SessionClaims,
};

const SESSION_ISSUER_PREFIX: &str = "https://session.firebase.google.com/";
const MAX_UID_LEN: usize = 128;
/// Tolerated drift between this host and the token issuer.
const CLOCK_SKEW_SECONDS: i64 = 300;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    local_id: String,
    id_token: String,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    disabled: bool,
    /// Unix seconds, encoded as a string.
    #[serde(default)]
    valid_since: Option<String>,
}

impl From<LookupUser> for AccountInfo {
    fn from(user: LookupUser) -> Self {
        Self {
            uid: user.local_id,
            email: user.email,
            disabled: user.disabled,
            valid_since: user.valid_since.and_then(|s| s.parse().ok()),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionCookieResponse {
    session_cookie: String,
}

#[derive(Deserialize)]
struct SessionCookieClaims {
    iss: String,
    aud: String,
    #[serde(default)]
    sub: String,
    auth_time: i64,
    #[serde(default)]
    iat: i64,
    exp: i64,
}

/// Map an Identity Toolkit error message (`"EMAIL_EXISTS"`,
/// `"WEAK_PASSWORD : Password should be at least 6 characters"`, ...).
fn identity_error(status: u16, message: &str) -> ProviderError {
    let code = message.split(" : ").next().unwrap_or_default().trim();
    match code {
        "EMAIL_EXISTS" => ProviderError::EmailExists,
        "EMAIL_NOT_FOUND" | "USER_NOT_FOUND" => ProviderError::AccountNotFound,
        "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "USER_DISABLED" => {
            ProviderError::InvalidCredentials
        }
        "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" | "USER_MISMATCH" => {
            ProviderError::InvalidSession(code.to_string())
        }
        _ => ProviderError::Api {
            status,
            message: message.to_string(),
        },
    }
}

pub struct FirebaseIdentity {
    client: Client,
    base: Url,
    project_id: String,
    api_key: SecretString,
    tokens: Arc<AccessTokens>,
    keys: SessionKeys,
}

impl std::fmt::Debug for FirebaseIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseIdentity")
            .field("base", &self.base.as_str())
            .field("project_id", &self.project_id)
            .field("api_key", &"***")
            .finish_non_exhaustive()
    }
}

impl FirebaseIdentity {
    /// # Errors
    /// Returns `ProviderError::Credentials` if `base_url` is not a valid URL.
    pub fn new(
        client: Client,
        base_url: &str,
        project_id: &str,
        api_key: SecretString,
        tokens: Arc<AccessTokens>,
    ) -> Result<Self, ProviderError> {
        let base = Url::parse(base_url.trim_end_matches('/')).map_err(|err| {
            ProviderError::Credentials(format!("invalid identity toolkit URL {base_url}: {err}"))
        })?;
        let keys = SessionKeys::new(
            format!("{}/v1/sessionCookiePublicKeys", base.as_str().trim_end_matches('/')),
            client.clone(),
        );
        Ok(Self {
            client,
            base,
            project_id: project_id.to_string(),
            api_key,
            tokens,
            keys,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.base.as_str().trim_end_matches('/'))
    }

    fn expected_issuer(&self) -> String {
        format!("{SESSION_ISSUER_PREFIX}{}", self.project_id)
    }

    /// Unprivileged call authenticated by the web API key.
    fn public_request(&self, path: &str) -> RequestBuilder {
        self.client
            .post(self.endpoint(path))
            .query(&[("key", self.api_key.expose_secret())])
    }

    /// Privileged call authenticated by an OAuth2 bearer token.
    async fn admin_request(&self, path: &str) -> Result<RequestBuilder, ProviderError> {
        let token = self.tokens.bearer().await?;
        Ok(self
            .client
            .post(self.endpoint(path))
            .bearer_auth(token.expose_secret()))
    }

    async fn send<T: DeserializeOwned>(
        request: RequestBuilder,
        body: &Value,
    ) -> Result<T, ProviderError> {
        let response = request.json(body).send().await?;
        if !response.status().is_success() {
            let (status, message) = super::error_message(response).await;
            return Err(identity_error(status, &message));
        }
        response
            .json()
            .await
            .map_err(|err| ProviderError::Decode(err.to_string()))
    }

    async fn lookup(&self, body: Value) -> Result<AccountInfo, ProviderError> {
        let path = format!("projects/{}/accounts:lookup", self.project_id);
        let request = self.admin_request(&path).await?;
        let found: LookupResponse = Self::send(request, &body).await?;
        found
            .users
            .into_iter()
            .next()
            .map(AccountInfo::from)
            .ok_or(ProviderError::AccountNotFound)
    }

    fn check_claims(&self, claims: &SessionCookieClaims) -> Result<(), ProviderError> {
        let reject = |reason: &str| Err(ProviderError::InvalidSession(reason.to_string()));
        if claims.iss != self.expected_issuer() {
            return reject("invalid issuer");
        }
        if claims.aud != self.project_id {
            return reject("invalid audience");
        }
        if claims.sub.is_empty() || claims.sub.len() > MAX_UID_LEN {
            return reject("invalid subject");
        }
        let now = now_unix_seconds();
        if claims.exp <= now {
            return reject("session cookie expired");
        }
        let latest = now.saturating_add(CLOCK_SKEW_SECONDS);
        if claims.auth_time <= 0 {
            return reject("missing auth_time");
        }
        if claims.auth_time > latest {
            return reject("auth_time in the future");
        }
        if claims.iat > latest {
            return reject("issued in the future");
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityClient for FirebaseIdentity {
    #[instrument(skip(self, password))]
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Credentials, ProviderError> {
        let body = json!({ "email": email, "password": password, "returnSecureToken": true });
        let created: PasswordResponse = Self::send(self.public_request("accounts:signUp"), &body).await?;
        debug!(uid = %created.local_id, "identity account created");
        Ok(Credentials {
            uid: created.local_id,
            id_token: created.id_token,
        })
    }

    #[instrument(skip(self, password))]
    async fn authenticate(&self, email: &str, password: &str) -> Result<Credentials, ProviderError> {
        let body = json!({ "email": email, "password": password, "returnSecureToken": true });
        let signed_in: PasswordResponse =
            Self::send(self.public_request("accounts:signInWithPassword"), &body).await?;
        Ok(Credentials {
            uid: signed_in.local_id,
            id_token: signed_in.id_token,
        })
    }
}

#[async_trait]
impl IdentityAdmin for FirebaseIdentity {
    #[instrument(skip(self))]
    async fn lookup_by_email(&self, email: &str) -> Result<AccountInfo, ProviderError> {
        self.lookup(json!({ "email": [email] })).await
    }

    #[instrument(skip(self, id_token))]
    async fn issue_session_cookie(
        &self,
        id_token: &str,
        expires_in_ms: u64,
    ) -> Result<String, ProviderError> {
        // The REST API takes seconds.
        let body = json!({ "idToken": id_token, "validDuration": expires_in_ms / 1000 });
        let path = format!("projects/{}:createSessionCookie", self.project_id);
        let request = self.admin_request(&path).await?;
        let created: SessionCookieResponse = Self::send(request, &body).await?;
        Ok(created.session_cookie)
    }

    #[instrument(skip(self, session_cookie))]
    async fn verify_session_cookie(
        &self,
        session_cookie: &str,
        check_revoked: bool,
    ) -> Result<SessionClaims, ProviderError> {
        let claims: SessionCookieClaims = self.keys.verify(session_cookie).await?;
        self.check_claims(&claims)?;

        if check_revoked {
            let account = match self.lookup(json!({ "localId": [claims.sub] })).await {
                Err(ProviderError::AccountNotFound) => {
                    return Err(ProviderError::InvalidSession("account deleted".to_string()))
                }
                other => other?,
            };
            if account.disabled {
                return Err(ProviderError::Revoked);
            }
            if account
                .valid_since
                .is_some_and(|valid_since| claims.auth_time < valid_since)
            {
                return Err(ProviderError::Revoked);
            }
        }

        Ok(SessionClaims {
            uid: claims.sub,
            auth_time: claims.auth_time,
            expires_at: claims.exp,
        })
    }
}
